//! Playback surface capability.
//!
//! The surface belongs to the UI layer. The session holds only a weak
//! reference to it and never creates or destroys it; it sets the source,
//! asks it to play, and subscribes to its events.

use std::time::Duration;

use bytes::Bytes;
use url::Url;

use super::engine::EngineId;
use super::events::EventSink;
use crate::error::{AppendError, PlayRejected};

/// What a surface can play, queried once per `attach`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SurfaceCapabilities {
    /// The surface fetches and decodes HLS by itself.
    pub native_hls: bool,
    /// The surface accepts segments pushed by an engine.
    pub managed: bool,
}

/// Where the surface takes its media from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceSource {
    Empty,
    /// Native playback of a manifest URL.
    Url(Url),
    /// Segments pushed by the given engine.
    Managed(EngineId),
}

/// One segment pushed by an engine, positioned on the media timeline.
#[derive(Debug, Clone)]
pub struct MediaSegment {
    pub engine: EngineId,
    pub sequence: u64,
    /// Timeline offset in seconds.
    pub start: f64,
    pub duration: f64,
    pub data: Bytes,
}

pub trait PlaybackSurface: Send + Sync {
    fn capabilities(&self) -> SurfaceCapabilities;

    fn set_source(&self, source: SurfaceSource);

    fn set_poster(&self, poster: Option<&Url>) {
        let _ = poster;
    }

    /// Start playback. A rejection is an expected outcome, not a fault.
    fn play(&self) -> Result<(), PlayRejected>;

    /// Push a segment into the decode pipeline (managed mode).
    fn append(&self, segment: &MediaSegment) -> Result<(), AppendError>;

    /// Segments fell out of the back buffer and may be released.
    fn evict(&self, sequences: &[u64]) {
        let _ = sequences;
    }

    /// Tear down and rebuild the decode pipeline, keeping the playhead.
    fn reset_pipeline(&self) -> Result<(), AppendError>;

    /// No more segments will be appended.
    fn end_of_stream(&self) {}

    /// Current playhead.
    fn current_time(&self) -> Duration;

    /// Route surface events into `sink`, replacing any previous sink.
    fn subscribe(&self, sink: EventSink);

    fn unsubscribe(&self);
}
