//! Adaptive engine trait.
//!
//! An [`AdaptiveEngine`] fetches a manifest and its segments and feeds them
//! to a playback surface when the surface cannot play HLS by itself. The
//! session owns exactly one engine at a time and talks to it only through
//! this trait; [`HlsEngine`](super::hls::HlsEngine) is the implementation
//! used in production.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;
use std::time::Duration;

use url::Url;

use super::events::EventSink;
use super::surface::PlaybackSurface;

/// Quality selection strategy for stream variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamQuality {
    /// Highest available bitrate / resolution.
    Best,
    /// Lowest available bitrate / resolution.
    Worst,
    /// Closest match to the given height in pixels (e.g., 720, 1080).
    Specific(u32),
}

impl StreamQuality {
    /// Parse `best`, `worst` or a pixel height. Unknown input means `Best`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "best" => Self::Best,
            "worst" => Self::Worst,
            q => q
                .trim_end_matches('p')
                .parse::<u32>()
                .map_or(Self::Best, Self::Specific),
        }
    }
}

/// Process-unique engine identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EngineId(u64);

impl EngineId {
    /// Allocate the next id.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine#{}", self.0)
    }
}

/// Runtime configuration for a managed engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Played media retained behind the playhead.
    pub back_buffer: Duration,
    /// Media buffered ahead of the playhead before fetching pauses.
    pub max_buffer: Duration,
    /// Refresh live playlists at a quarter of the target duration.
    pub low_latency: bool,
    /// Probe segment containers on the blocking pool.
    pub enable_worker: bool,
    /// Attempts per segment before reporting a fatal network error.
    pub segment_retries: u32,
    pub request_timeout: Duration,
    /// Segments fetched in parallel.
    pub max_concurrent: usize,
    pub quality: StreamQuality,
}

impl Default for EngineConfig {
    fn default() -> Self {
        crate::config::EngineSection::default().to_engine_config()
    }
}

/// The in-process adaptive streaming engine.
///
/// All methods return immediately; progress and failures are reported
/// through the [`EventSink`] the engine was created with.
pub trait AdaptiveEngine: Send {
    fn id(&self) -> EngineId;

    /// Set the manifest to play. Loading starts once media is attached.
    fn load_source(&mut self, url: &Url);

    /// Bind the engine's output to a surface.
    fn attach_media(&mut self, surface: Weak<dyn PlaybackSurface>);

    /// (Re)start fetching from the current position, reusing parsed state.
    fn start_load(&mut self);

    /// Rebuild the surface's decode pipeline in place, keeping position.
    fn recover_media_error(&mut self);

    /// Stop all fetch work and release the surface. Idempotent.
    fn destroy(&mut self);
}

/// Constructs engines for a session.
pub trait EngineFactory: Send + Sync {
    fn create(&self, config: &EngineConfig, events: EventSink) -> Box<dyn AdaptiveEngine>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_parse() {
        assert_eq!(StreamQuality::parse("best"), StreamQuality::Best);
        assert_eq!(StreamQuality::parse("WORST"), StreamQuality::Worst);
        assert_eq!(StreamQuality::parse("720"), StreamQuality::Specific(720));
        assert_eq!(StreamQuality::parse("1080p"), StreamQuality::Specific(1080));
        assert_eq!(StreamQuality::parse("ultra"), StreamQuality::Best);
    }

    #[test]
    fn test_engine_ids_are_unique() {
        let a = EngineId::next();
        let b = EngineId::next();
        assert_ne!(a, b);
        assert!(b.get() > a.get());
        assert!(a.to_string().starts_with("engine#"));
    }
}
