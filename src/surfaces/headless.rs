//! Headless surface: writes the managed segment stream to a byte sink.
//!
//! Useful for piping to a player (`vodplay play 42 | mpv -`) or saving a
//! recording. It cannot play HLS itself, so sessions always drive it in
//! managed mode.

use std::io::Write;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, trace};
use url::Url;

use crate::error::{AppendError, PlayRejected};
use crate::stream::{
    EventSink, MediaSegment, PlaybackSurface, SurfaceCapabilities, SurfaceEvent, SurfaceSource,
};

struct State {
    out: Box<dyn Write + Send>,
    source: SurfaceSource,
    sink: Option<EventSink>,
    poster: Option<Url>,
    /// Highest sequence written for the current source.
    written_through: Option<u64>,
    /// End of the last written segment on the media timeline.
    position: f64,
    bytes_written: u64,
    playing: bool,
    ended: bool,
}

impl State {
    fn emit(&self, event: SurfaceEvent) {
        if let Some(sink) = &self.sink {
            sink.emit(event);
        }
    }
}

pub struct HeadlessSurface {
    state: Mutex<State>,
}

impl HeadlessSurface {
    #[must_use]
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            state: Mutex::new(State {
                out,
                source: SurfaceSource::Empty,
                sink: None,
                poster: None,
                written_through: None,
                position: 0.0,
                bytes_written: 0,
                playing: false,
                ended: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The engine signalled end of stream.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.lock().ended
    }

    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.lock().bytes_written
    }

    #[must_use]
    pub fn source(&self) -> SurfaceSource {
        self.lock().source.clone()
    }

    #[must_use]
    pub fn poster(&self) -> Option<Url> {
        self.lock().poster.clone()
    }
}

impl PlaybackSurface for HeadlessSurface {
    fn capabilities(&self) -> SurfaceCapabilities {
        SurfaceCapabilities {
            native_hls: false,
            managed: true,
        }
    }

    fn set_source(&self, source: SurfaceSource) {
        let mut state = self.lock();
        debug!(?source, "Headless surface source changed");
        state.source = source;
        state.written_through = None;
        state.position = 0.0;
        state.playing = false;
        state.ended = false;
    }

    fn set_poster(&self, poster: Option<&Url>) {
        self.lock().poster = poster.cloned();
    }

    fn play(&self) -> Result<(), PlayRejected> {
        let mut state = self.lock();
        if !matches!(state.source, SurfaceSource::Managed(_)) {
            return Err(PlayRejected("no managed source attached".to_string()));
        }
        if !state.playing {
            state.playing = true;
            state.emit(SurfaceEvent::Playing);
        }
        Ok(())
    }

    fn append(&self, segment: &MediaSegment) -> Result<(), AppendError> {
        let mut state = self.lock();
        if state.source != SurfaceSource::Managed(segment.engine) {
            return Err(AppendError(format!(
                "segment from {} does not match the current source",
                segment.engine
            )));
        }
        // A pipeline reset re-feeds buffered segments; bytes already written
        // to the sink cannot be taken back.
        if state.written_through.is_some_and(|w| segment.sequence <= w) {
            trace!(sequence = segment.sequence, "Skipping already written segment");
            return Ok(());
        }

        state
            .out
            .write_all(&segment.data)
            .map_err(|e| AppendError(format!("write failed: {e}")))?;
        state.written_through = Some(segment.sequence);
        state.position = segment.start + segment.duration;
        state.bytes_written += segment.data.len() as u64;
        Ok(())
    }

    fn reset_pipeline(&self) -> Result<(), AppendError> {
        self.lock()
            .out
            .flush()
            .map_err(|e| AppendError(format!("flush failed: {e}")))
    }

    fn end_of_stream(&self) {
        let mut state = self.lock();
        if let Err(e) = state.out.flush() {
            debug!(error = %e, "Flush at end of stream failed");
        }
        state.ended = true;
        state.emit(SurfaceEvent::Ended);
    }

    fn current_time(&self) -> Duration {
        Duration::from_secs_f64(self.lock().position.max(0.0))
    }

    fn subscribe(&self, sink: EventSink) {
        self.lock().sink = Some(sink);
    }

    fn unsubscribe(&self) {
        self.lock().sink = None;
    }
}
