//! Event plumbing between engines, surfaces and the session.
//!
//! Engine and surface callbacks are funnelled into one queue of
//! [`QueuedEvent`]s, each stamped with the session generation it was issued
//! under. An [`EventSink`] refuses to enqueue once its generation is stale,
//! and the session drops any stale entry that slipped in before the
//! generation advanced.
//!
//! Outward, the session publishes [`PlayerEvent`]s on a broadcast bus.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use url::Url;

use crate::error::Fault;

/// Which collaborator emitted an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    Engine,
    Surface,
}

/// Error category reported by an adaptive engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    /// Manifest or segment fetch failure.
    Network,
    /// Segment rejected by the container probe or the surface decoder.
    Media,
    /// Anything else: unparsable manifest, failed pipeline reset, ...
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    ManifestLoading { url: Url },
    ManifestParsed { variants: usize, segments: usize, live: bool },
    SegmentAppended { sequence: u64, bytes: usize },
    /// A fresh decode pipeline was built and re-fed after a media reset.
    MediaRecovered { position_secs: f64 },
    EndOfStream,
    /// Non-fatal errors are informational; the engine already retried.
    Error {
        kind: EngineErrorKind,
        fatal: bool,
        detail: String,
    },
}

/// Error category reported by a playback surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceErrorKind {
    Network,
    Decode,
    SourceNotSupported,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    LoadedMetadata,
    Playing,
    Paused,
    Ended,
    Error { kind: SurfaceErrorKind, detail: String },
}

/// Tagged event as seen by the recovery controller.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Engine(EngineEvent),
    Surface(SurfaceEvent),
}

impl PlaybackEvent {
    #[must_use]
    pub fn source(&self) -> EventSource {
        match self {
            Self::Engine(_) => EventSource::Engine,
            Self::Surface(_) => EventSource::Surface,
        }
    }
}

impl From<EngineEvent> for PlaybackEvent {
    fn from(e: EngineEvent) -> Self {
        Self::Engine(e)
    }
}

impl From<SurfaceEvent> for PlaybackEvent {
    fn from(e: SurfaceEvent) -> Self {
        Self::Surface(e)
    }
}

/// Queue entry: an event plus the generation that issued its sink.
#[derive(Debug, Clone)]
pub struct QueuedEvent {
    pub generation: u64,
    pub event: PlaybackEvent,
}

/// Monotonic generation counter owned by a session.
#[derive(Debug, Default)]
pub(crate) struct Generations {
    current: Arc<AtomicU64>,
}

impl Generations {
    /// Invalidate every outstanding token and issue a new one.
    pub(crate) fn advance(&self) -> Liveness {
        let issued = self.current.fetch_add(1, Ordering::AcqRel) + 1;
        Liveness {
            current: Arc::clone(&self.current),
            issued,
        }
    }

    pub(crate) fn current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }
}

/// Token captured by asynchronous work; live until the session moves on.
#[derive(Debug, Clone)]
pub struct Liveness {
    current: Arc<AtomicU64>,
    issued: u64,
}

impl Liveness {
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.issued
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.current.load(Ordering::Acquire) == self.issued
    }
}

/// Handle given to engines and surfaces for reporting events.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<QueuedEvent>,
    liveness: Liveness,
}

impl EventSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<QueuedEvent>, liveness: Liveness) -> Self {
        Self { tx, liveness }
    }

    /// Enqueue an event. Returns `false` if the sink's session has moved on
    /// (the event is dropped).
    pub fn emit<E: Into<PlaybackEvent>>(&self, event: E) -> bool {
        if !self.liveness.is_live() {
            return false;
        }
        self.tx
            .send(QueuedEvent {
                generation: self.liveness.generation(),
                event: event.into(),
            })
            .is_ok()
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.liveness.is_live()
    }

    #[must_use]
    pub fn liveness(&self) -> &Liveness {
        &self.liveness
    }
}

/// Event kinds exposed to the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEventKind {
    Loaded,
    Playing,
    Fault,
}

/// Event published to the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// Manifest parsed (managed) or metadata loaded (native).
    Loaded { url: Url },
    Playing,
    /// Terminal fault; the session is now `Failed`.
    Fault(Fault),
}

impl PlayerEvent {
    #[must_use]
    pub fn kind(&self) -> PlayerEventKind {
        match self {
            Self::Loaded { .. } => PlayerEventKind::Loaded,
            Self::Playing => PlayerEventKind::Playing,
            Self::Fault(_) => PlayerEventKind::Fault,
        }
    }
}

/// Broadcast bus for [`PlayerEvent`]s.
///
/// Publishing is a sync call; without subscribers events are dropped.
#[derive(Clone, Debug)]
pub struct PlayerEvents {
    tx: broadcast::Sender<PlayerEvent>,
}

impl PlayerEvents {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: PlayerEvent) {
        let _ = self.tx.send(event);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_drops_after_generation_advances() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let generations = Generations::default();
        let sink = EventSink::new(tx, generations.advance());

        assert!(sink.emit(SurfaceEvent::Playing));
        let queued = rx.try_recv().unwrap();
        assert_eq!(queued.generation, 1);
        assert_eq!(queued.event.source(), EventSource::Surface);

        let _next = generations.advance();
        assert!(!sink.is_live());
        assert!(!sink.emit(EngineEvent::EndOfStream));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_generations_are_monotonic() {
        let generations = Generations::default();
        let a = generations.advance();
        let b = generations.advance();
        assert!(b.generation() > a.generation());
        assert!(!a.is_live());
        assert!(b.is_live());
        assert_eq!(generations.current(), b.generation());
    }

    #[test]
    fn test_player_event_kind() {
        assert_eq!(PlayerEvent::Playing.kind(), PlayerEventKind::Playing);
        assert_eq!(
            PlayerEvent::Fault(Fault::Terminal("x".into())).kind(),
            PlayerEventKind::Fault
        );
    }

    #[tokio::test]
    async fn test_bus_delivers_to_each_subscriber() {
        let bus = PlayerEvents::new(8);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        bus.publish(PlayerEvent::Playing);
        assert_eq!(rx1.recv().await.unwrap(), PlayerEvent::Playing);
        assert_eq!(rx2.recv().await.unwrap(), PlayerEvent::Playing);
    }

    #[test]
    fn test_publish_without_subscribers_does_not_panic() {
        let bus = PlayerEvents::new(1);
        bus.publish(PlayerEvent::Playing);
    }
}
