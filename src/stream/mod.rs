//! Adaptive HLS playback.
//!
//! A [`StreamSession`] binds a [`StreamDescriptor`] to a [`PlaybackSurface`].
//! Surfaces that play HLS themselves get the manifest URL directly; all
//! others are fed by an [`AdaptiveEngine`] (in production, [`HlsEngine`]).
//! Engine and surface events go through the [`recovery`] controller, which
//! decides whether to reload, reset the decode pipeline or give up.

pub mod buffer;
pub mod descriptor;
pub mod engine;
pub mod events;
pub mod hls;
pub mod playlist;
pub mod recovery;
pub mod session;
pub mod strategy;
pub mod surface;

pub use descriptor::StreamDescriptor;
pub use engine::{AdaptiveEngine, EngineConfig, EngineFactory, EngineId, StreamQuality};
pub use events::{
    EngineErrorKind, EngineEvent, EventSink, EventSource, PlaybackEvent, PlayerEvent,
    PlayerEventKind, PlayerEvents, SurfaceErrorKind, SurfaceEvent,
};
pub use hls::{HlsEngine, HlsEngineFactory};
pub use recovery::{Action, Phase, RecoveryController, Signal};
pub use session::StreamSession;
pub use strategy::{PlaybackMode, PlaybackStrategy};
pub use surface::{MediaSegment, PlaybackSurface, SurfaceCapabilities, SurfaceSource};
