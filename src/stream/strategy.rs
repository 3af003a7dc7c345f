//! Playback strategy selection.
//!
//! The surface's capabilities are queried once per `attach` and pick a
//! strategy: native (the surface plays the manifest URL itself) or managed
//! (an engine fetches segments and pushes them into the surface).

use std::sync::Arc;

use tracing::debug;

use super::descriptor::StreamDescriptor;
use super::engine::{AdaptiveEngine, EngineConfig, EngineFactory, EngineId};
use super::events::EventSink;
use super::surface::{PlaybackSurface, SurfaceCapabilities, SurfaceSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    Native,
    Managed,
}

/// The active decoding pipeline of a session.
pub enum Pipeline {
    Native,
    Managed(Box<dyn AdaptiveEngine>),
    /// No capability was available; nothing is attached.
    Unavailable,
}

impl Pipeline {
    #[must_use]
    pub fn mode(&self) -> Option<PlaybackMode> {
        match self {
            Self::Native => Some(PlaybackMode::Native),
            Self::Managed(_) => Some(PlaybackMode::Managed),
            Self::Unavailable => None,
        }
    }

    #[must_use]
    pub fn engine_id(&self) -> Option<EngineId> {
        match self {
            Self::Managed(engine) => Some(engine.id()),
            _ => None,
        }
    }

    pub fn engine_mut(&mut self) -> Option<&mut (dyn AdaptiveEngine + 'static)> {
        match self {
            Self::Managed(engine) => Some(engine.as_mut()),
            _ => None,
        }
    }

    /// Destroy the engine, if any. The pipeline becomes `Unavailable`.
    pub fn dispose(&mut self) {
        if let Self::Managed(engine) = self {
            debug!(id = %engine.id(), "Disposing engine");
            engine.destroy();
        }
        *self = Self::Unavailable;
    }
}

/// Everything a strategy needs to bring up a pipeline.
pub struct StartContext<'a> {
    pub descriptor: &'a StreamDescriptor,
    pub surface: &'a Arc<dyn PlaybackSurface>,
    pub events: &'a EventSink,
    pub config: &'a EngineConfig,
}

pub trait PlaybackStrategy {
    fn mode(&self) -> PlaybackMode;

    /// Point the surface at the stream and begin loading.
    fn start(&self, ctx: &StartContext<'_>) -> Pipeline;
}

/// The surface plays the manifest URL directly.
pub struct NativeStrategy;

impl PlaybackStrategy for NativeStrategy {
    fn mode(&self) -> PlaybackMode {
        PlaybackMode::Native
    }

    fn start(&self, ctx: &StartContext<'_>) -> Pipeline {
        ctx.surface
            .set_source(SurfaceSource::Url(ctx.descriptor.stream_url().clone()));
        Pipeline::Native
    }
}

/// An engine from the factory mediates fetch and decode.
pub struct ManagedStrategy {
    factory: Arc<dyn EngineFactory>,
}

impl ManagedStrategy {
    #[must_use]
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self { factory }
    }
}

impl PlaybackStrategy for ManagedStrategy {
    fn mode(&self) -> PlaybackMode {
        PlaybackMode::Managed
    }

    fn start(&self, ctx: &StartContext<'_>) -> Pipeline {
        let mut engine = self.factory.create(ctx.config, ctx.events.clone());
        ctx.surface.set_source(SurfaceSource::Managed(engine.id()));
        engine.attach_media(Arc::downgrade(ctx.surface));
        engine.load_source(ctx.descriptor.stream_url());
        Pipeline::Managed(engine)
    }
}

/// Pick the strategy for a surface. Native support wins when declared.
#[must_use]
pub fn select(
    capabilities: SurfaceCapabilities,
    factory: &Arc<dyn EngineFactory>,
) -> Option<Box<dyn PlaybackStrategy>> {
    if capabilities.native_hls {
        Some(Box::new(NativeStrategy))
    } else if capabilities.managed {
        Some(Box::new(ManagedStrategy::new(Arc::clone(factory))))
    } else {
        None
    }
}
