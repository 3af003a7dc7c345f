//! Stream session: binds one stream to one playback surface.
//!
//! The session owns the engine (if any) and the recovery controller, holds
//! a non-owning reference to the surface, and pumps the single event queue
//! that engines and surfaces report into. Nothing here blocks: `attach` and
//! `detach` return immediately and outcomes arrive on the [`PlayerEvents`]
//! bus.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vodplay::config::PlayerConfig;
//! use vodplay::stream::{HlsEngineFactory, StreamDescriptor, StreamSession};
//! use vodplay::surfaces::HeadlessSurface;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = PlayerConfig::default();
//! let factory = Arc::new(HlsEngineFactory::new(config.engine.request_timeout())?);
//! let mut session = StreamSession::new(factory, &config);
//!
//! let surface = Arc::new(HeadlessSurface::new(Box::new(std::io::sink())));
//! session.attach(StreamDescriptor::new("https://cdn.example/a.m3u8", None)?, &surface);
//! while !surface.is_ended() {
//!     session.process_next().await;
//! }
//! session.detach();
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Weak};

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use super::descriptor::StreamDescriptor;
use super::engine::{EngineConfig, EngineFactory, EngineId};
use super::events::{EventSink, Generations, PlayerEvent, PlayerEvents, QueuedEvent};
use super::recovery::{classify, Action, Phase, RecoveryController, Signal};
use super::strategy::{self, Pipeline, PlaybackMode, StartContext};
use super::surface::{PlaybackSurface, SurfaceSource};
use crate::config::PlayerConfig;
use crate::error::{Fault, FaultKind};

/// Capacity of the outward event bus.
const BUS_CAPACITY: usize = 64;

/// State tied to one `attach`; dropped on `detach` or re-attach.
struct Binding {
    generation: u64,
    descriptor: StreamDescriptor,
    surface: Weak<dyn PlaybackSurface>,
    pipeline: Pipeline,
    /// Mode the pipeline was started in; survives disposal on failure.
    mode: Option<PlaybackMode>,
    recovery: RecoveryController,
    loaded_announced: bool,
}

pub struct StreamSession {
    factory: Arc<dyn EngineFactory>,
    engine_config: EngineConfig,
    retry_budget: u32,
    generations: Generations,
    queue_tx: mpsc::UnboundedSender<QueuedEvent>,
    queue_rx: mpsc::UnboundedReceiver<QueuedEvent>,
    bus: PlayerEvents,
    active: Option<Binding>,
}

impl StreamSession {
    #[must_use]
    pub fn new(factory: Arc<dyn EngineFactory>, config: &PlayerConfig) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            factory,
            engine_config: config.engine.to_engine_config(),
            retry_budget: config.recovery.retry_budget,
            generations: Generations::default(),
            queue_tx,
            queue_rx,
            bus: PlayerEvents::new(BUS_CAPACITY),
            active: None,
        }
    }

    /// Bind `descriptor` to `surface`, replacing any previous binding.
    ///
    /// The previous engine is destroyed before the new one is created.
    pub fn attach<S>(&mut self, descriptor: StreamDescriptor, surface: &Arc<S>)
    where
        S: PlaybackSurface + 'static,
    {
        let surface: Arc<dyn PlaybackSurface> = Arc::clone(surface) as Arc<dyn PlaybackSurface>;
        let weak = Arc::downgrade(&surface);

        if let Some(old) = self.active.take() {
            let same_surface = old.surface.ptr_eq(&weak);
            self.teardown(old, !same_surface);
        }

        let liveness = self.generations.advance();
        let generation = liveness.generation();
        let sink = EventSink::new(self.queue_tx.clone(), liveness);
        info!(url = %descriptor.stream_url(), generation, "Attaching stream");

        surface.subscribe(sink.clone());
        surface.set_poster(descriptor.poster_url());

        let mut recovery = RecoveryController::new(self.retry_budget);
        let pipeline = match strategy::select(surface.capabilities(), &self.factory) {
            Some(strategy) => {
                debug!(mode = ?strategy.mode(), "Selected playback strategy");
                let pipeline = strategy.start(&StartContext {
                    descriptor: &descriptor,
                    surface: &surface,
                    events: &sink,
                    config: &self.engine_config,
                });
                recovery.begin();
                pipeline
            }
            None => {
                let fault = Fault::Unsupported(
                    "surface supports neither native HLS nor managed playback".to_string(),
                );
                error!(%fault, "Cannot play stream");
                recovery.fail(FaultKind::Unsupported);
                self.bus.publish(PlayerEvent::Fault(fault));
                Pipeline::Unavailable
            }
        };

        self.active = Some(Binding {
            generation,
            descriptor,
            surface: weak,
            mode: pipeline.mode(),
            pipeline,
            recovery,
            loaded_announced: false,
        });
    }

    /// Release the engine and the surface. Idempotent.
    pub fn detach(&mut self) {
        if let Some(binding) = self.active.take() {
            info!(url = %binding.descriptor.stream_url(), "Detaching stream");
            self.teardown(binding, true);
        }
    }

    fn teardown(&mut self, mut binding: Binding, release_surface: bool) {
        // Invalidate every sink handed out for this binding first.
        self.generations.advance();
        binding.pipeline.dispose();
        if let Some(surface) = binding.surface.upgrade() {
            surface.unsubscribe();
            if release_surface {
                surface.set_source(SurfaceSource::Empty);
            }
        }
    }

    /// Handle every event already queued. Returns how many were taken.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(queued) = self.queue_rx.try_recv() {
            self.handle(queued);
            handled += 1;
        }
        handled
    }

    /// Wait for the next event, handle it and return the resulting phase.
    pub async fn process_next(&mut self) -> Phase {
        if let Some(queued) = self.queue_rx.recv().await {
            self.handle(queued);
        }
        self.phase()
    }

    fn handle(&mut self, queued: QueuedEvent) {
        let current = self.generations.current();
        let Some(binding) = self.active.as_mut() else {
            debug!(generation = queued.generation, "Dropping event, no active stream");
            return;
        };
        if queued.generation != current || queued.generation != binding.generation {
            debug!(
                generation = queued.generation,
                current, "Dropping stale event"
            );
            return;
        }
        let Some(mode) = binding.pipeline.mode() else {
            return;
        };

        let signal = classify(&queued.event, mode);
        let source_ready = signal == Signal::SourceReady;
        let fault_kind = match &signal {
            Signal::Fault(fault) => Some(fault.kind()),
            _ => None,
        };

        let before = binding.recovery.phase();
        let action = binding.recovery.handle(signal);
        let after = binding.recovery.phase();

        if let Some(kind) = fault_kind {
            warn!(%kind, ?action, phase = %after, "Classified playback fault");
        }
        if before != after {
            debug!(from = %before, to = %after, "Recovery phase changed");
        }

        if source_ready && !binding.loaded_announced {
            binding.loaded_announced = true;
            self.bus.publish(PlayerEvent::Loaded {
                url: binding.descriptor.stream_url().clone(),
            });
        }
        if after == Phase::Playing && before != Phase::Playing {
            self.bus.publish(PlayerEvent::Playing);
        }

        self.apply(action);
    }

    fn apply(&mut self, action: Action) {
        let Some(binding) = self.active.as_mut() else {
            return;
        };

        match action {
            Action::None => {}
            Action::Autoplay => {
                let Some(surface) = binding.surface.upgrade() else {
                    info!("Surface was unmounted, detaching");
                    self.detach();
                    return;
                };
                if let Err(e) = surface.play() {
                    info!(reason = %e, "Autoplay rejected");
                }
            }
            Action::ReloadSource => match binding.pipeline.engine_mut() {
                Some(engine) => engine.start_load(),
                None => debug!("No engine to reload"),
            },
            Action::ResetPipeline => match binding.pipeline.engine_mut() {
                Some(engine) => engine.recover_media_error(),
                None => debug!("No engine to reset"),
            },
            Action::Terminate(fault) => {
                error!(%fault, url = %binding.descriptor.stream_url(), "Playback failed");
                binding.pipeline.dispose();
                self.bus.publish(PlayerEvent::Fault(fault));
            }
        }
    }

    /// Subscribe to `loaded`, `playing` and `fault` events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.bus.subscribe()
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.active
            .as_ref()
            .map_or(Phase::Idle, |b| b.recovery.phase())
    }

    /// Mode the current binding was started in, still reported once it has
    /// failed; `None` when idle or unsupported.
    #[must_use]
    pub fn mode(&self) -> Option<PlaybackMode> {
        self.active.as_ref().and_then(|b| b.mode)
    }

    /// Identity of the live engine, if any.
    #[must_use]
    pub fn engine_id(&self) -> Option<EngineId> {
        self.active.as_ref().and_then(|b| b.pipeline.engine_id())
    }

    #[must_use]
    pub fn last_fault(&self) -> Option<FaultKind> {
        self.active.as_ref().and_then(|b| b.recovery.last_fault())
    }

    #[must_use]
    pub fn descriptor(&self) -> Option<&StreamDescriptor> {
        self.active.as_ref().map(|b| &b.descriptor)
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.active.is_some()
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.detach();
    }
}
