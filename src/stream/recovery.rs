//! Fault recovery controller.
//!
//! Raw engine and surface events are first reduced to a [`Signal`] by
//! [`classify`], then fed through [`transition`], a pure function from the
//! current [`RecoveryState`] to the next state plus the [`Action`] the
//! session must apply. Keeping the table pure makes every path testable
//! without an engine, a surface or a runtime.

use std::fmt;

use tracing::warn;

use super::events::{EngineErrorKind, EngineEvent, PlaybackEvent, SurfaceErrorKind, SurfaceEvent};
use super::strategy::PlaybackMode;
use crate::error::{Fault, FaultKind};

/// Controller phase.
///
/// `Failed` is terminal: only a fresh `attach` leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Playing,
    Recovering(FaultKind),
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Loading => f.write_str("loading"),
            Self::Playing => f.write_str("playing"),
            Self::Recovering(kind) => write!(f, "recovering({kind})"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// A classified event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Manifest parsed (managed) or metadata loaded (native).
    SourceReady,
    /// Media is flowing again: a segment landed or the pipeline was rebuilt.
    Progress,
    Playing,
    Fault(Fault),
    /// Informational; no state change.
    Ignored,
}

/// Decision applied back onto the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    /// Ask the surface to play. Issued once per session.
    Autoplay,
    /// Restart loading on the same engine instance.
    ReloadSource,
    /// Rebuild the decode pipeline in place, keeping position.
    ResetPipeline,
    /// Dispose the engine and report the fault to the caller.
    Terminate(Fault),
}

/// Recovery attempts spent per recoverable fault kind since the last time
/// playback was reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Attempts {
    pub network: u32,
    pub media: u32,
}

impl Attempts {
    fn slot(&mut self, kind: FaultKind) -> Option<&mut u32> {
        match kind {
            FaultKind::Network => Some(&mut self.network),
            FaultKind::Media => Some(&mut self.media),
            FaultKind::Unsupported | FaultKind::Terminal => None,
        }
    }
}

/// Everything the controller remembers about one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryState {
    pub phase: Phase,
    pub attempts: Attempts,
    pub autoplayed: bool,
    /// The surface has reported playback at least once; from then on,
    /// progress in `Loading` returns to `Playing`.
    pub started: bool,
    /// Kind of the most recent fault, kept for telemetry only.
    pub last_fault: Option<FaultKind>,
}

impl Default for RecoveryState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            attempts: Attempts::default(),
            autoplayed: false,
            started: false,
            last_fault: None,
        }
    }
}

/// Compute the next state and the action to apply.
///
/// `budget` is the number of recovery attempts allowed per fault kind; one
/// more fault of that kind before playback is reached is terminal.
#[must_use]
pub fn transition(state: RecoveryState, signal: Signal, budget: u32) -> (RecoveryState, Action) {
    let mut next = state;

    if matches!(state.phase, Phase::Idle | Phase::Failed) {
        return (next, Action::None);
    }

    let action = match signal {
        Signal::Ignored => Action::None,

        Signal::SourceReady => {
            if state.phase != Phase::Playing {
                next.phase = Phase::Loading;
            }
            if state.autoplayed {
                Action::None
            } else {
                next.autoplayed = true;
                Action::Autoplay
            }
        }

        Signal::Progress => {
            match state.phase {
                Phase::Recovering(_) => next.phase = Phase::Loading,
                Phase::Loading if state.started => {
                    next.phase = Phase::Playing;
                    next.attempts = Attempts::default();
                }
                _ => {}
            }
            Action::None
        }

        Signal::Playing => {
            next.phase = Phase::Playing;
            next.started = true;
            next.attempts = Attempts::default();
            Action::None
        }

        Signal::Fault(fault) => {
            let kind = fault.kind();
            next.last_fault = Some(kind);

            match next.attempts.slot(kind) {
                None => {
                    next.phase = Phase::Failed;
                    Action::Terminate(fault)
                }
                Some(spent) => {
                    *spent += 1;
                    let spent = *spent;
                    if spent > budget {
                        next.phase = Phase::Failed;
                        Action::Terminate(Fault::Terminal(format!(
                            "{kind} fault persisted after {budget} recovery attempt(s): {}",
                            fault.detail()
                        )))
                    } else {
                        next.phase = Phase::Recovering(kind);
                        if kind == FaultKind::Network {
                            Action::ReloadSource
                        } else {
                            Action::ResetPipeline
                        }
                    }
                }
            }
        }
    };

    (next, action)
}

/// Reduce a raw event to a signal.
///
/// Native-mode surface errors are never retried; engine events in native
/// mode cannot be legitimate and are ignored.
#[must_use]
pub fn classify(event: &PlaybackEvent, mode: PlaybackMode) -> Signal {
    match (event, mode) {
        (PlaybackEvent::Engine(_), PlaybackMode::Native) => Signal::Ignored,
        (PlaybackEvent::Engine(event), PlaybackMode::Managed) => classify_engine(event),
        (PlaybackEvent::Surface(event), mode) => classify_surface(event, mode),
    }
}

fn classify_engine(event: &EngineEvent) -> Signal {
    match event {
        EngineEvent::ManifestParsed { .. } => Signal::SourceReady,
        EngineEvent::SegmentAppended { .. } | EngineEvent::MediaRecovered { .. } => {
            Signal::Progress
        }
        EngineEvent::ManifestLoading { .. } | EngineEvent::EndOfStream => Signal::Ignored,
        EngineEvent::Error {
            kind,
            fatal: false,
            detail,
        } => {
            warn!(?kind, detail = %detail, "Engine reported a non-fatal error");
            Signal::Ignored
        }
        EngineEvent::Error {
            kind,
            fatal: true,
            detail,
        } => Signal::Fault(match kind {
            EngineErrorKind::Network => Fault::Network(detail.clone()),
            EngineErrorKind::Media => Fault::Media(detail.clone()),
            EngineErrorKind::Other => Fault::Terminal(detail.clone()),
        }),
    }
}

fn classify_surface(event: &SurfaceEvent, mode: PlaybackMode) -> Signal {
    match event {
        SurfaceEvent::LoadedMetadata => match mode {
            PlaybackMode::Native => Signal::SourceReady,
            PlaybackMode::Managed => Signal::Ignored,
        },
        SurfaceEvent::Playing => Signal::Playing,
        SurfaceEvent::Paused | SurfaceEvent::Ended => Signal::Ignored,
        SurfaceEvent::Error { kind, detail } => {
            let detail = detail.clone();
            Signal::Fault(match (mode, kind) {
                (_, SurfaceErrorKind::SourceNotSupported) => Fault::Unsupported(detail),
                (PlaybackMode::Native, _) => Fault::Terminal(detail),
                (PlaybackMode::Managed, SurfaceErrorKind::Decode) => Fault::Media(detail),
                (PlaybackMode::Managed, SurfaceErrorKind::Network) => Fault::Network(detail),
                (PlaybackMode::Managed, SurfaceErrorKind::Other) => Fault::Terminal(detail),
            })
        }
    }
}

/// Stateful wrapper used by the session.
#[derive(Debug, Clone)]
pub struct RecoveryController {
    state: RecoveryState,
    budget: u32,
}

impl RecoveryController {
    #[must_use]
    pub fn new(budget: u32) -> Self {
        Self {
            state: RecoveryState::default(),
            budget,
        }
    }

    /// Enter `Loading`. A fresh controller is created per attach.
    pub fn begin(&mut self) {
        if self.state.phase == Phase::Idle {
            self.state.phase = Phase::Loading;
        }
    }

    pub fn handle(&mut self, signal: Signal) -> Action {
        let (next, action) = transition(self.state, signal, self.budget);
        self.state = next;
        action
    }

    /// Terminate without going through the table (no capability at all).
    pub fn fail(&mut self, kind: FaultKind) {
        self.state.phase = Phase::Failed;
        self.state.last_fault = Some(kind);
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    #[must_use]
    pub fn last_fault(&self) -> Option<FaultKind> {
        self.state.last_fault
    }

    #[must_use]
    pub fn state(&self) -> RecoveryState {
        self.state
    }
}
