//! External player surface: hands the manifest URL to mpv, vlc, ffplay or
//! iina and reports the child process lifecycle as surface events.
//!
//! These players fetch and decode HLS themselves, so the surface declares
//! native support only and sessions never create an engine for it.

use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{AppendError, PlayRejected};
use crate::stream::{
    EventSink, MediaSegment, PlaybackSurface, SurfaceCapabilities, SurfaceErrorKind,
    SurfaceEvent, SurfaceSource,
};

/// Players tried in order when none is configured.
pub const KNOWN_PLAYERS: &[&str] = &["mpv", "vlc", "ffplay", "iina"];

#[derive(Default)]
struct State {
    sink: Option<EventSink>,
    source: Option<Url>,
    cancel: Option<oneshot::Sender<()>>,
    started: Option<Instant>,
    ended: bool,
}

type Shared = Arc<Mutex<State>>;

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn emit(state: &Mutex<State>, event: SurfaceEvent) {
    if let Some(sink) = &lock(state).sink {
        sink.emit(event);
    }
}

/// Arguments that make each player exit when playback finishes.
fn player_args(player: &str) -> Vec<&'static str> {
    let name = std::path::Path::new(player)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(player);
    match name {
        "vlc" => vec!["--play-and-exit"],
        "mpv" => vec!["--no-terminal"],
        "ffplay" => vec!["-autoexit", "-loglevel", "warning"],
        _ => vec![],
    }
}

pub struct ExternalPlayerSurface {
    player: String,
    state: Shared,
}

impl ExternalPlayerSurface {
    #[must_use]
    pub fn new(player: impl Into<String>) -> Self {
        Self {
            player: player.into(),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Use the first player from [`KNOWN_PLAYERS`] found on `PATH`.
    #[must_use]
    pub fn detect() -> Option<Self> {
        KNOWN_PLAYERS
            .iter()
            .find(|p| which::which(p).is_ok())
            .map(|p| Self::new(*p))
    }

    #[must_use]
    pub fn player(&self) -> &str {
        &self.player
    }

    /// The player exited successfully.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        lock(&self.state).ended
    }

    fn stop(&self) {
        if let Some(cancel) = lock(&self.state).cancel.take() {
            debug!(player = %self.player, "Stopping external player");
            let _ = cancel.send(());
        }
    }
}

impl PlaybackSurface for ExternalPlayerSurface {
    fn capabilities(&self) -> SurfaceCapabilities {
        SurfaceCapabilities {
            native_hls: true,
            managed: false,
        }
    }

    fn set_source(&self, source: SurfaceSource) {
        self.stop();
        {
            let mut state = lock(&self.state);
            state.ended = false;
            state.started = None;
            state.source = None;
        }

        match source {
            SurfaceSource::Empty => {}
            SurfaceSource::Url(url) => {
                if which::which(&self.player).is_err() {
                    emit(
                        &self.state,
                        SurfaceEvent::Error {
                            kind: SurfaceErrorKind::SourceNotSupported,
                            detail: format!("player {:?} not found on PATH", self.player),
                        },
                    );
                    return;
                }
                lock(&self.state).source = Some(url);
                emit(&self.state, SurfaceEvent::LoadedMetadata);
            }
            SurfaceSource::Managed(engine) => emit(
                &self.state,
                SurfaceEvent::Error {
                    kind: SurfaceErrorKind::SourceNotSupported,
                    detail: format!("{} cannot take segments from {engine}", self.player),
                },
            ),
        }
    }

    fn play(&self) -> Result<(), PlayRejected> {
        let mut state = lock(&self.state);
        if state.cancel.is_some() {
            return Ok(());
        }
        let Some(url) = state.source.clone() else {
            return Err(PlayRejected("no source set".to_string()));
        };
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PlayRejected(format!("no async runtime: {e}")))?;

        let (cancel_tx, cancel_rx) = oneshot::channel();
        state.cancel = Some(cancel_tx);
        state.started = Some(Instant::now());
        drop(state);

        info!(player = %self.player, %url, "Launching external player");
        runtime.spawn(supervise(
            self.player.clone(),
            url,
            Arc::clone(&self.state),
            cancel_rx,
        ));
        Ok(())
    }

    fn append(&self, _segment: &MediaSegment) -> Result<(), AppendError> {
        Err(AppendError(format!("{} does not accept segments", self.player)))
    }

    fn reset_pipeline(&self) -> Result<(), AppendError> {
        Err(AppendError(format!("{} has no managed pipeline", self.player)))
    }

    fn current_time(&self) -> Duration {
        lock(&self.state)
            .started
            .map_or(Duration::ZERO, |started| started.elapsed())
    }

    fn subscribe(&self, sink: EventSink) {
        lock(&self.state).sink = Some(sink);
    }

    fn unsubscribe(&self) {
        lock(&self.state).sink = None;
    }
}

impl Drop for ExternalPlayerSurface {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Run the player to completion, or kill it on cancel.
async fn supervise(player: String, url: Url, state: Shared, cancel: oneshot::Receiver<()>) {
    let spawned = Command::new(&player)
        .args(player_args(&player))
        .arg(url.as_str())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn();

    let mut child = match spawned {
        Ok(child) => child,
        Err(e) => {
            lock(&state).cancel = None;
            emit(
                &state,
                SurfaceEvent::Error {
                    kind: SurfaceErrorKind::SourceNotSupported,
                    detail: format!("failed to spawn {player}: {e}"),
                },
            );
            return;
        }
    };
    emit(&state, SurfaceEvent::Playing);

    tokio::select! {
        status = child.wait() => {
            lock(&state).cancel = None;
            match status {
                Ok(status) if status.success() => {
                    debug!(%player, "Player exited");
                    lock(&state).ended = true;
                    emit(&state, SurfaceEvent::Ended);
                }
                Ok(status) => {
                    warn!(%player, %status, "Player exited with failure");
                    emit(&state, SurfaceEvent::Error {
                        kind: SurfaceErrorKind::Other,
                        detail: format!("{player} exited with {status}"),
                    });
                }
                Err(e) => emit(&state, SurfaceEvent::Error {
                    kind: SurfaceErrorKind::Other,
                    detail: format!("waiting for {player} failed: {e}"),
                }),
            }
        }
        _ = cancel => {
            if let Err(e) = child.kill().await {
                debug!(%player, error = %e, "Kill failed");
            }
        }
    }
}
