//! Managed HLS engine
//!
//! Fetches the manifest and its segments on the async runtime and pushes
//! them into a playback surface. Supports:
//! - Multi-quality master playlists (quality selection)
//! - VOD playlists (finite segments, end-of-stream)
//! - Live playlists (refresh, start near the live edge)
//! - Parallel segment fetching with per-segment retry
//! - Bounded back buffer kept for in-place media recovery

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use bytes::Bytes;
use rand::Rng;
use reqwest::Client;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::buffer::BufferWindow;
use super::engine::{AdaptiveEngine, EngineConfig, EngineFactory, EngineId};
use super::events::{EngineErrorKind, EngineEvent, EventSink};
use super::playlist::{self, MediaPlaylist, Playlist, Segment};
use super::surface::{MediaSegment, PlaybackSurface};
use crate::error::AppendError;
use crate::http::build_client;

/// Segments behind the live edge where live playback starts.
const LIVE_EDGE_SEGMENTS: usize = 3;

/// Poll interval while the forward buffer is full.
const BUFFER_POLL: Duration = Duration::from_millis(250);

type SurfaceSlot = Arc<Mutex<Option<Weak<dyn PlaybackSurface>>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn with_surface<R>(
    slot: &Mutex<Option<Weak<dyn PlaybackSurface>>>,
    f: impl FnOnce(&dyn PlaybackSurface) -> R,
) -> Option<R> {
    let guard = lock(slot);
    let surface = guard.as_ref()?.upgrade()?;
    Some(f(surface.as_ref()))
}

/// Container detected by [`probe_container`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    MpegTs,
    Fmp4,
    PackedAudio,
}

/// Cheap sanity check of a segment payload before it reaches the decoder.
pub fn probe_container(data: &[u8]) -> Result<Container, String> {
    const TS_PACKET: usize = 188;

    let Some(&first) = data.first() else {
        return Err("empty segment".to_string());
    };

    if first == 0x47 {
        if data.len() < TS_PACKET {
            return Err("truncated transport stream packet".to_string());
        }
        if data.len() >= 2 * TS_PACKET && data[TS_PACKET] != 0x47 {
            return Err("lost transport stream sync".to_string());
        }
        return Ok(Container::MpegTs);
    }

    if data.len() >= 8
        && matches!(&data[4..8], b"ftyp" | b"styp" | b"moof" | b"sidx" | b"moov" | b"emsg")
    {
        return Ok(Container::Fmp4);
    }

    // Packed audio: ID3 timestamp tag or an ADTS frame header
    if data.starts_with(b"ID3") || (data.len() >= 2 && first == 0xFF && data[1] & 0xF6 == 0xF0) {
        return Ok(Container::PackedAudio);
    }

    Err(format!("unrecognized container (first byte 0x{first:02x})"))
}

/// Builds [`HlsEngine`]s sharing one pooled HTTP client.
pub struct HlsEngineFactory {
    client: Client,
}

impl HlsEngineFactory {
    pub fn new(request_timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            client: build_client(request_timeout)?,
        })
    }

    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl EngineFactory for HlsEngineFactory {
    fn create(&self, config: &EngineConfig, events: EventSink) -> Box<dyn AdaptiveEngine> {
        Box::new(HlsEngine::new(self.client.clone(), config.clone(), events))
    }
}

/// Playback position state shared between the engine and its loader task.
#[derive(Debug)]
struct Cursor {
    media_url: Option<Url>,
    variants: usize,
    next_sequence: Option<u64>,
    window: BufferWindow,
}

impl Cursor {
    fn new(config: &EngineConfig) -> Self {
        Self {
            media_url: None,
            variants: 0,
            next_sequence: None,
            window: BufferWindow::new(config.back_buffer),
        }
    }
}

/// Managed HLS engine
pub struct HlsEngine {
    id: EngineId,
    client: Client,
    config: EngineConfig,
    events: EventSink,
    source: Option<Url>,
    surface: SurfaceSlot,
    cursor: Arc<Mutex<Cursor>>,
    /// Bumped whenever the running loader is superseded.
    epoch: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
    destroyed: bool,
}

impl HlsEngine {
    #[must_use]
    pub fn new(client: Client, config: EngineConfig, events: EventSink) -> Self {
        let id = EngineId::next();
        debug!(%id, "Creating HLS engine");
        Self {
            id,
            client,
            cursor: Arc::new(Mutex::new(Cursor::new(&config))),
            config,
            events,
            source: None,
            surface: Arc::new(Mutex::new(None)),
            epoch: Arc::new(AtomicU64::new(0)),
            task: None,
            destroyed: false,
        }
    }

    /// Supersede and cancel the running loader, if any.
    fn stop_loader(&mut self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn maybe_start(&mut self) {
        let attached = lock(&self.surface).is_some();
        if self.task.is_none() && attached && self.source.is_some() {
            self.spawn_loader();
        }
    }

    fn spawn_loader(&mut self) {
        let Some(source) = self.source.clone() else {
            return;
        };

        let loader = Loader {
            id: self.id,
            client: self.client.clone(),
            config: self.config.clone(),
            events: self.events.clone(),
            source,
            surface: Arc::clone(&self.surface),
            cursor: Arc::clone(&self.cursor),
            epoch: Arc::clone(&self.epoch),
            issued: self.epoch.load(Ordering::Acquire),
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => self.task = Some(handle.spawn(loader.run())),
            Err(e) => {
                self.events.emit(EngineEvent::Error {
                    kind: EngineErrorKind::Other,
                    fatal: true,
                    detail: format!("no async runtime for segment loading: {e}"),
                });
            }
        }
    }
}

impl AdaptiveEngine for HlsEngine {
    fn id(&self) -> EngineId {
        self.id
    }

    fn load_source(&mut self, url: &Url) {
        if self.destroyed {
            return;
        }
        self.stop_loader();
        self.source = Some(url.clone());
        *lock(&self.cursor) = Cursor::new(&self.config);
        self.maybe_start();
    }

    fn attach_media(&mut self, surface: Weak<dyn PlaybackSurface>) {
        if self.destroyed {
            return;
        }
        *lock(&self.surface) = Some(surface);
        self.maybe_start();
    }

    fn start_load(&mut self) {
        if self.destroyed {
            return;
        }
        info!(id = %self.id, "Restarting load");
        self.stop_loader();
        self.spawn_loader();
    }

    fn recover_media_error(&mut self) {
        if self.destroyed {
            return;
        }
        info!(id = %self.id, "Resetting decode pipeline");
        self.stop_loader();

        let result = {
            let cursor = lock(&self.cursor);
            with_surface(&self.surface, |surface| {
                surface.reset_pipeline()?;
                let position = surface.current_time();
                for buffered in cursor.window.from_position(position) {
                    surface.append(&MediaSegment {
                        engine: self.id,
                        sequence: buffered.sequence,
                        start: buffered.start,
                        duration: buffered.duration,
                        data: buffered.data.clone(),
                    })?;
                }
                Ok::<_, AppendError>(position)
            })
        };

        match result {
            None => debug!(id = %self.id, "Surface gone, skipping media recovery"),
            Some(Err(e)) => {
                self.events.emit(EngineEvent::Error {
                    kind: EngineErrorKind::Other,
                    fatal: true,
                    detail: format!("pipeline reset failed: {e}"),
                });
            }
            Some(Ok(position)) => {
                self.events.emit(EngineEvent::MediaRecovered {
                    position_secs: position.as_secs_f64(),
                });
                self.spawn_loader();
            }
        }
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.stop_loader();
        *lock(&self.surface) = None;
        debug!(id = %self.id, "HLS engine destroyed");
    }
}

impl Drop for HlsEngine {
    fn drop(&mut self) {
        self.destroy();
    }
}

enum LoadError {
    Network(String),
    Media(String),
    Other(String),
    /// Superseded, destroyed, or the surface went away. Not reported.
    Detached,
}

/// Background fetch loop state.
struct Loader {
    id: EngineId,
    client: Client,
    config: EngineConfig,
    events: EventSink,
    source: Url,
    surface: SurfaceSlot,
    cursor: Arc<Mutex<Cursor>>,
    epoch: Arc<AtomicU64>,
    issued: u64,
}

impl Loader {
    fn is_current(&self) -> bool {
        self.epoch.load(Ordering::Acquire) == self.issued && self.events.is_live()
    }

    async fn run(self) {
        let (kind, detail) = match self.load().await {
            Ok(()) | Err(LoadError::Detached) => return,
            Err(LoadError::Network(d)) => (EngineErrorKind::Network, d),
            Err(LoadError::Media(d)) => (EngineErrorKind::Media, d),
            Err(LoadError::Other(d)) => (EngineErrorKind::Other, d),
        };
        if !self.is_current() {
            return;
        }
        warn!(id = %self.id, ?kind, %detail, "Load failed");
        self.events.emit(EngineEvent::Error {
            kind,
            fatal: true,
            detail,
        });
    }

    async fn load(&self) -> Result<(), LoadError> {
        let (media_url, parsed) = self.resolve_media_url().await?;
        let mut playlist = match parsed {
            Some(p) => p,
            None => self.fetch_media_playlist(&media_url).await?,
        };

        let variants = lock(&self.cursor).variants;
        info!(
            id = %self.id,
            variants,
            segments = playlist.segments.len(),
            live = playlist.is_live,
            "Manifest parsed"
        );
        self.emit(EngineEvent::ManifestParsed {
            variants,
            segments: playlist.segments.len(),
            live: playlist.is_live,
        })?;

        loop {
            let start = lock(&self.cursor)
                .next_sequence
                .unwrap_or_else(|| start_sequence(&playlist));
            let pending: Vec<Segment> = playlist
                .segments
                .iter()
                .filter(|s| s.sequence >= start)
                .cloned()
                .collect();

            if !pending.is_empty() {
                debug!(id = %self.id, count = pending.len(), "Fetching segments");
            }

            for chunk in pending.chunks(self.config.max_concurrent) {
                self.wait_for_buffer_room().await?;

                let fetches = chunk.iter().map(|seg| self.fetch_segment(seg));
                let results = futures::future::join_all(fetches).await;

                for (segment, result) in chunk.iter().zip(results) {
                    let data = result?;
                    self.probe(segment.sequence, data.clone()).await?;
                    self.append(segment, data)?;
                }
            }

            if !playlist.is_live {
                with_surface(&self.surface, |surface| surface.end_of_stream())
                    .ok_or(LoadError::Detached)?;
                self.emit(EngineEvent::EndOfStream)?;
                return Ok(());
            }

            tokio::time::sleep(self.refresh_interval(&playlist)).await;
            playlist = self.fetch_media_playlist(&media_url).await?;
        }
    }

    /// Resolve the media playlist URL, selecting a variant from a master
    /// playlist when needed. Reuses the URL from an earlier run.
    async fn resolve_media_url(&self) -> Result<(Url, Option<MediaPlaylist>), LoadError> {
        let cached = lock(&self.cursor).media_url.clone();
        if let Some(url) = cached {
            return Ok((url, None));
        }

        self.emit(EngineEvent::ManifestLoading {
            url: self.source.clone(),
        })?;
        let content = self.fetch_text(&self.source).await?;
        let parsed = playlist::parse(&content, &self.source)
            .map_err(|e| LoadError::Other(format!("manifest {}: {e}", self.source)))?;

        let (url, variants, media) = match parsed {
            Playlist::Master(variants) => {
                let variant = playlist::select_variant(&variants, &self.config.quality)
                    .ok_or_else(|| LoadError::Other("no suitable quality variant".to_string()))?;
                info!(
                    id = %self.id,
                    height = variant.height,
                    bandwidth = variant.bandwidth,
                    "Selected variant"
                );
                (variant.uri.clone(), variants.len(), None)
            }
            Playlist::Media(media) => (self.source.clone(), 1, Some(media)),
        };

        let mut cursor = lock(&self.cursor);
        cursor.media_url = Some(url.clone());
        cursor.variants = variants;
        Ok((url, media))
    }

    async fn fetch_media_playlist(&self, url: &Url) -> Result<MediaPlaylist, LoadError> {
        let content = self.fetch_text(url).await?;
        playlist::parse_media(&content, url)
            .map_err(|e| LoadError::Other(format!("media playlist {url}: {e}")))
    }

    #[instrument(skip(self), fields(id = %self.id))]
    async fn fetch_text(&self, url: &Url) -> Result<String, LoadError> {
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| LoadError::Network(format!("{url}: {e}")))?;
        if !resp.status().is_success() {
            return Err(LoadError::Network(format!("{url}: HTTP {}", resp.status())));
        }
        resp.text()
            .await
            .map_err(|e| LoadError::Network(format!("{url}: {e}")))
    }

    async fn fetch_segment(&self, segment: &Segment) -> Result<Bytes, LoadError> {
        let retries = self.config.segment_retries.max(1);
        let mut last_error = String::new();

        for attempt in 0..retries {
            match self.client.get(segment.uri.clone()).send().await {
                Ok(resp) if resp.status().is_success() => match resp.bytes().await {
                    Ok(data) => return Ok(data),
                    Err(e) => last_error = e.to_string(),
                },
                Ok(resp) => last_error = format!("HTTP {}", resp.status()),
                Err(e) => last_error = e.to_string(),
            }

            if attempt + 1 < retries {
                self.emit(EngineEvent::Error {
                    kind: EngineErrorKind::Network,
                    fatal: false,
                    detail: format!(
                        "segment {} attempt {}: {last_error}",
                        segment.sequence,
                        attempt + 1
                    ),
                })?;
                let jitter = rand::thread_rng().gen_range(0..100);
                tokio::time::sleep(Duration::from_millis(500 * (u64::from(attempt) + 1) + jitter)).await;
            }
        }

        Err(LoadError::Network(format!(
            "segment {} ({}): {last_error}",
            segment.sequence, segment.uri
        )))
    }

    async fn probe(&self, sequence: u64, data: Bytes) -> Result<(), LoadError> {
        let probed = if self.config.enable_worker {
            tokio::task::spawn_blocking(move || probe_container(&data))
                .await
                .map_err(|e| LoadError::Other(format!("probe worker: {e}")))?
        } else {
            probe_container(&data)
        };
        probed
            .map(|_| ())
            .map_err(|e| LoadError::Media(format!("segment {sequence}: {e}")))
    }

    fn append(&self, segment: &Segment, data: Bytes) -> Result<(), LoadError> {
        let mut cursor = lock(&self.cursor);
        if !self.is_current() {
            return Err(LoadError::Detached);
        }

        let media = MediaSegment {
            engine: self.id,
            sequence: segment.sequence,
            start: cursor.window.end().as_secs_f64(),
            duration: segment.duration,
            data: data.clone(),
        };
        let bytes = media.data.len();
        let position = with_surface(&self.surface, |surface| {
            surface.append(&media).map(|()| surface.current_time())
        })
        .ok_or(LoadError::Detached)?
        .map_err(|e| LoadError::Media(format!("segment {}: {e}", segment.sequence)))?;

        cursor.window.push(segment.sequence, segment.duration, data);
        cursor.next_sequence = Some(segment.sequence + 1);
        let evicted = cursor.window.evict_behind(position);
        drop(cursor);

        if !evicted.is_empty() {
            with_surface(&self.surface, |surface| surface.evict(&evicted));
        }
        self.emit(EngineEvent::SegmentAppended {
            sequence: segment.sequence,
            bytes,
        })
    }

    async fn wait_for_buffer_room(&self) -> Result<(), LoadError> {
        loop {
            let position = with_surface(&self.surface, |surface| surface.current_time())
                .ok_or(LoadError::Detached)?;
            let ahead = lock(&self.cursor).window.buffered_ahead(position);
            if ahead <= self.config.max_buffer {
                return Ok(());
            }
            tokio::time::sleep(BUFFER_POLL).await;
            if !self.is_current() {
                return Err(LoadError::Detached);
            }
        }
    }

    fn refresh_interval(&self, playlist: &MediaPlaylist) -> Duration {
        let divisor = if self.config.low_latency { 4.0 } else { 2.0 };
        Duration::from_secs_f64((playlist.target_duration / divisor).max(0.25))
    }

    fn emit(&self, event: EngineEvent) -> Result<(), LoadError> {
        if self.is_current() && self.events.emit(event) {
            Ok(())
        } else {
            Err(LoadError::Detached)
        }
    }
}

/// First sequence to play for a fresh load: the start of a VOD playlist,
/// or a few segments behind the live edge.
fn start_sequence(playlist: &MediaPlaylist) -> u64 {
    if !playlist.is_live {
        return playlist.media_sequence;
    }
    let idx = playlist.segments.len().saturating_sub(LIVE_EDGE_SEGMENTS);
    playlist
        .segments
        .get(idx)
        .map_or(playlist.media_sequence, |s| s.sequence)
}
