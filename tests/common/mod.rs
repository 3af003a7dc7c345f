//! Recording test doubles for sessions: a mock engine factory and a mock
//! surface sharing one call log, so tests can assert on ordering.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::broadcast;
use url::Url;
use vodplay::error::{AppendError, PlayRejected};
use vodplay::stream::{
    AdaptiveEngine, EngineConfig, EngineEvent, EngineFactory, EngineId, EventSink, MediaSegment,
    PlaybackSurface, PlayerEvent, SurfaceCapabilities, SurfaceEvent, SurfaceSource,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create(EngineId),
    Load(EngineId, String),
    AttachMedia(EngineId),
    StartLoad(EngineId),
    RecoverMedia(EngineId),
    Destroy(EngineId),
    SetSource(SurfaceSource),
    Poster(Option<String>),
    Play,
    Subscribe,
    Unsubscribe,
}

#[derive(Clone, Default)]
pub struct Log(Arc<Mutex<Vec<Call>>>);

impl Log {
    pub fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub fn position(&self, call: &Call) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn plays(&self) -> usize {
        self.count(|c| *c == Call::Play)
    }
}

#[derive(Default)]
struct EngineState {
    surface: Option<Weak<dyn PlaybackSurface>>,
    destroyed: bool,
}

/// Test-side view of one engine created by [`MockFactory`].
#[derive(Clone)]
pub struct EngineHandle {
    pub id: EngineId,
    pub sink: EventSink,
    state: Arc<Mutex<EngineState>>,
}

impl EngineHandle {
    pub fn emit(&self, event: EngineEvent) -> bool {
        self.sink.emit(event)
    }

    pub fn manifest_parsed(&self) -> bool {
        self.emit(EngineEvent::ManifestParsed {
            variants: 1,
            segments: 3,
            live: false,
        })
    }

    pub fn fatal(&self, kind: vodplay::stream::EngineErrorKind, detail: &str) -> bool {
        self.emit(EngineEvent::Error {
            kind,
            fatal: true,
            detail: detail.to_string(),
        })
    }

    /// Push a segment into the attached surface, as a real engine would.
    pub fn push_segment(&self, sequence: u64, data: &'static [u8]) -> bool {
        let state = self.state.lock().unwrap();
        if state.destroyed {
            return false;
        }
        let Some(surface) = state.surface.as_ref().and_then(Weak::upgrade) else {
            return false;
        };
        surface
            .append(&MediaSegment {
                engine: self.id,
                sequence,
                start: sequence as f64 * 4.0,
                duration: 4.0,
                data: Bytes::from_static(data),
            })
            .is_ok()
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().unwrap().destroyed
    }
}

struct MockEngine {
    id: EngineId,
    log: Log,
    state: Arc<Mutex<EngineState>>,
}

impl AdaptiveEngine for MockEngine {
    fn id(&self) -> EngineId {
        self.id
    }

    fn load_source(&mut self, url: &Url) {
        self.log.push(Call::Load(self.id, url.to_string()));
    }

    fn attach_media(&mut self, surface: Weak<dyn PlaybackSurface>) {
        self.log.push(Call::AttachMedia(self.id));
        self.state.lock().unwrap().surface = Some(surface);
    }

    fn start_load(&mut self) {
        self.log.push(Call::StartLoad(self.id));
    }

    fn recover_media_error(&mut self) {
        self.log.push(Call::RecoverMedia(self.id));
    }

    fn destroy(&mut self) {
        let mut state = self.state.lock().unwrap();
        if !state.destroyed {
            state.destroyed = true;
            state.surface = None;
            self.log.push(Call::Destroy(self.id));
        }
    }
}

pub struct MockFactory {
    log: Log,
    engines: Mutex<Vec<EngineHandle>>,
}

impl MockFactory {
    pub fn new(log: &Log) -> Arc<Self> {
        Arc::new(Self {
            log: log.clone(),
            engines: Mutex::new(Vec::new()),
        })
    }

    pub fn engines(&self) -> Vec<EngineHandle> {
        self.engines.lock().unwrap().clone()
    }

    pub fn last(&self) -> EngineHandle {
        self.engines().last().cloned().expect("no engine created")
    }

    pub fn live_count(&self) -> usize {
        self.engines().iter().filter(|e| !e.is_destroyed()).count()
    }
}

impl EngineFactory for MockFactory {
    fn create(&self, _config: &EngineConfig, events: EventSink) -> Box<dyn AdaptiveEngine> {
        let id = EngineId::next();
        self.log.push(Call::Create(id));
        let state = Arc::new(Mutex::new(EngineState::default()));
        self.engines.lock().unwrap().push(EngineHandle {
            id,
            sink: events,
            state: Arc::clone(&state),
        });
        Box::new(MockEngine {
            id,
            log: self.log.clone(),
            state,
        })
    }
}

pub struct MockSurface {
    caps: SurfaceCapabilities,
    log: Log,
    sink: Mutex<Option<EventSink>>,
    source: Mutex<SurfaceSource>,
    appended: Mutex<Vec<(EngineId, u64, Bytes)>>,
    reject_play: AtomicBool,
}

impl MockSurface {
    pub fn with_caps(log: &Log, native_hls: bool, managed: bool) -> Arc<Self> {
        Arc::new(Self {
            caps: SurfaceCapabilities { native_hls, managed },
            log: log.clone(),
            sink: Mutex::new(None),
            source: Mutex::new(SurfaceSource::Empty),
            appended: Mutex::new(Vec::new()),
            reject_play: AtomicBool::new(false),
        })
    }

    pub fn managed(log: &Log) -> Arc<Self> {
        Self::with_caps(log, false, true)
    }

    pub fn native(log: &Log) -> Arc<Self> {
        Self::with_caps(log, true, false)
    }

    pub fn reject_play(&self) {
        self.reject_play.store(true, Ordering::SeqCst);
    }

    /// Emit through the current subscription; `false` if unsubscribed or stale.
    pub fn emit(&self, event: SurfaceEvent) -> bool {
        self.sink
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|sink| sink.emit(event))
    }

    pub fn source(&self) -> SurfaceSource {
        self.source.lock().unwrap().clone()
    }

    pub fn appended(&self) -> Vec<(EngineId, u64)> {
        self.appended
            .lock()
            .unwrap()
            .iter()
            .map(|(e, s, _)| (*e, *s))
            .collect()
    }
}

impl PlaybackSurface for MockSurface {
    fn capabilities(&self) -> SurfaceCapabilities {
        self.caps
    }

    fn set_source(&self, source: SurfaceSource) {
        self.log.push(Call::SetSource(source.clone()));
        *self.source.lock().unwrap() = source;
    }

    fn set_poster(&self, poster: Option<&Url>) {
        self.log.push(Call::Poster(poster.map(Url::to_string)));
    }

    fn play(&self) -> Result<(), PlayRejected> {
        self.log.push(Call::Play);
        if self.reject_play.load(Ordering::SeqCst) {
            Err(PlayRejected("user gesture required".into()))
        } else {
            Ok(())
        }
    }

    fn append(&self, segment: &MediaSegment) -> Result<(), AppendError> {
        if *self.source.lock().unwrap() != SurfaceSource::Managed(segment.engine) {
            return Err(AppendError("not the current source".into()));
        }
        self.appended
            .lock()
            .unwrap()
            .push((segment.engine, segment.sequence, segment.data.clone()));
        Ok(())
    }

    fn reset_pipeline(&self) -> Result<(), AppendError> {
        Ok(())
    }

    fn current_time(&self) -> Duration {
        Duration::ZERO
    }

    fn subscribe(&self, sink: EventSink) {
        self.log.push(Call::Subscribe);
        *self.sink.lock().unwrap() = Some(sink);
    }

    fn unsubscribe(&self) {
        self.log.push(Call::Unsubscribe);
        *self.sink.lock().unwrap() = None;
    }
}

/// Everything published on the bus so far.
pub fn drain(rx: &mut broadcast::Receiver<PlayerEvent>) -> Vec<PlayerEvent> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

/// `Write` sink whose contents stay inspectable after being boxed.
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn bytes(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl std::io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// `n` MPEG-TS packets, each payload filled with `fill`.
pub fn ts_segment(n: usize, fill: u8) -> Vec<u8> {
    let mut data = vec![fill; 188 * n];
    for i in 0..n {
        data[i * 188] = 0x47;
    }
    data
}
