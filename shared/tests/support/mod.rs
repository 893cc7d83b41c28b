//! Fakes for the shell capabilities. Each records what it was asked to do
//! so tests can assert on call counts and ordering.
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use shared::capabilities::{
    AudioFileReader, AudioPlayer, CaptureBackend, DeepLink, HttpBody, HttpError, HttpHeaders,
    HttpRequest, HttpResponse, HttpTransport, KeyValueStore, KvError, KvKey, LinkError,
    LocationAccuracy, LocationError, LocationProvider, MemoryKvStore, Notice, Notifier,
    PermissionError, PermissionKind, PermissionProvider, PermissionStatus, PlaybackError, Position,
    RecorderError, UrlOpener,
};
use shared::{App, Capabilities, RecorderBackend, SosConfig, SosController, SosState};

pub const SOS_OK: &str = r#"{"message":"SOS alert sent successfully","sid":"SM123","code":"SOS_SENT"}"#;
pub const SOS_FAILED: &str =
    r#"{"error":"Failed to send SOS alert","message":"provider down","code":"SOS_ERROR"}"#;
pub const AUDIO_OK: &str =
    r#"{"message":"Audio uploaded","audioUrl":"https://cdn.example.com/sos.m4a","code":"AUDIO_UPLOADED"}"#;

/// Ordered record of side effects shared across fakes.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }
}

#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub path: String,
    pub json: Option<serde_json::Value>,
    pub multipart_field: Option<String>,
}

/// Relay stand-in. Answers by path; `/alerts/sos` can be made to fail or
/// to never answer.
#[derive(Default)]
pub struct FakeTransport {
    pub fail_sos: AtomicBool,
    pub hang_sos: AtomicBool,
    pub fail_upload: AtomicBool,
    pub seen: Mutex<Vec<SeenRequest>>,
}

impl FakeTransport {
    pub fn calls_to(&self, path: &str) -> Vec<SeenRequest> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let url = request.url().as_str().to_string();
        let path = url
            .split_once("/api/v1")
            .map_or(url.as_str(), |(_, p)| p)
            .to_string();
        let (json, multipart_field) = match request.body() {
            HttpBody::Bytes(b) => (serde_json::from_slice(b).ok(), None),
            HttpBody::Multipart(file) => (None, Some(file.field.clone())),
            HttpBody::Empty => (None, None),
        };
        self.seen.lock().unwrap().push(SeenRequest {
            path: path.clone(),
            json,
            multipart_field,
        });

        let (status, body) = match path.as_str() {
            "/alerts/sos" => {
                if self.hang_sos.load(Ordering::SeqCst) {
                    std::future::pending::<()>().await;
                }
                if self.fail_sos.load(Ordering::SeqCst) {
                    (500, SOS_FAILED)
                } else {
                    (200, SOS_OK)
                }
            }
            "/alerts/sos-audio" => {
                if self.fail_upload.load(Ordering::SeqCst) {
                    (500, r#"{"error":"Upload failed","code":"AUDIO_ERROR"}"#)
                } else {
                    (200, AUDIO_OK)
                }
            }
            _ => (404, r#"{"error":"Not found","code":"NOT_FOUND"}"#),
        };

        Ok(HttpResponse::new(
            status,
            HttpHeaders::new(),
            Bytes::from_static(body.as_bytes()),
            request.request_id().to_string(),
        ))
    }
}

/// Prompts for kinds listed in `unanswered` never resolve.
pub struct FakePermissions {
    pub microphone: Mutex<PermissionStatus>,
    pub location: Mutex<PermissionStatus>,
    pub unanswered: Mutex<Vec<PermissionKind>>,
    pub prompts: AtomicUsize,
}

impl FakePermissions {
    pub fn new(microphone: PermissionStatus, location: PermissionStatus) -> Self {
        Self {
            microphone: Mutex::new(microphone),
            location: Mutex::new(location),
            unanswered: Mutex::new(Vec::new()),
            prompts: AtomicUsize::new(0),
        }
    }

    pub fn leave_unanswered(&self, kind: PermissionKind) {
        self.unanswered.lock().unwrap().push(kind);
    }

    fn status(&self, kind: PermissionKind) -> PermissionStatus {
        match kind {
            PermissionKind::Microphone => *self.microphone.lock().unwrap(),
            PermissionKind::Location => *self.location.lock().unwrap(),
        }
    }
}

#[async_trait]
impl PermissionProvider for FakePermissions {
    async fn check(&self, kind: PermissionKind) -> Result<PermissionStatus, PermissionError> {
        Ok(self.status(kind))
    }

    async fn request(&self, kind: PermissionKind) -> Result<PermissionStatus, PermissionError> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        let unanswered = self.unanswered.lock().unwrap().contains(&kind);
        if unanswered {
            std::future::pending::<()>().await;
        }
        Ok(self.status(kind))
    }
}

pub struct FakeCapture {
    kind: RecorderBackend,
    pub fail_start: AtomicBool,
    pub hang_start: AtomicBool,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    log: EventLog,
}

impl FakeCapture {
    pub fn new(kind: RecorderBackend, log: EventLog) -> Self {
        Self {
            kind,
            fail_start: AtomicBool::new(false),
            hang_start: AtomicBool::new(false),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            log,
        }
    }
}

#[async_trait]
impl CaptureBackend for FakeCapture {
    fn kind(&self) -> RecorderBackend {
        self.kind
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn start(&self) -> Result<Option<String>, RecorderError> {
        if self.hang_start.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(RecorderError::StartFailed {
                backend: self.kind,
                message: "injected".into(),
            });
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.log.push(format!("{}.start", self.kind.as_str()));
        Ok(None)
    }

    async fn stop_and_unload(&self) -> Result<Option<String>, RecorderError> {
        let n = self.stops.fetch_add(1, Ordering::SeqCst);
        self.log.push(format!("{}.stop", self.kind.as_str()));
        Ok(Some(format!("file:///recordings/{}-{n}.m4a", self.kind.as_str())))
    }
}

pub struct FakePlayer {
    log: EventLog,
}

impl FakePlayer {
    pub fn new(log: EventLog) -> Self {
        Self { log }
    }
}

#[async_trait]
impl AudioPlayer for FakePlayer {
    async fn play(&self, uri: &str) -> Result<(), PlaybackError> {
        self.log.push(format!("player.play {uri}"));
        Ok(())
    }

    async fn stop_and_unload(&self) -> Result<(), PlaybackError> {
        self.log.push("player.unload");
        Ok(())
    }
}

pub struct FakeFiles;

#[async_trait]
impl AudioFileReader for FakeFiles {
    async fn read(&self, _uri: &str) -> std::io::Result<Bytes> {
        Ok(Bytes::from_static(b"m4a-bytes"))
    }
}

pub struct FakeLocation {
    pub fix: Option<(f64, f64)>,
}

#[async_trait]
impl LocationProvider for FakeLocation {
    async fn current_position(&self, _: LocationAccuracy) -> Result<Position, LocationError> {
        match self.fix {
            Some((latitude, longitude)) => Ok(Position {
                latitude,
                longitude,
                accuracy: Some(12.0),
                timestamp_ms: 1_700_000_000_000,
            }),
            None => Err(LocationError::ServicesDisabled),
        }
    }
}

/// Device URL launcher. The chat app can be made unavailable and any
/// scheme can be made to fail on open.
pub struct FakeOpener {
    pub chat_available: AtomicBool,
    pub fail_sms: AtomicBool,
    pub opened: Mutex<Vec<String>>,
}

impl Default for FakeOpener {
    fn default() -> Self {
        Self {
            chat_available: AtomicBool::new(true),
            fail_sms: AtomicBool::new(false),
            opened: Mutex::new(Vec::new()),
        }
    }
}

impl FakeOpener {
    pub fn opened_schemes(&self) -> Vec<String> {
        self.opened
            .lock()
            .unwrap()
            .iter()
            .map(|l| l.split(':').next().unwrap_or_default().to_string())
            .collect()
    }
}

#[async_trait]
impl UrlOpener for FakeOpener {
    async fn can_open(&self, link: &DeepLink) -> Result<bool, LinkError> {
        Ok(link.scheme() != "whatsapp" || self.chat_available.load(Ordering::SeqCst))
    }

    async fn open(&self, link: &DeepLink) -> Result<(), LinkError> {
        if link.scheme() == "sms" && self.fail_sms.load(Ordering::SeqCst) {
            return Err(LinkError::OpenFailed {
                scheme: "sms".into(),
                message: "no composer".into(),
            });
        }
        self.opened.lock().unwrap().push(link.as_str().to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub notices: Mutex<Vec<Notice>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

/// In-memory store that logs every write.
pub struct LoggingKv {
    inner: MemoryKvStore,
    log: EventLog,
}

impl LoggingKv {
    pub fn new(log: EventLog) -> Self {
        Self {
            inner: MemoryKvStore::new(),
            log,
        }
    }
}

#[async_trait]
impl KeyValueStore for LoggingKv {
    async fn get(&self, key: &KvKey) -> Result<Option<Vec<u8>>, KvError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &KvKey, value: Vec<u8>) -> Result<(), KvError> {
        self.log.push(format!("kv.set {}", key.raw()));
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &KvKey) -> Result<bool, KvError> {
        self.log.push(format!("kv.delete {}", key.raw()));
        self.inner.delete(key).await
    }
}

pub struct Options {
    pub microphone: PermissionStatus,
    pub location: PermissionStatus,
    pub native_recorder: bool,
    pub fix: Option<(f64, f64)>,
    pub relay_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            microphone: PermissionStatus::Granted,
            location: PermissionStatus::Granted,
            native_recorder: false,
            fix: Some((18.5204, 73.8567)),
            relay_timeout: Duration::from_secs(30),
        }
    }
}

pub struct Harness {
    pub app: App,
    pub transport: Arc<FakeTransport>,
    pub permissions: Arc<FakePermissions>,
    pub native: Option<Arc<FakeCapture>>,
    pub fallback: Arc<FakeCapture>,
    pub opener: Arc<FakeOpener>,
    pub notifier: Arc<RecordingNotifier>,
    pub kv: Arc<LoggingKv>,
    pub log: EventLog,
}

impl Harness {
    pub async fn new(options: Options) -> Self {
        let log = EventLog::default();
        let transport = Arc::new(FakeTransport::default());
        let permissions = Arc::new(FakePermissions::new(options.microphone, options.location));
        let native = options
            .native_recorder
            .then(|| Arc::new(FakeCapture::new(RecorderBackend::Native, log.clone())));
        let fallback = Arc::new(FakeCapture::new(RecorderBackend::Fallback, log.clone()));
        let opener = Arc::new(FakeOpener::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let kv = Arc::new(LoggingKv::new(log.clone()));

        let caps = Capabilities {
            http: transport.clone(),
            kv: kv.clone(),
            permissions: permissions.clone(),
            native_recorder: native
                .clone()
                .map(|n| n as Arc<dyn CaptureBackend>),
            fallback_recorder: fallback.clone(),
            player: Arc::new(FakePlayer::new(log.clone())),
            files: Arc::new(FakeFiles),
            location: Arc::new(FakeLocation { fix: options.fix }),
            links: opener.clone(),
            notifier: notifier.clone(),
            hardware_trigger: None,
        };

        let mut config = SosConfig::default();
        config.relay.request_timeout_ms = u64::try_from(options.relay_timeout.as_millis()).unwrap();
        let app = App::new(config, caps, None).await.unwrap();

        Self {
            app,
            transport,
            permissions,
            native,
            fallback,
            opener,
            notifier,
            kv,
            log,
        }
    }

    pub fn controller(&self) -> &SosController {
        self.app.controller()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notifier.notices.lock().unwrap().clone()
    }

    /// Yields until the controller reaches `state`, advancing paused time
    /// in small steps.
    pub async fn wait_for(&self, state: SosState) {
        for _ in 0..1_000 {
            if self.controller().state() == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("controller never reached {state}");
    }
}
