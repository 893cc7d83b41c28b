pub mod audio;
pub mod http;
pub mod kv;
pub mod linking;
pub mod location;
pub mod notify;
pub mod permissions;

use std::sync::Arc;

use crate::trigger::HardwareTrigger;

pub use self::audio::{
    AudioFileReader, AudioPlayer, CaptureBackend, LocalFileReader, PlaybackError, RecorderError,
};
pub use self::http::{
    HttpBody, HttpError, HttpHeaders, HttpMethod, HttpRequest, HttpResponse, HttpTransport,
    MultipartFile, NetworkPolicy, ValidatedUrl,
};
pub use self::kv::{KeyNamespace, KeyValueStore, KvError, KvKey, MemoryKvStore, TypedKvStore};
pub use self::linking::{DeepLink, LinkError, UrlOpener};
pub use self::location::{LocationAccuracy, LocationError, LocationProvider, Position};
pub use self::notify::{Notice, Notifier, SilentNotifier};
pub use self::permissions::{
    PermissionError, PermissionGate, PermissionKind, PermissionProvider, PermissionStatus,
};

#[cfg(all(feature = "sqlite", not(target_arch = "wasm32")))]
pub use self::kv::SqliteKvStore;

#[cfg(all(feature = "reqwest-transport", not(target_arch = "wasm32")))]
pub use self::http::ReqwestTransport;

/// Everything the platform shell provides to the core.
#[derive(Clone)]
pub struct Capabilities {
    pub http: Arc<dyn HttpTransport>,
    pub kv: Arc<dyn KeyValueStore>,
    pub permissions: Arc<dyn PermissionProvider>,
    /// Background-capable recording service, where the platform has one.
    pub native_recorder: Option<Arc<dyn CaptureBackend>>,
    pub fallback_recorder: Arc<dyn CaptureBackend>,
    pub player: Arc<dyn AudioPlayer>,
    pub files: Arc<dyn AudioFileReader>,
    pub location: Arc<dyn LocationProvider>,
    pub links: Arc<dyn UrlOpener>,
    pub notifier: Arc<dyn Notifier>,
    pub hardware_trigger: Option<Arc<dyn HardwareTrigger>>,
}
