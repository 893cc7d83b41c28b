//! Durga safety core: SOS activation, evidence capture and alert
//! delivery, shared by the Android and iOS shells.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod app;
pub mod archive;
pub mod assistant;
pub mod capabilities;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod fallback;
pub mod location;
pub mod message;
pub mod model;
pub mod recorder;
pub mod relay;
pub mod settings;
pub mod trigger;
pub mod view;

pub use app::App;
pub use archive::{ArchiveError, AudioArchive};
pub use assistant::{ChatReply, ChatTurn, Companion, GeminiClient, Mood, SafetyIntent};
pub use capabilities::Capabilities;
pub use config::{ConfigError, EmergencyContact, Platform, SosConfig};
pub use controller::{Activation, SosController, SosServices, SosSnapshot};
pub use dispatch::AlertDispatcher;
pub use error::{AppError, AppResult, ErrorKind, ErrorSeverity};
pub use location::LocationProbe;
pub use message::{compose_emergency_message, EmergencyMessage};
pub use model::{
    AudioArchiveEntry, Coordinate, DispatchChannel, DispatchOutcome, DispatchReport,
    RecorderBackend, RecordingHandle, SessionId, SosSession, SosState, UnixTimeMs,
};
pub use recorder::Recorder;
pub use relay::{RelayClient, RelayError};
pub use settings::{Language, LocalSettings};
pub use trigger::{TriggerDetector, TriggerEvents, TriggerSource};
pub use view::{sos_status_view, SosStatusView};
