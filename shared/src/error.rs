use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Transient,
    Permanent,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Network,
    Timeout,
    Authentication,
    Authorization,
    Validation,
    NotFound,
    Conflict,
    RateLimited,
    Storage,
    Serialization,
    MicrophonePermissionDenied,
    LocationPermissionDenied,
    Recorder,
    Location,
    Playback,
    DispatchChannel,
    TotalDispatchFailure,
    FeatureUnavailable,
    InvalidState,
    Internal,
    Unknown,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Network => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Authentication => "AUTH_ERROR",
            Self::Authorization => "FORBIDDEN",
            Self::Validation => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::RateLimited => "RATE_LIMITED",
            Self::Storage => "STORAGE_ERROR",
            Self::Serialization => "SERIALIZATION_ERROR",
            Self::MicrophonePermissionDenied => "MICROPHONE_PERMISSION_DENIED",
            Self::LocationPermissionDenied => "LOCATION_PERMISSION_DENIED",
            Self::Recorder => "RECORDER_ERROR",
            Self::Location => "LOCATION_ERROR",
            Self::Playback => "PLAYBACK_ERROR",
            Self::DispatchChannel => "DISPATCH_CHANNEL_FAILED",
            Self::TotalDispatchFailure => "TOTAL_DISPATCH_FAILURE",
            Self::FeatureUnavailable => "FEATURE_UNAVAILABLE",
            Self::InvalidState => "INVALID_STATE",
            Self::Internal => "INTERNAL_ERROR",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    #[must_use]
    pub const fn default_severity(self) -> ErrorSeverity {
        match self {
            Self::Network
            | Self::Timeout
            | Self::Conflict
            | Self::RateLimited
            | Self::Storage
            | Self::Recorder
            | Self::Location
            | Self::Playback
            | Self::DispatchChannel => ErrorSeverity::Transient,

            Self::Serialization | Self::Internal | Self::InvalidState => ErrorSeverity::Fatal,

            Self::Authentication
            | Self::Authorization
            | Self::Validation
            | Self::NotFound
            | Self::MicrophonePermissionDenied
            | Self::LocationPermissionDenied
            | Self::TotalDispatchFailure
            | Self::FeatureUnavailable
            | Self::Unknown => ErrorSeverity::Permanent,
        }
    }

    /// Whether the caller may retry. The SOS pipeline itself never retries;
    /// this only informs shells that offer a manual retry.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Network
                | Self::Timeout
                | Self::RateLimited
                | Self::Storage
                | Self::Conflict
                | Self::Recorder
                | Self::Location
                | Self::DispatchChannel
        )
    }

    /// Maps a relay `code` string back onto a kind, if it is one we know.
    #[must_use]
    pub fn from_api_code(code: &str) -> Option<Self> {
        let kind = match code {
            "INVALID_INPUT" | "VALIDATION_ERROR" => Self::Validation,
            "INVALID_CREDENTIALS" | "UNAUTHORIZED" | "AUTH_ERROR" => Self::Authentication,
            "USER_EXISTS" => Self::Conflict,
            "USER_NOT_FOUND" | "NOT_FOUND" => Self::NotFound,
            "SOS_ERROR" | "AUDIO_ERROR" => Self::DispatchChannel,
            _ => return None,
        };
        Some(kind)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub severity: ErrorSeverity,
    pub message: String,
    pub internal_message: Option<String>,
    pub context: HashMap<String, String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            message: message.into(),
            internal_message: None,
            context: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_internal(mut self, internal: impl Into<String>) -> Self {
        self.internal_message = Some(internal.into());
        self
    }

    #[must_use]
    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable() && !matches!(self.severity, ErrorSeverity::Fatal)
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind {
            ErrorKind::Network => {
                "Unable to connect. Please check your internet connection and try again.".into()
            }
            ErrorKind::Timeout => "The request timed out. Please try again.".into(),
            ErrorKind::Authentication => "Your session has expired. Please sign in again.".into(),
            ErrorKind::Authorization => "You don't have permission to perform this action.".into(),
            ErrorKind::Validation | ErrorKind::FeatureUnavailable => self.message.clone(),
            ErrorKind::NotFound => "The requested item could not be found.".into(),
            ErrorKind::Conflict => "This account already exists.".into(),
            ErrorKind::RateLimited => "Too many requests. Please wait a moment and try again.".into(),
            ErrorKind::Storage => {
                "Unable to save data locally. Please free up some storage space.".into()
            }
            ErrorKind::Serialization => {
                "A data error occurred. Please contact support if this persists.".into()
            }
            ErrorKind::MicrophonePermissionDenied => {
                "Microphone permission is required for SOS recording.".into()
            }
            ErrorKind::LocationPermissionDenied => {
                "Location permission is required to share your location.".into()
            }
            ErrorKind::Recorder => "Audio recording could not be started.".into(),
            ErrorKind::Location => "Unable to determine your location.".into(),
            ErrorKind::Playback => "Failed to play recording.".into(),
            ErrorKind::DispatchChannel => "Could not reach one of the alert channels.".into(),
            ErrorKind::TotalDispatchFailure => {
                "Failed to send SOS alert. Please call emergency services directly.".into()
            }
            ErrorKind::InvalidState => {
                "The app is in an invalid state. Please restart the app.".into()
            }
            ErrorKind::Internal | ErrorKind::Unknown => {
                "An unexpected error occurred. Please try again or contact support.".into()
            }
        }
    }

    /// Builds an error from a relay response, decoding the
    /// `{error, message, code}` envelope when the body carries one.
    #[must_use]
    pub fn from_http_status(status: u16, body: Option<&[u8]>) -> Self {
        let envelope = body.and_then(|b| serde_json::from_slice::<ApiErrorEnvelope>(b).ok());

        let kind = envelope
            .as_ref()
            .and_then(|e| e.code.as_deref())
            .and_then(ErrorKind::from_api_code)
            .unwrap_or(match status {
                400 => ErrorKind::Validation,
                401 => ErrorKind::Authentication,
                403 => ErrorKind::Authorization,
                404 => ErrorKind::NotFound,
                409 => ErrorKind::Conflict,
                429 => ErrorKind::RateLimited,
                408 => ErrorKind::Timeout,
                500..=599 => ErrorKind::Internal,
                _ => ErrorKind::Unknown,
            });

        let message = envelope
            .as_ref()
            .and_then(|e| e.error.clone().or_else(|| e.message.clone()))
            .unwrap_or_else(|| format!("HTTP error: {status}"));

        let mut err = Self::new(kind, message).with_context("http_status", status.to_string());
        if let Some(code) = envelope.and_then(|e| e.code) {
            err = err.with_context("api_code", code);
        }
        err
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)?;
        if let Some(internal) = &self.internal_message {
            write!(f, " (internal: {internal})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

#[derive(Debug, Clone, Deserialize)]
struct ApiErrorEnvelope {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

pub type AppResult<T> = Result<T, AppError>;
