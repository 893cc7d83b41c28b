use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{AppError, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionKind {
    Microphone,
    /// Foreground location only.
    Location,
}

impl PermissionKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            PermissionKind::Microphone => "microphone",
            PermissionKind::Location => "location",
        }
    }

    #[must_use]
    pub fn denied_error(self) -> AppError {
        let kind = match self {
            PermissionKind::Microphone => ErrorKind::MicrophonePermissionDenied,
            PermissionKind::Location => ErrorKind::LocationPermissionDenied,
        };
        AppError::new(kind, format!("{} permission not granted", self.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionStatus {
    Granted,
    Denied,
    DeniedPermanently,
    Restricted,
    NotDetermined,
}

impl PermissionStatus {
    #[must_use]
    pub fn is_granted(self) -> bool {
        matches!(self, PermissionStatus::Granted)
    }

    #[must_use]
    pub fn can_request(self) -> bool {
        matches!(self, PermissionStatus::NotDetermined | PermissionStatus::Denied)
    }

    #[must_use]
    pub fn should_show_settings_prompt(self) -> bool {
        matches!(
            self,
            PermissionStatus::DeniedPermanently | PermissionStatus::Restricted
        )
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PermissionError {
    #[error("{kind:?} permission prompt failed: {message}")]
    PromptFailed { kind: PermissionKind, message: String },

    #[error("{kind:?} permission is not supported on this device")]
    Unsupported { kind: PermissionKind },
}

/// OS permission prompts, provided by the shell.
#[async_trait]
pub trait PermissionProvider: Send + Sync {
    async fn check(&self, kind: PermissionKind) -> Result<PermissionStatus, PermissionError>;
    async fn request(&self, kind: PermissionKind) -> Result<PermissionStatus, PermissionError>;
}

/// Checks and, when the OS still allows it, requests a permission.
/// Any provider failure is treated as a denial.
#[derive(Clone)]
pub struct PermissionGate {
    provider: Arc<dyn PermissionProvider>,
}

impl PermissionGate {
    #[must_use]
    pub fn new(provider: Arc<dyn PermissionProvider>) -> Self {
        Self { provider }
    }

    pub async fn ensure(&self, kind: PermissionKind) -> PermissionStatus {
        let current = match self.provider.check(kind).await {
            Ok(status) => status,
            Err(e) => {
                warn!(permission = kind.as_str(), error = %e, "permission check failed");
                return PermissionStatus::Denied;
            }
        };

        if current.is_granted() || !current.can_request() {
            debug!(permission = kind.as_str(), status = ?current, "permission resolved without prompt");
            return current;
        }

        match self.provider.request(kind).await {
            Ok(status) => {
                debug!(permission = kind.as_str(), status = ?status, "permission prompt answered");
                status
            }
            Err(e) => {
                warn!(permission = kind.as_str(), error = %e, "permission request failed");
                PermissionStatus::Denied
            }
        }
    }

    pub async fn is_granted(&self, kind: PermissionKind) -> bool {
        self.ensure(kind).await.is_granted()
    }
}
