use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{AppError, ErrorKind};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationAccuracy {
    Balanced,
    #[default]
    High,
}

/// Raw fix as reported by the platform, before validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LocationError {
    #[error("location services are disabled")]
    ServicesDisabled,

    #[error("location provider error: {0}")]
    Provider(String),

    #[error("location fix timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("location permission not granted")]
    PermissionDenied,

    #[error("provider returned an invalid fix: {0}")]
    InvalidFix(String),
}

impl From<LocationError> for AppError {
    fn from(e: LocationError) -> Self {
        let kind = match e {
            LocationError::PermissionDenied => ErrorKind::LocationPermissionDenied,
            LocationError::Timeout { .. } => ErrorKind::Timeout,
            _ => ErrorKind::Location,
        };
        AppError::new(kind, e.to_string())
    }
}

/// Platform location services.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_position(&self, accuracy: LocationAccuracy) -> Result<Position, LocationError>;
}
