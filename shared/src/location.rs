use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::capabilities::location::{LocationAccuracy, LocationError, LocationProvider, Position};
use crate::capabilities::permissions::{PermissionGate, PermissionKind};
use crate::model::{Coordinate, UnixTimeMs};

/// One-shot, time-boxed location lookup. Every failure collapses to
/// "unknown location" so the SOS pipeline never waits on or fails because
/// of a missing fix.
pub struct LocationProbe {
    gate: PermissionGate,
    provider: Arc<dyn LocationProvider>,
    timeout: Duration,
}

impl LocationProbe {
    #[must_use]
    pub fn new(gate: PermissionGate, provider: Arc<dyn LocationProvider>, timeout: Duration) -> Self {
        Self {
            gate,
            provider,
            timeout,
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns `None` on denial, timeout, provider error or an invalid fix.
    #[instrument(skip(self))]
    pub async fn fetch(&self) -> Option<Coordinate> {
        match self.try_fetch().await {
            Ok(coordinate) => {
                debug!(accuracy = ?coordinate.accuracy(), "location fix acquired");
                Some(coordinate)
            }
            Err(e) => {
                warn!(error = %e, "location unavailable, continuing without it");
                None
            }
        }
    }

    async fn try_fetch(&self) -> Result<Coordinate, LocationError> {
        // The permission prompt shares the budget with the fix itself.
        let position = tokio::time::timeout(self.timeout, self.locate())
            .await
            .map_err(|_| LocationError::Timeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            })??;

        let fetched_at = if position.timestamp_ms == 0 {
            UnixTimeMs::now()
        } else {
            UnixTimeMs(position.timestamp_ms)
        };
        Coordinate::new(position.latitude, position.longitude, position.accuracy, fetched_at)
            .map_err(|e| LocationError::InvalidFix(e.to_string()))
    }

    async fn locate(&self) -> Result<Position, LocationError> {
        if !self.gate.is_granted(PermissionKind::Location).await {
            return Err(LocationError::PermissionDenied);
        }
        self.provider.current_position(LocationAccuracy::High).await
    }
}
