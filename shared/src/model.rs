use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::error::{AppError, ErrorKind};

/// Explicit timestamp unit.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnixTimeMs(pub u64);

impl UnixTimeMs {
    #[must_use]
    pub fn now() -> Self {
        Self(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis()
                .try_into()
                .unwrap_or(u64::MAX),
        )
    }

    #[must_use]
    pub fn elapsed_since(self, earlier: UnixTimeMs) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

/// Monotonic per-process SOS session identifier.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sos-{}", self.0)
    }
}

/// Lifecycle of one SOS activation. Transitions only move forward;
/// `Idle` is re-entered by reset, never by stepping back.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SosState {
    #[default]
    Idle,
    Arming,
    Recording,
    Dispatching,
    CoolingDown,
}

impl SosState {
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, SosState::Idle)
    }

    /// The single legal forward step out of `self`.
    #[must_use]
    pub const fn next(self) -> SosState {
        match self {
            SosState::Idle => SosState::Arming,
            SosState::Arming => SosState::Recording,
            SosState::Recording => SosState::Dispatching,
            SosState::Dispatching => SosState::CoolingDown,
            SosState::CoolingDown => SosState::Idle,
        }
    }

    #[must_use]
    pub fn can_advance_to(self, to: SosState) -> bool {
        self.next() == to
    }

    /// Manual stop is only honoured while capture or delivery is underway.
    #[must_use]
    pub const fn can_stop_manually(self) -> bool {
        matches!(self, SosState::Recording | SosState::Dispatching)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            SosState::Idle => "idle",
            SosState::Arming => "arming",
            SosState::Recording => "recording",
            SosState::Dispatching => "dispatching",
            SosState::CoolingDown => "cooling_down",
        }
    }
}

impl fmt::Display for SosState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CoordinateError {
    #[error("Latitude {0} is out of valid range [-90, 90]")]
    LatitudeOutOfRange(f64),
    #[error("Longitude {0} is out of valid range [-180, 180]")]
    LongitudeOutOfRange(f64),
    #[error("Coordinate value is not finite (NaN or Infinity)")]
    NonFinite,
}

impl From<CoordinateError> for AppError {
    fn from(e: CoordinateError) -> Self {
        AppError::new(ErrorKind::Location, e.to_string())
    }
}

/// Immutable location snapshot. An absent coordinate is a valid
/// "unknown location" and is modelled as `Option<Coordinate>`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    accuracy: Option<f64>,
    fetched_at: UnixTimeMs,
}

impl Coordinate {
    pub fn new(
        latitude: f64,
        longitude: f64,
        accuracy: Option<f64>,
        fetched_at: UnixTimeMs,
    ) -> Result<Self, CoordinateError> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(CoordinateError::NonFinite);
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(CoordinateError::LatitudeOutOfRange(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(CoordinateError::LongitudeOutOfRange(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
            accuracy: accuracy.filter(|a| a.is_finite() && *a >= 0.0),
            fetched_at,
        })
    }

    #[must_use]
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    #[must_use]
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    #[must_use]
    pub fn accuracy(&self) -> Option<f64> {
        self.accuracy
    }

    #[must_use]
    pub fn fetched_at(&self) -> UnixTimeMs {
        self.fetched_at
    }

    #[must_use]
    pub fn maps_link(&self) -> String {
        format!(
            "https://www.google.com/maps/search/?api=1&query={},{}",
            self.latitude, self.longitude
        )
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecorderBackend {
    /// Platform service that keeps recording with the app in background.
    Native,
    /// In-process recorder, foreground only.
    Fallback,
}

impl RecorderBackend {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RecorderBackend::Native => "native",
            RecorderBackend::Fallback => "fallback",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingHandle {
    pub backend: RecorderBackend,
    pub uri: Option<String>,
    pub started_at: UnixTimeMs,
    pub stopped_at: Option<UnixTimeMs>,
}

impl RecordingHandle {
    #[must_use]
    pub fn started(backend: RecorderBackend, uri: Option<String>, started_at: UnixTimeMs) -> Self {
        Self {
            backend,
            uri,
            started_at,
            stopped_at: None,
        }
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.stopped_at.is_none()
    }

    /// Whole seconds between start and stop; zero while still live.
    #[must_use]
    pub fn duration_seconds(&self) -> u64 {
        self.stopped_at
            .map_or(0, |stopped| stopped.elapsed_since(self.started_at).as_secs())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DispatchChannel {
    Backend,
    ChatApp,
    Sms,
}

impl DispatchChannel {
    /// Fixed priority order for emergency delivery.
    pub const PRIORITY: [DispatchChannel; 3] =
        [DispatchChannel::Backend, DispatchChannel::ChatApp, DispatchChannel::Sms];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            DispatchChannel::Backend => "backend",
            DispatchChannel::ChatApp => "chat_app",
            DispatchChannel::Sms => "sms",
        }
    }
}

impl fmt::Display for DispatchChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one attempt on one channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub channel: DispatchChannel,
    pub success: bool,
    pub error: Option<AppError>,
    /// Relay message sid, when the provider returned one.
    pub reference: Option<String>,
}

impl DispatchOutcome {
    #[must_use]
    pub fn delivered(channel: DispatchChannel, reference: Option<String>) -> Self {
        Self {
            channel,
            success: true,
            error: None,
            reference,
        }
    }

    #[must_use]
    pub fn failed(channel: DispatchChannel, error: AppError) -> Self {
        Self {
            channel,
            success: false,
            error: Some(error),
            reference: None,
        }
    }
}

/// Every attempt of one `send`, in the order they were made.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub attempts: Vec<DispatchOutcome>,
}

impl DispatchReport {
    #[must_use]
    pub fn winner(&self) -> Option<&DispatchOutcome> {
        self.attempts.iter().find(|o| o.success)
    }

    #[must_use]
    pub fn delivered_via(&self) -> Option<DispatchChannel> {
        self.winner().map(|o| o.channel)
    }

    #[must_use]
    pub fn is_delivered(&self) -> bool {
        self.winner().is_some()
    }

    #[must_use]
    pub fn attempted(&self, channel: DispatchChannel) -> bool {
        self.attempts.iter().any(|o| o.channel == channel)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SosSession {
    pub id: SessionId,
    pub state: SosState,
    pub started_at: UnixTimeMs,
    pub recording: Option<RecordingHandle>,
    pub location: Option<Coordinate>,
    pub dispatch_result: Option<DispatchReport>,
}

impl SosSession {
    #[must_use]
    pub fn arming(id: SessionId, started_at: UnixTimeMs) -> Self {
        Self {
            id,
            state: SosState::Arming,
            started_at,
            recording: None,
            location: None,
            dispatch_result: None,
        }
    }
}

/// One finished recording kept for later review. Field names match the
/// on-device JSON list so existing archives keep loading.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioArchiveEntry {
    pub file_path: String,
    pub timestamp: UnixTimeMs,
    #[serde(rename = "duration", alias = "durationSeconds")]
    pub duration_seconds: u64,
    #[serde(default)]
    pub location: Option<Coordinate>,
}

impl AudioArchiveEntry {
    /// Returns `None` for handles that never produced a file.
    #[must_use]
    pub fn from_recording(handle: &RecordingHandle, location: Option<Coordinate>) -> Option<Self> {
        let file_path = handle.uri.clone()?;
        Some(Self {
            file_path,
            timestamp: handle.started_at,
            duration_seconds: handle.duration_seconds(),
            location,
        })
    }

    /// `m:ss`
    #[must_use]
    pub fn duration_label(&self) -> String {
        format!("{}:{:02}", self.duration_seconds / 60, self.duration_seconds % 60)
    }

    #[must_use]
    pub fn location_label(&self) -> String {
        match &self.location {
            Some(c) => format!("{}, {}", c.latitude(), c.longitude()),
            None => "Unknown".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_walk_is_linear() {
        let mut state = SosState::Idle;
        let mut seen = vec![state];
        for _ in 0..5 {
            state = state.next();
            seen.push(state);
        }
        assert_eq!(
            seen,
            vec![
                SosState::Idle,
                SosState::Arming,
                SosState::Recording,
                SosState::Dispatching,
                SosState::CoolingDown,
                SosState::Idle,
            ]
        );
        assert!(!SosState::Dispatching.can_advance_to(SosState::Recording));
        assert!(!SosState::Arming.can_advance_to(SosState::Dispatching));
    }

    #[test]
    fn test_manual_stop_window() {
        assert!(SosState::Recording.can_stop_manually());
        assert!(SosState::Dispatching.can_stop_manually());
        assert!(!SosState::Arming.can_stop_manually());
        assert!(!SosState::CoolingDown.can_stop_manually());
        assert!(!SosState::Idle.can_stop_manually());
    }

    #[test]
    fn test_coordinate_validation() {
        assert!(Coordinate::new(12.34, 56.78, Some(5.0), UnixTimeMs(0)).is_ok());
        assert_eq!(
            Coordinate::new(91.0, 0.0, None, UnixTimeMs(0)),
            Err(CoordinateError::LatitudeOutOfRange(91.0))
        );
        assert_eq!(
            Coordinate::new(0.0, -181.0, None, UnixTimeMs(0)),
            Err(CoordinateError::LongitudeOutOfRange(-181.0))
        );
        assert_eq!(
            Coordinate::new(f64::NAN, 0.0, None, UnixTimeMs(0)),
            Err(CoordinateError::NonFinite)
        );
    }

    #[test]
    fn test_coordinate_drops_bogus_accuracy() {
        let c = Coordinate::new(1.0, 2.0, Some(-3.0), UnixTimeMs(0)).unwrap();
        assert_eq!(c.accuracy(), None);
    }

    #[test]
    fn test_maps_link() {
        let c = Coordinate::new(12.34, 56.78, None, UnixTimeMs(0)).unwrap();
        assert_eq!(
            c.maps_link(),
            "https://www.google.com/maps/search/?api=1&query=12.34,56.78"
        );
    }

    #[test]
    fn test_recording_duration() {
        let mut handle =
            RecordingHandle::started(RecorderBackend::Fallback, None, UnixTimeMs(1_000));
        assert!(handle.is_live());
        assert_eq!(handle.duration_seconds(), 0);
        handle.stopped_at = Some(UnixTimeMs(126_500));
        assert_eq!(handle.duration_seconds(), 125);
    }

    #[test]
    fn test_archive_entry_labels_and_wire_names() {
        let entry = AudioArchiveEntry {
            file_path: "file:///data/sos.m4a".into(),
            timestamp: UnixTimeMs(42),
            duration_seconds: 65,
            location: None,
        };
        assert_eq!(entry.duration_label(), "1:05");
        assert_eq!(entry.location_label(), "Unknown");

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["filePath"], "file:///data/sos.m4a");
        assert_eq!(json["duration"], 65);
    }

    #[test]
    fn test_archive_entry_requires_uri() {
        let handle = RecordingHandle::started(RecorderBackend::Native, None, UnixTimeMs(0));
        assert!(AudioArchiveEntry::from_recording(&handle, None).is_none());
    }

    #[test]
    fn test_report_winner() {
        let report = DispatchReport {
            attempts: vec![
                DispatchOutcome::failed(
                    DispatchChannel::Backend,
                    AppError::new(ErrorKind::Network, "down"),
                ),
                DispatchOutcome::delivered(DispatchChannel::ChatApp, None),
            ],
        };
        assert_eq!(report.delivered_via(), Some(DispatchChannel::ChatApp));
        assert!(!report.attempted(DispatchChannel::Sms));
    }
}
