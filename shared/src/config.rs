use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::error::{AppError, ErrorKind};

pub const DEFAULT_COOLDOWN_MS: u64 = 30_000;
pub const DEFAULT_LOCATION_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_RECORDER_START_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_RELAY_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_TAP_WINDOW_MS: u64 = 800;
pub const DEFAULT_TAPS_REQUIRED: u32 = 3;
pub const DEFAULT_HISTORY_LIMIT: usize = 10;
pub const DEFAULT_RELAY_BASE_URL: &str = "http://10.253.87.127:5000/api/v1";
pub const DEFAULT_MESSAGE_BODY: &str = "A woman is in immediate danger and needs urgent help!\n\n\
     This is an automated emergency alert from Durga Safety App.";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid config field '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("failed to parse config: {0}")]
    Parse(String),
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::new(ErrorKind::Validation, e.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Android,
    Ios,
}

impl Platform {
    /// Only Android ships the background recording service.
    #[must_use]
    pub const fn supports_background_recording(self) -> bool {
        matches!(self, Platform::Android)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmergencyContact {
    /// Digits only, no leading `+`.
    pub country_code: String,
    /// National number, digits only.
    pub number: String,
    /// Number opened in the dialer for a direct call.
    pub dial_number: String,
}

impl Default for EmergencyContact {
    fn default() -> Self {
        Self {
            country_code: "91".to_string(),
            number: "9021530516".to_string(),
            dial_number: "9021530316".to_string(),
        }
    }
}

impl EmergencyContact {
    /// Country code followed by national number, as the relay and the chat
    /// app expect it.
    #[must_use]
    pub fn international(&self) -> String {
        format!("{}{}", self.country_code, self.number)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("contact.country_code", &self.country_code),
            ("contact.number", &self.number),
            ("contact.dial_number", &self.dial_number),
        ] {
            if value.is_empty() {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must not be empty".into(),
                });
            }
            if !value.chars().all(|c| c.is_ascii_digit()) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("'{value}' must contain digits only"),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Base URL including the API version prefix.
    pub base_url: String,
    pub request_timeout_ms: u64,
    /// Lets the relay live on a LAN address during development.
    pub allow_private_network: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_RELAY_BASE_URL.to_string(),
            request_timeout_ms: DEFAULT_RELAY_TIMEOUT_MS,
            allow_private_network: true,
        }
    }
}

impl RelayConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Taps further apart than this restart the count.
    pub tap_window_ms: u64,
    pub taps_required: u32,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            tap_window_ms: DEFAULT_TAP_WINDOW_MS,
            taps_required: DEFAULT_TAPS_REQUIRED,
        }
    }
}

impl TriggerConfig {
    #[must_use]
    pub fn tap_window(&self) -> Duration {
        Duration::from_millis(self.tap_window_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Tried in order, first success wins.
    pub endpoints: Vec<String>,
    pub history_limit: usize,
    pub request_timeout_ms: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![
                "https://generativelanguage.googleapis.com/v1beta/models/gemini-pro:generateContent"
                    .to_string(),
            ],
            history_limit: DEFAULT_HISTORY_LIMIT,
            request_timeout_ms: DEFAULT_RELAY_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SosConfig {
    /// Window after activation before the session resets to idle.
    pub cooldown_ms: u64,
    pub location_timeout_ms: u64,
    pub recorder_start_timeout_ms: u64,
    pub platform: Platform,
    pub contact: EmergencyContact,
    pub relay: RelayConfig,
    pub message_body: String,
    pub trigger: TriggerConfig,
    pub assistant: AssistantConfig,
}

impl Default for SosConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: DEFAULT_COOLDOWN_MS,
            location_timeout_ms: DEFAULT_LOCATION_TIMEOUT_MS,
            recorder_start_timeout_ms: DEFAULT_RECORDER_START_TIMEOUT_MS,
            platform: Platform::default(),
            contact: EmergencyContact::default(),
            relay: RelayConfig::default(),
            message_body: DEFAULT_MESSAGE_BODY.to_string(),
            trigger: TriggerConfig::default(),
            assistant: AssistantConfig::default(),
        }
    }
}

impl SosConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("cooldown_ms", self.cooldown_ms),
            ("location_timeout_ms", self.location_timeout_ms),
            ("recorder_start_timeout_ms", self.recorder_start_timeout_ms),
            ("relay.request_timeout_ms", self.relay.request_timeout_ms),
            ("trigger.tap_window_ms", self.trigger.tap_window_ms),
            ("assistant.request_timeout_ms", self.assistant.request_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be > 0".into(),
                });
            }
        }

        if self.location_timeout_ms >= self.cooldown_ms {
            return Err(ConfigError::Invalid {
                field: "location_timeout_ms",
                reason: "must be shorter than the cooldown window".into(),
            });
        }

        if self.trigger.taps_required == 0 {
            return Err(ConfigError::Invalid {
                field: "trigger.taps_required",
                reason: "must be > 0".into(),
            });
        }

        if self.assistant.history_limit == 0 {
            return Err(ConfigError::Invalid {
                field: "assistant.history_limit",
                reason: "must be > 0".into(),
            });
        }

        self.contact.validate()?;

        url::Url::parse(&self.relay.base_url).map_err(|e| ConfigError::Invalid {
            field: "relay.base_url",
            reason: e.to_string(),
        })?;

        Ok(())
    }

    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    #[must_use]
    pub fn location_timeout(&self) -> Duration {
        Duration::from_millis(self.location_timeout_ms)
    }

    #[must_use]
    pub fn recorder_start_timeout(&self) -> Duration {
        Duration::from_millis(self.recorder_start_timeout_ms)
    }
}
