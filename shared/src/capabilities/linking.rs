use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::config::{EmergencyContact, Platform};
use crate::error::{AppError, ErrorKind};

/// A device-level URI handed to the OS: chat app, SMS composer or dialer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeepLink(String);

impl DeepLink {
    /// Chat app compose screen with the message pre-filled.
    #[must_use]
    pub fn chat_app(contact: &EmergencyContact, text: &str) -> Self {
        Self(format!(
            "whatsapp://send?phone={}&text={}",
            contact.international(),
            urlencoding::encode(text)
        ))
    }

    /// Native SMS composer. iOS expects `&body=`, Android `?body=`.
    #[must_use]
    pub fn sms(platform: Platform, contact: &EmergencyContact, text: &str) -> Self {
        let separator = match platform {
            Platform::Ios => '&',
            Platform::Android => '?',
        };
        Self(format!(
            "sms:{}{}body={}",
            contact.number,
            separator,
            urlencoding::encode(text)
        ))
    }

    #[must_use]
    pub fn dialer(number: &str) -> Self {
        Self(format!("tel:{number}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        self.0.split(':').next().unwrap_or_default()
    }
}

impl fmt::Display for DeepLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Links carry the message body; only the scheme is printed.
        write!(f, "{}:…", self.scheme())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("no app can handle '{scheme}:' links")]
    Unsupported { scheme: String },

    #[error("failed to open '{scheme}:' link: {message}")]
    OpenFailed { scheme: String, message: String },
}

impl From<LinkError> for AppError {
    fn from(e: LinkError) -> Self {
        AppError::new(ErrorKind::DispatchChannel, e.to_string())
    }
}

/// OS URL launcher.
#[async_trait]
pub trait UrlOpener: Send + Sync {
    async fn can_open(&self, link: &DeepLink) -> Result<bool, LinkError>;

    async fn open(&self, link: &DeepLink) -> Result<(), LinkError>;
}
