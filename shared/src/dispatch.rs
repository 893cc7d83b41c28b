use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::capabilities::linking::{DeepLink, LinkError, UrlOpener};
use crate::config::{EmergencyContact, Platform};
use crate::error::{AppError, ErrorKind};
use crate::fallback::{first_success, FallbackOutcome};
use crate::message::{compose_location_share, EmergencyMessage};
use crate::model::{Coordinate, DispatchChannel, DispatchOutcome, DispatchReport};
use crate::relay::{RelayClient, SosAlertRequest};

/// Delivers emergency messages over the relay and device share intents.
pub struct AlertDispatcher {
    relay: Arc<RelayClient>,
    opener: Arc<dyn UrlOpener>,
    contact: EmergencyContact,
    platform: Platform,
}

impl AlertDispatcher {
    #[must_use]
    pub fn new(
        relay: Arc<RelayClient>,
        opener: Arc<dyn UrlOpener>,
        contact: EmergencyContact,
        platform: Platform,
    ) -> Self {
        Self {
            relay,
            opener,
            contact,
            platform,
        }
    }

    /// Tries backend relay, then chat app, then SMS composer, once each,
    /// stopping at the first that succeeds. Never fails: total failure is
    /// a report with no successful attempt.
    #[instrument(skip_all, fields(has_location = coordinate.is_some(), has_audio = audio_ref.is_some()))]
    pub async fn send(
        &self,
        message: &EmergencyMessage,
        coordinate: Option<&Coordinate>,
        audio_ref: Option<&str>,
    ) -> DispatchReport {
        let outcome = first_success(DispatchChannel::PRIORITY, |channel| {
            self.attempt(channel, message, coordinate, audio_ref)
        })
        .await;

        let report = to_report(outcome);
        match report.delivered_via() {
            Some(channel) => info!(%channel, attempts = report.attempts.len(), "SOS delivered"),
            None => error!("SOS delivery failed on every channel"),
        }
        report
    }

    /// Shares the current location with the emergency contact over the
    /// device channels only.
    #[instrument(skip_all)]
    pub async fn share_location(&self, coordinate: &Coordinate) -> DispatchReport {
        let message = compose_location_share(coordinate);
        let message = &message;
        let outcome = first_success([DispatchChannel::ChatApp, DispatchChannel::Sms], |channel| {
            self.attempt(channel, message, Some(coordinate), None)
        })
        .await;
        to_report(outcome)
    }

    /// Opens the dialer on the configured emergency number.
    pub async fn call_emergency(&self) -> Result<(), AppError> {
        let link = DeepLink::dialer(&self.contact.dial_number);
        self.opener.open(&link).await.map_err(|e| {
            warn!(error = %e, "failed to open dialer");
            AppError::from(e).with_context("number", self.contact.dial_number.clone())
        })
    }

    async fn attempt(
        &self,
        channel: DispatchChannel,
        message: &EmergencyMessage,
        coordinate: Option<&Coordinate>,
        audio_ref: Option<&str>,
    ) -> Result<Option<String>, AppError> {
        let result = match channel {
            DispatchChannel::Backend => self.via_relay(message, coordinate, audio_ref).await,
            DispatchChannel::ChatApp => self.via_chat_app(message).await.map(|()| None),
            DispatchChannel::Sms => self.via_sms(message).await.map(|()| None),
        };
        if let Err(e) = &result {
            warn!(%channel, error = %e, "dispatch channel failed");
        }
        result
    }

    async fn via_relay(
        &self,
        message: &EmergencyMessage,
        coordinate: Option<&Coordinate>,
        audio_ref: Option<&str>,
    ) -> Result<Option<String>, AppError> {
        // Audio is best effort; the alert goes out without the link.
        let audio_url = match audio_ref {
            Some(uri) => match self.relay.upload_sos_audio(uri).await {
                Ok(uploaded) => Some(uploaded.audio_url),
                Err(e) => {
                    warn!(error = %e, "audio upload failed, sending without audio");
                    None
                }
            },
            None => None,
        };

        let alert = SosAlertRequest {
            phone: self.contact.international(),
            message: message.as_str().to_string(),
            lat: coordinate.map(Coordinate::latitude),
            lng: coordinate.map(Coordinate::longitude),
            audio_url,
        };

        let response = self.relay.send_sos(&alert).await.map_err(|e| {
            AppError::from(e).with_context("channel", DispatchChannel::Backend.as_str())
        })?;
        Ok(response.sid)
    }

    async fn via_chat_app(&self, message: &EmergencyMessage) -> Result<(), AppError> {
        let link = DeepLink::chat_app(&self.contact, message.as_str());
        if !self.opener.can_open(&link).await.map_err(AppError::from)? {
            return Err(LinkError::Unsupported {
                scheme: link.scheme().to_string(),
            }
            .into());
        }
        self.opener.open(&link).await.map_err(AppError::from)
    }

    async fn via_sms(&self, message: &EmergencyMessage) -> Result<(), AppError> {
        let link = DeepLink::sms(self.platform, &self.contact, message.as_str());
        self.opener.open(&link).await.map_err(AppError::from)
    }
}

fn to_report(outcome: FallbackOutcome<DispatchChannel, Option<String>, AppError>) -> DispatchReport {
    let mut attempts: Vec<DispatchOutcome> = outcome
        .failures()
        .iter()
        .map(|f| DispatchOutcome::failed(f.candidate, f.error.clone()))
        .collect();
    if let FallbackOutcome::Succeeded {
        candidate, value, ..
    } = outcome
    {
        attempts.push(DispatchOutcome::delivered(candidate, value));
    }
    DispatchReport { attempts }
}

/// Error reported to the user when no channel delivered.
#[must_use]
pub fn total_failure(report: &DispatchReport) -> AppError {
    let tried: Vec<&str> = report.attempts.iter().map(|a| a.channel.as_str()).collect();
    AppError::new(ErrorKind::TotalDispatchFailure, "all alert channels failed")
        .with_context("channels", tried.join(","))
}
