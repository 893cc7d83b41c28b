use secrecy::SecretString;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::archive::AudioArchive;
use crate::assistant::{ChatReply, ChatTurn, Companion, GeminiClient, Mood};
use crate::capabilities::permissions::PermissionGate;
use crate::capabilities::Capabilities;
use crate::config::SosConfig;
use crate::controller::{SosController, SosServices};
use crate::dispatch::AlertDispatcher;
use crate::error::AppError;
use crate::location::LocationProbe;
use crate::recorder::Recorder;
use crate::relay::{AuthResponse, LoginRequest, RelayClient};
use crate::settings::LocalSettings;
use crate::trigger::{TriggerDetector, TriggerEvents};

/// The assembled core: SOS controller, triggers, relay session and chat.
pub struct App {
    controller: SosController,
    relay: Arc<RelayClient>,
    settings: LocalSettings,
    companion: Companion,
    trigger: TriggerDetector,
    events: Option<TriggerEvents>,
}

impl App {
    /// Validates `config` and wires every component to the shell's
    /// capabilities. A stored auth token is restored into the relay
    /// client.
    #[instrument(skip_all)]
    pub async fn new(
        config: SosConfig,
        caps: Capabilities,
        assistant_key: Option<SecretString>,
    ) -> Result<Self, AppError> {
        config.validate()?;

        let relay = Arc::new(RelayClient::new(
            &config.relay,
            Arc::clone(&caps.http),
            Arc::clone(&caps.files),
        )?);

        let settings = LocalSettings::new(Arc::clone(&caps.kv))?;
        match settings.auth_token().await {
            Ok(token) => relay.set_token(token),
            Err(e) => warn!(error = %e, "could not restore auth token"),
        }

        let archive = AudioArchive::load(Arc::clone(&caps.kv), Arc::clone(&caps.player)).await?;

        let permissions = PermissionGate::new(Arc::clone(&caps.permissions));
        let recorder = Arc::new(Recorder::new(
            caps.native_recorder.clone(),
            Arc::clone(&caps.fallback_recorder),
        ));
        let location = LocationProbe::new(
            permissions.clone(),
            Arc::clone(&caps.location),
            config.location_timeout(),
        );
        let dispatcher = AlertDispatcher::new(
            Arc::clone(&relay),
            Arc::clone(&caps.links),
            config.contact.clone(),
            config.platform,
        );

        let (trigger, events) = TriggerDetector::new(&config.trigger);
        if let Some(hardware) = &caps.hardware_trigger {
            trigger.attach_hardware(hardware.as_ref());
        }

        let companion = match assistant_key {
            Some(key) => match GeminiClient::new(&config.assistant, key, Arc::clone(&caps.http)) {
                Ok(client) => Companion::new(Some(client)),
                Err(e) => {
                    warn!(error = %e, "assistant disabled");
                    Companion::offline()
                }
            },
            None => Companion::offline(),
        };

        info!(
            platform = ?config.platform,
            native_recorder = recorder.has_native(),
            "core ready"
        );

        let controller = SosController::new(
            config,
            SosServices {
                permissions,
                recorder,
                location,
                dispatcher,
                archive: Arc::new(AsyncMutex::new(archive)),
                notifier: Arc::clone(&caps.notifier),
            },
        );

        Ok(Self {
            controller,
            relay,
            settings,
            companion,
            trigger,
            events: Some(events),
        })
    }

    #[must_use]
    pub fn controller(&self) -> &SosController {
        &self.controller
    }

    #[must_use]
    pub fn trigger(&self) -> &TriggerDetector {
        &self.trigger
    }

    #[must_use]
    pub fn relay(&self) -> &RelayClient {
        &self.relay
    }

    #[must_use]
    pub fn settings(&self) -> &LocalSettings {
        &self.settings
    }

    /// Routes trigger events into the controller. Only the first call
    /// starts a listener; later calls return `None`.
    pub fn listen_for_triggers(&mut self) -> Option<JoinHandle<()>> {
        let events = self.events.take()?;
        Some(tokio::spawn(events.drive(self.controller.clone())))
    }

    pub async fn login(&self, credentials: &LoginRequest) -> Result<AuthResponse, AppError> {
        let response = self.relay.login(credentials).await?;
        if let Some(token) = &response.token {
            self.settings.set_auth_token(token).await?;
            self.relay.set_token(Some(token.clone()));
        }
        Ok(response)
    }

    /// Ends the relay session. The local token is forgotten even when the
    /// relay call fails.
    pub async fn logout(&self) -> Result<(), AppError> {
        let remote = self.relay.logout().await;
        self.settings.clear_auth_token().await?;
        remote.map_err(AppError::from)
    }

    pub async fn chat(&self, message: &str, history: &[ChatTurn], mood: Mood) -> ChatReply {
        self.companion.reply(message, history, mood).await
    }

    /// Detaches the hardware trigger. Also happens on drop.
    pub fn shutdown(&self) {
        self.trigger.dispose();
    }
}
