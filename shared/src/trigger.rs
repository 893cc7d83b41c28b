use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::TriggerConfig;
use crate::controller::{Activation, SosController};
use crate::error::{AppError, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerSource {
    HardwareVolume,
    InAppTripleTap,
}

impl TriggerSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TriggerSource::HardwareVolume => "hardware_volume",
            TriggerSource::InAppTripleTap => "in_app_triple_tap",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TriggerError {
    #[error("hardware trigger is not available on this device")]
    Unavailable,

    #[error("failed to subscribe to hardware trigger: {0}")]
    SubscribeFailed(String),
}

impl From<TriggerError> for AppError {
    fn from(e: TriggerError) -> Self {
        AppError::new(ErrorKind::FeatureUnavailable, e.to_string())
    }
}

/// Live registration with the hardware button listener.
pub trait TriggerSubscription: Send {
    fn remove(&mut self);
}

/// Volume-button triple press (or equivalent) reported by the platform.
pub trait HardwareTrigger: Send + Sync {
    fn is_available(&self) -> bool;

    fn subscribe(
        &self,
        on_trigger: Box<dyn Fn() + Send + Sync>,
    ) -> Result<Box<dyn TriggerSubscription>, TriggerError>;
}

/// Consecutive taps closer together than `window` count toward one
/// trigger. A longer gap starts over.
#[derive(Debug, Clone)]
pub struct TapCounter {
    window: Duration,
    required: u32,
    count: u32,
    last: Option<Instant>,
}

impl TapCounter {
    #[must_use]
    pub fn new(window: Duration, required: u32) -> Self {
        Self {
            window,
            required: required.max(1),
            count: 0,
            last: None,
        }
    }

    /// Records a tap; returns `true` when this tap completes the sequence.
    pub fn register(&mut self, at: Instant) -> bool {
        let within_window = self
            .last
            .is_some_and(|last| at.saturating_duration_since(last) <= self.window);
        self.count = if within_window { self.count + 1 } else { 1 };
        self.last = Some(at);

        if self.count >= self.required {
            self.reset();
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        self.count = 0;
        self.last = None;
    }

    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }
}

/// Normalizes hardware and in-app triggers into one event stream.
pub struct TriggerDetector {
    taps: Mutex<TapCounter>,
    tx: mpsc::UnboundedSender<TriggerSource>,
    subscription: Mutex<Option<Box<dyn TriggerSubscription>>>,
}

impl TriggerDetector {
    #[must_use]
    pub fn new(config: &TriggerConfig) -> (Self, TriggerEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        let detector = Self {
            taps: Mutex::new(TapCounter::new(config.tap_window(), config.taps_required)),
            tx,
            subscription: Mutex::new(None),
        };
        (detector, TriggerEvents { rx })
    }

    /// Subscribes to the hardware button. Returns `false` when the device
    /// has none or the subscription fails; in-app taps keep working.
    pub fn attach_hardware(&self, hardware: &dyn HardwareTrigger) -> bool {
        if !hardware.is_available() {
            info!("hardware trigger unavailable, using in-app taps only");
            return false;
        }

        let tx = self.tx.clone();
        let callback = Box::new(move || {
            if tx.send(TriggerSource::HardwareVolume).is_err() {
                debug!("hardware trigger fired after events were dropped");
            }
        });

        match hardware.subscribe(callback) {
            Ok(subscription) => {
                let previous = self
                    .subscription
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .replace(subscription);
                if let Some(mut previous) = previous {
                    previous.remove();
                }
                info!("hardware trigger attached");
                true
            }
            Err(e) => {
                warn!(error = %e, "hardware trigger subscription failed");
                false
            }
        }
    }

    /// In-app tap on the SOS button.
    pub fn tap(&self, at: Instant) -> bool {
        let fired = self
            .taps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .register(at);
        if fired {
            self.emit(TriggerSource::InAppTripleTap);
        }
        fired
    }

    /// Direct activation, e.g. a long press on the SOS button.
    pub fn fire(&self, source: TriggerSource) {
        self.emit(source);
    }

    pub fn dispose(&self) {
        let subscription = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut subscription) = subscription {
            subscription.remove();
            debug!("hardware trigger detached");
        }
    }

    fn emit(&self, source: TriggerSource) {
        debug!(source = source.as_str(), "trigger fired");
        if self.tx.send(source).is_err() {
            debug!("trigger fired with no listener");
        }
    }
}

impl Drop for TriggerDetector {
    fn drop(&mut self) {
        self.dispose();
    }
}

pub struct TriggerEvents {
    rx: mpsc::UnboundedReceiver<TriggerSource>,
}

impl TriggerEvents {
    pub async fn next(&mut self) -> Option<TriggerSource> {
        self.rx.recv().await
    }

    /// Feeds every trigger into `controller.activate()` until all senders
    /// are gone. Debouncing is the controller's job.
    pub async fn drive(mut self, controller: SosController) {
        while let Some(source) = self.next().await {
            match controller.activate() {
                Activation::Started { session_id, .. } => {
                    info!(source = source.as_str(), %session_id, "SOS triggered");
                }
                Activation::Suppressed { state } => {
                    debug!(source = source.as_str(), %state, "trigger ignored, SOS already active");
                }
            }
        }
    }
}
