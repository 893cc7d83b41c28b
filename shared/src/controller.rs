use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::archive::AudioArchive;
use crate::capabilities::notify::{Notice, Notifier};
use crate::capabilities::permissions::{PermissionGate, PermissionKind, PermissionStatus};
use crate::config::SosConfig;
use crate::dispatch::{total_failure, AlertDispatcher};
use crate::error::{AppError, ErrorKind};
use crate::location::LocationProbe;
use crate::message::compose_emergency_message;
use crate::model::{
    AudioArchiveEntry, Coordinate, DispatchReport, RecordingHandle, SessionId, SosSession,
    SosState, UnixTimeMs,
};
use crate::recorder::Recorder;
use crate::view::{sos_status_view, SosStatusView};

/// What observers see of the SOS lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SosSnapshot {
    pub session_id: Option<SessionId>,
    pub state: SosState,
}

#[derive(Debug)]
pub enum Activation {
    /// A new session began. Awaiting `pipeline` is optional; it runs
    /// detached either way.
    Started {
        session_id: SessionId,
        pipeline: JoinHandle<()>,
    },
    /// A session was already active; nothing happened.
    Suppressed { state: SosState },
}

/// Collaborators the controller sequences.
pub struct SosServices {
    pub permissions: PermissionGate,
    pub recorder: Arc<Recorder>,
    pub location: LocationProbe,
    pub dispatcher: AlertDispatcher,
    pub archive: Arc<AsyncMutex<AudioArchive>>,
    pub notifier: Arc<dyn Notifier>,
}

struct Slot {
    session: Option<SosSession>,
    cooldown: Option<CancellationToken>,
    next_id: u64,
}

struct Shared {
    config: SosConfig,
    services: SosServices,
    slot: Mutex<Slot>,
    snapshot: watch::Sender<SosSnapshot>,
}

/// Owns the SOS lifecycle. At most one session is active at a time; the
/// session walks `Idle -> Arming -> Recording -> Dispatching ->
/// CoolingDown` and is reset to `Idle` by the cooldown timer or a manual
/// stop.
///
/// Every transition names the session it belongs to, so work still
/// running for a session that was already reset cannot touch a newer one.
#[derive(Clone)]
pub struct SosController {
    shared: Arc<Shared>,
}

impl SosController {
    #[must_use]
    pub fn new(config: SosConfig, services: SosServices) -> Self {
        let (snapshot, _) = watch::channel(SosSnapshot::default());
        Self {
            shared: Arc::new(Shared {
                config,
                services,
                slot: Mutex::new(Slot {
                    session: None,
                    cooldown: None,
                    next_id: 0,
                }),
                snapshot,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SosConfig {
        &self.shared.config
    }

    #[must_use]
    pub fn state(&self) -> SosState {
        self.slot()
            .session
            .as_ref()
            .map_or(SosState::Idle, |s| s.state)
    }

    #[must_use]
    pub fn session(&self) -> Option<SosSession> {
        self.slot().session.clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SosSnapshot> {
        self.shared.snapshot.subscribe()
    }

    #[must_use]
    pub fn archive(&self) -> Arc<AsyncMutex<AudioArchive>> {
        Arc::clone(&self.shared.services.archive)
    }

    pub async fn status_view(&self) -> Option<SosStatusView> {
        let recording = self.shared.services.recorder.is_recording().await;
        sos_status_view(self.state(), recording)
    }

    /// Starts an SOS session unless one is already active. Must be called
    /// from within a Tokio runtime.
    pub fn activate(&self) -> Activation {
        let (id, token) = {
            let mut slot = self.slot();
            if let Some(session) = &slot.session {
                debug!(session_id = %session.id, state = %session.state, "activation suppressed");
                return Activation::Suppressed {
                    state: session.state,
                };
            }
            slot.next_id += 1;
            let id = SessionId(slot.next_id);
            let token = CancellationToken::new();
            slot.session = Some(SosSession::arming(id, UnixTimeMs::now()));
            slot.cooldown = Some(token.clone());
            self.publish(Some(id), SosState::Arming);
            (id, token)
        };

        info!(session_id = %id, cooldown_ms = self.shared.config.cooldown_ms, "SOS activated");
        tokio::spawn(self.clone().run_cooldown(id, token));
        let pipeline = tokio::spawn(self.clone().run_pipeline(id));
        Activation::Started {
            session_id: id,
            pipeline,
        }
    }

    /// Manual stop. Honoured only while recording or dispatching: stops
    /// the capture, archives it and returns to `Idle` without waiting for
    /// the cooldown. An in-flight dispatch keeps running.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> bool {
        let session = {
            let mut slot = self.slot();
            match slot.session.as_ref() {
                Some(s) if s.state.can_stop_manually() => {}
                Some(s) => {
                    debug!(state = %s.state, "manual stop ignored in this state");
                    return false;
                }
                None => return false,
            }
            if let Some(token) = slot.cooldown.take() {
                token.cancel();
            }
            let session = slot.session.take();
            self.publish(None, SosState::Idle);
            session
        };

        let Some(session) = session else {
            return false;
        };
        info!(session_id = %session.id, "SOS stopped manually");
        self.finish_recording(session.id, session.location).await;
        true
    }

    /// Sends the current location to the emergency contact over the device
    /// channels. Fails when no fix is available or no channel delivered.
    #[instrument(skip(self))]
    pub async fn share_location(&self) -> Result<DispatchReport, AppError> {
        let services = &self.shared.services;
        let Some(coordinate) = services.location.fetch().await else {
            let error = AppError::new(ErrorKind::Location, "current location unavailable");
            services.notifier.notify(Notice::PermissionRequired {
                kind: PermissionKind::Location,
                error: error.clone(),
            });
            return Err(error);
        };

        let report = services.dispatcher.share_location(&coordinate).await;
        match report.delivered_via() {
            Some(channel) => {
                services.notifier.notify(Notice::LocationShared { channel });
                Ok(report)
            }
            None => {
                let error = total_failure(&report);
                services.notifier.notify(Notice::DispatchFailed {
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    pub async fn call_emergency(&self) -> Result<(), AppError> {
        self.shared.services.dispatcher.call_emergency().await
    }

    async fn run_cooldown(self, id: SessionId, token: CancellationToken) {
        tokio::select! {
            () = token.cancelled() => {
                debug!(session_id = %id, "cooldown cancelled");
                return;
            }
            () = tokio::time::sleep(self.shared.config.cooldown()) => {}
        }

        let expired = {
            let mut slot = self.slot();
            if slot.session.as_ref().is_some_and(|s| s.id == id) {
                slot.cooldown = None;
                let session = slot.session.take();
                self.publish(None, SosState::Idle);
                session
            } else {
                None
            }
        };

        if let Some(session) = expired {
            info!(session_id = %id, from = %session.state, "cooldown elapsed, SOS reset");
            self.finish_recording(id, session.location).await;
        }
    }

    #[instrument(skip_all, fields(session_id = %id))]
    async fn run_pipeline(self, id: SessionId) {
        let services = &self.shared.services;

        let mic = self.microphone_permission().await;
        if !mic.is_granted() {
            warn!(status = ?mic, "microphone not granted, continuing without audio");
            services.notifier.notify(Notice::PermissionRequired {
                kind: PermissionKind::Microphone,
                error: PermissionKind::Microphone.denied_error(),
            });
        }

        if !self.advance(id, SosState::Recording) {
            return;
        }

        let (recording, coordinate) = tokio::join!(
            self.start_recording(id, mic.is_granted()),
            services.location.fetch()
        );
        self.update(id, |s| {
            s.recording.clone_from(&recording);
            s.location = coordinate;
        });

        if !self.advance(id, SosState::Dispatching) {
            // Reset while capture was starting.
            self.finish_recording(id, coordinate).await;
            return;
        }

        let released = match services.recorder.release_for_dispatch(id).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "could not finalize recording, sending without audio");
                None
            }
        };
        let audio_ref = released.as_ref().and_then(|h| h.uri.clone());
        if let Some(handle) = &released {
            self.update(id, |s| s.recording = Some(handle.clone()));
        }

        let message = compose_emergency_message(
            &self.shared.config.message_body,
            coordinate.as_ref(),
            UnixTimeMs::now(),
        );
        let report = services
            .dispatcher
            .send(&message, coordinate.as_ref(), audio_ref.as_deref())
            .await;

        let notice = match report.delivered_via() {
            Some(channel) => Notice::SosDispatched { channel },
            None => Notice::DispatchFailed {
                error: total_failure(&report),
            },
        };
        services.notifier.notify(notice);

        self.update(id, |s| s.dispatch_result = Some(report));
        self.advance(id, SosState::CoolingDown);

        // Archived only once the alert is out; the archive lock is shared
        // with playback.
        if let Some(handle) = released {
            self.archive_recording(&handle, coordinate).await;
        }
    }

    /// Microphone prompt bounded by the recorder start budget. An
    /// unanswered prompt counts as denied.
    async fn microphone_permission(&self) -> PermissionStatus {
        let budget = self.shared.config.recorder_start_timeout();
        let prompt = self
            .shared
            .services
            .permissions
            .ensure(PermissionKind::Microphone);
        tokio::time::timeout(budget, prompt)
            .await
            .unwrap_or_else(|_| {
                warn!(
                    timeout_ms = self.shared.config.recorder_start_timeout_ms,
                    "microphone prompt unanswered, treating as denied"
                );
                PermissionStatus::Denied
            })
    }

    async fn start_recording(&self, id: SessionId, granted: bool) -> Option<RecordingHandle> {
        if !granted {
            return None;
        }
        let budget = self.shared.config.recorder_start_timeout();
        match tokio::time::timeout(budget, self.shared.services.recorder.start_for(id)).await {
            Ok(Ok(handle)) => Some(handle),
            Ok(Err(e)) => {
                warn!(error = %e, "recording failed to start, continuing without audio");
                None
            }
            Err(_) => {
                warn!(timeout_ms = self.shared.config.recorder_start_timeout_ms, "recording start timed out");
                None
            }
        }
    }

    async fn finish_recording(&self, id: SessionId, location: Option<Coordinate>) {
        match self.shared.services.recorder.stop_for(id).await {
            Ok(Some(handle)) => self.archive_recording(&handle, location).await,
            Ok(None) => {}
            Err(e) => error!(session_id = %id, error = %e, "failed to stop recording"),
        }
    }

    async fn archive_recording(&self, handle: &RecordingHandle, location: Option<Coordinate>) {
        let Some(entry) = AudioArchiveEntry::from_recording(handle, location) else {
            debug!("recording produced no file, nothing to archive");
            return;
        };
        let mut archive = self.shared.services.archive.lock().await;
        if let Err(e) = archive.record(entry).await {
            error!(error = %e, "failed to archive recording");
        }
    }

    fn advance(&self, id: SessionId, to: SosState) -> bool {
        let mut slot = self.slot();
        match slot.session.as_mut() {
            Some(session) if session.id == id && session.state.can_advance_to(to) => {
                let from = session.state;
                session.state = to;
                self.publish(Some(id), to);
                debug!(session_id = %id, %from, %to, "SOS state advanced");
                true
            }
            _ => {
                debug!(session_id = %id, %to, "stale transition ignored");
                false
            }
        }
    }

    fn update(&self, id: SessionId, apply: impl FnOnce(&mut SosSession)) {
        if let Some(session) = self.slot().session.as_mut().filter(|s| s.id == id) {
            apply(session);
        }
    }

    fn publish(&self, session_id: Option<SessionId>, state: SosState) {
        self.shared
            .snapshot
            .send_replace(SosSnapshot { session_id, state });
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.shared
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
