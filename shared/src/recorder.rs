use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::capabilities::audio::{CaptureBackend, RecorderError};
use crate::model::{RecorderBackend, RecordingHandle, SessionId, UnixTimeMs};

struct LiveCapture {
    handle: RecordingHandle,
    owner: Option<SessionId>,
}

/// Owns the single live capture. The native backend is chosen once, at
/// construction, if it reports itself available; otherwise every capture
/// goes to the in-process fallback.
pub struct Recorder {
    native: Option<Arc<dyn CaptureBackend>>,
    fallback: Arc<dyn CaptureBackend>,
    live: Mutex<Option<LiveCapture>>,
}

impl Recorder {
    #[must_use]
    pub fn new(native: Option<Arc<dyn CaptureBackend>>, fallback: Arc<dyn CaptureBackend>) -> Self {
        let native = native.filter(|backend| {
            let available = backend.is_available();
            if !available {
                info!("native recording service unavailable, using in-app recorder");
            }
            available
        });
        Self {
            native,
            fallback,
            live: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn has_native(&self) -> bool {
        self.native.is_some()
    }

    pub async fn is_recording(&self) -> bool {
        self.live.lock().await.is_some()
    }

    pub async fn current(&self) -> Option<RecordingHandle> {
        self.live.lock().await.as_ref().map(|c| c.handle.clone())
    }

    /// Starts a capture, stopping and releasing any live one first.
    pub async fn start(&self) -> Result<RecordingHandle, RecorderError> {
        self.start_owned(None).await
    }

    /// Like [`Recorder::start`], tagging the capture with the session so a
    /// stale session cannot stop a newer one.
    pub async fn start_for(&self, session: SessionId) -> Result<RecordingHandle, RecorderError> {
        self.start_owned(Some(session)).await
    }

    #[instrument(skip(self))]
    async fn start_owned(
        &self,
        owner: Option<SessionId>,
    ) -> Result<RecordingHandle, RecorderError> {
        let mut live = self.live.lock().await;

        if let Some(previous) = live.take() {
            warn!(backend = previous.handle.backend.as_str(), "releasing previous capture before start");
            if let Err(e) = self.finalize(previous.handle).await {
                warn!(error = %e, "previous capture did not stop cleanly");
            }
        }

        let started_at = UnixTimeMs::now();
        let handle = match &self.native {
            Some(native) => match native.start().await {
                Ok(uri) => RecordingHandle::started(RecorderBackend::Native, uri, started_at),
                Err(e) => {
                    warn!(error = %e, "native recorder failed, falling back to in-app recorder");
                    self.start_fallback(started_at).await?
                }
            },
            None => self.start_fallback(started_at).await?,
        };

        info!(backend = handle.backend.as_str(), "recording started");
        *live = Some(LiveCapture {
            handle: handle.clone(),
            owner,
        });
        Ok(handle)
    }

    async fn start_fallback(&self, started_at: UnixTimeMs) -> Result<RecordingHandle, RecorderError> {
        let uri = self.fallback.start().await?;
        Ok(RecordingHandle::started(RecorderBackend::Fallback, uri, started_at))
    }

    /// Stops whatever is recording. Safe to call when nothing is: returns
    /// `Ok(None)` and changes nothing. The returned handle's file is
    /// finalized and readable.
    pub async fn stop(&self) -> Result<Option<RecordingHandle>, RecorderError> {
        let mut live = self.live.lock().await;
        match live.take() {
            Some(capture) => self.finalize(capture.handle).await.map(Some),
            None => {
                debug!("stop requested with no live capture");
                Ok(None)
            }
        }
    }

    /// Stops the capture only if `session` started it.
    pub async fn stop_for(
        &self,
        session: SessionId,
    ) -> Result<Option<RecordingHandle>, RecorderError> {
        let mut live = self.live.lock().await;
        if !matches!(live.as_ref(), Some(c) if c.owner == Some(session)) {
            return Ok(None);
        }
        match live.take() {
            Some(capture) => self.finalize(capture.handle).await.map(Some),
            None => Ok(None),
        }
    }

    /// Hands the session's audio to the dispatcher. A foreground capture
    /// must be stopped to produce a file, so it is finalized here; the
    /// native service keeps recording in the background and is finalized
    /// on cooldown or manual stop instead.
    pub async fn release_for_dispatch(
        &self,
        session: SessionId,
    ) -> Result<Option<RecordingHandle>, RecorderError> {
        let mut live = self.live.lock().await;
        let releasable = matches!(
            live.as_ref(),
            Some(c) if c.owner == Some(session) && c.handle.backend == RecorderBackend::Fallback
        );
        if !releasable {
            return Ok(None);
        }
        match live.take() {
            Some(capture) => self.finalize(capture.handle).await.map(Some),
            None => Ok(None),
        }
    }

    // The slot is already empty when this runs, so a failed unload leaves
    // no stale handle behind.
    async fn finalize(&self, mut handle: RecordingHandle) -> Result<RecordingHandle, RecorderError> {
        let backend = match handle.backend {
            RecorderBackend::Native => match &self.native {
                Some(native) => native,
                None => {
                    return Err(RecorderError::Unavailable {
                        backend: RecorderBackend::Native,
                    })
                }
            },
            RecorderBackend::Fallback => &self.fallback,
        };

        let uri = backend.stop_and_unload().await?;
        handle.uri = uri.or(handle.uri);
        handle.stopped_at = Some(UnixTimeMs::now());
        info!(
            backend = handle.backend.as_str(),
            duration_s = handle.duration_seconds(),
            has_file = handle.uri.is_some(),
            "recording stopped"
        );
        Ok(handle)
    }
}
