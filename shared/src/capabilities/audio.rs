use async_trait::async_trait;
use thiserror::Error;

use crate::error::{AppError, ErrorKind};
use crate::model::RecorderBackend;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecorderError {
    #[error("{backend:?} recorder is not available on this device")]
    Unavailable { backend: RecorderBackend },

    #[error("{backend:?} recorder failed to start: {message}")]
    StartFailed {
        backend: RecorderBackend,
        message: String,
    },

    #[error("{backend:?} recorder failed to stop: {message}")]
    StopFailed {
        backend: RecorderBackend,
        message: String,
    },

    #[error("no recorder backend could start")]
    NoBackend,
}

impl From<RecorderError> for AppError {
    fn from(e: RecorderError) -> Self {
        AppError::new(ErrorKind::Recorder, e.to_string())
    }
}

/// One way of capturing microphone audio.
///
/// `start` may return the output location up front (the native service
/// knows its file path); `stop_and_unload` returns the finalized file
/// location only once the file is fully written. After
/// `stop_and_unload` the capture session is gone and cannot be resumed.
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    fn kind(&self) -> RecorderBackend;

    /// Cheap availability probe, called once when the `Recorder` is built.
    fn is_available(&self) -> bool;

    async fn start(&self) -> Result<Option<String>, RecorderError>;

    async fn stop_and_unload(&self) -> Result<Option<String>, RecorderError>;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("failed to load '{uri}': {message}")]
    LoadFailed { uri: String, message: String },

    #[error("player error: {0}")]
    Player(String),
}

impl From<PlaybackError> for AppError {
    fn from(e: PlaybackError) -> Self {
        AppError::new(ErrorKind::Playback, e.to_string())
    }
}

/// Plays archived recordings. One sound is loaded at a time.
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    async fn play(&self, uri: &str) -> Result<(), PlaybackError>;

    /// Stops and unloads the current sound; a no-op when nothing is loaded.
    async fn stop_and_unload(&self) -> Result<(), PlaybackError>;
}

/// Reads a finished recording so it can be uploaded.
#[async_trait]
pub trait AudioFileReader: Send + Sync {
    async fn read(&self, uri: &str) -> std::io::Result<bytes::Bytes>;
}

/// Reads `file://` URIs and plain paths from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileReader;

#[async_trait]
impl AudioFileReader for LocalFileReader {
    async fn read(&self, uri: &str) -> std::io::Result<bytes::Bytes> {
        let path = uri.strip_prefix("file://").unwrap_or(uri);
        tokio::fs::read(path).await.map(bytes::Bytes::from)
    }
}
