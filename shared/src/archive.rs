use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::capabilities::audio::{AudioPlayer, PlaybackError};
use crate::capabilities::kv::{KeyNamespace, KeyValueStore, KvError, KvKey, TypedKvStore};
use crate::error::{AppError, ErrorKind};
use crate::model::AudioArchiveEntry;

pub const ARCHIVE_KEY: &str = "sos_recordings";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ArchiveError {
    #[error("archive storage failed: {0}")]
    Storage(#[from] KvError),

    #[error("playback failed: {0}")]
    Playback(#[from] PlaybackError),

    #[error("no recording at index {index} (archive holds {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

impl From<ArchiveError> for AppError {
    fn from(e: ArchiveError) -> Self {
        match e {
            ArchiveError::Storage(kv) => kv.into(),
            ArchiveError::Playback(p) => p.into(),
            ArchiveError::IndexOutOfRange { .. } => AppError::new(ErrorKind::NotFound, e.to_string()),
        }
    }
}

/// Persisted list of finished SOS recordings plus the one playback slot.
///
/// Mutations change memory first, then persist; a failed write is rolled
/// back so memory and storage never disagree.
pub struct AudioArchive {
    store: TypedKvStore<Vec<AudioArchiveEntry>>,
    player: Arc<dyn AudioPlayer>,
    entries: Vec<AudioArchiveEntry>,
    playing: Option<usize>,
}

impl AudioArchive {
    /// Loads the stored list. A corrupt list is logged and treated as empty.
    pub async fn load(
        store: Arc<dyn KeyValueStore>,
        player: Arc<dyn AudioPlayer>,
    ) -> Result<Self, ArchiveError> {
        let key = KvKey::new(KeyNamespace::UserData, ARCHIVE_KEY)?;
        let store = TypedKvStore::new(store, key);

        let entries = match store.load().await {
            Ok(entries) => entries.unwrap_or_default(),
            Err(KvError::Serialization { message, .. }) => {
                error!(error = %message, "stored recordings list is unreadable, starting empty");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };
        info!(count = entries.len(), "audio archive loaded");

        Ok(Self {
            store,
            player,
            entries,
            playing: None,
        })
    }

    #[must_use]
    pub fn entries(&self) -> &[AudioArchiveEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the entry currently loaded in the player.
    #[must_use]
    pub fn playing(&self) -> Option<usize> {
        self.playing
    }

    #[instrument(skip_all, fields(duration_s = entry.duration_seconds))]
    pub async fn record(&mut self, entry: AudioArchiveEntry) -> Result<(), ArchiveError> {
        self.entries.push(entry);
        if let Err(e) = self.store.save(&self.entries).await {
            self.entries.pop();
            error!(error = %e, "failed to persist recording, rolled back");
            return Err(e.into());
        }
        info!(count = self.entries.len(), "recording archived");
        Ok(())
    }

    /// Plays entry `index`, unloading whatever was playing first.
    pub async fn play(&mut self, index: usize) -> Result<(), ArchiveError> {
        let uri = self.entry(index)?.file_path.clone();
        self.unload_current().await;
        self.player.play(&uri).await?;
        self.playing = Some(index);
        Ok(())
    }

    pub async fn stop_playback(&mut self) -> Result<(), ArchiveError> {
        if self.playing.is_none() {
            return Ok(());
        }
        self.playing = None;
        self.player.stop_and_unload().await?;
        Ok(())
    }

    /// The player reached the end of the sound on its own.
    pub fn playback_finished(&mut self) {
        self.playing = None;
    }

    /// Removes entry `index`. If it is the one playing, playback is stopped
    /// and unloaded before the list is rewritten.
    #[instrument(skip(self))]
    pub async fn delete(&mut self, index: usize) -> Result<AudioArchiveEntry, ArchiveError> {
        self.entry(index)?;

        if self.playing == Some(index) {
            self.unload_current().await;
        }

        let removed = self.entries.remove(index);
        if let Err(e) = self.store.save(&self.entries).await {
            self.entries.insert(index, removed);
            error!(error = %e, "failed to persist deletion, rolled back");
            return Err(e.into());
        }

        if let Some(playing) = self.playing {
            if playing > index {
                self.playing = Some(playing - 1);
            }
        }
        info!(count = self.entries.len(), "recording deleted");
        Ok(removed)
    }

    fn entry(&self, index: usize) -> Result<&AudioArchiveEntry, ArchiveError> {
        self.entries.get(index).ok_or(ArchiveError::IndexOutOfRange {
            index,
            len: self.entries.len(),
        })
    }

    async fn unload_current(&mut self) {
        if self.playing.take().is_some() {
            if let Err(e) = self.player.stop_and_unload().await {
                warn!(error = %e, "failed to unload current sound");
            }
        }
    }
}
