//! Download queue state
//!
//! ```text
//! queued ──pump──▶ downloading ──▶ completed
//!    │                  │
//!    └──cancel──────────┴──cancel / failure──▶ cancelled / failed
//! ```
//!
//! Only `downloads` and `download_queue` are durable. In-flight records live
//! in `active_downloads` and always start empty: no transfer survives a
//! process restart. A failed or cancelled attempt leaves `active_downloads`
//! and is recorded in `outcomes` by the same update.

use bridge_traits::storage::{load_json, save_json, SettingsStore};
use chrono::{DateTime, Utc};
use core_library::DownloadedEpisode;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Settings key of the serialized download state.
pub const DOWNLOADS_KEY: &str = "lectern.downloads";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Queued,
    Downloading,
    /// Every byte written; about to move to `downloads`.
    Completed,
    Failed,
    Cancelled,
}

impl DownloadStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// In-flight transfer record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadProgress {
    pub episode_id: String,
    pub status: DownloadStatus,
    pub bytes_written: u64,
    /// `0` while the size is unknown.
    pub total_bytes: u64,
    pub percent: u8,
    pub started_at: DateTime<Utc>,
}

impl DownloadProgress {
    pub fn started(episode_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            episode_id: episode_id.into(),
            status: DownloadStatus::Downloading,
            bytes_written: 0,
            total_bytes: 0,
            percent: 0,
            started_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadState {
    /// Completed downloads by episode id.
    pub downloads: HashMap<String, DownloadedEpisode>,
    /// In-flight transfers by episode id. Never persisted.
    pub active_downloads: HashMap<String, DownloadProgress>,
    /// Pending episode ids in FIFO order.
    pub download_queue: Vec<String>,
    /// Status of the last failed or cancelled attempt by episode id.
    /// Cleared when the episode is queued or started again. Never persisted.
    pub outcomes: HashMap<String, DownloadStatus>,
}

impl DownloadState {
    pub fn is_downloaded(&self, episode_id: &str) -> bool {
        self.downloads.contains_key(episode_id)
    }

    pub fn is_active(&self, episode_id: &str) -> bool {
        self.active_downloads.contains_key(episode_id)
    }

    pub fn is_queued(&self, episode_id: &str) -> bool {
        self.download_queue.iter().any(|id| id == episode_id)
    }

    /// Where `episode_id` stands, or `None` when it was never touched.
    pub fn status_of(&self, episode_id: &str) -> Option<DownloadStatus> {
        if self.is_downloaded(episode_id) {
            return Some(DownloadStatus::Completed);
        }
        if let Some(progress) = self.active_downloads.get(episode_id) {
            return Some(progress.status);
        }
        if self.is_queued(episode_id) {
            return Some(DownloadStatus::Queued);
        }
        self.outcomes.get(episode_id).copied()
    }

    pub fn total_size(&self) -> u64 {
        self.downloads.values().map(|d| d.file_size).sum()
    }

    pub fn durable(&self) -> DurableDownloadState {
        DurableDownloadState {
            downloads: self.downloads.clone(),
            download_queue: self.download_queue.clone(),
        }
    }
}

/// The persisted half of [`DownloadState`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DurableDownloadState {
    #[serde(default)]
    pub downloads: HashMap<String, DownloadedEpisode>,
    #[serde(default)]
    pub download_queue: Vec<String>,
}

impl From<DurableDownloadState> for DownloadState {
    fn from(durable: DurableDownloadState) -> Self {
        let downloads = durable.downloads;
        let mut seen = HashSet::new();
        let download_queue = durable
            .download_queue
            .into_iter()
            .filter(|id| !downloads.contains_key(id) && seen.insert(id.clone()))
            .collect();

        Self {
            downloads,
            active_downloads: HashMap::new(),
            download_queue,
            outcomes: HashMap::new(),
        }
    }
}

/// Rehydrate download state. Missing or corrupt blobs yield an empty state.
pub async fn load_download_state(store: &dyn SettingsStore) -> DownloadState {
    match load_json::<DurableDownloadState>(store, DOWNLOADS_KEY).await {
        Ok(Some(durable)) => {
            let state = DownloadState::from(durable);
            debug!(
                downloads = state.downloads.len(),
                queued = state.download_queue.len(),
                "Rehydrated download state"
            );
            state
        }
        Ok(None) => DownloadState::default(),
        Err(e) => {
            warn!(error = %e, "Discarding unreadable download state");
            DownloadState::default()
        }
    }
}

pub async fn save_download_state(
    store: &dyn SettingsStore,
    state: &DownloadState,
) -> bridge_traits::error::Result<()> {
    save_json(store, DOWNLOADS_KEY, &state.durable()).await
}
