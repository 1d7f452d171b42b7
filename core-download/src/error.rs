//! # Download Error Types

use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DownloadError {
    /// The executor failed to move the bytes (network, disk full...).
    #[error("Transfer failed for {episode_id}: {source}")]
    Transfer {
        episode_id: String,
        #[source]
        source: BridgeError,
    },

    #[error("Download cancelled: {0}")]
    Cancelled(String),

    #[error("Download already in progress: {0}")]
    InProgress(String),

    #[error("Episode not found: {0}")]
    EpisodeNotFound(String),

    #[error("Episode {0} has no audio URL")]
    NoSourceUrl(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DownloadError {
    /// Map an executor error, keeping cooperative cancellation distinct.
    pub(crate) fn from_transfer(episode_id: &str, source: BridgeError) -> Self {
        if source.is_cancelled() {
            DownloadError::Cancelled(episode_id.to_string())
        } else {
            DownloadError::Transfer {
                episode_id: episode_id.to_string(),
                source,
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DownloadError::Cancelled(_))
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;
