//! # Playback Error Types
//!
//! Error types for the playback session, queue and position ledgers.

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Errors that can occur during playback operations.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Engine Errors
    // ========================================================================
    /// The audio engine rejected a command (load, play, seek...).
    #[error("Audio engine error: {0}")]
    Engine(#[from] BridgeError),

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// Attempted operation when no episode is current.
    #[error("No episode loaded")]
    NoEpisodeLoaded,

    /// Playback rate outside the supported range.
    #[error("Invalid playback speed: {0} (must be between 0.25 and 2.0)")]
    InvalidSpeed(f32),

    /// Episode could not be resolved through the catalog.
    #[error("Episode not found: {0}")]
    EpisodeNotFound(String),

    // ========================================================================
    // Persistence Errors
    // ========================================================================
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PlaybackError {
    /// Returns `true` if the failure came from the audio engine and the user
    /// can simply retry.
    pub fn is_engine_error(&self) -> bool {
        matches!(self, PlaybackError::Engine(_))
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
