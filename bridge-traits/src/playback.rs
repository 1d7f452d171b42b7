//! Audio engine bridge and supporting playback types.
//!
//! The host owns the actual audio engine (AVPlayer, ExoPlayer, a desktop
//! mixer). The core drives it through [`AudioEngine`] and learns about
//! engine-originated transitions (track end, lock-screen buttons, errors)
//! through the typed [`EngineEvent`] stream.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;

/// Where the engine should read audio from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackSource {
    /// Downloaded file on local storage.
    LocalFile { path: PathBuf },
    /// Remote HTTP(S) stream.
    RemoteStream { url: String },
}

impl PlaybackSource {
    /// Determine whether the source represents remote content.
    pub fn is_remote(&self) -> bool {
        matches!(self, PlaybackSource::RemoteStream { .. })
    }
}

/// Display metadata forwarded to the platform media session / lock screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackMetadata {
    pub episode_id: String,
    pub title: String,
    pub artist: Option<String>,
    pub artwork_url: Option<String>,
    pub duration_ms: Option<u64>,
}

/// Request to load a track into the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub source: PlaybackSource,
    /// Offset to start from, in milliseconds.
    pub start_position_ms: u64,
    /// Playback rate, `1.0` is normal speed.
    pub speed: f32,
    /// Begin playing as soon as the track is ready.
    pub autoplay: bool,
    pub metadata: TrackMetadata,
}

/// Engine lifecycle state as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    /// Nothing loaded.
    None,
    Loading,
    Buffering,
    /// Loaded and ready but not playing yet.
    Ready,
    Playing,
    Paused,
    Stopped,
    Ended,
    Error,
}

impl EngineState {
    /// Returns `true` when a track is loaded and can be resumed cheaply.
    pub fn has_track_loaded(&self) -> bool {
        matches!(
            self,
            EngineState::Ready
                | EngineState::Playing
                | EngineState::Paused
                | EngineState::Buffering
                | EngineState::Loading
        )
    }
}

/// Position and duration snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineTimings {
    pub position_ms: u64,
    pub duration_ms: u64,
}

/// Events originated by the engine or by platform remote controls.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    StateChanged(EngineState),
    /// Periodic progress, throttled by the engine itself (~500ms).
    Progress { position_ms: u64, duration_ms: u64 },
    /// The loaded track played to its end.
    TrackEnded { episode_id: Option<String> },
    PlaybackError { message: String },
    /// Hardware / lock-screen "next".
    RemoteNext,
    /// Hardware / lock-screen "previous".
    RemotePrevious,
}

/// Trait for platform audio engines.
///
/// Every command is a round-trip to the engine and may fail; failures are
/// surfaced to the caller. The event stream returned by [`AudioEngine::events`]
/// is consumed by exactly one listener for the lifetime of the app.
#[async_trait::async_trait]
pub trait AudioEngine: Send + Sync {
    /// Load a track, replacing whatever was loaded before.
    async fn load(&self, request: LoadRequest) -> Result<()>;

    /// Begin playback of the loaded track.
    async fn play(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    /// Continue after a pause without reloading.
    async fn resume(&self) -> Result<()>;

    /// Stop playback and unload the track.
    async fn stop(&self) -> Result<()>;

    async fn seek_to(&self, position_ms: u64) -> Result<()>;

    async fn seek_forward(&self, offset_ms: u64) -> Result<()>;

    async fn seek_backward(&self, offset_ms: u64) -> Result<()>;

    async fn set_speed(&self, rate: f32) -> Result<()>;

    async fn state(&self) -> Result<EngineState>;

    async fn timings(&self) -> Result<EngineTimings>;

    /// Subscribe to engine events.
    fn events(&self) -> broadcast::Receiver<EngineEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loaded_states() {
        assert!(EngineState::Paused.has_track_loaded());
        assert!(EngineState::Ready.has_track_loaded());
        assert!(!EngineState::None.has_track_loaded());
        assert!(!EngineState::Stopped.has_track_loaded());
        assert!(!EngineState::Error.has_track_loaded());
    }

    #[test]
    fn remote_source_detection() {
        let remote = PlaybackSource::RemoteStream {
            url: "https://example.com/a.mp3".to_string(),
        };
        let local = PlaybackSource::LocalFile {
            path: PathBuf::from("/tmp/a.mp3"),
        };
        assert!(remote.is_remote());
        assert!(!local.is_remote());
    }
}
