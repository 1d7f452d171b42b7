//! Playback session slice
//!
//! [`PlayerState`] is what the UI renders. It splits into a durable half
//! ([`DurablePlayerState`], written to the settings store) and a volatile
//! half ([`SessionFlags`] and [`PlaybackStatus`]) that always starts from
//! defaults, so a restarted process never claims to be mid-playback.

use bridge_traits::storage::{load_json, save_json, SettingsStore};
use chrono::{DateTime, Utc};
use core_library::Episode;
use core_runtime::config::is_valid_speed;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Maximum number of entries kept in the play history.
pub const HISTORY_LIMIT: usize = 20;

/// Settings key of the serialized durable half.
pub const PLAYER_STATE_KEY: &str = "lectern.player";

/// Session lifecycle as presented to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Stopped,
    Error,
}

/// Volatile flags, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionFlags {
    pub is_playing: bool,
    pub is_loading: bool,
    pub is_buffering: bool,
    /// Set when a play command is issued and cleared once the engine reports
    /// a settled state. Lets the UI show "playing" across the load gap.
    pub is_play_requested: bool,
}

impl SessionFlags {
    /// Whether the UI should render the session as playing.
    pub fn appears_playing(&self) -> bool {
        self.is_playing || self.is_play_requested
    }
}

/// An upcoming episode and when it was queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub episode: Episode,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub current_episode: Option<Episode>,
    /// Upcoming episodes in play order. Never contains the current episode
    /// nor duplicate ids.
    pub queue: Vec<QueueItem>,
    /// Previously-current episodes, most recent first.
    pub history: Vec<Episode>,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub playback_speed: f32,
    pub status: PlaybackStatus,
    pub flags: SessionFlags,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            current_episode: None,
            queue: Vec::new(),
            history: Vec::new(),
            position_ms: 0,
            duration_ms: 0,
            playback_speed: 1.0,
            status: PlaybackStatus::Idle,
            flags: SessionFlags::default(),
        }
    }
}

impl PlayerState {
    pub fn current_id(&self) -> Option<&str> {
        self.current_episode.as_ref().map(|e| e.id.as_str())
    }

    pub fn is_current(&self, episode_id: &str) -> bool {
        self.current_id() == Some(episode_id)
    }

    pub fn queue_contains(&self, episode_id: &str) -> bool {
        self.queue.iter().any(|item| item.episode.id == episode_id)
    }

    /// Push `episode` to the front of history, moving an existing entry
    /// rather than duplicating it.
    pub(crate) fn push_history(&mut self, episode: Episode) {
        self.history.retain(|e| e.id != episode.id);
        self.history.insert(0, episode);
        self.history.truncate(HISTORY_LIMIT);
    }

    pub(crate) fn remove_from_queue(&mut self, episode_id: &str) {
        self.queue.retain(|item| item.episode.id != episode_id);
    }

    pub(crate) fn reset_timings(&mut self) {
        self.position_ms = 0;
        self.duration_ms = 0;
    }

    pub fn durable(&self) -> DurablePlayerState {
        DurablePlayerState {
            current_episode: self.current_episode.clone(),
            queue: self.queue.clone(),
            history: self.history.clone(),
            position_ms: self.position_ms,
            duration_ms: self.duration_ms,
            playback_speed: self.playback_speed,
        }
    }
}

/// The persisted half of [`PlayerState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurablePlayerState {
    pub current_episode: Option<Episode>,
    #[serde(default)]
    pub queue: Vec<QueueItem>,
    #[serde(default)]
    pub history: Vec<Episode>,
    #[serde(default)]
    pub position_ms: u64,
    #[serde(default)]
    pub duration_ms: u64,
    pub playback_speed: f32,
}

impl From<DurablePlayerState> for PlayerState {
    fn from(durable: DurablePlayerState) -> Self {
        let mut state = PlayerState {
            current_episode: durable.current_episode,
            queue: durable.queue,
            history: durable.history,
            position_ms: durable.position_ms,
            duration_ms: durable.duration_ms,
            playback_speed: if is_valid_speed(durable.playback_speed) {
                durable.playback_speed
            } else {
                1.0
            },
            ..PlayerState::default()
        };

        // Re-establish invariants a hand-edited or older blob may violate.
        if let Some(current) = state.current_episode.clone() {
            state.remove_from_queue(&current.id);
        }
        let mut seen = std::collections::HashSet::new();
        state.queue.retain(|item| seen.insert(item.episode.id.clone()));
        state.history.truncate(HISTORY_LIMIT);
        state
    }
}

/// Rehydrate the session slice. Missing or corrupt blobs yield defaults
/// with `default_speed`.
pub async fn load_player_state(store: &dyn SettingsStore, default_speed: f32) -> PlayerState {
    match load_json::<DurablePlayerState>(store, PLAYER_STATE_KEY).await {
        Ok(Some(durable)) => {
            let state = PlayerState::from(durable);
            debug!(
                current = ?state.current_id(),
                queue = state.queue.len(),
                history = state.history.len(),
                "Rehydrated player state"
            );
            state
        }
        Ok(None) => PlayerState {
            playback_speed: default_speed,
            ..PlayerState::default()
        },
        Err(e) => {
            warn!(error = %e, "Discarding unreadable player state");
            PlayerState {
                playback_speed: default_speed,
                ..PlayerState::default()
            }
        }
    }
}

pub async fn save_player_state(
    store: &dyn SettingsStore,
    state: &PlayerState,
) -> bridge_traits::error::Result<()> {
    save_json(store, PLAYER_STATE_KEY, &state.durable()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn episode(id: &str) -> Episode {
        Episode {
            id: id.to_string(),
            show_id: "show".to_string(),
            title: id.to_string(),
            description: String::new(),
            audio_url: format!("https://cdn.example.com/{}.mp3", id),
            duration_secs: 600,
            published_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            image_url: None,
            season: None,
            episode_number: None,
            file_size: 0,
        }
    }

    #[test]
    fn test_history_dedups_and_caps() {
        let mut state = PlayerState::default();
        for i in 0..25 {
            state.push_history(episode(&format!("ep-{}", i)));
        }
        assert_eq!(state.history.len(), HISTORY_LIMIT);
        assert_eq!(state.history[0].id, "ep-24");

        state.push_history(episode("ep-10"));
        assert_eq!(state.history[0].id, "ep-10");
        assert_eq!(state.history.iter().filter(|e| e.id == "ep-10").count(), 1);
    }

    #[test]
    fn test_rehydration_resets_volatile_flags() {
        let mut state = PlayerState {
            current_episode: Some(episode("ep-1")),
            position_ms: 42_000,
            playback_speed: 1.5,
            status: PlaybackStatus::Playing,
            ..PlayerState::default()
        };
        state.flags = SessionFlags {
            is_playing: true,
            is_loading: true,
            is_buffering: true,
            is_play_requested: true,
        };

        let json = serde_json::to_string(&state.durable()).unwrap();
        let durable: DurablePlayerState = serde_json::from_str(&json).unwrap();
        let restored = PlayerState::from(durable);

        assert_eq!(restored.flags, SessionFlags::default());
        assert_eq!(restored.status, PlaybackStatus::Idle);
        assert_eq!(restored.position_ms, 42_000);
        assert_eq!(restored.playback_speed, 1.5);
        assert!(restored.is_current("ep-1"));
    }

    #[test]
    fn test_rehydration_repairs_queue_invariants() {
        let added_at = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let item = |id: &str| QueueItem {
            episode: episode(id),
            added_at,
        };
        let durable = DurablePlayerState {
            current_episode: Some(episode("ep-1")),
            queue: vec![item("ep-1"), item("ep-2"), item("ep-2"), item("ep-3")],
            history: Vec::new(),
            position_ms: 0,
            duration_ms: 0,
            playback_speed: 9.0,
        };

        let state = PlayerState::from(durable);
        let ids: Vec<&str> = state.queue.iter().map(|i| i.episode.id.as_str()).collect();
        assert_eq!(ids, vec!["ep-2", "ep-3"]);
        assert_eq!(state.playback_speed, 1.0);
    }
}
