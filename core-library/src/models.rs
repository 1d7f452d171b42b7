//! Domain models for the lecture catalog
//!
//! Episodes are immutable once fetched from a feed; a re-sync replaces a
//! show's episodes wholesale instead of patching them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::PathBuf;

/// A named collection of episodes sourced from one feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Show {
    pub id: String,
    pub title: String,
    pub author: Option<String>,
    pub description: String,
    pub image_url: Option<String>,
    pub feed_url: String,
}

impl Show {
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Show id cannot be empty".to_string());
        }
        if self.title.trim().is_empty() {
            return Err("Show title cannot be empty".to_string());
        }
        Ok(())
    }
}

/// A single playable lecture.
///
/// `id` is globally unique (typically the feed item GUID).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    pub show_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Remote audio source.
    pub audio_url: String,
    /// Duration in seconds as announced by the feed.
    #[serde(default)]
    pub duration_secs: u64,
    pub published_at: DateTime<Utc>,
    pub image_url: Option<String>,
    pub season: Option<u32>,
    pub episode_number: Option<u32>,
    /// Enclosure size in bytes, `0` when unknown.
    #[serde(default)]
    pub file_size: u64,
}

impl Episode {
    pub fn duration_ms(&self) -> u64 {
        self.duration_secs.saturating_mul(1000)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Episode id cannot be empty".to_string());
        }
        if self.show_id.trim().is_empty() {
            return Err(format!("Episode {} has no owning show", self.id));
        }
        if self.title.trim().is_empty() {
            return Err(format!("Episode {} title cannot be empty", self.id));
        }
        Ok(())
    }

    /// Series order: season, then episode number, then publish time.
    ///
    /// Missing season/number sort before present ones so feeds that only
    /// carry publish dates still order chronologically.
    pub fn series_cmp(&self, other: &Episode) -> Ordering {
        self.season
            .cmp(&other.season)
            .then(self.episode_number.cmp(&other.episode_number))
            .then(self.published_at.cmp(&other.published_at))
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// An episode whose audio has been fully written to local storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadedEpisode {
    pub episode: Episode,
    pub local_path: PathBuf,
    pub downloaded_at: DateTime<Utc>,
    /// Bytes on disk.
    pub file_size: u64,
}

impl DownloadedEpisode {
    pub fn id(&self) -> &str {
        &self.episode.id
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_series_order_prefers_season_and_number() {
        let mut a = episode("a", "s", 5);
        let mut b = episode("b", "s", 1);
        a.season = Some(1);
        a.episode_number = Some(1);
        b.season = Some(1);
        b.episode_number = Some(2);

        // b was published earlier but is numbered later
        assert_eq!(a.series_cmp(&b), Ordering::Less);
    }

    #[test]
    fn test_series_order_falls_back_to_publish_time() {
        let a = episode("a", "s", 1);
        let b = episode("b", "s", 2);
        assert_eq!(a.series_cmp(&b), Ordering::Less);
        assert_eq!(b.series_cmp(&a), Ordering::Greater);
    }

    #[test]
    fn test_episode_validation() {
        let mut ep = episode("e1", "s", 1);
        assert!(ep.validate().is_ok());
        ep.show_id = " ".to_string();
        assert!(ep.validate().is_err());
        assert!(show("s").validate().is_ok());
    }

    #[test]
    fn test_downloaded_episode_round_trips_timestamps() {
        let downloaded = DownloadedEpisode {
            episode: episode("e1", "s", 3),
            local_path: PathBuf::from("/downloads/e1.mp3"),
            downloaded_at: Utc::now(),
            file_size: 1024,
        };
        let json = serde_json::to_string(&downloaded).unwrap();
        let restored: DownloadedEpisode = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, downloaded);
        assert_eq!(restored.id(), "e1");
    }
}
