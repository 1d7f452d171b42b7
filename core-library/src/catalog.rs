//! Read-side catalog contracts
//!
//! The playback and download layers never refresh feeds themselves; they
//! read an already-populated [`FeedCatalog`].

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::models::{Episode, Show};

/// Lookup surface over the synced show/episode dataset.
pub trait FeedCatalog: Send + Sync {
    fn episode_by_id(&self, id: &str) -> Option<Episode>;

    /// Episodes of a show in ascending series order.
    fn episodes_by_show_id(&self, show_id: &str) -> Vec<Episode>;

    fn show_by_id(&self, id: &str) -> Option<Show>;
}

/// Answers "is this episode available locally, and where".
///
/// Always re-queried at playback time; queue and history entries never
/// cache a downloaded flag.
pub trait DownloadIndex: Send + Sync {
    fn local_path(&self, episode_id: &str) -> Option<PathBuf>;
}

#[derive(Default)]
struct CatalogInner {
    shows: HashMap<String, Show>,
    /// Per-show episodes, kept in series order.
    episodes_by_show: HashMap<String, Vec<Episode>>,
    /// Episode id to owning show id.
    episode_index: HashMap<String, String>,
}

/// In-memory [`FeedCatalog`] populated by the feed sync.
#[derive(Default)]
pub struct EpisodeCatalog {
    inner: RwLock<CatalogInner>,
}

impl EpisodeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Supersede a show and all its episodes.
    ///
    /// Episodes failing validation or belonging to another show are dropped.
    pub fn replace_show(&self, show: Show, episodes: Vec<Episode>) {
        let mut episodes: Vec<Episode> = episodes
            .into_iter()
            .filter(|ep| {
                if ep.show_id != show.id {
                    warn!(episode_id = %ep.id, show_id = %show.id, "Episode belongs to another show");
                    return false;
                }
                match ep.validate() {
                    Ok(()) => true,
                    Err(reason) => {
                        warn!(episode_id = %ep.id, %reason, "Dropping invalid episode");
                        false
                    }
                }
            })
            .collect();
        episodes.sort_by(|a, b| a.series_cmp(b));
        episodes.dedup_by(|a, b| a.id == b.id);

        let mut inner = self.inner.write();
        if let Some(previous) = inner.episodes_by_show.remove(&show.id) {
            for ep in previous {
                inner.episode_index.remove(&ep.id);
            }
        }
        for ep in &episodes {
            inner.episode_index.insert(ep.id.clone(), show.id.clone());
        }

        debug!(show_id = %show.id, episodes = episodes.len(), "Replaced show");
        inner.episodes_by_show.insert(show.id.clone(), episodes);
        inner.shows.insert(show.id.clone(), show);
    }

    pub fn remove_show(&self, show_id: &str) -> bool {
        let mut inner = self.inner.write();
        if let Some(episodes) = inner.episodes_by_show.remove(show_id) {
            for ep in episodes {
                inner.episode_index.remove(&ep.id);
            }
        }
        inner.shows.remove(show_id).is_some()
    }

    /// All shows, sorted by title.
    pub fn shows(&self) -> Vec<Show> {
        let mut shows: Vec<Show> = self.inner.read().shows.values().cloned().collect();
        shows.sort_by(|a, b| a.title.cmp(&b.title));
        shows
    }

    pub fn episode_count(&self) -> usize {
        self.inner.read().episode_index.len()
    }
}

impl FeedCatalog for EpisodeCatalog {
    fn episode_by_id(&self, id: &str) -> Option<Episode> {
        let inner = self.inner.read();
        let show_id = inner.episode_index.get(id)?;
        inner
            .episodes_by_show
            .get(show_id)?
            .iter()
            .find(|ep| ep.id == id)
            .cloned()
    }

    fn episodes_by_show_id(&self, show_id: &str) -> Vec<Episode> {
        self.inner
            .read()
            .episodes_by_show
            .get(show_id)
            .cloned()
            .unwrap_or_default()
    }

    fn show_by_id(&self, id: &str) -> Option<Show> {
        self.inner.read().shows.get(id).cloned()
    }
}
