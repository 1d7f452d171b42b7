//! Queue/History Ledger
//!
//! Owns the current episode, the upcoming queue and the play history, and
//! derives every next/previous transition from them. Each operation is a
//! single whole-slice update on the shared [`StateStore`], followed by
//! best-effort persistence of the durable half.
//!
//! Two "previous" strategies coexist:
//! - [`QueueLedger::play_previous`]: pop the history back-stack
//! - [`QueueLedger::play_previous_in_series`]: the episode preceding the
//!   current one in its show, independent of what was actually played

use bridge_traits::storage::SettingsStore;
use bridge_traits::time::Clock;
use core_library::{Episode, FeedCatalog};
use core_runtime::events::{CoreEvent, EventBus, QueueEvent};
use core_runtime::StateStore;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, instrument, warn};

use crate::position::PositionLedger;
use crate::state::{save_player_state, PlayerState, QueueItem};

/// Episode that stopped being current and how far it got.
struct Outgoing {
    episode_id: String,
    position_ms: u64,
}

pub struct QueueLedger {
    state: Arc<StateStore<PlayerState>>,
    positions: Arc<PositionLedger>,
    catalog: Arc<dyn FeedCatalog>,
    store: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    event_bus: Option<Arc<EventBus>>,
    write_lock: AsyncMutex<()>,
}

impl QueueLedger {
    pub fn new(
        state: Arc<StateStore<PlayerState>>,
        positions: Arc<PositionLedger>,
        catalog: Arc<dyn FeedCatalog>,
        store: Arc<dyn SettingsStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state,
            positions,
            catalog,
            store,
            clock,
            event_bus: None,
            write_lock: AsyncMutex::new(()),
        }
    }

    /// Set event bus for queue notifications.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn state(&self) -> &Arc<StateStore<PlayerState>> {
        &self.state
    }

    pub fn positions(&self) -> &Arc<PositionLedger> {
        &self.positions
    }

    pub fn catalog(&self) -> &Arc<dyn FeedCatalog> {
        &self.catalog
    }

    pub fn snapshot(&self) -> PlayerState {
        self.state.get()
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Make `episode` current.
    ///
    /// The outgoing episode's progress is saved and it moves to the front of
    /// history. Position and duration reset.
    #[instrument(skip(self, episode), fields(episode_id = %episode.id))]
    pub async fn set_current(&self, episode: Episode) {
        let new_id = episode.id.clone();
        let outgoing = self.state.update(|s| make_current(s, episode));
        self.finish_transition(outgoing, Some(new_id)).await;
    }

    /// Append `episode` unless it is current or already queued.
    ///
    /// Returns `true` if the queue changed.
    pub async fn enqueue(&self, episode: Episode) -> bool {
        let added_at = self.clock.now();
        let added = self.state.update(|s| {
            if s.is_current(&episode.id) || s.queue_contains(&episode.id) {
                return false;
            }
            s.queue.push(QueueItem { episode, added_at });
            true
        });

        if added {
            self.queue_changed().await;
        }
        added
    }

    /// Replace the queue wholesale, dropping the current episode and
    /// duplicate ids.
    pub async fn set_queue(&self, episodes: Vec<Episode>) {
        let added_at = self.clock.now();
        self.state.update(|s| {
            let current = s.current_id().map(str::to_string);
            let mut queue: Vec<QueueItem> = Vec::with_capacity(episodes.len());
            for episode in episodes {
                if current.as_deref() == Some(episode.id.as_str())
                    || queue.iter().any(|item| item.episode.id == episode.id)
                {
                    continue;
                }
                queue.push(QueueItem { episode, added_at });
            }
            s.queue = queue;
        });
        self.queue_changed().await;
    }

    pub async fn remove_from_queue(&self, episode_id: &str) -> bool {
        let removed = self.state.update(|s| {
            let before = s.queue.len();
            s.remove_from_queue(episode_id);
            s.queue.len() != before
        });
        if removed {
            self.queue_changed().await;
        }
        removed
    }

    pub async fn clear_queue(&self) {
        self.state.update(|s| s.queue.clear());
        self.queue_changed().await;
    }

    /// Advance to the queue head. `None` (and no change) when the queue is
    /// empty.
    #[instrument(skip(self))]
    pub async fn play_next(&self) -> Option<Episode> {
        let transition = self.state.update(|s| {
            if s.queue.is_empty() {
                return None;
            }
            let outgoing = take_outgoing(s);
            let next = s.queue.remove(0).episode;
            if let Some(previous) = s.current_episode.take() {
                s.push_history(previous);
            }
            s.current_episode = Some(next.clone());
            s.reset_timings();
            Some((outgoing, next))
        });

        let (outgoing, next) = transition?;
        debug!(episode_id = %next.id, "Advanced to next episode");
        self.finish_transition(outgoing, Some(next.id.clone())).await;
        Some(next)
    }

    /// Pop the history back-stack. The outgoing episode goes to the front of
    /// the queue so it plays next.
    #[instrument(skip(self))]
    pub async fn play_previous(&self) -> Option<Episode> {
        let added_at = self.clock.now();
        let transition = self.state.update(|s| {
            if s.history.is_empty() {
                return None;
            }
            let outgoing = take_outgoing(s);
            let previous = s.history.remove(0);
            if let Some(current) = s.current_episode.take() {
                s.remove_from_queue(&current.id);
                s.queue.insert(
                    0,
                    QueueItem {
                        episode: current,
                        added_at,
                    },
                );
            }
            s.remove_from_queue(&previous.id);
            s.current_episode = Some(previous.clone());
            s.reset_timings();
            Some((outgoing, previous))
        });

        let (outgoing, previous) = transition?;
        debug!(episode_id = %previous.id, "Returned to previous episode from history");
        self.finish_transition(outgoing, Some(previous.id.clone())).await;
        Some(previous)
    }

    /// Move to the episode preceding the current one in its show and rebuild
    /// the queue to the rest of the show from there.
    #[instrument(skip(self))]
    pub async fn play_previous_in_series(&self) -> Option<Episode> {
        let (episodes, index) = self.locate_in_series()?;
        if index == 0 {
            return None;
        }
        let target = episodes[index - 1].clone();
        self.jump_within_series(target.clone(), episodes[index..].to_vec())
            .await;
        Some(target)
    }

    /// Move to the episode following the current one in its show and rebuild
    /// the queue to the rest of the show after it.
    #[instrument(skip(self))]
    pub async fn next_in_series(&self) -> Option<Episode> {
        let (episodes, index) = self.locate_in_series()?;
        let target = episodes.get(index + 1)?.clone();
        self.jump_within_series(target.clone(), episodes[index + 2..].to_vec())
            .await;
        Some(target)
    }

    /// Move the queue item at `from` to `to`. No-op when equal or out of
    /// bounds.
    pub async fn reorder_queue(&self, from: usize, to: usize) -> bool {
        let moved = self.state.update(|s| {
            let len = s.queue.len();
            if from == to || from >= len || to >= len {
                return false;
            }
            let item = s.queue.remove(from);
            s.queue.insert(to, item);
            true
        });
        if moved {
            self.queue_changed().await;
        }
        moved
    }

    /// Episodes after `episode` in its show, in series order.
    ///
    /// `None` when the catalog does not list `episode` under its show; an
    /// empty list when it is the last one.
    pub fn rest_of_show(&self, episode: &Episode) -> Option<Vec<Episode>> {
        let episodes = self.catalog.episodes_by_show_id(&episode.show_id);
        let index = episodes.iter().position(|e| e.id == episode.id)?;
        Some(episodes[index + 1..].to_vec())
    }

    /// Write the durable half of the slice. Failures are logged.
    pub async fn persist(&self) {
        let _guard = self.write_lock.lock().await;
        let snapshot = self.state.get();
        if let Err(e) = save_player_state(self.store.as_ref(), &snapshot).await {
            warn!(error = %e, "Failed to persist player state");
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn jump_within_series(&self, target: Episode, rest: Vec<Episode>) {
        let target_id = target.id.clone();
        let added_at = self.clock.now();
        let outgoing = self.state.update(|s| {
            let outgoing = make_current(s, target);
            s.queue = rest
                .into_iter()
                .filter(|e| e.id != target_id)
                .map(|episode| QueueItem { episode, added_at })
                .collect();
            outgoing
        });
        debug!(episode_id = %target_id, "Moved within series");
        self.finish_transition(outgoing, Some(target_id)).await;
    }

    fn locate_in_series(&self) -> Option<(Vec<Episode>, usize)> {
        let current = self.state.read(|s| s.current_episode.clone())?;
        let episodes = self.catalog.episodes_by_show_id(&current.show_id);
        let index = episodes.iter().position(|e| e.id == current.id);
        if index.is_none() {
            warn!(episode_id = %current.id, "Current episode missing from its show");
        }
        Some((episodes, index?))
    }

    async fn finish_transition(&self, outgoing: Option<Outgoing>, current_id: Option<String>) {
        let previous_id = outgoing.as_ref().map(|o| o.episode_id.clone());
        if let Some(outgoing) = outgoing {
            if outgoing.position_ms > 0 {
                self.positions
                    .save_position(&outgoing.episode_id, outgoing.position_ms)
                    .await;
            }
        }

        self.persist().await;
        self.emit(QueueEvent::CurrentChanged {
            previous_id,
            current_id,
        });
        self.emit(QueueEvent::QueueChanged {
            length: self.state.read(|s| s.queue.len()),
        });
    }

    async fn queue_changed(&self) {
        self.persist().await;
        self.emit(QueueEvent::QueueChanged {
            length: self.state.read(|s| s.queue.len()),
        });
    }

    fn emit(&self, event: QueueEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Queue(event));
        }
    }
}

/// Shared body of every "make this episode current" transition.
fn make_current(state: &mut PlayerState, episode: Episode) -> Option<Outgoing> {
    let outgoing = take_outgoing(state);
    if let Some(previous) = state.current_episode.take() {
        if previous.id != episode.id {
            state.push_history(previous);
        }
    }
    state.remove_from_queue(&episode.id);
    state.current_episode = Some(episode);
    state.reset_timings();
    outgoing
}

fn take_outgoing(state: &PlayerState) -> Option<Outgoing> {
    state.current_episode.as_ref().map(|e| Outgoing {
        episode_id: e.id.clone(),
        position_ms: state.position_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::SqliteSettingsStore;
    use bridge_traits::time::SystemClock;
    use chrono::{TimeZone, Utc};
    use core_library::{EpisodeCatalog, Show};

    fn episode(id: &str, day: u32) -> Episode {
        Episode {
            id: id.to_string(),
            show_id: "show-1".to_string(),
            title: format!("Lecture {}", id),
            description: String::new(),
            audio_url: format!("https://cdn.example.com/{}.mp3", id),
            duration_secs: 1200,
            published_at: Utc.with_ymd_and_hms(2024, 2, day, 8, 0, 0).unwrap(),
            image_url: None,
            season: None,
            episode_number: None,
            file_size: 0,
        }
    }

    async fn ledger_with(episodes: Vec<Episode>) -> QueueLedger {
        let store: Arc<dyn SettingsStore> =
            Arc::new(SqliteSettingsStore::in_memory().await.unwrap());
        let clock = Arc::new(SystemClock);
        let catalog = Arc::new(EpisodeCatalog::new());
        catalog.replace_show(
            Show {
                id: "show-1".to_string(),
                title: "Ethics".to_string(),
                author: None,
                description: String::new(),
                image_url: None,
                feed_url: "https://feeds.example.com/ethics.xml".to_string(),
            },
            episodes,
        );
        let positions = Arc::new(PositionLedger::new(store.clone(), clock.clone()));
        QueueLedger::new(
            Arc::new(StateStore::new(PlayerState::default())),
            positions,
            catalog,
            store,
            clock,
        )
    }

    fn ids(items: &[QueueItem]) -> Vec<&str> {
        items.iter().map(|i| i.episode.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_enqueue_is_idempotent_and_skips_current() {
        let ledger = ledger_with(vec![]).await;
        ledger.set_current(episode("a", 1)).await;

        assert!(ledger.enqueue(episode("b", 2)).await);
        assert!(!ledger.enqueue(episode("b", 2)).await);
        assert!(!ledger.enqueue(episode("a", 1)).await);

        assert_eq!(ids(&ledger.snapshot().queue), vec!["b"]);
    }

    #[tokio::test]
    async fn test_set_current_saves_outgoing_progress_and_pushes_history() {
        let ledger = ledger_with(vec![]).await;
        ledger.set_current(episode("a", 1)).await;
        ledger.state().update(|s| {
            s.position_ms = 65_000;
            s.duration_ms = 1_200_000;
        });

        ledger.set_current(episode("b", 2)).await;

        let state = ledger.snapshot();
        assert!(state.is_current("b"));
        assert_eq!(state.history[0].id, "a");
        assert_eq!(state.position_ms, 0);
        assert_eq!(state.duration_ms, 0);
        assert_eq!(ledger.positions().get_saved_position("a"), 65_000);
    }

    #[tokio::test]
    async fn test_set_current_same_episode_does_not_touch_history() {
        let ledger = ledger_with(vec![]).await;
        ledger.set_current(episode("a", 1)).await;
        ledger.set_current(episode("a", 1)).await;
        assert!(ledger.snapshot().history.is_empty());
    }

    #[tokio::test]
    async fn test_set_current_removes_new_current_from_queue() {
        let ledger = ledger_with(vec![]).await;
        ledger.enqueue(episode("b", 2)).await;
        ledger.enqueue(episode("c", 3)).await;
        ledger.set_current(episode("b", 2)).await;
        assert_eq!(ids(&ledger.snapshot().queue), vec!["c"]);
    }

    #[tokio::test]
    async fn test_set_queue_filters_current_and_duplicates() {
        let ledger = ledger_with(vec![]).await;
        ledger.set_current(episode("a", 1)).await;
        ledger
            .set_queue(vec![
                episode("a", 1),
                episode("b", 2),
                episode("b", 2),
                episode("c", 3),
            ])
            .await;
        assert_eq!(ids(&ledger.snapshot().queue), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_next_with_empty_queue_is_noop() {
        let ledger = ledger_with(vec![]).await;
        ledger.set_current(episode("a", 1)).await;
        assert!(ledger.play_next().await.is_none());
        assert!(ledger.snapshot().is_current("a"));
        assert!(ledger.snapshot().history.is_empty());
    }

    #[tokio::test]
    async fn test_previous_with_empty_history_is_noop() {
        let ledger = ledger_with(vec![]).await;
        assert!(ledger.play_previous().await.is_none());
        ledger.set_current(episode("a", 1)).await;
        assert!(ledger.play_previous().await.is_none());
        assert!(ledger.snapshot().is_current("a"));
    }

    #[tokio::test]
    async fn test_reorder_queue_bounds() {
        let ledger = ledger_with(vec![]).await;
        for (id, day) in [("a", 1), ("b", 2), ("c", 3)] {
            ledger.enqueue(episode(id, day)).await;
        }

        assert!(!ledger.reorder_queue(1, 1).await);
        assert!(!ledger.reorder_queue(0, 3).await);
        assert!(!ledger.reorder_queue(5, 0).await);
        assert_eq!(ids(&ledger.snapshot().queue), vec!["a", "b", "c"]);

        assert!(ledger.reorder_queue(2, 0).await);
        assert_eq!(ids(&ledger.snapshot().queue), vec!["c", "a", "b"]);
        assert!(ledger.reorder_queue(0, 2).await);
        assert_eq!(ids(&ledger.snapshot().queue), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_series_navigation_rebuilds_queue() {
        let show: Vec<Episode> = (1..=4).map(|d| episode(&format!("e{}", d), d)).collect();
        let ledger = ledger_with(show.clone()).await;
        ledger.set_current(show[2].clone()).await; // e3

        let prev = ledger.play_previous_in_series().await.unwrap();
        assert_eq!(prev.id, "e2");
        assert_eq!(ids(&ledger.snapshot().queue), vec!["e3", "e4"]);

        let next = ledger.next_in_series().await.unwrap();
        assert_eq!(next.id, "e3");
        assert_eq!(ids(&ledger.snapshot().queue), vec!["e4"]);
    }

    #[tokio::test]
    async fn test_series_navigation_at_show_edges() {
        let show: Vec<Episode> = (1..=2).map(|d| episode(&format!("e{}", d), d)).collect();
        let ledger = ledger_with(show.clone()).await;

        ledger.set_current(show[0].clone()).await;
        assert!(ledger.play_previous_in_series().await.is_none());

        ledger.set_current(show[1].clone()).await;
        assert!(ledger.next_in_series().await.is_none());
        assert!(ledger.snapshot().is_current("e2"));
    }

    #[tokio::test]
    async fn test_state_is_persisted_after_transitions() {
        let ledger = ledger_with(vec![]).await;
        ledger.set_current(episode("a", 1)).await;
        ledger.enqueue(episode("b", 2)).await;

        let restored = crate::state::load_player_state(ledger.store.as_ref(), 1.0).await;
        assert!(restored.is_current("a"));
        assert_eq!(ids(&restored.queue), vec!["b"]);
    }
}
