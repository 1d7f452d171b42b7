//! Position Ledger
//!
//! Durable map from episode id to the last known playback offset. Offsets
//! below [`MIN_SAVED_POSITION_MS`] count as "at the start" and are never
//! stored. Every accepted save is written through to the settings store;
//! write failures are logged and swallowed.

use bridge_traits::storage::{load_json, save_json, SettingsStore};
use bridge_traits::time::Clock;
use chrono::{DateTime, Utc};
use core_runtime::StateStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

/// Positions below this are not worth restoring.
pub const MIN_SAVED_POSITION_MS: u64 = 5_000;

/// Settings key of the serialized ledger.
pub const POSITIONS_KEY: &str = "lectern.positions";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedPosition {
    pub position_ms: u64,
    pub updated_at: DateTime<Utc>,
}

pub type PositionMap = HashMap<String, SavedPosition>;

pub struct PositionLedger {
    positions: StateStore<PositionMap>,
    store: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    // Serializes write-through so an older snapshot never lands last.
    write_lock: AsyncMutex<()>,
}

impl PositionLedger {
    /// Empty ledger.
    pub fn new(store: Arc<dyn SettingsStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_positions(store, clock, PositionMap::new())
    }

    /// Ledger rehydrated from the settings store.
    ///
    /// A missing or corrupt blob yields an empty ledger.
    pub async fn load(store: Arc<dyn SettingsStore>, clock: Arc<dyn Clock>) -> Self {
        let positions = match load_json::<PositionMap>(store.as_ref(), POSITIONS_KEY).await {
            Ok(Some(positions)) => positions,
            Ok(None) => PositionMap::new(),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable saved positions");
                PositionMap::new()
            }
        };
        debug!(count = positions.len(), "Rehydrated saved positions");
        Self::with_positions(store, clock, positions)
    }

    fn with_positions(
        store: Arc<dyn SettingsStore>,
        clock: Arc<dyn Clock>,
        positions: PositionMap,
    ) -> Self {
        Self {
            positions: StateStore::new(positions),
            store,
            clock,
            write_lock: AsyncMutex::new(()),
        }
    }

    /// Record `position_ms` for `episode_id`.
    ///
    /// No-op below [`MIN_SAVED_POSITION_MS`].
    pub async fn save_position(&self, episode_id: &str, position_ms: u64) {
        if position_ms < MIN_SAVED_POSITION_MS {
            return;
        }

        let updated_at = self.clock.now();
        self.positions.update(|map| {
            map.insert(
                episode_id.to_string(),
                SavedPosition {
                    position_ms,
                    updated_at,
                },
            );
        });
        debug!(episode_id, position_ms, "Saved position");
        self.write_through().await;
    }

    /// Saved offset, `0` if none.
    pub fn get_saved_position(&self, episode_id: &str) -> u64 {
        self.positions
            .read(|map| map.get(episode_id).map(|p| p.position_ms))
            .unwrap_or(0)
    }

    pub async fn clear_saved_position(&self, episode_id: &str) {
        let removed = self.positions.update(|map| map.remove(episode_id).is_some());
        if removed {
            debug!(episode_id, "Cleared saved position");
            self.write_through().await;
        }
    }

    pub fn snapshot(&self) -> PositionMap {
        self.positions.get()
    }

    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<PositionMap> {
        self.positions.subscribe()
    }

    async fn write_through(&self) {
        let _guard = self.write_lock.lock().await;
        let snapshot = self.positions.get();
        if let Err(e) = save_json(self.store.as_ref(), POSITIONS_KEY, &snapshot).await {
            warn!(error = %e, "Failed to persist saved positions");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_desktop::SqliteSettingsStore;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::time::ManualClock;
    use chrono::TimeZone;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        ))
    }

    async fn store() -> Arc<dyn SettingsStore> {
        Arc::new(SqliteSettingsStore::in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn test_positions_below_threshold_are_ignored() {
        let ledger = PositionLedger::new(store().await, clock());

        for position in [0, 1, 2_500, 4_999] {
            ledger.save_position("ep-1", position).await;
            assert_eq!(ledger.get_saved_position("ep-1"), 0);
        }

        ledger.save_position("ep-1", 5_000).await;
        assert_eq!(ledger.get_saved_position("ep-1"), 5_000);
        ledger.save_position("ep-1", 62_000).await;
        assert_eq!(ledger.get_saved_position("ep-1"), 62_000);
    }

    #[tokio::test]
    async fn test_small_save_does_not_overwrite_existing_entry() {
        let ledger = PositionLedger::new(store().await, clock());
        ledger.save_position("ep-1", 30_000).await;
        ledger.save_position("ep-1", 1_000).await;
        assert_eq!(ledger.get_saved_position("ep-1"), 30_000);
    }

    #[tokio::test]
    async fn test_clear_and_missing_entries() {
        let ledger = PositionLedger::new(store().await, clock());
        assert_eq!(ledger.get_saved_position("unknown"), 0);

        ledger.save_position("ep-1", 10_000).await;
        ledger.clear_saved_position("ep-1").await;
        assert_eq!(ledger.get_saved_position("ep-1"), 0);

        // clearing twice is harmless
        ledger.clear_saved_position("ep-1").await;
    }

    #[tokio::test]
    async fn test_write_through_survives_reload() {
        let store = store().await;
        let clock = clock();
        let ledger = PositionLedger::new(store.clone(), clock.clone());
        ledger.save_position("ep-1", 45_000).await;

        let reloaded = PositionLedger::load(store, clock.clone()).await;
        assert_eq!(reloaded.get_saved_position("ep-1"), 45_000);
        assert_eq!(
            reloaded.snapshot()["ep-1"].updated_at,
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_corrupt_blob_loads_empty() {
        let store = store().await;
        store.set_string(POSITIONS_KEY, "[1,2,").await.unwrap();
        let ledger = PositionLedger::load(store, clock()).await;
        assert!(ledger.snapshot().is_empty());
    }

    struct FailingStore;

    #[async_trait]
    impl SettingsStore for FailingStore {
        async fn set_string(&self, _key: &str, _value: &str) -> BridgeResult<()> {
            Err(BridgeError::Storage("disk full".to_string()))
        }
        async fn get_string(&self, _key: &str) -> BridgeResult<Option<String>> {
            Ok(None)
        }
        async fn set_bool(&self, _key: &str, _value: bool) -> BridgeResult<()> {
            Err(BridgeError::Storage("disk full".to_string()))
        }
        async fn get_bool(&self, _key: &str) -> BridgeResult<Option<bool>> {
            Ok(None)
        }
        async fn set_f64(&self, _key: &str, _value: f64) -> BridgeResult<()> {
            Err(BridgeError::Storage("disk full".to_string()))
        }
        async fn get_f64(&self, _key: &str) -> BridgeResult<Option<f64>> {
            Ok(None)
        }
        async fn delete(&self, _key: &str) -> BridgeResult<()> {
            Ok(())
        }
        async fn list_keys(&self) -> BridgeResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_storage_failure_is_swallowed() {
        let ledger = PositionLedger::new(Arc::new(FailingStore), clock());
        ledger.save_position("ep-1", 20_000).await;
        // The in-memory ledger still reflects the save
        assert_eq!(ledger.get_saved_position("ep-1"), 20_000);
    }
}
