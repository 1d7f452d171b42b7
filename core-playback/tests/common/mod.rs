//! Shared fakes for the playback integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::playback::{AudioEngine, EngineEvent, EngineState, EngineTimings, LoadRequest};
use bridge_traits::storage::SettingsStore;
use bridge_traits::time::SystemClock;
use chrono::{TimeZone, Utc};
use core_library::{DownloadIndex, Episode, EpisodeCatalog, Show};
use core_playback::{PlaybackController, PositionLedger, QueueLedger};
use core_runtime::config::PlaybackSettings;
use core_runtime::StateStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

// ============================================================================
// Stub AudioEngine
// ============================================================================

pub struct StubEngine {
    commands: Mutex<Vec<String>>,
    loads: Mutex<Vec<LoadRequest>>,
    engine_state: Mutex<EngineState>,
    timings: Mutex<EngineTimings>,
    pub fail_load: AtomicBool,
    events: broadcast::Sender<EngineEvent>,
}

impl StubEngine {
    pub fn new() -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            loads: Mutex::new(Vec::new()),
            engine_state: Mutex::new(EngineState::None),
            timings: Mutex::new(EngineTimings::default()),
            fail_load: AtomicBool::new(false),
            events: broadcast::channel(64).0,
        }
    }

    pub fn set_state(&self, state: EngineState) {
        *self.engine_state.lock() = state;
    }

    pub fn set_position(&self, position_ms: u64) {
        self.timings.lock().position_ms = position_ms;
    }

    pub fn fail_loads(&self, fail: bool) {
        self.fail_load.store(fail, Ordering::SeqCst);
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn load_count(&self) -> usize {
        self.loads.lock().len()
    }

    pub fn last_load(&self) -> Option<LoadRequest> {
        self.loads.lock().last().cloned()
    }

    /// Emit an event the way the host engine would.
    pub fn send(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    fn record(&self, command: impl Into<String>) {
        self.commands.lock().push(command.into());
    }
}

#[async_trait]
impl AudioEngine for StubEngine {
    async fn load(&self, request: LoadRequest) -> BridgeResult<()> {
        self.record("load");
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed(
                "decoder unavailable".to_string(),
            ));
        }
        self.timings.lock().position_ms = request.start_position_ms;
        self.loads.lock().push(request);
        self.set_state(EngineState::Loading);
        Ok(())
    }

    async fn play(&self) -> BridgeResult<()> {
        self.record("play");
        Ok(())
    }

    async fn pause(&self) -> BridgeResult<()> {
        self.record("pause");
        self.set_state(EngineState::Paused);
        Ok(())
    }

    async fn resume(&self) -> BridgeResult<()> {
        self.record("resume");
        self.set_state(EngineState::Playing);
        Ok(())
    }

    async fn stop(&self) -> BridgeResult<()> {
        self.record("stop");
        self.set_state(EngineState::Stopped);
        Ok(())
    }

    async fn seek_to(&self, position_ms: u64) -> BridgeResult<()> {
        self.record(format!("seek_to:{}", position_ms));
        self.set_position(position_ms);
        Ok(())
    }

    async fn seek_forward(&self, offset_ms: u64) -> BridgeResult<()> {
        self.record(format!("seek_forward:{}", offset_ms));
        Ok(())
    }

    async fn seek_backward(&self, offset_ms: u64) -> BridgeResult<()> {
        self.record(format!("seek_backward:{}", offset_ms));
        Ok(())
    }

    async fn set_speed(&self, rate: f32) -> BridgeResult<()> {
        self.record(format!("set_speed:{}", rate));
        Ok(())
    }

    async fn state(&self) -> BridgeResult<EngineState> {
        Ok(*self.engine_state.lock())
    }

    async fn timings(&self) -> BridgeResult<EngineTimings> {
        Ok(*self.timings.lock())
    }

    fn events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }
}

// ============================================================================
// In-memory SettingsStore
// ============================================================================

#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn set_string(&self, key: &str, value: &str) -> BridgeResult<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_string(&self, key: &str) -> BridgeResult<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    async fn set_bool(&self, key: &str, value: bool) -> BridgeResult<()> {
        self.set_string(key, &value.to_string()).await
    }

    async fn get_bool(&self, key: &str) -> BridgeResult<Option<bool>> {
        Ok(self.values.lock().get(key).and_then(|v| v.parse().ok()))
    }

    async fn set_f64(&self, key: &str, value: f64) -> BridgeResult<()> {
        self.set_string(key, &value.to_string()).await
    }

    async fn get_f64(&self, key: &str) -> BridgeResult<Option<f64>> {
        Ok(self.values.lock().get(key).and_then(|v| v.parse().ok()))
    }

    async fn delete(&self, key: &str) -> BridgeResult<()> {
        self.values.lock().remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> BridgeResult<Vec<String>> {
        Ok(self.values.lock().keys().cloned().collect())
    }
}

// ============================================================================
// Download index
// ============================================================================

#[derive(Default)]
pub struct StaticDownloads {
    paths: Mutex<HashMap<String, PathBuf>>,
}

impl StaticDownloads {
    pub fn insert(&self, episode_id: &str, path: impl Into<PathBuf>) {
        self.paths.lock().insert(episode_id.to_string(), path.into());
    }
}

impl DownloadIndex for StaticDownloads {
    fn local_path(&self, episode_id: &str) -> Option<PathBuf> {
        self.paths.lock().get(episode_id).cloned()
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub const SHOW_ID: &str = "show-ethics";

pub fn episode(id: &str, day: u32) -> Episode {
    Episode {
        id: id.to_string(),
        show_id: SHOW_ID.to_string(),
        title: format!("Lecture {}", id),
        description: String::new(),
        audio_url: format!("https://cdn.example.com/{}.mp3", id),
        duration_secs: 1800,
        published_at: Utc.with_ymd_and_hms(2024, 4, day, 10, 0, 0).unwrap(),
        image_url: None,
        season: None,
        episode_number: None,
        file_size: 0,
    }
}

pub fn show() -> Show {
    Show {
        id: SHOW_ID.to_string(),
        title: "Moral Philosophy".to_string(),
        author: Some("Dept. of Philosophy".to_string()),
        description: String::new(),
        image_url: Some("https://cdn.example.com/ethics.png".to_string()),
        feed_url: "https://feeds.example.com/ethics.xml".to_string(),
    }
}

/// E1..E3 in published order.
pub fn e(n: u32) -> Episode {
    episode(&format!("E{}", n), n)
}

pub struct Harness {
    pub engine: Arc<StubEngine>,
    pub catalog: Arc<EpisodeCatalog>,
    pub store: Arc<MemoryStore>,
    pub downloads: Arc<StaticDownloads>,
    pub controller: Arc<PlaybackController>,
}

impl Harness {
    pub fn ledger(&self) -> &Arc<QueueLedger> {
        self.controller.ledger()
    }

    pub fn positions(&self) -> &Arc<PositionLedger> {
        self.controller.ledger().positions()
    }

    pub fn current_id(&self) -> Option<String> {
        self.controller.snapshot().current_id().map(str::to_string)
    }

    pub fn queue_ids(&self) -> Vec<String> {
        self.controller
            .snapshot()
            .queue
            .into_iter()
            .map(|item| item.episode.id)
            .collect()
    }

    pub fn history_ids(&self) -> Vec<String> {
        self.controller
            .snapshot()
            .history
            .into_iter()
            .map(|episode| episode.id)
            .collect()
    }

    /// Pretend the engine reported `position_ms`.
    pub fn set_position(&self, position_ms: u64) {
        self.controller
            .state()
            .update(|s| s.position_ms = position_ms);
        self.engine.set_position(position_ms);
    }
}

/// Controller over a catalog holding one show with `episode_count` episodes.
pub fn harness_with(settings: PlaybackSettings, episode_count: u32) -> Harness {
    let engine = Arc::new(StubEngine::new());
    let store = Arc::new(MemoryStore::default());
    let clock = Arc::new(SystemClock);

    let catalog = Arc::new(EpisodeCatalog::new());
    catalog.replace_show(show(), (1..=episode_count).map(e).collect());

    let positions = Arc::new(PositionLedger::new(store.clone(), clock.clone()));
    let ledger = Arc::new(QueueLedger::new(
        Arc::new(StateStore::default()),
        positions,
        catalog.clone(),
        store.clone(),
        clock,
    ));
    let downloads = Arc::new(StaticDownloads::default());
    let controller = Arc::new(
        PlaybackController::new(engine.clone(), ledger, store.clone(), settings)
            .with_download_index(downloads.clone()),
    );

    Harness {
        engine,
        catalog,
        store,
        downloads,
        controller,
    }
}

pub fn harness() -> Harness {
    harness_with(PlaybackSettings::default(), 3)
}

pub fn ids(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
