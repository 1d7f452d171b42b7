//! Core service façade and bootstrap.
//!
//! This crate is the composition root: it wires the host-provided bridges
//! carried by [`CoreConfig`] (audio engine, settings store, download
//! executor, HTTP client) into the playback and download cores, rehydrates
//! every ledger from the settings store and owns the single engine-event
//! listener for the lifetime of the process.
//!
//! UI layers talk to [`CoreService`] only: they issue intents (play, toggle,
//! seek, skip, download, cancel, delete) and observe state through
//! [`CoreService::subscribe_player`], [`CoreService::subscribe_downloads`] and
//! [`CoreService::events`].
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use core_service::CoreService;
//!
//! let config = CoreConfig::builder()
//!     .data_dir("/var/lib/lectern")
//!     .audio_engine(engine)
//!     .build()?;
//! let core = CoreService::bootstrap(config, catalog).await?;
//! core.play_episode("ep-42", false).await?;
//! ```

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use core_download::{DownloadManager, DownloadState};
use core_library::{DownloadedEpisode, Episode, FeedCatalog, FeedConfigLoader, LoadedFeedConfig};
use core_playback::state::load_player_state;
use core_playback::{
    EngineEventDispatcher, PlaybackController, PlayerState, PositionAutosave, PositionLedger,
    PreviousOutcome, QueueLedger,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, Receiver};
use core_runtime::StateStore;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    config: CoreConfig,
    event_bus: Arc<EventBus>,
    catalog: Arc<dyn FeedCatalog>,
    controller: Arc<PlaybackController>,
    downloads: Arc<DownloadManager>,
    dispatcher: EngineEventDispatcher,
    autosave: PositionAutosave,
    feed_config: FeedConfigLoader,
    pump: Mutex<Option<JoinHandle<usize>>>,
}

impl CoreService {
    /// Build every component from `config`, rehydrate persisted state and
    /// attach the engine listener.
    ///
    /// A download queue left over from a previous run starts draining in the
    /// background. Must be called from within a Tokio runtime.
    #[instrument(skip_all)]
    pub async fn bootstrap(config: CoreConfig, catalog: Arc<dyn FeedCatalog>) -> Result<Self> {
        config.validate()?;

        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        let store = Arc::clone(&config.settings_store);
        let clock = Arc::clone(&config.clock);

        let positions = Arc::new(PositionLedger::load(Arc::clone(&store), Arc::clone(&clock)).await);
        let player = load_player_state(store.as_ref(), config.playback.default_speed).await;
        let ledger = Arc::new(
            QueueLedger::new(
                Arc::new(StateStore::new(player)),
                positions,
                Arc::clone(&catalog),
                Arc::clone(&store),
                Arc::clone(&clock),
            )
            .with_event_bus(Arc::clone(&event_bus)),
        );

        let downloads = DownloadManager::new(
            Arc::clone(&config.download_executor),
            Arc::clone(&catalog),
            Arc::clone(&store),
            clock,
            config.downloads.clone(),
        )
        .with_event_bus(Arc::clone(&event_bus));
        downloads.rehydrate().await;
        let downloads = Arc::new(downloads);

        let controller = Arc::new(
            PlaybackController::new(
                Arc::clone(&config.audio_engine),
                ledger,
                Arc::clone(&store),
                config.playback.clone(),
            )
            .with_download_index(downloads.clone())
            .with_event_bus(Arc::clone(&event_bus)),
        );
        controller.restore_preferences().await;

        let dispatcher = EngineEventDispatcher::new(Arc::clone(&controller));
        dispatcher.attach();
        let autosave = PositionAutosave::start(Arc::clone(&controller));

        let feed_config = FeedConfigLoader::new(
            store,
            config.http_client.clone(),
            config.feed_config_url.clone(),
        )
        .with_event_bus(Arc::clone(&event_bus));

        let service = Self {
            inner: Arc::new(ServiceInner {
                config,
                event_bus,
                catalog,
                controller,
                downloads,
                dispatcher,
                autosave,
                feed_config,
                pump: Mutex::new(None),
            }),
        };

        let snapshot = service.player_state();
        let pending = service.inner.downloads.snapshot().download_queue.len();
        info!(
            current = ?snapshot.current_id(),
            queued = snapshot.queue.len(),
            pending_downloads = pending,
            "Core bootstrapped"
        );
        if pending > 0 {
            service.spawn_pump();
        }

        Ok(service)
    }

    pub fn config(&self) -> &CoreConfig {
        &self.inner.config
    }

    pub fn controller(&self) -> &Arc<PlaybackController> {
        &self.inner.controller
    }

    pub fn downloads(&self) -> &Arc<DownloadManager> {
        &self.inner.downloads
    }

    /// Subscribe to the core event stream.
    pub fn events(&self) -> Receiver<CoreEvent> {
        self.inner.event_bus.subscribe()
    }

    pub fn player_state(&self) -> PlayerState {
        self.inner.controller.snapshot()
    }

    pub fn subscribe_player(&self) -> watch::Receiver<PlayerState> {
        self.inner.controller.state().subscribe()
    }

    pub fn download_state(&self) -> DownloadState {
        self.inner.downloads.snapshot()
    }

    pub fn subscribe_downloads(&self) -> watch::Receiver<DownloadState> {
        self.inner.downloads.subscribe()
    }

    /// Fetch the remote feed list, falling back to the cached copy.
    pub async fn load_feed_config(&self) -> Result<LoadedFeedConfig> {
        Ok(self.inner.feed_config.load().await?)
    }

    fn resolve(&self, episode_id: &str) -> Result<Episode> {
        self.inner
            .catalog
            .episode_by_id(episode_id)
            .ok_or_else(|| CoreError::EpisodeNotFound(episode_id.to_string()))
    }

    // ------------------------------------------------------------------
    // Playback intents
    // ------------------------------------------------------------------

    pub async fn play_episode(&self, episode_id: &str, from_beginning: bool) -> Result<()> {
        let episode = self.resolve(episode_id)?;
        Ok(self.inner.controller.play_episode(episode, from_beginning).await?)
    }

    pub async fn toggle_play_pause(&self) -> Result<()> {
        Ok(self.inner.controller.toggle_play_pause().await?)
    }

    pub async fn pause(&self) -> Result<()> {
        Ok(self.inner.controller.pause().await?)
    }

    pub async fn stop(&self) -> Result<()> {
        Ok(self.inner.controller.stop().await?)
    }

    pub async fn seek_to(&self, position_ms: u64) -> Result<()> {
        Ok(self.inner.controller.seek_to(position_ms).await?)
    }

    /// Skip ahead by the configured forward interval.
    pub async fn jump_forward(&self) -> Result<()> {
        Ok(self.inner.controller.jump_forward().await?)
    }

    /// Skip back by the configured backward interval.
    pub async fn jump_backward(&self) -> Result<()> {
        Ok(self.inner.controller.jump_backward().await?)
    }

    pub async fn set_speed(&self, rate: f32) -> Result<()> {
        Ok(self.inner.controller.set_speed(rate).await?)
    }

    pub async fn set_auto_play_next(&self, enabled: bool) {
        self.inner.controller.set_auto_play_next(enabled).await;
    }

    pub async fn skip_next(&self) -> Result<Option<Episode>> {
        Ok(self.inner.controller.skip_next().await?)
    }

    pub async fn skip_previous(&self) -> Result<PreviousOutcome> {
        Ok(self.inner.controller.skip_previous().await?)
    }

    // ------------------------------------------------------------------
    // Queue intents
    // ------------------------------------------------------------------

    /// Append an episode to the up-next queue. Returns `false` when it is
    /// already current or queued.
    pub async fn add_to_queue(&self, episode_id: &str) -> Result<bool> {
        let episode = self.resolve(episode_id)?;
        Ok(self.inner.controller.ledger().enqueue(episode).await)
    }

    pub async fn remove_from_queue(&self, episode_id: &str) -> bool {
        self.inner.controller.ledger().remove_from_queue(episode_id).await
    }

    pub async fn reorder_queue(&self, from: usize, to: usize) -> bool {
        self.inner.controller.ledger().reorder_queue(from, to).await
    }

    pub async fn clear_queue(&self) {
        self.inner.controller.ledger().clear_queue().await;
    }

    // ------------------------------------------------------------------
    // Download intents
    // ------------------------------------------------------------------

    /// Queue an episode for download and make sure the pump is running.
    ///
    /// Returns `false` when the episode is already downloaded, downloading
    /// or queued.
    pub async fn download(&self, episode_id: &str) -> Result<bool> {
        self.resolve(episode_id)?;
        let added = self.inner.downloads.enqueue(episode_id).await;
        self.spawn_pump();
        Ok(added)
    }

    pub async fn cancel_download(&self, episode_id: &str) -> bool {
        self.inner.downloads.cancel_download(episode_id).await
    }

    pub async fn delete_download(&self, episode_id: &str) -> Result<bool> {
        Ok(self.inner.downloads.delete_download(episode_id).await?)
    }

    pub async fn delete_all_downloads(&self) -> Result<()> {
        Ok(self.inner.downloads.delete_all_downloads().await?)
    }

    /// Completed downloads, most recent first.
    pub fn downloaded_episodes(&self) -> Vec<DownloadedEpisode> {
        self.inner.downloads.get_downloaded_episodes()
    }

    pub fn total_download_size(&self) -> u64 {
        self.inner.downloads.get_total_download_size()
    }

    /// Wait for the background download pump, if one is running.
    ///
    /// Returns the number of downloads it completed.
    pub async fn wait_for_downloads(&self) -> usize {
        let handle = self.inner.pump.lock().take();
        match handle {
            Some(handle) => handle.await.unwrap_or_else(|e| {
                warn!(error = %e, "Download pump task failed");
                0
            }),
            None => 0,
        }
    }

    fn spawn_pump(&self) {
        let mut pump = self.inner.pump.lock();
        if pump.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("Download pump already scheduled");
            return;
        }
        let downloads = Arc::clone(&self.inner.downloads);
        *pump = Some(tokio::spawn(async move { downloads.process_queue().await }));
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Persist the session and stop background tasks.
    ///
    /// Playback is left running. Active downloads are cancelled; pending
    /// queue entries stay persisted for the next bootstrap.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let controller = &self.inner.controller;
        let (current, position_ms) =
            controller
                .state()
                .read(|s| (s.current_id().map(str::to_string), s.position_ms));
        if let Some(episode_id) = current {
            controller
                .ledger()
                .positions()
                .save_position(&episode_id, position_ms)
                .await;
        }
        controller.ledger().persist().await;

        self.inner.autosave.stop();
        self.inner.dispatcher.detach();

        let active: Vec<String> = self
            .inner
            .downloads
            .snapshot()
            .active_downloads
            .into_keys()
            .collect();
        for episode_id in active {
            self.inner.downloads.cancel_download(&episode_id).await;
        }
        if let Some(handle) = self.inner.pump.lock().take() {
            handle.abort();
        }

        info!("Core shut down");
    }
}
