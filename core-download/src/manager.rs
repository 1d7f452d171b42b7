//! # Download Queue Manager
//!
//! Serial download pump over a FIFO queue of episode ids.
//!
//! ## Overview
//!
//! - [`DownloadManager::enqueue`] appends an id (idempotent)
//! - [`DownloadManager::process_queue`] drains the queue one transfer at a
//!   time; a second call while a pump is running returns immediately
//! - [`DownloadManager::start_download`] runs a single transfer with
//!   throttled progress and cooperative cancellation
//! - [`DownloadManager::cancel_download`], [`DownloadManager::delete_download`]
//!   and [`DownloadManager::delete_all_downloads`] clean up
//!
//! A failed or cancelled transfer never produces an entry in `downloads`,
//! and a single failure never stops the pump.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let manager = Arc::new(DownloadManager::new(executor, catalog, store, clock, settings));
//! manager.rehydrate().await;
//!
//! manager.enqueue("ep-42").await;
//! let completed = manager.process_queue().await;
//! ```

use bridge_traits::storage::SettingsStore;
use bridge_traits::time::Clock;
use bridge_traits::transfer::{DownloadExecutor, ProgressCallback, TransferProgress, TransferRequest};
use core_library::{DownloadIndex, DownloadedEpisode, Episode, FeedCatalog};
use core_runtime::config::DownloadSettings;
use core_runtime::events::{CoreEvent, DownloadEvent, EventBus};
use core_runtime::{ProgressThrottle, StateStore};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{DownloadError, Result};
use crate::state::{
    load_download_state, save_download_state, DownloadProgress, DownloadState, DownloadStatus,
};

pub struct DownloadManager {
    state: Arc<StateStore<DownloadState>>,
    executor: Arc<dyn DownloadExecutor>,
    catalog: Arc<dyn FeedCatalog>,
    store: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    settings: DownloadSettings,
    event_bus: Option<Arc<EventBus>>,
    /// Cancellation handle per in-flight transfer.
    tokens: Mutex<HashMap<String, CancellationToken>>,
    processing: AtomicBool,
    write_lock: AsyncMutex<()>,
}

/// Clears the pump flag even if the pump future is dropped mid-transfer.
struct PumpGuard<'a>(&'a AtomicBool);

impl Drop for PumpGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl DownloadManager {
    pub fn new(
        executor: Arc<dyn DownloadExecutor>,
        catalog: Arc<dyn FeedCatalog>,
        store: Arc<dyn SettingsStore>,
        clock: Arc<dyn Clock>,
        settings: DownloadSettings,
    ) -> Self {
        Self {
            state: Arc::new(StateStore::default()),
            executor,
            catalog,
            store,
            clock,
            settings,
            event_bus: None,
            tokens: Mutex::new(HashMap::new()),
            processing: AtomicBool::new(false),
            write_lock: AsyncMutex::new(()),
        }
    }

    /// Set event bus for download notifications.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Replace in-memory state with the persisted `downloads` and
    /// `download_queue`. In-flight records start empty.
    pub async fn rehydrate(&self) {
        let restored = load_download_state(self.store.as_ref()).await;
        self.state.replace(restored);
    }

    pub fn state(&self) -> &Arc<StateStore<DownloadState>> {
        &self.state
    }

    pub fn snapshot(&self) -> DownloadState {
        self.state.get()
    }

    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<DownloadState> {
        self.state.subscribe()
    }

    // ------------------------------------------------------------------
    // Queue
    // ------------------------------------------------------------------

    /// Append `episode_id` to the pending queue.
    ///
    /// No-op (returns `false`) when the episode is already downloaded,
    /// downloading or queued.
    pub async fn enqueue(&self, episode_id: &str) -> bool {
        let added = self.state.update(|s| {
            if s.is_downloaded(episode_id) || s.is_active(episode_id) || s.is_queued(episode_id) {
                return false;
            }
            s.download_queue.push(episode_id.to_string());
            s.outcomes.remove(episode_id);
            true
        });

        if added {
            debug!(episode_id, "Download queued");
            self.persist().await;
            self.emit(DownloadEvent::Queued {
                episode_id: episode_id.to_string(),
            });
        }
        added
    }

    /// Head of the pending queue, without removing it.
    pub fn dequeue_next(&self) -> Option<String> {
        self.state.read(|s| s.download_queue.first().cloned())
    }

    /// Drain the pending queue, one transfer at a time.
    ///
    /// Returns the number of downloads completed by this call; `0` when
    /// another pump is already running. Ids the catalog cannot resolve are
    /// dropped, failed transfers are logged and skipped.
    #[instrument(skip(self))]
    pub async fn process_queue(&self) -> usize {
        let mut completed = 0;

        loop {
            if self.processing.swap(true, Ordering::SeqCst) {
                debug!("Download pump already running");
                return completed;
            }
            let guard = PumpGuard(&self.processing);

            while let Some(episode_id) = self.pop_queue_head().await {
                let Some(episode) = self.catalog.episode_by_id(&episode_id) else {
                    warn!(episode_id = %episode_id, "Dropping unresolvable queued download");
                    continue;
                };

                match self.start_download(&episode).await {
                    Ok(_) => completed += 1,
                    Err(e) if e.is_cancelled() => {
                        info!(episode_id = %episode_id, "Queued download cancelled");
                    }
                    Err(e) => {
                        warn!(episode_id = %episode_id, error = %e, "Queued download failed, continuing");
                    }
                }
            }

            drop(guard);

            // An enqueue may have landed between the last pop and the release.
            if self.state.read(|s| s.download_queue.is_empty()) {
                return completed;
            }
        }
    }

    // ------------------------------------------------------------------
    // Transfers
    // ------------------------------------------------------------------

    /// Download `episode` now.
    ///
    /// Returns the existing record when the episode is already downloaded.
    /// Errors are propagated to the caller; bookkeeping is cleaned up first.
    #[instrument(skip(self, episode), fields(episode_id = %episode.id))]
    pub async fn start_download(&self, episode: &Episode) -> Result<DownloadedEpisode> {
        let episode_id = episode.id.clone();

        if let Some(existing) = self.state.read(|s| s.downloads.get(&episode_id).cloned()) {
            debug!("Already downloaded");
            return Ok(existing);
        }
        if episode.audio_url.trim().is_empty() {
            return Err(DownloadError::NoSourceUrl(episode_id));
        }

        let cancel = CancellationToken::new();
        {
            let mut tokens = self.tokens.lock();
            if tokens.contains_key(&episode_id) {
                return Err(DownloadError::InProgress(episode_id));
            }
            tokens.insert(episode_id.clone(), cancel.clone());
        }

        let started_at = self.clock.now();
        let dequeued = self.state.update(|s| {
            s.active_downloads.insert(
                episode_id.clone(),
                DownloadProgress::started(episode_id.clone(), started_at),
            );
            s.outcomes.remove(&episode_id);
            let before = s.download_queue.len();
            s.download_queue.retain(|id| *id != episode_id);
            s.download_queue.len() != before
        });
        if dequeued {
            self.persist().await;
        }
        self.emit(DownloadEvent::Started {
            episode_id: episode_id.clone(),
        });

        let request = TransferRequest {
            episode_id: episode_id.clone(),
            source_url: episode.audio_url.clone(),
            file_name: file_name_for(episode, &self.settings.default_extension),
        };
        info!(file_name = %request.file_name, "Starting download");

        let result = self
            .executor
            .transfer(request, self.progress_callback(&episode_id), cancel.clone())
            .await;
        self.tokens.lock().remove(&episode_id);

        match result {
            Ok(path) if cancel.is_cancelled() => {
                // Finished racing a cancel: the cancel wins.
                self.discard_file(&path).await;
                self.finish_cancelled(&episode_id);
                Err(DownloadError::Cancelled(episode_id))
            }
            Ok(path) => Ok(self.finish_completed(episode, path).await),
            Err(e) => {
                let error = DownloadError::from_transfer(&episode_id, e);
                if error.is_cancelled() || cancel.is_cancelled() {
                    self.finish_cancelled(&episode_id);
                    return Err(DownloadError::Cancelled(episode_id));
                }

                warn!(error = %error, "Download failed");
                self.state.update(|s| {
                    s.active_downloads.remove(&episode_id);
                    s.outcomes
                        .insert(episode_id.clone(), DownloadStatus::Failed);
                });
                self.emit(DownloadEvent::Failed {
                    episode_id,
                    message: error.to_string(),
                });
                Err(error)
            }
        }
    }

    /// Resolve `episode_id` through the catalog and download it now.
    pub async fn download_by_id(&self, episode_id: &str) -> Result<DownloadedEpisode> {
        let episode = self
            .catalog
            .episode_by_id(episode_id)
            .ok_or_else(|| DownloadError::EpisodeNotFound(episode_id.to_string()))?;
        self.start_download(&episode).await
    }

    /// Abort an in-flight transfer and drop the id from the queue.
    ///
    /// Bookkeeping is cleared immediately; the executor stops on its own
    /// schedule. Returns `false` when there was nothing to cancel.
    #[instrument(skip(self))]
    pub async fn cancel_download(&self, episode_id: &str) -> bool {
        let token = self.tokens.lock().remove(episode_id);
        if let Some(token) = &token {
            token.cancel();
        }

        let had_token = token.is_some();
        let (cancelled, was_queued) = self.state.update(|s| {
            let was_active = s.active_downloads.remove(episode_id).is_some();
            let before = s.download_queue.len();
            s.download_queue.retain(|id| id != episode_id);
            let was_queued = s.download_queue.len() != before;
            let cancelled = had_token || was_active || was_queued;
            if cancelled {
                s.outcomes
                    .insert(episode_id.to_string(), DownloadStatus::Cancelled);
            }
            (cancelled, was_queued)
        });

        if was_queued {
            self.persist().await;
        }
        if cancelled {
            info!(episode_id, "Download cancelled");
            self.emit(DownloadEvent::Cancelled {
                episode_id: episode_id.to_string(),
            });
        }
        cancelled
    }

    /// Delete a completed download's file and record.
    ///
    /// Returns `Ok(false)` when the episode was not downloaded.
    #[instrument(skip(self))]
    pub async fn delete_download(&self, episode_id: &str) -> Result<bool> {
        let Some(record) = self.state.read(|s| s.downloads.get(episode_id).cloned()) else {
            return Ok(false);
        };

        self.executor
            .delete_file(&record.local_path)
            .await
            .map_err(|e| DownloadError::from_transfer(episode_id, e))?;

        self.state.update(|s| {
            s.downloads.remove(episode_id);
        });
        self.persist().await;
        info!(episode_id, "Download deleted");
        self.emit(DownloadEvent::Deleted {
            episode_id: episode_id.to_string(),
        });
        Ok(true)
    }

    /// Cancel everything in flight, wipe the download directory and clear
    /// all bookkeeping.
    #[instrument(skip(self))]
    pub async fn delete_all_downloads(&self) -> Result<()> {
        let tokens: Vec<CancellationToken> =
            self.tokens.lock().drain().map(|(_, token)| token).collect();
        for token in &tokens {
            token.cancel();
        }

        self.executor
            .delete_all()
            .await
            .map_err(|e| DownloadError::Storage(format!("Failed to delete downloads: {}", e)))?;

        let count = self.state.update(|s| {
            let count = s.downloads.len();
            *s = DownloadState::default();
            count
        });
        self.persist().await;
        info!(count, cancelled = tokens.len(), "All downloads deleted");
        self.emit(DownloadEvent::AllDeleted { count });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Completed downloads, most recent first.
    pub fn get_downloaded_episodes(&self) -> Vec<DownloadedEpisode> {
        let mut downloads: Vec<DownloadedEpisode> =
            self.state.read(|s| s.downloads.values().cloned().collect());
        downloads.sort_by(|a, b| b.downloaded_at.cmp(&a.downloaded_at));
        downloads
    }

    /// Sum of completed download sizes in bytes.
    pub fn get_total_download_size(&self) -> u64 {
        self.state.read(|s| s.total_size())
    }

    pub fn is_downloaded(&self, episode_id: &str) -> bool {
        self.state.read(|s| s.is_downloaded(episode_id))
    }

    pub fn local_path(&self, episode_id: &str) -> Option<PathBuf> {
        self.state
            .read(|s| s.downloads.get(episode_id).map(|d| d.local_path.clone()))
    }

    pub fn progress_for(&self, episode_id: &str) -> Option<DownloadProgress> {
        self.state
            .read(|s| s.active_downloads.get(episode_id).cloned())
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn pop_queue_head(&self) -> Option<String> {
        let head = self.state.update(|s| {
            if s.download_queue.is_empty() {
                None
            } else {
                Some(s.download_queue.remove(0))
            }
        });
        if head.is_some() {
            self.persist().await;
        }
        head
    }

    /// Progress callback applying at most one intermediate update per
    /// `progress_interval`. Complete reports always apply.
    fn progress_callback(&self, episode_id: &str) -> ProgressCallback {
        let throttle = Mutex::new(ProgressThrottle::new(self.settings.progress_interval));
        let state = Arc::clone(&self.state);
        let event_bus = self.event_bus.clone();
        let episode_id = episode_id.to_string();

        Arc::new(move |progress: TransferProgress| {
            let now = tokio::time::Instant::now().into_std();
            let terminal = progress.is_complete();
            if !throttle.lock().should_emit(now, terminal) {
                return;
            }

            let applied = state.update(|s| match s.active_downloads.get_mut(&episode_id) {
                Some(record) => {
                    record.bytes_written = progress.bytes_written;
                    record.total_bytes = progress.total_bytes;
                    record.percent = progress.percent();
                    if terminal {
                        record.status = DownloadStatus::Completed;
                    }
                    true
                }
                // Cancelled while the executor was still reporting.
                None => false,
            });

            if applied && !terminal {
                if let Some(bus) = &event_bus {
                    let _ = bus.emit(CoreEvent::Download(DownloadEvent::Progress {
                        episode_id: episode_id.clone(),
                        percent: progress.percent(),
                        bytes_written: progress.bytes_written,
                        total_bytes: progress.total_bytes,
                    }));
                }
            }
        })
    }

    async fn finish_completed(&self, episode: &Episode, local_path: PathBuf) -> DownloadedEpisode {
        let downloaded_at = self.clock.now();
        let record = self.state.update(|s| {
            let reported = s
                .active_downloads
                .remove(&episode.id)
                .map(|p| p.bytes_written)
                .unwrap_or(0);
            let record = DownloadedEpisode {
                episode: episode.clone(),
                local_path,
                downloaded_at,
                file_size: if reported > 0 { reported } else { episode.file_size },
            };
            s.downloads.insert(episode.id.clone(), record.clone());
            record
        });
        self.persist().await;

        info!(
            episode_id = %episode.id,
            file_size = record.file_size,
            "Download completed"
        );
        self.emit(DownloadEvent::Completed {
            episode_id: episode.id.clone(),
            file_size: record.file_size,
        });
        record
    }

    fn finish_cancelled(&self, episode_id: &str) {
        self.state.update(|s| {
            s.active_downloads.remove(episode_id);
            s.outcomes
                .insert(episode_id.to_string(), DownloadStatus::Cancelled);
        });
        debug!(episode_id, "Transfer stopped after cancellation");
    }

    async fn discard_file(&self, path: &std::path::Path) {
        if let Err(e) = self.executor.delete_file(path).await {
            warn!(error = %e, "Failed to remove file of cancelled download");
        }
    }

    /// Write the durable half of the state. Failures are logged.
    async fn persist(&self) {
        let _guard = self.write_lock.lock().await;
        let snapshot = self.state.get();
        if let Err(e) = save_download_state(self.store.as_ref(), &snapshot).await {
            warn!(error = %e, "Failed to persist download state");
        }
    }

    fn emit(&self, event: DownloadEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Download(event));
        }
    }
}

impl DownloadIndex for DownloadManager {
    fn local_path(&self, episode_id: &str) -> Option<PathBuf> {
        DownloadManager::local_path(self, episode_id)
    }
}

/// File name for an episode: its id made filesystem-safe plus the audio
/// URL's extension, or `default_extension` when the URL has none.
pub fn file_name_for(episode: &Episode, default_extension: &str) -> String {
    let stem: String = episode
        .id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let extension = url_extension(&episode.audio_url).unwrap_or(default_extension);
    format!("{}.{}", stem, extension.to_ascii_lowercase())
}

fn url_extension(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next()?;
    let path = path.split_once("://").map_or(path, |(_, rest)| rest);
    let (_, last_segment) = path.rsplit_once('/')?;
    let (_, extension) = last_segment.rsplit_once('.')?;
    let valid = (1..=5).contains(&extension.len())
        && extension.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then_some(extension)
}
