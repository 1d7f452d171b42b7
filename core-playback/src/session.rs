//! Playback Session Controller
//!
//! Drives the host [`AudioEngine`] and reconciles what it reports into the
//! shared [`PlayerState`]. Commands originate from the UI (play, toggle,
//! seek, skip) and from the engine itself (state changes, progress, track
//! end, remote next/previous). Event handlers always read the controller's
//! own store, never a captured snapshot.
//!
//! ```text
//! Idle ──play──▶ Loading ──engine──▶ Playing ⇄ Paused
//!                   │                   │
//!                   └──error──▶ Error   └──stop──▶ Stopped
//! ```

use bridge_traits::playback::{
    AudioEngine, EngineEvent, EngineState, LoadRequest, PlaybackSource, TrackMetadata,
};
use bridge_traits::storage::SettingsStore;
use core_library::{DownloadIndex, Episode};
use core_runtime::config::{is_valid_speed, PlaybackSettings, PreviousStrategy};
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use core_runtime::StateStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{PlaybackError, Result};
use crate::position::PositionLedger;
use crate::queue::QueueLedger;
use crate::state::{PlaybackStatus, PlayerState, SessionFlags};

/// Settings key for the auto-play-next preference.
pub const AUTO_PLAY_NEXT_KEY: &str = "playback.auto_play_next";
/// Settings key for the preferred playback speed.
pub const PLAYBACK_SPEED_KEY: &str = "playback.speed";

/// What a "previous" command ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviousOutcome {
    /// Far enough into the track: restarted it from zero.
    Restarted,
    /// Moved to another episode.
    Navigated(Episode),
    /// Nothing to go back to.
    Unavailable,
}

pub struct PlaybackController {
    engine: Arc<dyn AudioEngine>,
    ledger: Arc<QueueLedger>,
    store: Arc<dyn SettingsStore>,
    downloads: Option<Arc<dyn DownloadIndex>>,
    event_bus: Option<Arc<EventBus>>,
    settings: PlaybackSettings,
    auto_play_next: AtomicBool,
}

impl PlaybackController {
    pub fn new(
        engine: Arc<dyn AudioEngine>,
        ledger: Arc<QueueLedger>,
        store: Arc<dyn SettingsStore>,
        settings: PlaybackSettings,
    ) -> Self {
        let auto_play_next = AtomicBool::new(settings.auto_play_next);
        Self {
            engine,
            ledger,
            store,
            downloads: None,
            event_bus: None,
            settings,
            auto_play_next,
        }
    }

    /// Prefer local files found through `index`.
    pub fn with_download_index(mut self, index: Arc<dyn DownloadIndex>) -> Self {
        self.downloads = Some(index);
        self
    }

    /// Set event bus for playback notifications.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Apply persisted user preferences (auto-play-next, speed).
    pub async fn restore_preferences(&self) {
        match self.store.get_bool(AUTO_PLAY_NEXT_KEY).await {
            Ok(Some(enabled)) => self.auto_play_next.store(enabled, Ordering::SeqCst),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to read auto-play preference"),
        }
        match self.store.get_f64(PLAYBACK_SPEED_KEY).await {
            Ok(Some(speed)) if is_valid_speed(speed as f32) => {
                self.state().update(|s| s.playback_speed = speed as f32);
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to read playback speed preference"),
        }
    }

    pub fn engine(&self) -> &Arc<dyn AudioEngine> {
        &self.engine
    }

    pub fn ledger(&self) -> &Arc<QueueLedger> {
        &self.ledger
    }

    pub fn state(&self) -> &Arc<StateStore<PlayerState>> {
        self.ledger.state()
    }

    fn positions(&self) -> &Arc<PositionLedger> {
        self.ledger.positions()
    }

    pub fn snapshot(&self) -> PlayerState {
        self.state().get()
    }

    pub fn settings(&self) -> &PlaybackSettings {
        &self.settings
    }

    pub fn auto_play_next(&self) -> bool {
        self.auto_play_next.load(Ordering::SeqCst)
    }

    pub async fn set_auto_play_next(&self, enabled: bool) {
        self.auto_play_next.store(enabled, Ordering::SeqCst);
        if let Err(e) = self.store.set_bool(AUTO_PLAY_NEXT_KEY, enabled).await {
            warn!(error = %e, "Failed to persist auto-play preference");
        }
    }

    // ------------------------------------------------------------------
    // UI commands
    // ------------------------------------------------------------------

    /// Start `episode`, resuming from its saved position unless
    /// `from_beginning`.
    ///
    /// The queue is refilled with the rest of the episode's show.
    #[instrument(skip(self, episode), fields(episode_id = %episode.id))]
    pub async fn play_episode(&self, episode: Episode, from_beginning: bool) -> Result<()> {
        self.mark_play_requested();
        self.ledger.set_current(episode.clone()).await;

        if let Some(rest) = self.ledger.rest_of_show(&episode) {
            self.ledger.set_queue(rest).await;
        }

        self.start_engine(&episode, from_beginning).await
    }

    /// Pause when playing; otherwise resume the loaded track or reload the
    /// current episode when the engine has nothing loaded.
    #[instrument(skip(self))]
    pub async fn toggle_play_pause(&self) -> Result<()> {
        let snapshot = self.snapshot();
        let current = snapshot
            .current_episode
            .clone()
            .ok_or(PlaybackError::NoEpisodeLoaded)?;

        if snapshot.flags.appears_playing() {
            return self.pause().await;
        }

        let engine_state = self.engine.state().await?;
        if engine_state.has_track_loaded() {
            self.mark_play_requested();
            if let Err(e) = self.engine.resume().await {
                self.fail(Some(&current.id), &e.to_string());
                return Err(e.into());
            }
            self.emit(PlaybackEvent::Resumed {
                episode_id: current.id,
                position_ms: snapshot.position_ms,
            });
            Ok(())
        } else {
            debug!(episode_id = %current.id, "Engine has nothing loaded, reloading");
            self.play_episode(current, false).await
        }
    }

    /// Pause and persist the current position.
    pub async fn pause(&self) -> Result<()> {
        let current = self
            .state()
            .read(|s| s.current_episode.clone())
            .ok_or(PlaybackError::NoEpisodeLoaded)?;

        self.engine.pause().await?;
        let position_ms = self.refresh_position().await;

        self.state().update(|s| {
            s.flags.is_playing = false;
            s.flags.is_play_requested = false;
            s.flags.is_loading = false;
            s.status = PlaybackStatus::Paused;
        });
        self.positions().save_position(&current.id, position_ms).await;
        self.ledger.persist().await;

        self.emit(PlaybackEvent::Paused {
            episode_id: current.id,
            position_ms,
        });
        Ok(())
    }

    /// Persist position, stop the engine and mark the session stopped.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<()> {
        let current = self.state().read(|s| s.current_episode.clone());
        let position_ms = match &current {
            Some(_) => self.refresh_position().await,
            None => 0,
        };
        if let Some(episode) = &current {
            self.positions().save_position(&episode.id, position_ms).await;
        }

        let result = self.engine.stop().await;
        self.state().update(|s| {
            s.flags = SessionFlags::default();
            s.status = PlaybackStatus::Stopped;
        });
        self.ledger.persist().await;
        result?;

        if let Some(episode) = current {
            self.emit(PlaybackEvent::Stopped {
                episode_id: episode.id,
                position_ms,
            });
        }
        Ok(())
    }

    pub async fn seek_to(&self, position_ms: u64) -> Result<()> {
        let episode_id = self.require_current()?;
        self.guard_seek();
        self.engine.seek_to(position_ms).await?;
        self.apply_seek(episode_id, |_, _| position_ms);
        Ok(())
    }

    pub async fn seek_forward(&self, offset_ms: u64) -> Result<()> {
        let episode_id = self.require_current()?;
        self.guard_seek();
        self.engine.seek_forward(offset_ms).await?;
        self.apply_seek(episode_id, |position, duration| {
            let target = position.saturating_add(offset_ms);
            if duration > 0 {
                target.min(duration)
            } else {
                target
            }
        });
        Ok(())
    }

    pub async fn seek_backward(&self, offset_ms: u64) -> Result<()> {
        let episode_id = self.require_current()?;
        self.guard_seek();
        self.engine.seek_backward(offset_ms).await?;
        self.apply_seek(episode_id, |position, _| position.saturating_sub(offset_ms));
        Ok(())
    }

    /// Jump forward by the configured skip interval.
    pub async fn jump_forward(&self) -> Result<()> {
        self.seek_forward(self.settings.skip_forward_ms).await
    }

    /// Jump backward by the configured skip interval.
    pub async fn jump_backward(&self) -> Result<()> {
        self.seek_backward(self.settings.skip_backward_ms).await
    }

    /// Change the playback rate (0.25 to 2.0).
    pub async fn set_speed(&self, rate: f32) -> Result<()> {
        if !is_valid_speed(rate) {
            return Err(PlaybackError::InvalidSpeed(rate));
        }

        if self.engine.state().await?.has_track_loaded() {
            self.engine.set_speed(rate).await?;
        }

        self.state().update(|s| s.playback_speed = rate);
        if let Err(e) = self.store.set_f64(PLAYBACK_SPEED_KEY, rate as f64).await {
            warn!(error = %e, "Failed to persist playback speed");
        }
        self.ledger.persist().await;
        self.emit(PlaybackEvent::SpeedChanged { speed: rate });
        Ok(())
    }

    /// Advance to the queue head. `Ok(None)` with an empty queue.
    #[instrument(skip(self))]
    pub async fn skip_next(&self) -> Result<Option<Episode>> {
        match self.ledger.play_next().await {
            Some(next) => {
                self.mark_play_requested();
                self.start_engine(&next, false).await?;
                Ok(Some(next))
            }
            None => {
                debug!("Queue empty, next ignored");
                Ok(None)
            }
        }
    }

    /// "Previous" from the in-app controls.
    pub async fn skip_previous(&self) -> Result<PreviousOutcome> {
        self.previous(self.settings.ui_previous).await
    }

    /// Restart the current track when past the restart threshold, otherwise
    /// navigate back using `strategy`.
    #[instrument(skip(self))]
    pub async fn previous(&self, strategy: PreviousStrategy) -> Result<PreviousOutcome> {
        let (has_current, position_ms) = self
            .state()
            .read(|s| (s.current_episode.is_some(), s.position_ms));

        if has_current && self.settings.restarts_at(position_ms) {
            debug!(position_ms, "Restarting current track");
            self.seek_to(0).await?;
            return Ok(PreviousOutcome::Restarted);
        }

        let target = match strategy {
            PreviousStrategy::History => self.ledger.play_previous().await,
            PreviousStrategy::Series => self.ledger.play_previous_in_series().await,
        };

        match target {
            Some(episode) => {
                self.mark_play_requested();
                self.start_engine(&episode, false).await?;
                Ok(PreviousOutcome::Navigated(episode))
            }
            None => Ok(PreviousOutcome::Unavailable),
        }
    }

    /// Persist the current position if the session is playing.
    ///
    /// Called by the autosave task; a stale `episode_id` is ignored.
    pub async fn autosave(&self, episode_id: &str) {
        let position = self.state().read(|s| {
            (s.flags.is_playing && s.is_current(episode_id)).then_some(s.position_ms)
        });
        if let Some(position_ms) = position {
            self.positions().save_position(episode_id, position_ms).await;
            self.ledger.persist().await;
        }
    }

    // ------------------------------------------------------------------
    // Engine events
    // ------------------------------------------------------------------

    /// Reconcile one engine event. Errors are logged, never returned.
    pub async fn handle_engine_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::StateChanged(engine_state) => self.apply_engine_state(engine_state),
            EngineEvent::Progress {
                position_ms,
                duration_ms,
            } => {
                self.state().update(|s| {
                    if s.current_episode.is_some() {
                        s.position_ms = position_ms;
                        if duration_ms > 0 {
                            s.duration_ms = duration_ms;
                        }
                    }
                });
            }
            EngineEvent::TrackEnded { episode_id } => {
                if let Err(e) = self.handle_track_ended(episode_id).await {
                    error!(error = %e, "Failed to advance after track end");
                }
            }
            EngineEvent::PlaybackError { message } => {
                let current = self.state().read(|s| s.current_id().map(str::to_string));
                error!(episode_id = ?current, %message, "Engine reported playback error");
                self.fail(current.as_deref(), &message);
            }
            EngineEvent::RemoteNext => {
                if let Err(e) = self.skip_next().await {
                    warn!(error = %e, "Remote next failed");
                }
            }
            EngineEvent::RemotePrevious => {
                if let Err(e) = self.previous(self.settings.remote_previous).await {
                    warn!(error = %e, "Remote previous failed");
                }
            }
        }
    }

    /// The engine finished a track.
    ///
    /// The finished episode restarts from zero next time. With auto-play
    /// enabled the queue head starts immediately. Events naming an episode
    /// other than the current one are stale deliveries and are ignored.
    pub async fn handle_track_ended(&self, episode_id: Option<String>) -> Result<()> {
        let Some(current) = self.state().read(|s| s.current_episode.clone()) else {
            debug!("Track ended with no current episode");
            return Ok(());
        };
        if let Some(ended) = &episode_id {
            if *ended != current.id {
                debug!(ended = %ended, current = %current.id, "Ignoring stale track end");
                return Ok(());
            }
        }

        info!(episode_id = %current.id, "Track ended");
        self.positions().clear_saved_position(&current.id).await;
        let has_next = self.state().update(|s| {
            s.position_ms = 0;
            s.flags = SessionFlags::default();
            s.status = PlaybackStatus::Stopped;
            !s.queue.is_empty()
        });
        self.emit(PlaybackEvent::TrackEnded {
            episode_id: current.id.clone(),
        });

        if self.auto_play_next() && has_next {
            self.skip_next().await?;
        } else {
            self.ledger.persist().await;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Load `episode` into the engine with autoplay.
    async fn start_engine(&self, episode: &Episode, from_beginning: bool) -> Result<()> {
        let local_path = self
            .downloads
            .as_ref()
            .and_then(|index| index.local_path(&episode.id));
        let from_download = local_path.is_some();
        let source = match local_path {
            Some(path) => PlaybackSource::LocalFile { path },
            None => PlaybackSource::RemoteStream {
                url: episode.audio_url.clone(),
            },
        };

        let start_position_ms = if from_beginning {
            0
        } else {
            self.positions().get_saved_position(&episode.id)
        };

        let speed = self.state().update(|s| {
            s.position_ms = start_position_ms;
            s.duration_ms = episode.duration_ms();
            s.flags.is_loading = true;
            s.flags.is_play_requested = true;
            s.status = PlaybackStatus::Loading;
            s.playback_speed
        });

        let request = LoadRequest {
            source,
            start_position_ms,
            speed,
            autoplay: true,
            metadata: self.metadata_for(episode),
        };

        if let Err(e) = self.engine.load(request).await {
            error!(episode_id = %episode.id, error = %e, "Engine failed to load episode");
            self.fail(Some(&episode.id), &e.to_string());
            return Err(e.into());
        }

        info!(
            episode_id = %episode.id,
            start_position_ms,
            from_download,
            "Playback started"
        );
        self.emit(PlaybackEvent::Started {
            episode_id: episode.id.clone(),
            title: episode.title.clone(),
            start_position_ms,
            from_download,
        });
        Ok(())
    }

    fn metadata_for(&self, episode: &Episode) -> TrackMetadata {
        let show = self.ledger.catalog().show_by_id(&episode.show_id);
        TrackMetadata {
            episode_id: episode.id.clone(),
            title: episode.title.clone(),
            artist: show.as_ref().map(|s| s.title.clone()),
            artwork_url: episode
                .image_url
                .clone()
                .or_else(|| show.and_then(|s| s.image_url)),
            duration_ms: (episode.duration_secs > 0).then(|| episode.duration_ms()),
        }
    }

    fn apply_engine_state(&self, engine_state: EngineState) {
        debug!(?engine_state, "Engine state changed");
        self.state().update(|s| match engine_state {
            EngineState::Playing => {
                s.flags = SessionFlags {
                    is_playing: true,
                    ..SessionFlags::default()
                };
                s.status = PlaybackStatus::Playing;
            }
            EngineState::Paused => {
                s.flags = SessionFlags::default();
                s.status = PlaybackStatus::Paused;
            }
            EngineState::Loading => {
                s.flags.is_loading = true;
                s.status = PlaybackStatus::Loading;
            }
            EngineState::Buffering => {
                s.flags.is_buffering = true;
            }
            EngineState::Ready => {
                s.flags.is_loading = false;
                s.flags.is_buffering = false;
            }
            EngineState::Stopped | EngineState::Ended => {
                s.flags = SessionFlags::default();
                s.status = PlaybackStatus::Stopped;
            }
            EngineState::None => {
                s.flags = SessionFlags::default();
                s.status = PlaybackStatus::Idle;
            }
            EngineState::Error => {
                s.flags = SessionFlags::default();
                s.status = PlaybackStatus::Error;
            }
        });
    }

    fn mark_play_requested(&self) {
        self.state().update(|s| s.flags.is_play_requested = true);
    }

    /// Bridge the engine's brief loading blip during a seek.
    fn guard_seek(&self) {
        self.state().update(|s| {
            if s.flags.is_playing {
                s.flags.is_play_requested = true;
            }
        });
    }

    fn apply_seek(&self, episode_id: String, target: impl FnOnce(u64, u64) -> u64) {
        let (position_ms, duration_ms) = self.state().update(|s| {
            s.position_ms = target(s.position_ms, s.duration_ms);
            (s.position_ms, s.duration_ms)
        });
        self.emit(PlaybackEvent::PositionChanged {
            episode_id,
            position_ms,
            duration_ms,
        });
    }

    /// Ask the engine for the live position, falling back to the last
    /// reported one.
    async fn refresh_position(&self) -> u64 {
        match self.engine.timings().await {
            Ok(timings) => self.state().update(|s| {
                s.position_ms = timings.position_ms;
                if timings.duration_ms > 0 {
                    s.duration_ms = timings.duration_ms;
                }
                s.position_ms
            }),
            Err(e) => {
                warn!(error = %e, "Engine timings unavailable");
                self.state().read(|s| s.position_ms)
            }
        }
    }

    fn require_current(&self) -> Result<String> {
        self.state()
            .read(|s| s.current_id().map(str::to_string))
            .ok_or(PlaybackError::NoEpisodeLoaded)
    }

    /// Clear transient flags after an engine failure. Queue and history are
    /// left untouched.
    fn fail(&self, episode_id: Option<&str>, message: &str) {
        self.state().update(|s| {
            s.flags = SessionFlags::default();
            s.status = PlaybackStatus::Error;
        });
        self.emit(PlaybackEvent::Error {
            episode_id: episode_id.map(str::to_string),
            message: message.to_string(),
        });
    }

    fn emit(&self, event: PlaybackEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Playback(event));
        }
    }
}
