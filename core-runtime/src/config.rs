//! # Core Configuration Module
//!
//! Provides configuration management for the Lectern core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds all host bridges and tunables for the core. It enforces
//! fail-fast validation so a missing capability is reported at startup rather
//! than on the first play or download.
//!
//! ## Required Dependencies
//!
//! - `AudioEngine` - The host audio engine (no default on any platform)
//! - `SettingsStore` - Durable key-value storage (desktop default: SQLite)
//! - `DownloadExecutor` - File transfer (desktop default: reqwest)
//!
//! ## Optional Dependencies
//!
//! - `HttpClient` - Remote feed-config fetch (desktop default: reqwest)
//! - `Clock` - Time source (default: system clock)
//!
//! When the `desktop-shims` feature is enabled, desktop-ready defaults for the
//! settings store, download executor and HTTP client are injected
//! automatically if not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, PlaybackSettings};
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .data_dir("/path/to/app-data")
//!     .audio_engine(Arc::new(MyEngine::new()))
//!     .settings_store(Arc::new(MySettingsStore))
//!     .download_executor(Arc::new(MyExecutor))
//!     .feed_config_url("https://example.com/feeds.json")
//!     .playback(PlaybackSettings::default().with_auto_play_next(false))
//!     .build()
//!     .expect("Failed to build config");
//! ```

use crate::error::{Error, Result};
use bridge_traits::{AudioEngine, Clock, DownloadExecutor, HttpClient, SettingsStore, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Slowest supported playback rate.
pub const MIN_PLAYBACK_SPEED: f32 = 0.25;
/// Fastest supported playback rate.
pub const MAX_PLAYBACK_SPEED: f32 = 2.0;

/// Returns `true` when `rate` is a supported playback speed.
pub fn is_valid_speed(rate: f32) -> bool {
    rate.is_finite() && (MIN_PLAYBACK_SPEED..=MAX_PLAYBACK_SPEED).contains(&rate)
}

/// How a "previous" command picks its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviousStrategy {
    /// Pop the play-history back-stack.
    History,
    /// The episode immediately preceding the current one in its show.
    Series,
}

/// Playback tunables.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSettings {
    /// Start the next queued episode when a track ends.
    pub auto_play_next: bool,
    pub skip_forward_ms: u64,
    pub skip_backward_ms: u64,
    /// "Previous" later than this into a track restarts it instead of navigating.
    pub restart_threshold_ms: u64,
    /// Also restart when the position sits exactly on the threshold.
    pub restart_at_threshold: bool,
    /// Period of the position autosave while playing.
    pub autosave_interval: Duration,
    pub default_speed: f32,
    /// Strategy for the in-app previous button.
    pub ui_previous: PreviousStrategy,
    /// Strategy for hardware / lock-screen previous.
    pub remote_previous: PreviousStrategy,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            auto_play_next: true,
            skip_forward_ms: 30_000,
            skip_backward_ms: 15_000,
            restart_threshold_ms: 3_000,
            restart_at_threshold: false,
            autosave_interval: Duration::from_secs(10),
            default_speed: 1.0,
            ui_previous: PreviousStrategy::History,
            remote_previous: PreviousStrategy::Series,
        }
    }
}

impl PlaybackSettings {
    pub fn with_auto_play_next(mut self, enabled: bool) -> Self {
        self.auto_play_next = enabled;
        self
    }

    pub fn with_skip_intervals(mut self, forward_ms: u64, backward_ms: u64) -> Self {
        self.skip_forward_ms = forward_ms;
        self.skip_backward_ms = backward_ms;
        self
    }

    pub fn with_restart_threshold(mut self, threshold_ms: u64, inclusive: bool) -> Self {
        self.restart_threshold_ms = threshold_ms;
        self.restart_at_threshold = inclusive;
        self
    }

    /// Whether "previous" at `position_ms` restarts the current track.
    pub fn restarts_at(&self, position_ms: u64) -> bool {
        if self.restart_at_threshold {
            position_ms >= self.restart_threshold_ms
        } else {
            position_ms > self.restart_threshold_ms
        }
    }

    pub fn with_autosave_interval(mut self, interval: Duration) -> Self {
        self.autosave_interval = interval;
        self
    }

    pub fn with_previous_strategies(mut self, ui: PreviousStrategy, remote: PreviousStrategy) -> Self {
        self.ui_previous = ui;
        self.remote_previous = remote;
        self
    }

    pub fn with_default_speed(mut self, speed: f32) -> Self {
        self.default_speed = speed;
        self
    }

    /// Validates the playback settings.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_speed(self.default_speed) {
            return Err(Error::Config(format!(
                "Default playback speed {} is outside {}..={}",
                self.default_speed, MIN_PLAYBACK_SPEED, MAX_PLAYBACK_SPEED
            )));
        }
        if self.autosave_interval.is_zero() {
            return Err(Error::Config(
                "Position autosave interval must be greater than zero".to_string(),
            ));
        }
        if self.skip_forward_ms == 0 || self.skip_backward_ms == 0 {
            return Err(Error::Config(
                "Skip intervals must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Download queue tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSettings {
    /// Minimum wall time between two intermediate progress updates.
    pub progress_interval: Duration,
    /// Extension used when the source URL does not carry one.
    pub default_extension: String,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            progress_interval: Duration::from_millis(500),
            default_extension: "mp3".to_string(),
        }
    }
}

impl DownloadSettings {
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }
}

/// Core configuration for the Lectern core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Directory for persistent application data (settings database).
    pub data_dir: PathBuf,

    /// Directory downloaded episodes are written to.
    pub download_dir: PathBuf,

    /// Remote feed configuration endpoint.
    pub feed_config_url: Option<String>,

    pub audio_engine: Arc<dyn AudioEngine>,

    pub settings_store: Arc<dyn SettingsStore>,

    pub download_executor: Arc<dyn DownloadExecutor>,

    pub http_client: Option<Arc<dyn HttpClient>>,

    pub clock: Arc<dyn Clock>,

    pub playback: PlaybackSettings,

    pub downloads: DownloadSettings,

    /// Capacity of the event bus channel.
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("data_dir", &self.data_dir)
            .field("download_dir", &self.download_dir)
            .field("feed_config_url", &self.feed_config_url)
            .field("audio_engine", &"AudioEngine { ... }")
            .field("settings_store", &"SettingsStore { ... }")
            .field("download_executor", &"DownloadExecutor { ... }")
            .field(
                "http_client",
                &self.http_client.as_ref().map(|_| "HttpClient { ... }"),
            )
            .field("playback", &self.playback)
            .field("downloads", &self.downloads)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(Error::Config("Data directory cannot be empty".to_string()));
        }

        if self.download_dir.as_os_str().is_empty() {
            return Err(Error::Config(
                "Download directory cannot be empty".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if let Some(url) = &self.feed_config_url {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(Error::Config(format!(
                    "Feed config URL must be http(s): {}",
                    url
                )));
            }
        }

        self.playback.validate()?;

        if self.downloads.progress_interval.is_zero() {
            return Err(Error::Config(
                "Download progress interval must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

fn audio_engine_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "AudioEngine".to_string(),
        message: "An AudioEngine implementation is required for playback. \
                 Mobile: inject the platform player adapter (AVPlayer/ExoPlayer). \
                 Desktop: inject the host mixer adapter."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn settings_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "SettingsStore".to_string(),
        message: "SettingsStore implementation is required for durable state. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default SqliteSettingsStore. \
                 Mobile: inject platform-native settings (UserDefaults/DataStore)."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn download_executor_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "DownloadExecutor".to_string(),
        message: "DownloadExecutor implementation is required for offline episodes. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default ReqwestDownloadExecutor. \
                 Mobile: inject the platform background-transfer adapter."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_settings_store(data_dir: &std::path::Path) -> Result<Arc<dyn SettingsStore>> {
    use bridge_desktop::SqliteSettingsStore;
    use std::thread;
    use tokio::runtime::{Handle, Runtime};

    let path = data_dir.join("settings.db");

    let init_store = |path: PathBuf| -> Result<_> {
        let runtime = Runtime::new().map_err(|e| Error::DefaultBridge {
            bridge: "SettingsStore",
            message: format!("no Tokio runtime: {}", e),
        })?;

        runtime
            .block_on(SqliteSettingsStore::new(path))
            .map_err(|e| Error::DefaultBridge {
                bridge: "SettingsStore",
                message: e.to_string(),
            })
    };

    // A runtime cannot be nested inside another one; build the pool on a
    // helper thread when we are already inside Tokio.
    let store = match Handle::try_current() {
        Ok(_) => thread::spawn(move || init_store(path))
            .join()
            .map_err(|_| Error::DefaultBridge {
                bridge: "SettingsStore",
                message: "worker thread panicked".to_string(),
            })??,
        Err(_) => init_store(path)?,
    };

    let store: Arc<dyn SettingsStore> = Arc::new(store);
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_settings_store(_data_dir: &std::path::Path) -> Result<Arc<dyn SettingsStore>> {
    Err(settings_store_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_download_executor(
    download_dir: &std::path::Path,
) -> Result<Arc<dyn DownloadExecutor>> {
    let executor = bridge_desktop::ReqwestDownloadExecutor::new(download_dir.to_path_buf())
        .map_err(|e| Error::DefaultBridge {
            bridge: "DownloadExecutor",
            message: e.to_string(),
        })?;
    Ok(Arc::new(executor))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_download_executor(
    _download_dir: &std::path::Path,
) -> Result<Arc<dyn DownloadExecutor>> {
    Err(download_executor_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Option<Arc<dyn HttpClient>> {
    match bridge_desktop::ReqwestHttpClient::new() {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::warn!(error = %e, "Default HTTP client unavailable");
            None
        }
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Option<Arc<dyn HttpClient>> {
    None
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    data_dir: Option<PathBuf>,
    download_dir: Option<PathBuf>,
    feed_config_url: Option<String>,
    audio_engine: Option<Arc<dyn AudioEngine>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    download_executor: Option<Arc<dyn DownloadExecutor>>,
    http_client: Option<Arc<dyn HttpClient>>,
    clock: Option<Arc<dyn Clock>>,
    playback: Option<PlaybackSettings>,
    downloads: Option<DownloadSettings>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the application data directory.
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder().data_dir("/path/to/data");
    /// ```
    pub fn data_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.data_dir = Some(path.into());
        self
    }

    /// Sets the download directory. Defaults to `<data_dir>/downloads`.
    pub fn download_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.download_dir = Some(path.into());
        self
    }

    pub fn feed_config_url(mut self, url: impl Into<String>) -> Self {
        self.feed_config_url = Some(url.into());
        self
    }

    pub fn audio_engine(mut self, engine: Arc<dyn AudioEngine>) -> Self {
        self.audio_engine = Some(engine);
        self
    }

    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    pub fn download_executor(mut self, executor: Arc<dyn DownloadExecutor>) -> Self {
        self.download_executor = Some(executor);
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn playback(mut self, settings: PlaybackSettings) -> Self {
        self.playback = Some(settings);
        self
    }

    pub fn downloads(mut self, settings: DownloadSettings) -> Self {
        self.downloads = Some(settings);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the final `CoreConfig`, validating all required dependencies.
    ///
    /// # Errors
    ///
    /// - `Error::Config` when the data directory is missing or a tunable is invalid
    /// - `Error::CapabilityMissing` when a required bridge is absent and no
    ///   platform default is available
    pub fn build(self) -> Result<CoreConfig> {
        let data_dir = self.data_dir.ok_or_else(|| {
            Error::Config(
                "Data directory is required. Use .data_dir() to set it.".to_string(),
            )
        })?;

        let download_dir = self
            .download_dir
            .unwrap_or_else(|| data_dir.join("downloads"));

        let audio_engine = self.audio_engine.ok_or_else(audio_engine_missing_error)?;

        let settings_store = match self.settings_store {
            Some(store) => store,
            None => provide_default_settings_store(&data_dir)?,
        };

        let download_executor = match self.download_executor {
            Some(executor) => executor,
            None => provide_default_download_executor(&download_dir)?,
        };

        let http_client = self.http_client.or_else(provide_default_http_client);

        let config = CoreConfig {
            data_dir,
            download_dir,
            feed_config_url: self.feed_config_url,
            audio_engine,
            settings_store,
            download_executor,
            http_client,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            playback: self.playback.unwrap_or_default(),
            downloads: self.downloads.unwrap_or_default(),
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::playback::{EngineEvent, EngineState, EngineTimings, LoadRequest};
    use bridge_traits::transfer::{ProgressCallback, TransferRequest};
    use std::path::Path;
    use tokio::sync::broadcast;
    use tokio_util::sync::CancellationToken;

    struct NullEngine {
        events: broadcast::Sender<EngineEvent>,
    }

    impl NullEngine {
        fn new() -> Self {
            Self {
                events: broadcast::channel(4).0,
            }
        }
    }

    #[async_trait]
    impl AudioEngine for NullEngine {
        async fn load(&self, _request: LoadRequest) -> BridgeResult<()> {
            Ok(())
        }
        async fn play(&self) -> BridgeResult<()> {
            Ok(())
        }
        async fn pause(&self) -> BridgeResult<()> {
            Ok(())
        }
        async fn resume(&self) -> BridgeResult<()> {
            Ok(())
        }
        async fn stop(&self) -> BridgeResult<()> {
            Ok(())
        }
        async fn seek_to(&self, _position_ms: u64) -> BridgeResult<()> {
            Ok(())
        }
        async fn seek_forward(&self, _offset_ms: u64) -> BridgeResult<()> {
            Ok(())
        }
        async fn seek_backward(&self, _offset_ms: u64) -> BridgeResult<()> {
            Ok(())
        }
        async fn set_speed(&self, _rate: f32) -> BridgeResult<()> {
            Ok(())
        }
        async fn state(&self) -> BridgeResult<EngineState> {
            Ok(EngineState::None)
        }
        async fn timings(&self) -> BridgeResult<EngineTimings> {
            Ok(EngineTimings::default())
        }
        fn events(&self) -> broadcast::Receiver<EngineEvent> {
            self.events.subscribe()
        }
    }

    struct NullStore;

    #[async_trait]
    impl SettingsStore for NullStore {
        async fn set_string(&self, _key: &str, _value: &str) -> BridgeResult<()> {
            Ok(())
        }
        async fn get_string(&self, _key: &str) -> BridgeResult<Option<String>> {
            Ok(None)
        }
        async fn set_bool(&self, _key: &str, _value: bool) -> BridgeResult<()> {
            Ok(())
        }
        async fn get_bool(&self, _key: &str) -> BridgeResult<Option<bool>> {
            Ok(None)
        }
        async fn set_f64(&self, _key: &str, _value: f64) -> BridgeResult<()> {
            Ok(())
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

    struct NullExecutor;

    #[async_trait]
    impl DownloadExecutor for NullExecutor {
        async fn transfer(
            &self,
            request: TransferRequest,
            _on_progress: ProgressCallback,
            _cancel: CancellationToken,
        ) -> BridgeResult<PathBuf> {
            Ok(PathBuf::from(request.file_name))
        }
        async fn delete_file(&self, _path: &Path) -> BridgeResult<()> {
            Ok(())
        }
        async fn delete_all(&self) -> BridgeResult<()> {
            Ok(())
        }
    }

    fn complete_builder() -> CoreConfigBuilder {
        CoreConfig::builder()
            .data_dir("/tmp/lectern")
            .audio_engine(Arc::new(NullEngine::new()))
            .settings_store(Arc::new(NullStore))
            .download_executor(Arc::new(NullExecutor))
    }

    #[test]
    fn test_builder_with_all_bridges() {
        let config = complete_builder()
            .feed_config_url("https://example.com/feeds.json")
            .build()
            .unwrap();

        assert_eq!(config.download_dir, PathBuf::from("/tmp/lectern/downloads"));
        assert_eq!(config.playback, PlaybackSettings::default());
        assert_eq!(config.downloads.progress_interval, Duration::from_millis(500));
        assert_eq!(
            config.feed_config_url.as_deref(),
            Some("https://example.com/feeds.json")
        );
    }

    #[test]
    fn test_missing_data_dir() {
        let result = CoreConfig::builder()
            .audio_engine(Arc::new(NullEngine::new()))
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_audio_engine_is_capability_error() {
        let result = CoreConfig::builder()
            .data_dir("/tmp/lectern")
            .settings_store(Arc::new(NullStore))
            .download_executor(Arc::new(NullExecutor))
            .build();

        match result {
            Err(Error::CapabilityMissing { capability, .. }) => {
                assert_eq!(capability, "AudioEngine")
            }
            other => panic!("expected CapabilityMissing, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_invalid_default_speed_rejected() {
        let result = complete_builder()
            .playback(PlaybackSettings::default().with_default_speed(3.0))
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_feed_url_rejected() {
        let result = complete_builder().feed_config_url("ftp://feeds").build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_playback_settings_builders() {
        let settings = PlaybackSettings::default()
            .with_auto_play_next(false)
            .with_skip_intervals(10_000, 5_000)
            .with_autosave_interval(Duration::from_secs(5))
            .with_previous_strategies(PreviousStrategy::Series, PreviousStrategy::History);

        assert!(!settings.auto_play_next);
        assert_eq!(settings.skip_forward_ms, 10_000);
        assert_eq!(settings.skip_backward_ms, 5_000);
        assert_eq!(settings.autosave_interval, Duration::from_secs(5));
        assert_eq!(settings.ui_previous, PreviousStrategy::Series);
        assert_eq!(settings.remote_previous, PreviousStrategy::History);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_restart_threshold_comparison() {
        let exclusive = PlaybackSettings::default();
        assert!(!exclusive.restarts_at(3_000));
        assert!(exclusive.restarts_at(3_001));

        let inclusive = PlaybackSettings::default().with_restart_threshold(5_000, true);
        assert!(!inclusive.restarts_at(4_999));
        assert!(inclusive.restarts_at(5_000));
    }

    #[test]
    fn test_speed_bounds() {
        assert!(is_valid_speed(0.25));
        assert!(is_valid_speed(2.0));
        assert!(!is_valid_speed(0.2));
        assert!(!is_valid_speed(2.5));
        assert!(!is_valid_speed(f32::NAN));
    }
}
