//! Remote feed configuration
//!
//! The list of feeds the app syncs is fetched from a remote JSON document.
//! The fetch is best-effort: a successful response is cached verbatim in the
//! settings store, and a failed fetch falls back to that cache with the
//! result marked offline.

use bridge_traits::http::{HttpClient, HttpRequest};
use bridge_traits::storage::SettingsStore;
use core_runtime::events::{CatalogEvent, CoreEvent, EventBus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{LibraryError, Result};

/// Settings key holding the last successfully fetched config document.
pub const FEED_CONFIG_CACHE_KEY: &str = "lectern.feed_config";

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// One feed the catalog should sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeedConfig {
    pub feeds: Vec<FeedSource>,
}

impl FeedConfig {
    /// Parse and validate a config document.
    pub fn parse(raw: &str) -> Result<Self> {
        let config: FeedConfig =
            serde_json::from_str(raw).map_err(|e| LibraryError::MalformedConfig(e.to_string()))?;

        for feed in &config.feeds {
            if feed.id.trim().is_empty() || feed.url.trim().is_empty() {
                return Err(LibraryError::InvalidInput {
                    field: "feeds".to_string(),
                    message: format!("feed entry '{}' needs both id and url", feed.id),
                });
            }
        }
        Ok(config)
    }
}

/// A resolved config and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedFeedConfig {
    pub config: FeedConfig,
    /// `true` when served from the offline cache.
    pub offline: bool,
}

pub struct FeedConfigLoader {
    store: Arc<dyn SettingsStore>,
    http_client: Option<Arc<dyn HttpClient>>,
    url: Option<String>,
    event_bus: Option<Arc<EventBus>>,
}

impl FeedConfigLoader {
    pub fn new(
        store: Arc<dyn SettingsStore>,
        http_client: Option<Arc<dyn HttpClient>>,
        url: Option<String>,
    ) -> Self {
        Self {
            store,
            http_client,
            url,
            event_bus: None,
        }
    }

    /// Set event bus for load notifications.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Resolve the feed config, preferring the remote document.
    ///
    /// # Errors
    ///
    /// [`LibraryError::ConfigUnavailable`] when the fetch fails and nothing
    /// usable is cached.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<LoadedFeedConfig> {
        let loaded = match self.fetch_remote().await {
            Ok((config, raw)) => {
                if let Err(e) = self.store.set_string(FEED_CONFIG_CACHE_KEY, &raw).await {
                    warn!(error = %e, "Failed to cache feed config");
                }
                LoadedFeedConfig {
                    config,
                    offline: false,
                }
            }
            Err(fetch_error) => {
                warn!(error = %fetch_error, "Remote feed config unavailable, using cache");
                match self.load_cached().await {
                    Some(config) => LoadedFeedConfig {
                        config,
                        offline: true,
                    },
                    None => {
                        return Err(LibraryError::ConfigUnavailable(fetch_error.to_string()))
                    }
                }
            }
        };

        info!(
            feeds = loaded.config.feeds.len(),
            offline = loaded.offline,
            "Feed config loaded"
        );
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Catalog(CatalogEvent::ConfigLoaded {
                feed_count: loaded.config.feeds.len(),
                offline: loaded.offline,
            }));
        }
        Ok(loaded)
    }

    async fn fetch_remote(&self) -> Result<(FeedConfig, String)> {
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| LibraryError::ConfigUnavailable("no feed config URL".to_string()))?;
        let client = self
            .http_client
            .as_ref()
            .ok_or_else(|| LibraryError::ConfigUnavailable("no HTTP client".to_string()))?;

        debug!(url = url, "Fetching feed config");
        let response = client
            .execute(HttpRequest::get(url).timeout(FETCH_TIMEOUT))
            .await?;

        if !response.is_success() {
            return Err(LibraryError::ConfigUnavailable(format!(
                "HTTP {} from feed config endpoint",
                response.status
            )));
        }

        let raw = response.text()?;
        let config = FeedConfig::parse(&raw)?;
        Ok((config, raw))
    }

    async fn load_cached(&self) -> Option<FeedConfig> {
        let raw = match self.store.get_string(FEED_CONFIG_CACHE_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read cached feed config");
                return None;
            }
        };

        match FeedConfig::parse(&raw) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!(error = %e, "Cached feed config is corrupt");
                None
            }
        }
    }
}
