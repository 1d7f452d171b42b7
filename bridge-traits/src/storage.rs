//! Persistent Key-Value Storage
//!
//! Abstracts platform preferences storage used for serialized state blobs
//! (positions, queue/history, downloads) and user preferences:
//! - iOS: UserDefaults
//! - Android: SharedPreferences / DataStore
//! - Desktop: SQLite-backed store
//!
//! # Example
//!
//! ```ignore
//! use bridge_traits::storage::SettingsStore;
//!
//! async fn save_preference(store: &dyn SettingsStore) -> Result<()> {
//!     store.set_bool("playback.auto_play_next", true).await?;
//!     store.set_f64("playback.speed", 1.25).await?;
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{BridgeError, Result};

/// Key-value settings storage trait
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Store a boolean value
    async fn set_bool(&self, key: &str, value: bool) -> Result<()>;

    /// Retrieve a boolean value
    async fn get_bool(&self, key: &str) -> Result<Option<bool>>;

    /// Store a floating-point value
    async fn set_f64(&self, key: &str, value: f64) -> Result<()>;

    /// Retrieve a floating-point value
    async fn get_f64(&self, key: &str) -> Result<Option<f64>>;

    /// Delete a setting
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a setting exists
    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.get_string(key).await?.is_some())
    }

    /// List all setting keys
    async fn list_keys(&self) -> Result<Vec<String>>;
}

/// Serialize `value` as JSON and write it under `key`.
pub async fn save_json<T: Serialize + Sync>(
    store: &dyn SettingsStore,
    key: &str,
    value: &T,
) -> Result<()> {
    let json = serde_json::to_string(value)
        .map_err(|e| BridgeError::Storage(format!("Failed to serialize {}: {}", key, e)))?;
    store.set_string(key, &json).await
}

/// Read and deserialize the JSON blob stored under `key`.
///
/// Returns `Ok(None)` when the key is absent.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn SettingsStore,
    key: &str,
) -> Result<Option<T>> {
    match store.get_string(key).await? {
        Some(json) => serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| BridgeError::Storage(format!("Failed to deserialize {}: {}", key, e))),
        None => Ok(None),
    }
}
