//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `SettingsStore` using a SQLite-backed key-value table
//! - `HttpClient` using `reqwest`
//! - `DownloadExecutor` streaming episodes to disk with `reqwest` + `tokio::fs`
//!
//! There is no desktop `AudioEngine`; hosts always inject their own player.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestDownloadExecutor, SqliteSettingsStore};
//!
//! #[tokio::main]
//! async fn main() -> bridge_traits::error::Result<()> {
//!     let data_dir = bridge_desktop::default_data_dir();
//!     let store = SqliteSettingsStore::new(data_dir.join("settings.db")).await?;
//!     let executor = ReqwestDownloadExecutor::new(data_dir.join("downloads"))?;
//!     // Hand both to CoreConfig::builder()
//!     Ok(())
//! }
//! ```

mod http;
mod settings;
mod transfer;

use std::path::PathBuf;

pub use http::ReqwestHttpClient;
pub use settings::SqliteSettingsStore;
pub use transfer::ReqwestDownloadExecutor;

/// Platform data directory for Lectern (`~/.local/share/lectern` on Linux).
///
/// Falls back to `./lectern` when the platform reports no data directory.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lectern")
}
