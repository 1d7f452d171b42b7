//! # Library Module
//!
//! Owns the show/episode data model and the read-side contracts the playback
//! and download layers consume.
//!
//! ## Overview
//!
//! - [`models`]: `Show`, `Episode`, `DownloadedEpisode`
//! - [`catalog`]: the [`FeedCatalog`] lookup contract, the in-memory
//!   [`EpisodeCatalog`], and the [`DownloadIndex`] used to prefer local files
//! - [`feed_config`]: best-effort fetch of the remote feed list with an
//!   offline fallback

pub mod catalog;
pub mod error;
pub mod feed_config;
pub mod models;

pub use catalog::{DownloadIndex, EpisodeCatalog, FeedCatalog};
pub use error::{LibraryError, Result};
pub use feed_config::{FeedConfig, FeedConfigLoader, FeedSource, LoadedFeedConfig};
pub use models::{DownloadedEpisode, Episode, Show};
