//! # Download Module
//!
//! Offline episode downloads for the Lectern core.
//!
//! ## Overview
//!
//! - [`manager`]: the [`DownloadManager`], a strictly serial pump over a FIFO
//!   queue with throttled progress, cooperative cancellation and cleanup
//! - [`state`]: the download slice with its durable and volatile halves
//!
//! The manager implements [`core_library::DownloadIndex`], so the playback
//! controller can prefer local files without depending on this crate.

pub mod error;
pub mod manager;
pub mod state;

pub use error::{DownloadError, Result};
pub use manager::{file_name_for, DownloadManager};
pub use state::{DownloadProgress, DownloadState, DownloadStatus, DOWNLOADS_KEY};
