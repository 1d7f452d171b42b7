//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the Lectern core and the
//! platform-specific collaborators it drives. The core never talks to an audio
//! engine, a file-transfer API or a key-value store directly; it talks to the
//! traits below, and each host (desktop, iOS, Android) ships adapters for them.
//!
//! ## Traits
//!
//! ### Playback
//! - [`AudioEngine`](playback::AudioEngine) - Load/play/pause/seek commands plus
//!   a typed [`EngineEvent`](playback::EngineEvent) stream
//!
//! ### Downloads & I/O
//! - [`DownloadExecutor`](transfer::DownloadExecutor) - Cancelable file transfer
//!   with progress callbacks, file and directory deletion
//! - [`HttpClient`](http::HttpClient) - Best-effort HTTP fetches (feed config)
//!
//! ### Storage
//! - [`SettingsStore`](storage::SettingsStore) - Persistent key-value storage
//!   for serialized state blobs and user preferences
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Platform
//! implementations should convert platform-specific errors to `BridgeError`
//! and include context (file paths, URLs) in the message.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so adapters can be shared across
//! async tasks behind an `Arc`.

pub mod error;
pub mod http;
pub mod playback;
pub mod storage;
pub mod time;
pub mod transfer;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use playback::{
    AudioEngine, EngineEvent, EngineState, EngineTimings, LoadRequest, PlaybackSource,
    TrackMetadata,
};
pub use storage::SettingsStore;
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
pub use transfer::{DownloadExecutor, ProgressCallback, TransferProgress, TransferRequest};
