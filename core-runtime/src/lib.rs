//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the Lectern core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//! - Observable state containers
//! - Progress rate limiting
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the playback, download and
//! service crates depend on. It establishes the logging conventions, the
//! event broadcasting mechanism and the subscribe/notify state model used
//! throughout the system.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod store;
pub mod throttle;

pub use error::{Error, Result};
pub use store::StateStore;
pub use throttle::ProgressThrottle;
