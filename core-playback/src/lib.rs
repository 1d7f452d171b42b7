//! # Playback Coordination Module
//!
//! Governs what is playing, what plays next and where each episode left off.
//!
//! ## Overview
//!
//! - [`position`]: the Position Ledger, a durable map of per-episode offsets
//! - [`state`]: the session slice ([`PlayerState`]) with its durable and
//!   volatile halves
//! - [`queue`]: the Queue/History Ledger deriving next/previous transitions
//! - [`session`]: the [`PlaybackController`] driving the host audio engine
//! - [`dispatcher`]: the single engine-event listener
//! - [`autosave`]: periodic position persistence while playing
//!
//! All state lives in [`core_runtime::StateStore`] containers, so UI layers
//! subscribe to whole-slice updates rather than polling.

pub mod autosave;
pub mod dispatcher;
pub mod error;
pub mod position;
pub mod queue;
pub mod session;
pub mod state;

pub use autosave::PositionAutosave;
pub use dispatcher::EngineEventDispatcher;
pub use error::{PlaybackError, Result};
pub use position::{PositionLedger, SavedPosition};
pub use queue::QueueLedger;
pub use session::{PlaybackController, PreviousOutcome};
pub use state::{PlaybackStatus, PlayerState, QueueItem, SessionFlags};
