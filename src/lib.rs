//! Lectern workspace umbrella crate.
//!
//! Re-exports [`core_service`] behind the `desktop-shims` feature so hosts can
//! depend on a single crate and get the desktop bridge defaults wired in.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
