//! Helpers and types used across the crate

mod arena;
mod fmt;
mod instance;
pub mod time;

#[doc(hidden)]
pub use fmt::*;
/// Public API re-exported primitives.
pub use {
	arena::{Arena, Handle},
	instance::next_instance,
	time::{Clock, Ticks},
};
