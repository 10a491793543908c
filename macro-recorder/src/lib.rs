//! Keyboard and mouse macro recorder
//!
//! This crate records global keyboard and mouse input into a timed event log
//! and replays it with the original cadence, optionally scaled by a speed
//! multiplier. Both recording and playback end on the abort key (ESC).
//!
//! Macros are stored as JSON arrays of records carrying a `dt` delay in
//! seconds, a `kind` and the kind's payload; older files using absolute `t`
//! timestamps are normalized when loaded.

pub mod countdown;
pub mod error;
pub mod events;
pub mod hotkey;
pub mod input;
mod normalize;
pub mod player;
pub mod recorder;
pub mod session;

pub use error::*;
pub use events::*;
pub use normalize::legacy_key;
pub use player::*;
pub use recorder::*;
pub use session::{run_macro, run_macro_with};

#[cfg(test)]
mod tests;
