//! Replicated room/game state machine for a "find the impostor" party game.
//!
//! There is no authoritative server: every client embeds this crate and
//! mutates a shared per-room document through a transactional [`store`].
//! Game transitions are pure functions over a room snapshot, executed inside
//! the store's transaction primitive, so concurrent clients issuing the same
//! correction converge instead of corrupting state.

pub mod catalog;
pub mod clock;
pub mod config;
pub mod engine;
mod error;
pub mod model;
pub mod rules;
pub mod store;

pub use error::GameError;
