use thiserror::Error;

use crate::store::StorageError;

/// Errors surfaced by room and game operations.
///
/// Every validation error is detected before any write, so a failed
/// operation never leaves a partially mutated room behind. Store-level
/// failures are wrapped in [`GameError::Store`] and must not be assumed to
/// have committed; retrying is safe because all transitions are idempotent.
#[derive(Debug, Error)]
pub enum GameError {
    /// No room document exists for the given code.
    #[error("room not found")]
    RoomNotFound,
    /// The room's TTL has elapsed; it is treated as nonexistent and deleted.
    #[error("room expired")]
    RoomExpired,
    /// The room is no longer accepting joins because a round is running.
    #[error("game already started")]
    GameAlreadyStarted,
    /// Another active player in the room already uses this name.
    #[error("name `{0}` is already taken")]
    NameTaken(String),
    /// Not enough eligible players to start a round.
    #[error("at least {needed} players are required, got {got}")]
    InsufficientPlayers {
        /// Minimum number of eligible players required.
        needed: usize,
        /// Number of eligible players currently in the room.
        got: usize,
    },
    /// No selectable category remains, or the selection yields no words.
    #[error("no categories selected")]
    NoCategoriesSelected,
    /// Vote target is the voter themself, dead, kicked, or departed.
    #[error("invalid vote target")]
    InvalidTarget,
    /// A host-only operation was attempted by a non-host player.
    #[error("operation requires host privileges")]
    NotHost,
    /// The underlying document store failed.
    #[error("store error")]
    Store(#[from] StorageError),
}
