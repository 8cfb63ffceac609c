//! Abstraction over the shared room document store.
//!
//! All game semantics live above this layer as pure closures executed inside
//! [`RoomStore::transact`]; a backend only has to provide atomic
//! read-modify-write per room code and change notification.

pub mod memory;

use std::error::Error;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::GameError;
use crate::model::{Room, RoomCode};

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not serve the request.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Human readable context for the failure.
        message: String,
        /// Underlying backend error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A create hit an already-occupied room code.
    #[error("room code already in use: {code}")]
    CodeInUse {
        /// The colliding code.
        code: RoomCode,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}

/// What a transaction closure wants done with the room document.
#[derive(Debug)]
pub enum TxUpdate {
    /// Persist this snapshot as the new document.
    Write(Room),
    /// Delete the document (expiry, last player gone).
    Delete,
    /// Leave the document untouched.
    Keep,
}

/// What a committed transaction actually did.
#[derive(Debug)]
pub enum TxOutcome {
    /// A new snapshot was written; subscribers have been notified.
    Committed(Room),
    /// The document was deleted; subscribers saw [`RoomSignal::Gone`].
    Deleted,
    /// Nothing changed.
    Unchanged,
}

/// Transaction body: receives the current document (or `None` when absent)
/// and decides the update. Must be pure in the backend's sense; a backend is
/// free to re-run it on contention.
pub type TxFn = Box<dyn FnOnce(Option<Room>) -> Result<TxUpdate, GameError> + Send>;

/// Change feed signal for one room.
#[derive(Debug, Clone)]
pub enum RoomSignal {
    /// A committed snapshot of the document.
    Snapshot(Room),
    /// The document was deleted or never existed.
    Gone,
}

/// Subscription handle for a single room's change feed.
///
/// The first signal reflects the state at subscription time and is delivered
/// deterministically; later signals follow commits. Dropping the watch
/// unsubscribes.
pub struct RoomWatch {
    first: Option<RoomSignal>,
    rx: broadcast::Receiver<RoomSignal>,
}

impl RoomWatch {
    pub(crate) fn new(first: RoomSignal, rx: broadcast::Receiver<RoomSignal>) -> Self {
        Self {
            first: Some(first),
            rx,
        }
    }

    /// Next signal, or `None` once the store has dropped the feed.
    ///
    /// A slow receiver may miss intermediate snapshots; only the latest state
    /// matters, so lagged gaps are skipped silently.
    pub async fn recv(&mut self) -> Option<RoomSignal> {
        if let Some(first) = self.first.take() {
            return Some(first);
        }
        loop {
            match self.rx.recv().await {
                Ok(signal) => return Some(signal),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Abstraction over the replicated per-room document store.
pub trait RoomStore: Send + Sync {
    /// Create a new room document, failing with [`StorageError::CodeInUse`]
    /// if the code is already occupied.
    fn create(&self, room: Room) -> BoxFuture<'static, StorageResult<()>>;

    /// Fetch the current document, `None` when absent.
    fn find(&self, code: RoomCode) -> BoxFuture<'static, StorageResult<Option<Room>>>;

    /// Run `tx` atomically against the document for `code`.
    fn transact(
        &self,
        code: RoomCode,
        tx: TxFn,
    ) -> BoxFuture<'static, StorageResult<Result<TxOutcome, GameError>>>;

    /// Delete the document unconditionally, notifying subscribers.
    fn delete(&self, code: RoomCode) -> BoxFuture<'static, StorageResult<()>>;

    /// Subscribe to the document's change feed.
    fn subscribe(&self, code: RoomCode) -> BoxFuture<'static, StorageResult<RoomWatch>>;
}
