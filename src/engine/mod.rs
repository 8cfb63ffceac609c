//! Room engine: every room/game operation, expressed as store transactions.
//!
//! The engine owns no live game state of its own. Each operation loads the
//! room document, applies a pure transition and commits the result in one
//! atomic step, so any number of engine instances (one per client, in the
//! serverless deployment this models) can safely act on the same room.

mod lifecycle;
mod membership;
mod presence;
mod reactor;
mod session;
mod voting;

pub use lifecycle::{
    RoomSettings, create_room, delete_room, join_room, subscribe_to_room, update_settings,
};
pub use membership::{DepartKind, RemovalReport, remove_player};
pub use presence::{PruneReport, heartbeat, prune_inactive_players, transfer_host};
pub use reactor::RoomClient;
pub use session::{back_to_lobby, start_game};
pub use voting::{
    cast_vote, eliminate_and_continue, force_game_over, initiate_voting, repeat_vote,
    reveal_results,
};

use std::sync::Arc;

use crate::GameError;
use crate::catalog::Catalog;
use crate::clock::{Clock, SystemClock};
use crate::config::Tunables;
use crate::model::Room;
use crate::store::{RoomStore, TxOutcome};

/// Shareable handle to the engine.
pub type SharedEngine = Arc<RoomEngine>;

/// Stateless executor of room operations against a [`RoomStore`].
pub struct RoomEngine {
    store: Arc<dyn RoomStore>,
    catalog: Arc<Catalog>,
    tunables: Tunables,
    clock: Arc<dyn Clock>,
}

impl RoomEngine {
    /// Build an engine with default tunables and the system clock.
    pub fn new(store: Arc<dyn RoomStore>, catalog: Arc<Catalog>) -> Self {
        Self::with_parts(store, catalog, Tunables::default(), Arc::new(SystemClock))
    }

    /// Build an engine with explicit tunables and clock.
    pub fn with_parts(
        store: Arc<dyn RoomStore>,
        catalog: Arc<Catalog>,
        tunables: Tunables,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            catalog,
            tunables,
            clock,
        }
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn RoomStore> {
        &self.store
    }

    /// The static word/avatar catalog.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Timing knobs this engine runs with.
    pub fn tunables(&self) -> &Tunables {
        &self.tunables
    }

    pub(crate) fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Unwrap a transaction outcome where deletion means the room expired.
    pub(crate) fn committed(
        outcome: Result<TxOutcome, GameError>,
    ) -> Result<Room, GameError> {
        match outcome? {
            TxOutcome::Committed(room) => Ok(room),
            TxOutcome::Deleted => Err(GameError::RoomExpired),
            TxOutcome::Unchanged => Err(GameError::RoomNotFound),
        }
    }
}

/// Expiry guard used at the top of most transactions: an expired document is
/// deleted on sight and reads as nonexistent.
pub(crate) fn live_room(
    doc: Option<Room>,
    now: u64,
) -> Result<Result<Room, ExpiredRoom>, GameError> {
    match doc {
        None => Err(GameError::RoomNotFound),
        Some(room) if room.is_expired(now) => Ok(Err(ExpiredRoom)),
        Some(room) => Ok(Ok(room)),
    }
}

/// Marker telling the caller to return [`crate::store::TxUpdate::Delete`].
pub(crate) struct ExpiredRoom;
