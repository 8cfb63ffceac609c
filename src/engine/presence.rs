//! Liveness: heartbeats, pruning of silent players, host transfer.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::info;

use super::RoomEngine;
use crate::GameError;
use crate::model::{PlayerId, Room, RoomCode};
use crate::rules::{self, DepartReason, RemovalEffect};
use crate::store::{TxOutcome, TxUpdate};

/// What a prune pass removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Players removed for exceeding the liveness threshold.
    pub removed: Vec<PlayerId>,
    /// The room was deleted because nobody active remained.
    pub room_deleted: bool,
    /// Host succession ran and elected this player.
    pub new_host: Option<PlayerId>,
}

/// Refresh the caller's `last_seen_at`. Quietly does nothing when the room
/// or player is gone; liveness writes must never error a client out.
pub async fn heartbeat(
    engine: &RoomEngine,
    code: RoomCode,
    player: PlayerId,
) -> Result<(), GameError> {
    let now = engine.now_ms();

    engine
        .store()
        .transact(
            code,
            Box::new(move |doc| {
                let mut room = match doc {
                    None => return Ok(TxUpdate::Keep),
                    Some(room) if room.is_expired(now) => return Ok(TxUpdate::Delete),
                    Some(room) => room,
                };
                match room.player_mut(player) {
                    Some(p) if p.is_active() => {
                        p.last_seen_at = now;
                        Ok(TxUpdate::Write(room))
                    }
                    _ => Ok(TxUpdate::Keep),
                }
            }),
        )
        .await??;
    Ok(())
}

/// Remove every active player whose heartbeat is older than the prune
/// threshold. The acting player is never pruned by their own pass, so a
/// client with a slow clock cannot evict itself.
pub async fn prune_inactive_players(
    engine: &RoomEngine,
    code: RoomCode,
    actor: PlayerId,
) -> Result<PruneReport, GameError> {
    let now = engine.now_ms();
    let threshold = engine.tunables().prune_threshold_ms();
    let report_cell: Arc<Mutex<PruneReport>> = Arc::new(Mutex::new(PruneReport::default()));
    let report_in_tx = report_cell.clone();

    let outcome = engine
        .store()
        .transact(
            code.clone(),
            Box::new(move |doc| {
                let mut room = match doc {
                    None => return Ok(TxUpdate::Keep),
                    Some(room) if room.is_expired(now) => return Ok(TxUpdate::Delete),
                    Some(room) => room,
                };

                let stale: Vec<PlayerId> = room
                    .active_players()
                    .filter(|p| p.id != actor && now.saturating_sub(p.last_seen_at) > threshold)
                    .map(|p| p.id)
                    .collect();
                if stale.is_empty() {
                    return Ok(TxUpdate::Keep);
                }

                match rules::remove_players(&mut room, &stale, DepartReason::Leave, None, now) {
                    RemovalEffect::Unchanged => Ok(TxUpdate::Keep),
                    RemovalEffect::RoomEmpty => {
                        *report_in_tx.lock().unwrap_or_else(PoisonError::into_inner) =
                            PruneReport {
                                removed: stale,
                                room_deleted: true,
                                new_host: None,
                            };
                        Ok(TxUpdate::Delete)
                    }
                    RemovalEffect::Updated { new_host } => {
                        *report_in_tx.lock().unwrap_or_else(PoisonError::into_inner) =
                            PruneReport {
                                removed: stale,
                                room_deleted: false,
                                new_host,
                            };
                        if let Some(forced) = rules::abandonment_outcome(&room) {
                            crate::engine::voting::force_outcome_in_place(&mut room, forced);
                        }
                        Ok(TxUpdate::Write(room))
                    }
                }
            }),
        )
        .await??;

    let report = report_cell
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    if !matches!(outcome, TxOutcome::Unchanged) && !report.removed.is_empty() {
        info!(code = %code, removed = report.removed.len(), "pruned silent players");
    }
    Ok(report)
}

/// Hand the host seat to another active player. Host-only; an absent,
/// kicked or departed target quietly leaves the room untouched, matching
/// the stale-client tolerance of the voting path.
pub async fn transfer_host(
    engine: &RoomEngine,
    code: RoomCode,
    actor: PlayerId,
    target: PlayerId,
) -> Result<Room, GameError> {
    let now = engine.now_ms();

    let outcome = engine
        .store()
        .transact(
            code.clone(),
            Box::new(move |doc| {
                let mut room = match doc {
                    None => return Err(GameError::RoomNotFound),
                    Some(room) if room.is_expired(now) => return Ok(TxUpdate::Delete),
                    Some(room) => room,
                };
                if !room.is_host(actor) {
                    return Err(GameError::NotHost);
                }
                if room.player(target).is_none_or(|p| !p.is_active()) {
                    return Ok(TxUpdate::Keep);
                }
                room.host = target;
                for p in &mut room.players {
                    p.is_host = p.id == target;
                }
                Ok(TxUpdate::Write(room))
            }),
        )
        .await?;

    match outcome? {
        TxOutcome::Committed(room) => Ok(room),
        TxOutcome::Deleted => Err(GameError::RoomExpired),
        TxOutcome::Unchanged => engine
            .store()
            .find(code)
            .await?
            .ok_or(GameError::RoomNotFound),
    }
}
