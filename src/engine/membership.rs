//! Player departures: voluntary leaves and host-issued kicks.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use super::RoomEngine;
use crate::GameError;
use crate::model::{PlayerId, Room, RoomCode};
use crate::rules::{self, DepartReason, RemovalEffect};
use crate::store::{TxOutcome, TxUpdate};

/// Kind of departure requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepartKind {
    /// The player leaves on their own (or is pruned by liveness).
    Leave,
    /// The host permanently expels the player.
    Kick,
}

/// What a removal did, for callers that need to react (e.g. the local
/// client learning it became host).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalReport {
    /// Whether the player was actually present and removed.
    pub removed: bool,
    /// The room was deleted because no active player remained.
    pub room_deleted: bool,
    /// Host succession ran and elected this player.
    pub new_host: Option<PlayerId>,
    /// Committed room snapshot, absent when the room is gone.
    pub room: Option<Room>,
}

/// Remove `target` from the room.
///
/// Kicks are host-only and permanent. Leaves are modelled as removal in the
/// lobby and as a flagged, dead seat mid-round. The operation is idempotent:
/// removing an absent player (or acting on an absent room) is a quiet no-op,
/// which lets clients fire best-effort leaves on teardown without error
/// handling.
pub async fn remove_player(
    engine: &RoomEngine,
    code: RoomCode,
    actor: PlayerId,
    target: PlayerId,
    kind: DepartKind,
) -> Result<RemovalReport, GameError> {
    let now = engine.now_ms();
    let report_code = code.clone();
    // Succession happens inside the transaction; surface the elected host to
    // the caller through a side channel the closure writes on commit.
    let elected = Arc::new(Mutex::new(None));
    let elected_in_tx = elected.clone();

    let outcome = engine
        .store()
        .transact(
            code,
            Box::new(move |doc| {
                let mut room = match doc {
                    None => return Ok(TxUpdate::Keep),
                    Some(room) if room.is_expired(now) => return Ok(TxUpdate::Delete),
                    Some(room) => room,
                };

                let reason = match kind {
                    DepartKind::Kick => {
                        if !room.is_host(actor) {
                            return Err(GameError::NotHost);
                        }
                        DepartReason::Kick
                    }
                    DepartKind::Leave => DepartReason::Leave,
                };

                match rules::remove_players(&mut room, &[target], reason, Some(actor), now) {
                    RemovalEffect::Unchanged => Ok(TxUpdate::Keep),
                    RemovalEffect::RoomEmpty => Ok(TxUpdate::Delete),
                    RemovalEffect::Updated { new_host } => {
                        *elected_in_tx.lock().unwrap_or_else(PoisonError::into_inner) = new_host;
                        apply_departure_fallout(&mut room);
                        Ok(TxUpdate::Write(room))
                    }
                }
            }),
        )
        .await??;

    let report = match outcome {
        TxOutcome::Unchanged => RemovalReport::default(),
        TxOutcome::Deleted => {
            debug!(code = %report_code, "room deleted after last player departed");
            RemovalReport {
                removed: true,
                room_deleted: true,
                ..RemovalReport::default()
            }
        }
        TxOutcome::Committed(room) => RemovalReport {
            removed: true,
            room_deleted: false,
            new_host: *elected.lock().unwrap_or_else(PoisonError::into_inner),
            room: Some(room),
        },
    };
    Ok(report)
}

/// Mid-round departures can flip the population balance; fold the forced
/// outcome into the document in the same commit so every replica converges
/// on it without waiting for the host's reactor.
fn apply_departure_fallout(room: &mut Room) {
    if let Some(forced) = rules::abandonment_outcome(room) {
        crate::engine::voting::force_outcome_in_place(room, forced);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::AvatarId;
    use crate::engine::lifecycle::{create_room, join_room};
    use crate::engine::test_support::engine_at;
    use crate::model::RoomStatus;

    async fn lobby_of_three(
        engine: &RoomEngine,
    ) -> (RoomCode, PlayerId, PlayerId, PlayerId) {
        let (room, host) = create_room(engine, "Ana", AvatarId(1)).await.unwrap();
        let (_, bob) = join_room(engine, room.code.clone(), "Bob", AvatarId(2))
            .await
            .unwrap();
        let (_, cleo) = join_room(engine, room.code.clone(), "Cleo", AvatarId(3))
            .await
            .unwrap();
        (room.code, host, bob, cleo)
    }

    #[tokio::test]
    async fn leave_in_lobby_removes_the_seat() {
        let (engine, _) = engine_at(1_000);
        let (code, _, bob, _) = lobby_of_three(&engine).await;

        let report = remove_player(&engine, code.clone(), bob, bob, DepartKind::Leave)
            .await
            .unwrap();
        assert!(report.removed);
        let room = report.room.unwrap();
        assert!(room.player(bob).is_none());
        assert_eq!(room.players.len(), 2);
    }

    #[tokio::test]
    async fn double_leave_is_a_quiet_no_op() {
        let (engine, _) = engine_at(1_000);
        let (code, _, bob, _) = lobby_of_three(&engine).await;

        remove_player(&engine, code.clone(), bob, bob, DepartKind::Leave)
            .await
            .unwrap();
        let report = remove_player(&engine, code.clone(), bob, bob, DepartKind::Leave)
            .await
            .unwrap();
        assert!(!report.removed);
    }

    #[tokio::test]
    async fn leave_on_absent_room_is_a_quiet_no_op() {
        let (engine, _) = engine_at(1_000);
        let ghost = PlayerId::generate();
        let report = remove_player(
            &engine,
            RoomCode::normalize("NOSUCH"),
            ghost,
            ghost,
            DepartKind::Leave,
        )
        .await
        .unwrap();
        assert_eq!(report, RemovalReport::default());
    }

    #[tokio::test]
    async fn kick_requires_host() {
        let (engine, _) = engine_at(1_000);
        let (code, _, bob, cleo) = lobby_of_three(&engine).await;

        let err = remove_player(&engine, code.clone(), bob, cleo, DepartKind::Kick)
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::NotHost));
    }

    #[tokio::test]
    async fn kick_removes_and_records_even_mid_round() {
        let (engine, _) = engine_at(1_000);
        let (code, host, bob, _) = lobby_of_three(&engine).await;
        // force a running round directly in the store
        engine
            .store()
            .transact(
                code.clone(),
                Box::new(|doc| {
                    let mut room = doc.unwrap();
                    room.status = RoomStatus::Playing;
                    for p in &mut room.players {
                        p.is_impostor = false;
                    }
                    room.players[0].is_impostor = true;
                    Ok(TxUpdate::Write(room))
                }),
            )
            .await
            .unwrap()
            .unwrap();

        let report = remove_player(&engine, code.clone(), host, bob, DepartKind::Kick)
            .await
            .unwrap();
        let room = report.room.unwrap();
        assert!(room.player(bob).is_none());
        assert!(room.kicked_players.contains_key(&bob));
    }

    #[tokio::test]
    async fn last_player_leaving_deletes_the_room() {
        let (engine, _) = engine_at(1_000);
        let (room, host) = create_room(&engine, "Ana", AvatarId(1)).await.unwrap();

        let report = remove_player(&engine, room.code.clone(), host, host, DepartKind::Leave)
            .await
            .unwrap();
        assert!(report.room_deleted);
        assert_eq!(engine.store().find(room.code).await.unwrap(), None);
    }

    #[tokio::test]
    async fn host_leaving_promotes_earliest_joiner() {
        let (engine, clock) = engine_at(1_000);
        let (room, host) = create_room(&engine, "Ana", AvatarId(1)).await.unwrap();
        clock.advance(10);
        let (_, bob) = join_room(&engine, room.code.clone(), "Bob", AvatarId(2))
            .await
            .unwrap();
        clock.advance(10);
        join_room(&engine, room.code.clone(), "Cleo", AvatarId(3))
            .await
            .unwrap();

        let report = remove_player(&engine, room.code.clone(), host, host, DepartKind::Leave)
            .await
            .unwrap();
        assert_eq!(report.new_host, Some(bob));
        let room = report.room.unwrap();
        assert_eq!(room.host, bob);
        assert!(room.player(bob).unwrap().is_host);
    }
}
