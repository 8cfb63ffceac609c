//! Voting phase: casting, tallying, elimination and forced outcomes.

use tracing::debug;

use super::{ExpiredRoom, RoomEngine, live_room};
use crate::GameError;
use crate::model::{ForcedOutcome, PlayerId, Room, RoomCode, RoomStatus, VotingPhase};
use crate::rules::{self, RoundOutcome, TallyResult};
use crate::store::{TxOutcome, TxUpdate};

async fn resolve(
    engine: &RoomEngine,
    code: RoomCode,
    outcome: Result<TxOutcome, GameError>,
) -> Result<Room, GameError> {
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

/// Open a voting phase. Host-only; a no-op outside a running round, so a
/// double tap or a stale client cannot corrupt the phase.
pub async fn initiate_voting(
    engine: &RoomEngine,
    code: RoomCode,
    actor: PlayerId,
) -> Result<Room, GameError> {
    let now = engine.now_ms();

    let outcome = engine
        .store()
        .transact(
            code.clone(),
            Box::new(move |doc| {
                let mut room = match live_room(doc, now)? {
                    Ok(room) => room,
                    Err(ExpiredRoom) => return Ok(TxUpdate::Delete),
                };
                if !room.is_host(actor) {
                    return Err(GameError::NotHost);
                }
                match room.status {
                    RoomStatus::Playing => {
                        room.status = RoomStatus::Voting(VotingPhase::default());
                        Ok(TxUpdate::Write(room))
                    }
                    _ => Ok(TxUpdate::Keep),
                }
            }),
        )
        .await?;

    resolve(engine, code, outcome).await
}

/// Cast (or re-cast) a vote. Last write per voter wins.
///
/// An ineligible voter or a closed phase makes this a quiet no-op; only a
/// genuinely bad target (self, dead, departed, unknown) is an error the
/// client should surface.
pub async fn cast_vote(
    engine: &RoomEngine,
    code: RoomCode,
    voter: PlayerId,
    target: PlayerId,
) -> Result<Room, GameError> {
    let now = engine.now_ms();

    let outcome = engine
        .store()
        .transact(
            code.clone(),
            Box::new(move |doc| {
                let mut room = match live_room(doc, now)? {
                    Ok(room) => room,
                    Err(ExpiredRoom) => return Ok(TxUpdate::Delete),
                };

                let phase_open = matches!(
                    &room.status,
                    RoomStatus::Voting(phase) if !phase.show_results && phase.forced.is_none()
                );
                if !phase_open {
                    return Ok(TxUpdate::Keep);
                }
                if room.player(voter).is_none_or(|p| !p.is_alive_active()) {
                    return Ok(TxUpdate::Keep);
                }
                if voter == target
                    || room.player(target).is_none_or(|p| !p.is_alive_active())
                {
                    return Err(GameError::InvalidTarget);
                }

                if let RoomStatus::Voting(phase) = &mut room.status {
                    phase.votes.insert(voter, target);
                }
                Ok(TxUpdate::Write(room))
            }),
        )
        .await?;

    resolve(engine, code, outcome).await
}

/// Reveal the tally once every alive voter has voted.
///
/// Called by the host's reactor after the settle delay; the completeness
/// condition is re-checked inside the transaction because votes may have
/// been scrubbed (or voters pruned) since the delay was armed.
pub async fn reveal_results(engine: &RoomEngine, code: RoomCode) -> Result<Room, GameError> {
    let now = engine.now_ms();

    let outcome = engine
        .store()
        .transact(
            code.clone(),
            Box::new(move |doc| {
                let mut room = match live_room(doc, now)? {
                    Ok(room) => room,
                    Err(ExpiredRoom) => return Ok(TxUpdate::Delete),
                };
                rules::scrub_stale_votes(&mut room);
                if !rules::votes_complete(&room) {
                    return Ok(TxUpdate::Keep);
                }
                if let RoomStatus::Voting(phase) = &mut room.status {
                    phase.show_results = true;
                }
                Ok(TxUpdate::Write(room))
            }),
        )
        .await?;

    resolve(engine, code, outcome).await
}

/// Clear a revealed tie and open a fresh ballot. Host-only; a no-op unless
/// results are on screen without a forced outcome.
pub async fn repeat_vote(
    engine: &RoomEngine,
    code: RoomCode,
    actor: PlayerId,
) -> Result<Room, GameError> {
    let now = engine.now_ms();

    let outcome = engine
        .store()
        .transact(
            code.clone(),
            Box::new(move |doc| {
                let mut room = match live_room(doc, now)? {
                    Ok(room) => room,
                    Err(ExpiredRoom) => return Ok(TxUpdate::Delete),
                };
                if !room.is_host(actor) {
                    return Err(GameError::NotHost);
                }
                match &mut room.status {
                    RoomStatus::Voting(phase)
                        if phase.show_results && phase.forced.is_none() =>
                    {
                        phase.votes.clear();
                        phase.show_results = false;
                        Ok(TxUpdate::Write(room))
                    }
                    _ => Ok(TxUpdate::Keep),
                }
            }),
        )
        .await?;

    resolve(engine, code, outcome).await
}

/// Apply the revealed elimination and continue the round. Host-only.
///
/// The tally is recomputed inside the transaction rather than trusted from
/// the client, so a vote scrubbed between reveal and confirmation cannot
/// eliminate the wrong player. A decided round that the elimination ends is
/// surfaced as a forced outcome instead of silently returning to play.
pub async fn eliminate_and_continue(
    engine: &RoomEngine,
    code: RoomCode,
    actor: PlayerId,
) -> Result<Room, GameError> {
    let now = engine.now_ms();

    let outcome = engine
        .store()
        .transact(
            code.clone(),
            Box::new(move |doc| {
                let mut room = match live_room(doc, now)? {
                    Ok(room) => room,
                    Err(ExpiredRoom) => return Ok(TxUpdate::Delete),
                };
                if !room.is_host(actor) {
                    return Err(GameError::NotHost);
                }
                let revealed = matches!(
                    &room.status,
                    RoomStatus::Voting(phase) if phase.show_results && phase.forced.is_none()
                );
                if !revealed {
                    return Ok(TxUpdate::Keep);
                }

                let Some(TallyResult::Decided { target, outcome, .. }) = rules::tally(&room)
                else {
                    // Tie: nothing to eliminate, the host should repeat the vote.
                    return Ok(TxUpdate::Keep);
                };

                if let Some(player) = room.player_mut(target) {
                    player.is_alive = false;
                }
                match outcome {
                    RoundOutcome::Inconclusive => {
                        // The round goes on: open a fresh ballot right away.
                        room.status = RoomStatus::Voting(VotingPhase::default());
                    }
                    RoundOutcome::CitizensWin => {
                        force_outcome_in_place(&mut room, ForcedOutcome::CitizensWin);
                    }
                    RoundOutcome::ImpostorsWin => {
                        force_outcome_in_place(&mut room, ForcedOutcome::ImpostorsWin);
                    }
                }
                debug!(code = %room.code, eliminated = %target, "elimination applied");
                Ok(TxUpdate::Write(room))
            }),
        )
        .await?;

    resolve(engine, code, outcome).await
}

/// Force the round's outcome when abandonment has already decided it.
/// Level-triggered and idempotent: recomputes the condition from the
/// current document and does nothing if it no longer holds.
pub async fn force_game_over(engine: &RoomEngine, code: RoomCode) -> Result<Room, GameError> {
    let now = engine.now_ms();

    let outcome = engine
        .store()
        .transact(
            code.clone(),
            Box::new(move |doc| {
                let mut room = match live_room(doc, now)? {
                    Ok(room) => room,
                    Err(ExpiredRoom) => return Ok(TxUpdate::Delete),
                };
                match rules::abandonment_outcome(&room) {
                    Some(forced) => {
                        force_outcome_in_place(&mut room, forced);
                        Ok(TxUpdate::Write(room))
                    }
                    None => Ok(TxUpdate::Keep),
                }
            }),
        )
        .await?;

    resolve(engine, code, outcome).await
}

/// Put the room into a terminal results screen with `forced` as the winner.
/// Shared by the voting path and by departure handling in other modules.
pub(crate) fn force_outcome_in_place(room: &mut Room, forced: ForcedOutcome) {
    match &mut room.status {
        RoomStatus::Voting(phase) => {
            phase.show_results = true;
            phase.forced = Some(forced);
        }
        RoomStatus::Playing => {
            room.status = RoomStatus::Voting(VotingPhase {
                show_results: true,
                forced: Some(forced),
                ..VotingPhase::default()
            });
        }
        RoomStatus::Waiting => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::AvatarId;
    use crate::engine::lifecycle::{create_room, join_room};
    use crate::engine::membership::remove_player;
    use crate::engine::session::start_game;
    use crate::engine::test_support::engine_at;
    use crate::engine::DepartKind;
    use crate::model::IMPOSTOR_WORD;

    struct Table {
        code: RoomCode,
        host: PlayerId,
        impostor: PlayerId,
        citizens: Vec<PlayerId>,
    }

    /// Start a 4-player game and report who ended up impostor.
    async fn running_game(engine: &RoomEngine) -> Table {
        let (room, host) = create_room(engine, "Ana", AvatarId(1)).await.unwrap();
        for name in ["Bob", "Cleo", "Dan"] {
            join_room(engine, room.code.clone(), name, AvatarId(2))
                .await
                .unwrap();
        }
        let room = start_game(engine, room.code.clone(), host).await.unwrap();
        let impostor = room
            .players
            .iter()
            .find(|p| p.is_impostor)
            .map(|p| p.id)
            .unwrap();
        let citizens = room
            .players
            .iter()
            .filter(|p| !p.is_impostor)
            .map(|p| p.id)
            .collect();
        Table {
            code: room.code,
            host,
            impostor,
            citizens,
        }
    }

    fn phase(room: &Room) -> &VotingPhase {
        room.status.voting().unwrap()
    }

    #[tokio::test]
    async fn initiate_voting_only_from_a_running_round() {
        let (engine, _) = engine_at(1_000);
        let table = running_game(&engine).await;

        let room = initiate_voting(&engine, table.code.clone(), table.host)
            .await
            .unwrap();
        assert!(room.status.voting().is_some());

        // second initiation leaves the phase (and its votes) alone
        cast_vote(&engine, table.code.clone(), table.citizens[0], table.impostor)
            .await
            .unwrap();
        let room = initiate_voting(&engine, table.code.clone(), table.host)
            .await
            .unwrap();
        assert_eq!(phase(&room).votes.len(), 1);
    }

    #[tokio::test]
    async fn recast_overwrites_the_previous_vote() {
        let (engine, _) = engine_at(1_000);
        let table = running_game(&engine).await;
        initiate_voting(&engine, table.code.clone(), table.host)
            .await
            .unwrap();

        let voter = table.citizens[0];
        cast_vote(&engine, table.code.clone(), voter, table.citizens[1])
            .await
            .unwrap();
        let room = cast_vote(&engine, table.code.clone(), voter, table.impostor)
            .await
            .unwrap();

        assert_eq!(phase(&room).votes.len(), 1);
        assert_eq!(phase(&room).votes.get(&voter), Some(&table.impostor));
    }

    #[tokio::test]
    async fn self_votes_and_dead_targets_are_rejected() {
        let (engine, _) = engine_at(1_000);
        let table = running_game(&engine).await;
        initiate_voting(&engine, table.code.clone(), table.host)
            .await
            .unwrap();

        let voter = table.citizens[0];
        let err = cast_vote(&engine, table.code.clone(), voter, voter)
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::InvalidTarget));

        let err = cast_vote(&engine, table.code.clone(), voter, PlayerId::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::InvalidTarget));
    }

    #[tokio::test]
    async fn votes_outside_an_open_phase_are_ignored() {
        let (engine, _) = engine_at(1_000);
        let table = running_game(&engine).await;

        // still Playing: no phase to vote in
        let room = cast_vote(&engine, table.code.clone(), table.citizens[0], table.impostor)
            .await
            .unwrap();
        assert!(room.status.voting().is_none());
    }

    #[tokio::test]
    async fn reveal_waits_for_every_alive_voter() {
        let (engine, _) = engine_at(1_000);
        let table = running_game(&engine).await;
        initiate_voting(&engine, table.code.clone(), table.host)
            .await
            .unwrap();

        cast_vote(&engine, table.code.clone(), table.citizens[0], table.impostor)
            .await
            .unwrap();
        let room = reveal_results(&engine, table.code.clone()).await.unwrap();
        assert!(!phase(&room).show_results);

        for &citizen in &table.citizens[1..] {
            cast_vote(&engine, table.code.clone(), citizen, table.impostor)
                .await
                .unwrap();
        }
        cast_vote(&engine, table.code.clone(), table.impostor, table.citizens[0])
            .await
            .unwrap();

        let room = reveal_results(&engine, table.code.clone()).await.unwrap();
        assert!(phase(&room).show_results);
    }

    #[tokio::test]
    async fn eliminating_the_last_impostor_ends_the_round_for_citizens() {
        let (engine, _) = engine_at(1_000);
        let table = running_game(&engine).await;
        initiate_voting(&engine, table.code.clone(), table.host)
            .await
            .unwrap();

        for &citizen in &table.citizens {
            cast_vote(&engine, table.code.clone(), citizen, table.impostor)
                .await
                .unwrap();
        }
        cast_vote(&engine, table.code.clone(), table.impostor, table.citizens[0])
            .await
            .unwrap();
        reveal_results(&engine, table.code.clone()).await.unwrap();

        let room = eliminate_and_continue(&engine, table.code.clone(), table.host)
            .await
            .unwrap();
        assert!(!room.player(table.impostor).unwrap().is_alive);
        assert_eq!(phase(&room).forced, Some(ForcedOutcome::CitizensWin));
        assert!(phase(&room).show_results);
    }

    #[tokio::test]
    async fn eliminating_a_citizen_with_four_players_continues_play() {
        let (engine, _) = engine_at(1_000);
        let table = running_game(&engine).await;
        initiate_voting(&engine, table.code.clone(), table.host)
            .await
            .unwrap();

        // everyone piles on citizens[0]
        let victim = table.citizens[0];
        for &voter in table.citizens.iter().filter(|&&c| c != victim) {
            cast_vote(&engine, table.code.clone(), voter, victim)
                .await
                .unwrap();
        }
        cast_vote(&engine, table.code.clone(), table.impostor, victim)
            .await
            .unwrap();
        cast_vote(&engine, table.code.clone(), victim, table.impostor)
            .await
            .unwrap();
        reveal_results(&engine, table.code.clone()).await.unwrap();

        let room = eliminate_and_continue(&engine, table.code.clone(), table.host)
            .await
            .unwrap();
        // 1 impostor vs 2 citizens: the round goes on with a fresh ballot
        assert!(phase(&room).votes.is_empty());
        assert!(!phase(&room).show_results);
        assert!(!room.player(victim).unwrap().is_alive);
        // the dead citizen keeps their word card but can no longer vote
        assert!(room.player(victim).unwrap().word.is_some());
    }

    #[tokio::test]
    async fn tie_reveals_and_repeat_vote_reopens_the_ballot() {
        let (engine, _) = engine_at(1_000);
        let table = running_game(&engine).await;
        initiate_voting(&engine, table.code.clone(), table.host)
            .await
            .unwrap();

        let a = table.citizens[0];
        let b = table.citizens[1];
        // 2 votes for a, 2 votes for b
        cast_vote(&engine, table.code.clone(), b, a).await.unwrap();
        cast_vote(&engine, table.code.clone(), table.impostor, a)
            .await
            .unwrap();
        cast_vote(&engine, table.code.clone(), a, b).await.unwrap();
        cast_vote(&engine, table.code.clone(), table.citizens[2], b)
            .await
            .unwrap();

        let room = reveal_results(&engine, table.code.clone()).await.unwrap();
        assert!(phase(&room).show_results);
        assert_eq!(rules::tally(&room), Some(TallyResult::Tie));

        // confirming a tie does nothing
        let room = eliminate_and_continue(&engine, table.code.clone(), table.host)
            .await
            .unwrap();
        assert!(room.players.iter().all(|p| p.is_alive));

        let room = repeat_vote(&engine, table.code.clone(), table.host)
            .await
            .unwrap();
        assert!(phase(&room).votes.is_empty());
        assert!(!phase(&room).show_results);
    }

    #[tokio::test]
    async fn impostor_departure_mid_round_forces_citizens_win() {
        let (engine, _) = engine_at(1_000);
        let table = running_game(&engine).await;

        remove_player(
            &engine,
            table.code.clone(),
            table.impostor,
            table.impostor,
            DepartKind::Leave,
        )
        .await
        .unwrap();

        let room = engine
            .store()
            .find(table.code.clone())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(phase(&room).forced, Some(ForcedOutcome::CitizensWin));
        assert!(phase(&room).show_results);

        // the check is level-triggered and re-running it changes nothing
        let room = force_game_over(&engine, table.code).await.unwrap();
        assert_eq!(phase(&room).forced, Some(ForcedOutcome::CitizensWin));
    }

    #[tokio::test]
    async fn citizens_leaving_down_to_parity_forces_impostors_win() {
        let (engine, _) = engine_at(1_000);
        let table = running_game(&engine).await;

        for &citizen in &table.citizens[..2] {
            remove_player(
                &engine,
                table.code.clone(),
                citizen,
                citizen,
                DepartKind::Leave,
            )
            .await
            .unwrap();
        }

        let room = engine
            .store()
            .find(table.code.clone())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(phase(&room).forced, Some(ForcedOutcome::ImpostorsWin));
    }

    #[tokio::test]
    async fn departed_voters_votes_are_scrubbed_before_reveal() {
        let (engine, _) = engine_at(1_000);
        let table = running_game(&engine).await;
        initiate_voting(&engine, table.code.clone(), table.host)
            .await
            .unwrap();

        let leaver = table.citizens[1];
        cast_vote(&engine, table.code.clone(), leaver, table.citizens[0])
            .await
            .unwrap();
        remove_player(&engine, table.code.clone(), leaver, leaver, DepartKind::Leave)
            .await
            .unwrap();

        let room = engine
            .store()
            .find(table.code.clone())
            .await
            .unwrap()
            .unwrap();
        assert!(phase(&room).votes.is_empty());
    }

    #[tokio::test]
    async fn impostor_word_is_never_shown_to_citizens() {
        let (engine, _) = engine_at(1_000);
        let table = running_game(&engine).await;
        let room = engine
            .store()
            .find(table.code.clone())
            .await
            .unwrap()
            .unwrap();
        for citizen in room.players.iter().filter(|p| !p.is_impostor) {
            assert_ne!(citizen.word.as_deref(), Some(IMPOSTOR_WORD));
        }
    }
}
