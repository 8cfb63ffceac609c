//! Pure transition rules over room snapshots.
//!
//! Everything here is a function `(snapshot, input) -> next snapshot`, with
//! no store or clock access, so each rule is testable in isolation and safe
//! to re-run inside a transaction: applying the same rule twice yields the
//! same document.

use std::collections::{HashMap, HashSet};

use crate::model::{ForcedOutcome, KickRecord, PlayerId, Room, RoomStatus};

/// Why a player is being removed from the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepartReason {
    /// Voluntary or involuntary disconnect (including pruning).
    Leave,
    /// Host-issued permanent exile.
    Kick,
}

/// Net effect of a batch removal, observed by the transaction wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalEffect {
    /// None of the requested players were present; nothing changed.
    Unchanged,
    /// No active player remains; the room should be deleted.
    RoomEmpty,
    /// Players were removed; `new_host` is set when succession ran.
    Updated {
        /// Newly elected host, if the departure displaced the old one.
        new_host: Option<PlayerId>,
    },
}

/// Remove a batch of players in one logical step.
///
/// Kicked players are dropped from the list entirely and recorded in the
/// permanent exile map. Leavers are dropped in the lobby but only flagged
/// (`has_left`, `is_alive = false`) mid-round so their seat still renders.
/// Votes referencing any departed id are scrubbed and host succession runs
/// at most once for the whole batch.
pub fn remove_players(
    room: &mut Room,
    ids: &[PlayerId],
    reason: DepartReason,
    kicked_by: Option<PlayerId>,
    now: u64,
) -> RemovalEffect {
    let in_round = !room.status.is_waiting();
    let mut departed = HashSet::new();

    for &id in ids {
        let Some(index) = room.players.iter().position(|p| p.id == id) else {
            continue;
        };

        match reason {
            DepartReason::Kick => {
                room.players.remove(index);
                room.kicked_players.insert(
                    id,
                    KickRecord {
                        kicked_at: now,
                        kicked_by: kicked_by.unwrap_or(room.host),
                    },
                );
                departed.insert(id);
            }
            DepartReason::Leave => {
                if in_round {
                    let player = &mut room.players[index];
                    if player.is_active() {
                        player.has_left = true;
                        player.is_alive = false;
                        departed.insert(id);
                    }
                } else {
                    room.players.remove(index);
                    departed.insert(id);
                }
            }
        }
    }

    if departed.is_empty() {
        return RemovalEffect::Unchanged;
    }

    scrub_votes_referencing(room, &departed);

    if room.active_players().count() == 0 {
        return RemovalEffect::RoomEmpty;
    }

    RemovalEffect::Updated {
        new_host: ensure_host(room),
    }
}

/// Re-establish the unique-host invariant.
///
/// If the recorded host is still an active member, only the `is_host` flags
/// are normalised. Otherwise the first active player by `(joined_at, id)`
/// is elected. Returns the new host id when succession actually ran.
///
/// Callers must guarantee at least one active player remains.
pub fn ensure_host(room: &mut Room) -> Option<PlayerId> {
    let host_present = room
        .players
        .iter()
        .any(|p| p.id == room.host && p.is_active());

    let elected = if host_present {
        None
    } else {
        let successor = room
            .active_players()
            .min_by_key(|p| (p.joined_at, p.id))
            .map(|p| p.id)?;
        room.host = successor;
        Some(successor)
    };

    let host = room.host;
    for player in &mut room.players {
        player.is_host = player.id == host;
    }

    elected
}

/// Drop votes where any of `gone` appears as voter or target. Runs in the
/// same transaction as the player removal so no ghost vote ever counts.
pub fn scrub_votes_referencing(room: &mut Room, gone: &HashSet<PlayerId>) {
    if let RoomStatus::Voting(phase) = &mut room.status {
        phase
            .votes
            .retain(|voter, target| !gone.contains(voter) && !gone.contains(target));
    }
}

/// Drop votes whose voter or target is no longer alive and active.
/// Defensive cleanup for votes that survived a skipped eager scrub.
pub fn scrub_stale_votes(room: &mut Room) {
    let valid: HashSet<PlayerId> = room.alive_players().map(|p| p.id).collect();
    if let RoomStatus::Voting(phase) = &mut room.status {
        phase
            .votes
            .retain(|voter, target| valid.contains(voter) && valid.contains(target));
    }
}

/// Number of players currently allowed to cast a vote.
pub fn eligible_voter_count(room: &Room) -> usize {
    room.alive_players().count()
}

/// Whether every eligible voter has voted and the tally may be revealed.
pub fn votes_complete(room: &Room) -> bool {
    match room.status.voting() {
        Some(phase) if !phase.show_results && phase.forced.is_none() => {
            let eligible = eligible_voter_count(room);
            eligible > 0 && phase.votes.len() >= eligible
        }
        _ => false,
    }
}

/// Level-triggered abandonment check.
///
/// Applies while a round is running and results are not on screen: with no
/// alive impostor left the citizens win outright; once alive impostors reach
/// parity with alive citizens the impostors win. Membership changes (leave,
/// kick, prune) are exactly what moves these counts.
pub fn abandonment_outcome(room: &Room) -> Option<ForcedOutcome> {
    match &room.status {
        RoomStatus::Playing => {}
        RoomStatus::Voting(phase) if !phase.show_results && phase.forced.is_none() => {}
        _ => return None,
    }

    let impostors = room.alive_players().filter(|p| p.is_impostor).count();
    let citizens = room.alive_players().filter(|p| !p.is_impostor).count();

    if impostors == 0 {
        Some(ForcedOutcome::CitizensWin)
    } else if impostors >= citizens {
        Some(ForcedOutcome::ImpostorsWin)
    } else {
        None
    }
}

/// Outcome of a revealed, non-forced tally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TallyResult {
    /// Two or more candidates share the max vote count, or nobody voted.
    Tie,
    /// A single player collected the most votes.
    Decided {
        /// The player to be eliminated.
        target: PlayerId,
        /// Role reveal for the UI.
        target_was_impostor: bool,
        /// What eliminating the target would mean for the round.
        outcome: RoundOutcome,
    },
}

/// Round consequence of an elimination, computed as-if it were applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    /// The last impostor would be gone.
    CitizensWin,
    /// Impostors would reach parity with citizens.
    ImpostorsWin,
    /// The round continues; the host may start another vote.
    Inconclusive,
}

/// Tally the current votes.
///
/// Returns `None` when the room is not voting. The elimination is *not*
/// applied here; persisting it is the caller's decision (a winning round
/// goes straight back to the lobby without it).
pub fn tally(room: &Room) -> Option<TallyResult> {
    let phase = room.status.voting()?;

    let mut counts: HashMap<PlayerId, usize> = HashMap::new();
    for target in phase.votes.values() {
        *counts.entry(*target).or_insert(0) += 1;
    }

    let Some(&max) = counts.values().max() else {
        return Some(TallyResult::Tie);
    };
    let mut candidates = counts
        .iter()
        .filter(|&(_, &count)| count == max)
        .map(|(&id, _)| id);
    let target = candidates.next()?;
    if candidates.next().is_some() {
        return Some(TallyResult::Tie);
    }

    let target_was_impostor = room.player(target).is_some_and(|p| p.is_impostor);

    let mut impostors = room.alive_players().filter(|p| p.is_impostor).count();
    let mut citizens = room.alive_players().filter(|p| !p.is_impostor).count();
    if target_was_impostor {
        impostors = impostors.saturating_sub(1);
    } else {
        citizens = citizens.saturating_sub(1);
    }

    let outcome = if impostors == 0 {
        RoundOutcome::CitizensWin
    } else if impostors >= citizens {
        RoundOutcome::ImpostorsWin
    } else {
        RoundOutcome::Inconclusive
    };

    Some(TallyResult::Decided {
        target,
        target_was_impostor,
        outcome,
    })
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use std::collections::HashMap;

    use crate::catalog::{AvatarId, CategoryId};
    use crate::model::{Player, PlayerId, Room, RoomCode, RoomStatus, VotingPhase};

    /// Room with `count` players joined one millisecond apart; the first is host.
    pub(crate) fn room_with_players(count: usize) -> Room {
        let players: Vec<Player> = (0..count)
            .map(|i| {
                Player::new(
                    PlayerId::generate(),
                    format!("player-{i}"),
                    AvatarId(1),
                    i == 0,
                    1_000 + i as u64,
                )
            })
            .collect();

        Room {
            code: RoomCode::normalize("ABCDEF"),
            host: players[0].id,
            status: RoomStatus::Waiting,
            players,
            selected_categories: vec![CategoryId::new("animales")],
            impostor_count: 1,
            show_clues: false,
            impostor_mode: false,
            round: None,
            kicked_players: HashMap::new(),
            created_at: 0,
            expires_at: u64::MAX,
        }
    }

    /// Put the room into an active voting phase.
    pub(crate) fn enter_voting(room: &mut Room) {
        room.status = RoomStatus::Voting(VotingPhase::default());
    }

    pub(crate) fn vote(room: &mut Room, voter: PlayerId, target: PlayerId) {
        if let RoomStatus::Voting(phase) = &mut room.status {
            phase.votes.insert(voter, target);
        }
    }
}
