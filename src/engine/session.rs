//! Round lifecycle: starting a game and returning to the lobby.

use rand::Rng;
use rand::seq::IndexedRandom;
use tracing::debug;

use super::{ExpiredRoom, RoomEngine, live_room};
use crate::GameError;
use crate::catalog::Catalog;
use crate::config::MIN_PLAYERS;
use crate::engine::lifecycle::max_impostors;
use crate::model::{
    IMPOSTOR_WORD, PlayerId, Room, RoomCode, RoomStatus, RoundHints, TurnDirection,
};
use crate::store::{TxOutcome, TxUpdate};

/// Start a round. Host-only, lobby-only; requires enough players and a
/// usable category selection. Role assignment, word distribution and the
/// phase flip all land in one commit so no client ever observes a round
/// without roles.
pub async fn start_game(
    engine: &RoomEngine,
    code: RoomCode,
    actor: PlayerId,
) -> Result<Room, GameError> {
    let now = engine.now_ms();
    let catalog = engine.catalog().clone();

    let outcome = engine
        .store()
        .transact(
            code,
            Box::new(move |doc| {
                let mut room = match live_room(doc, now)? {
                    Ok(room) => room,
                    Err(ExpiredRoom) => return Ok(TxUpdate::Delete),
                };
                if !room.is_host(actor) {
                    return Err(GameError::NotHost);
                }
                if !room.status.is_waiting() {
                    return Err(GameError::GameAlreadyStarted);
                }
                start_round(&mut room, &catalog, now)?;
                Ok(TxUpdate::Write(room))
            }),
        )
        .await?;

    let room = RoomEngine::committed(outcome)?;
    debug!(code = %room.code, players = room.players.len(), "round started");
    Ok(room)
}

/// Assign roles and words, pick the presentation hints, and flip the room
/// into [`RoomStatus::Playing`].
fn start_round(room: &mut Room, catalog: &Catalog, now: u64) -> Result<(), GameError> {
    let eligible: Vec<PlayerId> = room.active_players().map(|p| p.id).collect();
    if eligible.len() < MIN_PLAYERS {
        return Err(GameError::InsufficientPlayers {
            needed: MIN_PLAYERS,
            got: eligible.len(),
        });
    }

    let mut rng = rand::rng();

    let category = room
        .selected_categories
        .choose(&mut rng)
        .and_then(|id| catalog.category(id))
        .ok_or(GameError::NoCategoriesSelected)?;
    let entry = category
        .words
        .choose(&mut rng)
        .ok_or(GameError::NoCategoriesSelected)?;

    let impostor_count = room.impostor_count.clamp(1, max_impostors(room)) as usize;
    let impostor_picks = rand::seq::index::sample(&mut rng, eligible.len(), impostor_count);
    let impostors: Vec<PlayerId> = impostor_picks.iter().map(|i| eligible[i]).collect();

    let secret = entry.word().to_owned();
    let decoy = entry.similar().map(str::to_owned);
    let clue = entry.clue().map(str::to_owned);
    let give_decoys = room.impostor_mode;
    let give_clues = room.show_clues;

    for player in &mut room.players {
        player.reset_round_state();
        if !player.is_active() {
            continue;
        }
        if impostors.contains(&player.id) {
            player.is_impostor = true;
            if give_decoys {
                // Confusion mode hands impostors a plausible decoy; entries
                // without one fall back to the sentinel.
                player.word = Some(decoy.clone().unwrap_or_else(|| IMPOSTOR_WORD.to_owned()));
            } else {
                player.word = Some(IMPOSTOR_WORD.to_owned());
                if give_clues {
                    player.clue = clue.clone();
                }
            }
        } else {
            player.word = Some(secret.clone());
        }
    }

    let starting = eligible[rng.random_range(0..eligible.len())];
    let starting_name = room
        .player(starting)
        .map(|p| p.name.clone())
        .unwrap_or_default();
    let direction = if rng.random_bool(0.5) {
        TurnDirection::Left
    } else {
        TurnDirection::Right
    };

    room.round = Some(RoundHints {
        category: category.id.clone(),
        starting_player: starting,
        starting_player_name: starting_name,
        direction,
        started_at: now,
    });
    room.status = RoomStatus::Playing;
    Ok(())
}

/// Return the room to its lobby. Host-only. Departed seats are dropped,
/// everyone else is revived with their round state cleared. This is the only
/// transition back into [`RoomStatus::Waiting`]; calling it from the lobby
/// is an idempotent no-op.
pub async fn back_to_lobby(
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
                if room.status.is_waiting() {
                    return Ok(TxUpdate::Keep);
                }

                room.players.retain(|p| p.is_active());
                for player in &mut room.players {
                    player.reset_round_state();
                }
                room.round = None;
                room.status = RoomStatus::Waiting;
                room.impostor_count = room.impostor_count.clamp(1, max_impostors(&room));
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
