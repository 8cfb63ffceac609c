//! Room lifecycle: creation, joining, settings, expiry cleanup.

use std::collections::HashMap;

use rand::Rng;
use tracing::debug;

use super::{ExpiredRoom, RoomEngine, live_room};
use crate::GameError;
use crate::catalog::{AvatarId, Catalog, CategoryId};
use crate::config::{IMPOSTOR_RATIO, ROOM_CODE_LENGTH};
use crate::model::{Player, PlayerId, Room, RoomCode, RoomStatus, ROOM_CODE_ALPHABET};
use crate::store::{RoomWatch, StorageError, TxUpdate};

/// Bounded retry budget for room-code collisions. With a 32^6 code space a
/// single retry is already rare; sixteen failures mean the store is wedged.
const CODE_ATTEMPTS: usize = 16;

/// Partial settings update applied by the host in the lobby.
///
/// `None` fields are left untouched, so concurrent updates to different
/// settings merge instead of clobbering each other.
#[derive(Debug, Clone, Default)]
pub struct RoomSettings {
    /// Replace the selected category ids.
    pub selected_categories: Option<Vec<CategoryId>>,
    /// Replace the impostor count (clamped to the legal range).
    pub impostor_count: Option<u32>,
    /// Toggle clue mode; enabling it switches confusion mode off.
    pub show_clues: Option<bool>,
    /// Toggle confusion mode; enabling it switches clue mode off.
    pub impostor_mode: Option<bool>,
}

fn generate_code() -> RoomCode {
    let mut rng = rand::rng();
    let code: String = (0..ROOM_CODE_LENGTH)
        .map(|_| ROOM_CODE_ALPHABET[rng.random_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect();
    RoomCode::normalize(&code)
}

/// Create a room with the caller as host. Returns the committed room and the
/// host's player id.
pub async fn create_room(
    engine: &RoomEngine,
    host_name: &str,
    avatar: AvatarId,
) -> Result<(Room, PlayerId), GameError> {
    let now = engine.now_ms();
    let host_id = PlayerId::generate();
    let mut last_collision = None;

    for _ in 0..CODE_ATTEMPTS {
        let code = generate_code();
        let room = Room {
            code: code.clone(),
            host: host_id,
            status: RoomStatus::Waiting,
            players: vec![Player::new(host_id, host_name.trim(), avatar, true, now)],
            selected_categories: engine.catalog().category_ids(),
            impostor_count: 1,
            show_clues: false,
            impostor_mode: false,
            round: None,
            kicked_players: HashMap::new(),
            created_at: now,
            expires_at: now + engine.tunables().room_ttl_ms(),
        };

        match engine.store().create(room.clone()).await {
            Ok(()) => {
                debug!(code = %code, host = %host_id, "room created");
                return Ok((room, host_id));
            }
            Err(err @ StorageError::CodeInUse { .. }) => {
                last_collision = Some(err);
            }
            Err(err) => return Err(err.into()),
        }
    }

    match last_collision {
        Some(err) => Err(err.into()),
        None => Err(GameError::RoomNotFound),
    }
}

/// Join an existing room by code. All admission checks run inside the same
/// transaction that appends the player, so two clients racing for the last
/// free name cannot both win.
pub async fn join_room(
    engine: &RoomEngine,
    code: RoomCode,
    name: &str,
    avatar: AvatarId,
) -> Result<(Room, PlayerId), GameError> {
    let now = engine.now_ms();
    let player_id = PlayerId::generate();
    let name = name.trim().to_owned();

    let outcome = engine
        .store()
        .transact(
            code,
            Box::new(move |doc| {
                let mut room = match live_room(doc, now)? {
                    Ok(room) => room,
                    Err(ExpiredRoom) => return Ok(TxUpdate::Delete),
                };
                if !room.status.is_waiting() {
                    return Err(GameError::GameAlreadyStarted);
                }
                if room
                    .active_players()
                    .any(|p| p.name.eq_ignore_ascii_case(&name))
                {
                    return Err(GameError::NameTaken(name));
                }
                room.players
                    .push(Player::new(player_id, name, avatar, false, now));
                Ok(TxUpdate::Write(room))
            }),
        )
        .await?;

    let room = RoomEngine::committed(outcome)?;
    Ok((room, player_id))
}

/// Apply a partial settings update. Host-only, lobby-only.
pub async fn update_settings(
    engine: &RoomEngine,
    code: RoomCode,
    actor: PlayerId,
    settings: RoomSettings,
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
                apply_settings(&mut room, settings, &catalog)?;
                Ok(TxUpdate::Write(room))
            }),
        )
        .await?;

    RoomEngine::committed(outcome)
}

fn apply_settings(
    room: &mut Room,
    settings: RoomSettings,
    catalog: &Catalog,
) -> Result<(), GameError> {
    if let Some(categories) = settings.selected_categories {
        let known: Vec<CategoryId> = categories
            .into_iter()
            .filter(|id| catalog.category(id).is_some())
            .collect();
        if known.is_empty() {
            return Err(GameError::NoCategoriesSelected);
        }
        room.selected_categories = known;
    }

    if let Some(show_clues) = settings.show_clues {
        room.show_clues = show_clues;
        if show_clues {
            room.impostor_mode = false;
        }
    }
    if let Some(impostor_mode) = settings.impostor_mode {
        room.impostor_mode = impostor_mode;
        if impostor_mode {
            room.show_clues = false;
        }
    }

    if let Some(count) = settings.impostor_count {
        room.impostor_count = count.clamp(1, max_impostors(room));
    } else {
        // Player departures may have shrunk the legal range.
        room.impostor_count = room.impostor_count.clamp(1, max_impostors(room));
    }

    Ok(())
}

/// Upper bound on impostors: one per [`IMPOSTOR_RATIO`] players, at least one.
pub(crate) fn max_impostors(room: &Room) -> u32 {
    let active = room.active_players().count();
    ((active / IMPOSTOR_RATIO).max(1)) as u32
}

/// Close the room for everyone. Host-only; an expired room is simply
/// deleted regardless of the actor.
pub async fn delete_room(
    engine: &RoomEngine,
    code: RoomCode,
    actor: PlayerId,
) -> Result<(), GameError> {
    let now = engine.now_ms();

    let outcome = engine
        .store()
        .transact(
            code,
            Box::new(move |doc| {
                let room = match live_room(doc, now)? {
                    Ok(room) => room,
                    Err(ExpiredRoom) => return Ok(TxUpdate::Delete),
                };
                if !room.is_host(actor) {
                    return Err(GameError::NotHost);
                }
                Ok(TxUpdate::Delete)
            }),
        )
        .await?;

    outcome.map(|_| ())
}

/// Subscribe to a room's change feed, cleaning up an expired document first
/// so the watch starts with `Gone` instead of a stale snapshot.
pub async fn subscribe_to_room(
    engine: &RoomEngine,
    code: RoomCode,
) -> Result<RoomWatch, GameError> {
    let now = engine.now_ms();
    if let Some(room) = engine.store().find(code.clone()).await? {
        if room.is_expired(now) {
            engine.store().delete(code.clone()).await?;
        }
    }
    Ok(engine.store().subscribe(code).await?)
}
