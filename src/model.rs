//! The shared room document and everything embedded in it.
//!
//! One `Room` is persisted per room code; it is the only shared mutable
//! resource in the system, so every cross-field mutation goes through a
//! single store transaction.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::{AvatarId, CategoryId};

/// Word handed to impostors outside of confusion mode.
pub const IMPOSTOR_WORD: &str = "ERES EL IMPOSTOR";

/// Alphabet used for room codes: uppercase alphanumerics minus the visually
/// ambiguous 0/O and 1/I.
pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Normalised room code identifying a room document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    /// Normalise raw user input into a room code: trim, uppercase, and strip
    /// interior whitespace. No further validation happens here; an unknown
    /// code simply resolves to no document.
    pub fn normalize(raw: &str) -> Self {
        let cleaned = raw
            .trim()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_uppercase();
        Self(cleaned)
    }

    /// Borrow the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque, client-generated player identifier, stable for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(Uuid);

impl PlayerId {
    /// Generate a fresh id for a new session.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A participant embedded in [`Room::players`], in join order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Session-stable identifier, unique within the room.
    pub id: PlayerId,
    /// Display name, unique among non-departed players at join time.
    pub name: String,
    /// Reference into the static avatar catalog.
    pub avatar: AvatarId,
    /// Whether this player currently holds host privileges.
    pub is_host: bool,
    /// Round-scoped role flag; reset when returning to the lobby.
    pub is_impostor: bool,
    /// False once eliminated by vote or disconnected mid-round.
    pub is_alive: bool,
    /// Permanent exile flag; a kicked player is hidden everywhere.
    pub is_kicked: bool,
    /// Marks a disconnect; the player may still render greyed out mid-round.
    pub has_left: bool,
    /// Word shown on this player's role card for the current round.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word: Option<String>,
    /// Clue shown to impostors when clue mode is on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clue: Option<String>,
    /// Logical join timestamp (unix ms); with `id` as tiebreak this yields
    /// the total order used for host succession.
    pub joined_at: u64,
    /// Last heartbeat timestamp (unix ms), used for liveness pruning.
    pub last_seen_at: u64,
}

impl Player {
    /// Build a fresh player joining at `now`.
    pub fn new(id: PlayerId, name: impl Into<String>, avatar: AvatarId, is_host: bool, now: u64) -> Self {
        Self {
            id,
            name: name.into(),
            avatar,
            is_host,
            is_impostor: false,
            is_alive: true,
            is_kicked: false,
            has_left: false,
            word: None,
            clue: None,
            joined_at: now,
            last_seen_at: now,
        }
    }

    /// Still a member: neither kicked nor departed.
    pub fn is_active(&self) -> bool {
        !self.is_kicked && !self.has_left
    }

    /// Active and not eliminated; the population win conditions count.
    pub fn is_alive_active(&self) -> bool {
        self.is_active() && self.is_alive
    }

    /// Clear round-scoped state (role, word, clue) and revive.
    pub fn reset_round_state(&mut self) {
        self.is_impostor = false;
        self.is_alive = true;
        self.word = None;
        self.clue = None;
    }
}

/// Direction of conversational turns, purely a presentation hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnDirection {
    /// Turns proceed to the left.
    Left,
    /// Turns proceed to the right.
    Right,
}

/// Presentational hints frozen at round start and consumed by the UI; the
/// state machine itself never enforces turn order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundHints {
    /// Category the secret word was drawn from.
    pub category: CategoryId,
    /// Player who speaks first.
    pub starting_player: PlayerId,
    /// Display name snapshot of the starting player.
    pub starting_player_name: String,
    /// Direction turns proceed in.
    pub direction: TurnDirection,
    /// When the round started (unix ms).
    pub started_at: u64,
}

/// Win outcome forced outside the normal tally path, e.g. by abandonment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForcedOutcome {
    /// Every impostor is gone; citizens win.
    CitizensWin,
    /// Alive impostors reached parity with citizens; impostors win.
    ImpostorsWin,
}

/// State of an in-progress voting phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingPhase {
    /// Confirmed votes, voter id to target id, in cast order.
    /// Re-casting overwrites in place (last write wins).
    pub votes: IndexMap<PlayerId, PlayerId>,
    /// True once the tally is revealed to everyone.
    pub show_results: bool,
    /// Set when a win was detected outside the tally (abandonment).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forced: Option<ForcedOutcome>,
}

/// The single source of truth for the room's phase.
///
/// Earlier iterations of this game spread the phase across several
/// overlapping booleans; here every UI flag derives from this one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RoomStatus {
    /// Lobby: players join and the host configures the game.
    Waiting,
    /// A round is running; role cards are out.
    Playing,
    /// Players are voting (or looking at vote results).
    Voting(VotingPhase),
}

impl RoomStatus {
    /// Whether the room is in its lobby phase.
    pub fn is_waiting(&self) -> bool {
        matches!(self, RoomStatus::Waiting)
    }

    /// The voting phase data, if the room is voting.
    pub fn voting(&self) -> Option<&VotingPhase> {
        match self {
            RoomStatus::Voting(phase) => Some(phase),
            _ => None,
        }
    }
}

/// Permanent record of a kick, kept even after the player list is filtered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KickRecord {
    /// When the kick happened (unix ms).
    pub kicked_at: u64,
    /// Host that issued the kick.
    pub kicked_by: PlayerId,
}

/// The per-room shared document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    /// Room code, also the document key.
    pub code: RoomCode,
    /// Id of the player currently holding host privileges.
    pub host: PlayerId,
    /// Current phase; governs which operations are legal.
    pub status: RoomStatus,
    /// Participants in join order.
    pub players: Vec<Player>,
    /// Categories the secret word may be drawn from; non-empty to start.
    pub selected_categories: Vec<CategoryId>,
    /// Number of impostors assigned at round start.
    pub impostor_count: u32,
    /// Give impostors a clue about the real word. Mutually exclusive with
    /// `impostor_mode`.
    pub show_clues: bool,
    /// Confusion mode: impostors receive a decoy word instead of the
    /// sentinel. Mutually exclusive with `show_clues`.
    pub impostor_mode: bool,
    /// Presentation hints for the current round, if one is running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<RoundHints>,
    /// Permanent exile list, surviving player-list filtering.
    #[serde(default)]
    pub kicked_players: HashMap<PlayerId, KickRecord>,
    /// Creation timestamp (unix ms).
    pub created_at: u64,
    /// The room is authoritatively dead once `now > expires_at`.
    pub expires_at: u64,
}

impl Room {
    /// True once the TTL has elapsed; readers must then treat the room as
    /// nonexistent and trigger cleanup.
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.expires_at
    }

    /// Find a player by id, departed or not.
    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    /// Mutable lookup by id.
    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    /// Players that are still members (non-kicked, non-departed).
    pub fn active_players(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| p.is_active())
    }

    /// Active players that are still alive this round.
    pub fn alive_players(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| p.is_alive_active())
    }

    /// Whether `id` is the current host and still a member.
    pub fn is_host(&self, id: PlayerId) -> bool {
        self.host == id && self.player(id).is_some_and(Player::is_active)
    }
}
