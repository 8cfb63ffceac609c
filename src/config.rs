//! Runtime tunables for presence, pruning, and voting cadence.
//!
//! The original iterations of this game disagreed on heartbeat and prune
//! intervals (8s/12s heartbeats, 10s/30s thresholds); these are deliberately
//! configuration rather than contract. The defaults below are the values the
//! rest of the crate is tested against.

use std::time::Duration;

use serde::Deserialize;

/// Length of generated room codes.
pub const ROOM_CODE_LENGTH: usize = 6;
/// Minimum number of eligible players required to start a round.
pub const MIN_PLAYERS: usize = 3;
/// Players per allowed impostor when clamping the impostor-count setting.
pub const IMPOSTOR_RATIO: usize = 3;

/// Immutable timing knobs shared by every component of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tunables {
    /// Period between liveness heartbeats written by each client.
    pub heartbeat_interval: Duration,
    /// Age of `last_seen_at` beyond which a player is considered gone.
    pub prune_threshold: Duration,
    /// Minimum spacing between prune attempts issued by a single client.
    pub prune_min_interval: Duration,
    /// Grace period between the last vote landing and results being shown.
    pub tally_settle_delay: Duration,
    /// Room lifetime from creation; an expired room reads as nonexistent.
    pub room_ttl: Duration,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(10),
            prune_threshold: Duration::from_secs(30),
            prune_min_interval: Duration::from_secs(10),
            tally_settle_delay: Duration::from_millis(1200),
            room_ttl: Duration::from_secs(4 * 60 * 60),
        }
    }
}

impl Tunables {
    /// Parse tunables from a JSON document, falling back to defaults for
    /// absent fields. Reading the document from disk or elsewhere is the
    /// embedder's concern; the core performs no I/O of its own.
    pub fn from_json_str(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RawTunables>(contents).map(Into::into)
    }

    /// Room TTL expressed in milliseconds, matching document timestamps.
    pub fn room_ttl_ms(&self) -> u64 {
        self.room_ttl.as_millis() as u64
    }

    /// Prune threshold expressed in milliseconds.
    pub fn prune_threshold_ms(&self) -> u64 {
        self.prune_threshold.as_millis() as u64
    }
}

/// JSON representation of [`Tunables`], all durations in milliseconds.
#[derive(Debug, Deserialize)]
struct RawTunables {
    heartbeat_interval_ms: Option<u64>,
    prune_threshold_ms: Option<u64>,
    prune_min_interval_ms: Option<u64>,
    tally_settle_delay_ms: Option<u64>,
    room_ttl_ms: Option<u64>,
}

impl From<RawTunables> for Tunables {
    fn from(raw: RawTunables) -> Self {
        let defaults = Tunables::default();
        let pick = |ms: Option<u64>, fallback: Duration| {
            ms.map(Duration::from_millis).unwrap_or(fallback)
        };
        Self {
            heartbeat_interval: pick(raw.heartbeat_interval_ms, defaults.heartbeat_interval),
            prune_threshold: pick(raw.prune_threshold_ms, defaults.prune_threshold),
            prune_min_interval: pick(raw.prune_min_interval_ms, defaults.prune_min_interval),
            tally_settle_delay: pick(raw.tally_settle_delay_ms, defaults.tally_settle_delay),
            room_ttl: pick(raw.room_ttl_ms, defaults.room_ttl),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_document_is_empty() {
        let parsed = Tunables::from_json_str("{}").unwrap();
        assert_eq!(parsed, Tunables::default());
    }

    #[test]
    fn overrides_apply_per_field() {
        let parsed =
            Tunables::from_json_str(r#"{"heartbeat_interval_ms": 8000, "prune_threshold_ms": 10000}"#)
                .unwrap();
        assert_eq!(parsed.heartbeat_interval, Duration::from_secs(8));
        assert_eq!(parsed.prune_threshold, Duration::from_secs(10));
        assert_eq!(parsed.room_ttl, Tunables::default().room_ttl);
    }
}
