//! Per-client reactor task.
//!
//! Every participating client runs one [`RoomClient`]: it heartbeats, follows
//! the room's change feed, and, while its player holds the host seat, issues
//! the corrections nobody else is responsible for in a serverless deployment:
//! revealing a settled tally, forcing abandonment outcomes, pruning silent
//! players and cleaning up expired rooms.

use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tracing::{debug, warn};

use super::membership::{DepartKind, remove_player};
use super::presence::{heartbeat, prune_inactive_players};
use super::voting::{force_game_over, reveal_results};
use super::{RoomEngine, SharedEngine, lifecycle};
use crate::model::{PlayerId, Room, RoomCode};
use crate::rules;
use crate::store::RoomSignal;

/// Handle to a spawned client reactor. Dropping the handle stops the task
/// but does not leave the room; use [`RoomClient::shutdown`] for a clean
/// departure.
pub struct RoomClient {
    code: RoomCode,
    player: PlayerId,
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
    engine: SharedEngine,
}

impl RoomClient {
    /// Spawn the reactor for `player` in `code`.
    pub fn spawn(engine: SharedEngine, code: RoomCode, player: PlayerId) -> Self {
        let (stop, stop_rx) = watch::channel(false);
        let task_engine = engine.clone();
        let task_code = code.clone();
        let handle = tokio::spawn(async move {
            run(task_engine, task_code, player, stop_rx).await;
        });
        Self {
            code,
            player,
            stop,
            handle,
            engine,
        }
    }

    /// The room this client is attached to.
    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    /// The player this client acts as.
    pub fn player(&self) -> PlayerId {
        self.player
    }

    /// Whether the reactor task has already stopped (room gone, kicked).
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the reactor and leave the room. The leave is best effort: a
    /// failure is logged and the local teardown proceeds regardless.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(err) = remove_player(
            &self.engine,
            self.code.clone(),
            self.player,
            self.player,
            DepartKind::Leave,
        )
        .await
        {
            warn!(error = %err, code = %self.code, "leave on shutdown failed");
        }
        let _ = self.handle.await;
    }
}

async fn run(
    engine: Arc<RoomEngine>,
    code: RoomCode,
    player: PlayerId,
    mut stop: watch::Receiver<bool>,
) {
    let mut feed = match lifecycle::subscribe_to_room(&engine, code.clone()).await {
        Ok(feed) => feed,
        Err(err) => {
            warn!(error = %err, code = %code, "room subscription failed");
            return;
        }
    };

    let mut ticker = tokio::time::interval(engine.tunables().heartbeat_interval);
    let mut am_host = false;
    let mut host_last_seen: Option<u64> = None;
    let mut last_prune_ms: Option<u64> = None;
    // Armed when the ballot fills up; fires the reveal after the settle
    // delay so a last-second re-cast still lands in the tally.
    let mut settle: Option<Pin<Box<Sleep>>> = None;

    loop {
        tokio::select! {
            _ = stop.changed() => break,

            signal = feed.recv() => {
                match signal {
                    Some(RoomSignal::Snapshot(room)) => {
                        host_last_seen = room.player(room.host).map(|p| p.last_seen_at);
                        match react(&engine, &code, player, &room, &mut am_host, &mut settle).await {
                            Flow::Continue => {}
                            Flow::Stop => break,
                        }
                    }
                    Some(RoomSignal::Gone) | None => {
                        debug!(code = %code, "room feed ended");
                        break;
                    }
                }
            }

            () = async {
                if let Some(delay) = settle.as_mut() {
                    delay.await;
                }
            }, if settle.is_some() => {
                settle = None;
                if am_host {
                    if let Err(err) = reveal_results(&engine, code.clone()).await {
                        warn!(error = %err, code = %code, "tally reveal failed");
                    }
                }
            }

            _ = ticker.tick() => {
                if let Err(err) = heartbeat(&engine, code.clone(), player).await {
                    warn!(error = %err, code = %code, "heartbeat failed");
                }
                let now = engine.now_ms();
                // The host normally runs the prune pass, but a silently
                // disconnected host cannot prune themself: any client that
                // sees the host's heartbeat go stale steps in.
                let host_stale = !am_host
                    && host_last_seen.is_some_and(|seen| {
                        now.saturating_sub(seen) > engine.tunables().prune_threshold_ms()
                    });
                if am_host || host_stale {
                    let spaced = last_prune_ms.is_none_or(|last| {
                        now.saturating_sub(last)
                            >= engine.tunables().prune_min_interval.as_millis() as u64
                    });
                    if spaced {
                        last_prune_ms = Some(now);
                        if let Err(err) =
                            prune_inactive_players(&engine, code.clone(), player).await
                        {
                            warn!(error = %err, code = %code, "prune pass failed");
                        }
                    }
                }
            }
        }
    }
}

enum Flow {
    Continue,
    Stop,
}

async fn react(
    engine: &RoomEngine,
    code: &RoomCode,
    player: PlayerId,
    room: &Room,
    am_host: &mut bool,
    settle: &mut Option<Pin<Box<Sleep>>>,
) -> Flow {
    if room.is_expired(engine.now_ms()) {
        if let Err(err) = engine.store().delete(code.clone()).await {
            warn!(error = %err, code = %code, "expired room cleanup failed");
        }
        return Flow::Stop;
    }

    // Kicked or removed elsewhere: this client is done.
    if room.player(player).is_none_or(|p| !p.is_active()) {
        return Flow::Stop;
    }

    *am_host = room.is_host(player);
    if !*am_host {
        *settle = None;
        return Flow::Continue;
    }

    if rules::abandonment_outcome(room).is_some() {
        if let Err(err) = force_game_over(engine, code.clone()).await {
            warn!(error = %err, code = %code, "forced outcome write failed");
        }
        return Flow::Continue;
    }

    if rules::votes_complete(room) {
        if settle.is_none() {
            *settle = Some(Box::pin(tokio::time::sleep(
                engine.tunables().tally_settle_delay,
            )));
        }
    } else {
        *settle = None;
    }

    Flow::Continue
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::catalog::AvatarId;
    use crate::engine::lifecycle::{create_room, join_room};
    use crate::engine::session::start_game;
    use crate::engine::test_support::engine_at;
    use crate::engine::voting::{cast_vote, initiate_voting};

    #[tokio::test(start_paused = true)]
    async fn host_reactor_reveals_a_settled_tally() {
        let (engine, _) = engine_at(1_000);
        let (room, host) = create_room(&engine, "Ana", AvatarId(1)).await.unwrap();
        let code = room.code.clone();
        let mut others = Vec::new();
        for name in ["Bob", "Cleo", "Dan"] {
            let (_, id) = join_room(&engine, code.clone(), name, AvatarId(2))
                .await
                .unwrap();
            others.push(id);
        }

        let client = RoomClient::spawn(engine.clone(), code.clone(), host);
        let started = start_game(&engine, code.clone(), host).await.unwrap();
        initiate_voting(&engine, code.clone(), host).await.unwrap();

        // everyone votes for the first non-host player
        let target = others[0];
        let voters: Vec<PlayerId> = started
            .players
            .iter()
            .map(|p| p.id)
            .filter(|&id| id != target)
            .collect();
        for voter in voters {
            cast_vote(&engine, code.clone(), voter, target).await.unwrap();
        }
        cast_vote(&engine, code.clone(), target, others[1])
            .await
            .unwrap();

        // the settle delay is 1.2s; give the reactor room to fire
        tokio::time::sleep(Duration::from_secs(3)).await;

        let room = engine.store().find(code.clone()).await.unwrap().unwrap();
        assert!(room.status.voting().unwrap().show_results);
        client.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reactor_stops_when_its_player_is_kicked() {
        let (engine, _) = engine_at(1_000);
        let (room, host) = create_room(&engine, "Ana", AvatarId(1)).await.unwrap();
        let (_, bob) = join_room(&engine, room.code.clone(), "Bob", AvatarId(2))
            .await
            .unwrap();

        let client = RoomClient::spawn(engine.clone(), room.code.clone(), bob);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!client.is_finished());

        remove_player(&engine, room.code.clone(), host, bob, DepartKind::Kick)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(client.is_finished());
        client.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn host_reactor_prunes_silent_players() {
        let (engine, clock) = engine_at(1_000);
        let (room, host) = create_room(&engine, "Ana", AvatarId(1)).await.unwrap();
        let (_, bob) = join_room(&engine, room.code.clone(), "Bob", AvatarId(2))
            .await
            .unwrap();

        let client = RoomClient::spawn(engine.clone(), room.code.clone(), host);
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Bob never heartbeats; push the document clock past the threshold
        clock.advance(engine.tunables().prune_threshold_ms() + 1);
        tokio::time::sleep(engine.tunables().heartbeat_interval * 2).await;

        let stored = engine.store().find(room.code.clone()).await.unwrap().unwrap();
        assert!(stored.player(bob).is_none());
        assert!(stored.player(host).is_some());
        client.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stale_host_is_pruned_by_another_client_and_succession_runs() {
        let (engine, clock) = engine_at(1_000);
        let (room, host) = create_room(&engine, "Ana", AvatarId(1)).await.unwrap();
        let (_, bob) = join_room(&engine, room.code.clone(), "Bob", AvatarId(2))
            .await
            .unwrap();

        // only Bob runs a reactor; the host goes silent
        let client = RoomClient::spawn(engine.clone(), room.code.clone(), bob);
        tokio::time::sleep(Duration::from_millis(100)).await;

        clock.advance(engine.tunables().prune_threshold_ms() + 1);
        tokio::time::sleep(engine.tunables().heartbeat_interval * 3).await;

        let stored = engine.store().find(room.code.clone()).await.unwrap().unwrap();
        assert!(stored.player(host).is_none(), "stale host must be pruned");
        assert_eq!(stored.host, bob);
        assert!(stored.player(bob).unwrap().is_host);
        client.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_leaves_the_room() {
        let (engine, _) = engine_at(1_000);
        let (room, host) = create_room(&engine, "Ana", AvatarId(1)).await.unwrap();
        let (_, bob) = join_room(&engine, room.code.clone(), "Bob", AvatarId(2))
            .await
            .unwrap();

        let client = RoomClient::spawn(engine.clone(), room.code.clone(), bob);
        tokio::time::sleep(Duration::from_millis(100)).await;
        client.shutdown().await;

        let stored = engine.store().find(room.code.clone()).await.unwrap().unwrap();
        assert!(stored.player(bob).is_none());
    }
}
