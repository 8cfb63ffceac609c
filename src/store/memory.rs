//! In-process [`RoomStore`] backend.
//!
//! Serves as the reference implementation of the store contract and as the
//! backend used by the test suite. One mutex-guarded document slot per room
//! code gives the atomicity `transact` requires; a broadcast channel per slot
//! carries the change feed.

use std::future::ready;
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::BoxFuture;
use tokio::sync::broadcast;

use super::{RoomSignal, RoomStore, RoomWatch, StorageError, StorageResult, TxFn, TxOutcome, TxUpdate};
use crate::GameError;
use crate::model::{Room, RoomCode};

const FEED_CAPACITY: usize = 16;

struct RoomSlot {
    doc: Mutex<Option<Room>>,
    hub: broadcast::Sender<RoomSignal>,
}

impl RoomSlot {
    fn new(room: Room) -> Self {
        let (hub, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            doc: Mutex::new(Some(room)),
            hub,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Room>> {
        self.doc.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, signal: RoomSignal) {
        // No receivers is fine; the send result only reports that.
        let _ = self.hub.send(signal);
    }
}

/// In-memory room store keyed by room code.
#[derive(Default)]
pub struct MemoryRoomStore {
    rooms: DashMap<RoomCode, Arc<RoomSlot>>,
}

impl MemoryRoomStore {
    /// Build an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, code: &RoomCode) -> Option<Arc<RoomSlot>> {
        self.rooms.get(code).map(|entry| entry.value().clone())
    }
}

impl RoomStore for MemoryRoomStore {
    fn create(&self, room: Room) -> BoxFuture<'static, StorageResult<()>> {
        let result = match self.rooms.entry(room.code.clone()) {
            Entry::Occupied(occupied) => {
                let slot = occupied.get().clone();
                let mut doc = slot.lock();
                if doc.is_some() {
                    Err(StorageError::CodeInUse {
                        code: room.code.clone(),
                    })
                } else {
                    // Slot lingered after a delete; reuse it.
                    let snapshot = room.clone();
                    *doc = Some(room);
                    drop(doc);
                    slot.publish(RoomSignal::Snapshot(snapshot));
                    Ok(())
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(RoomSlot::new(room)));
                Ok(())
            }
        };
        Box::pin(ready(result))
    }

    fn find(&self, code: RoomCode) -> BoxFuture<'static, StorageResult<Option<Room>>> {
        let doc = self.slot(&code).and_then(|slot| slot.lock().clone());
        Box::pin(ready(Ok(doc)))
    }

    fn transact(
        &self,
        code: RoomCode,
        tx: TxFn,
    ) -> BoxFuture<'static, StorageResult<Result<TxOutcome, GameError>>> {
        let outcome = match self.slot(&code) {
            Some(slot) => {
                let mut doc = slot.lock();
                match tx(doc.clone()) {
                    Ok(TxUpdate::Write(room)) => {
                        *doc = Some(room.clone());
                        drop(doc);
                        slot.publish(RoomSignal::Snapshot(room.clone()));
                        Ok(TxOutcome::Committed(room))
                    }
                    Ok(TxUpdate::Delete) => {
                        *doc = None;
                        drop(doc);
                        slot.publish(RoomSignal::Gone);
                        self.rooms.remove(&code);
                        Ok(TxOutcome::Deleted)
                    }
                    Ok(TxUpdate::Keep) => Ok(TxOutcome::Unchanged),
                    Err(err) => Err(err),
                }
            }
            None => match tx(None) {
                Ok(TxUpdate::Write(room)) => {
                    let snapshot = room.clone();
                    self.rooms
                        .insert(code.clone(), Arc::new(RoomSlot::new(room)));
                    Ok(TxOutcome::Committed(snapshot))
                }
                Ok(TxUpdate::Delete) => Ok(TxOutcome::Deleted),
                Ok(TxUpdate::Keep) => Ok(TxOutcome::Unchanged),
                Err(err) => Err(err),
            },
        };
        Box::pin(ready(Ok(outcome)))
    }

    fn delete(&self, code: RoomCode) -> BoxFuture<'static, StorageResult<()>> {
        if let Some((_, slot)) = self.rooms.remove(&code) {
            let mut doc = slot.lock();
            if doc.take().is_some() {
                drop(doc);
                slot.publish(RoomSignal::Gone);
            }
        }
        Box::pin(ready(Ok(())))
    }

    fn subscribe(&self, code: RoomCode) -> BoxFuture<'static, StorageResult<RoomWatch>> {
        let watch = match self.slot(&code) {
            Some(slot) => {
                // Lock while subscribing so the first signal and the feed
                // position are consistent.
                let doc = slot.lock();
                let rx = slot.hub.subscribe();
                let first = match doc.clone() {
                    Some(room) => RoomSignal::Snapshot(room),
                    None => RoomSignal::Gone,
                };
                RoomWatch::new(first, rx)
            }
            None => {
                // Absent room: deliver Gone, then the feed ends.
                let (_closed, rx) = broadcast::channel(1);
                RoomWatch::new(RoomSignal::Gone, rx)
            }
        };
        Box::pin(ready(Ok(watch)))
    }
}
