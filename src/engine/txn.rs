//! Transaction scope over the row locks. A `Txn` holds the shared
//! transaction gate plus write guards acquired in the canonical order
//! (booking row first, then rooms ascending by id). `commit` persists
//! one event and applies it to the held rows; dropping a `Txn` without
//! committing releases the locks with no state changed.

use std::collections::HashMap;

use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard};
use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError};

/// The rows a committing transaction holds, keyed for the event
/// applier.
pub struct RowSet<'a> {
    pub booking: Option<&'a mut Booking>,
    pub rooms: HashMap<Ulid, &'a mut Room>,
}

pub(super) struct Txn<'e> {
    engine: &'e Engine,
    /// Held shared for the whole transaction; compaction takes it
    /// exclusive to cut a consistent snapshot.
    _gate: OwnedRwLockReadGuard<()>,
    booking: Option<(Ulid, OwnedRwLockWriteGuard<Booking>)>,
    rooms: Vec<(Ulid, OwnedRwLockWriteGuard<Room>)>,
}

impl Engine {
    /// Open a transaction and lock one booking's row.
    pub(super) async fn begin(&self, booking_id: Ulid) -> Result<Txn<'_>, EngineError> {
        let mut txn = self.begin_floating().await?;
        txn.lock_booking(booking_id).await?;
        Ok(txn)
    }

    /// Open a transaction that owns no booking row (booking creation,
    /// room-only commands).
    pub(super) async fn begin_floating(&self) -> Result<Txn<'_>, EngineError> {
        let gate = self
            .acquire(self.txn_gate.clone().read_owned(), "transaction gate")
            .await?;
        Ok(Txn { engine: self, _gate: gate, booking: None, rooms: Vec::new() })
    }
}

impl Txn<'_> {
    /// Lock the booking row. Must precede any room locks.
    async fn lock_booking(&mut self, booking_id: Ulid) -> Result<(), EngineError> {
        debug_assert!(self.booking.is_none() && self.rooms.is_empty());
        let row = self
            .engine
            .stores
            .bookings
            .get(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let guard = self.engine.acquire(row.write_owned(), "booking row").await?;
        self.booking = Some((booking_id, guard));
        Ok(())
    }

    /// Lock room rows, deduped and ascending by id. Every transaction
    /// takes rooms in this order, so two writers can never hold pieces
    /// of each other's lock set.
    pub(super) async fn lock_rooms(&mut self, room_ids: &[Ulid]) -> Result<(), EngineError> {
        let mut ids = room_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        for id in ids {
            let row = self
                .engine
                .stores
                .rooms
                .get(&id)
                .ok_or(EngineError::NotFound(id))?;
            let guard = self.engine.acquire(row.write_owned(), "room row").await?;
            self.rooms.push((id, guard));
        }
        Ok(())
    }

    pub(super) fn booking_row(&self) -> &Booking {
        let (_, guard) = self.booking.as_ref().expect("txn: booking row not locked");
        guard
    }

    pub(super) fn room(&self, id: &Ulid) -> Option<&Room> {
        self.rooms.iter().find(|(rid, _)| rid == id).map(|(_, g)| &**g)
    }

    /// Make the event durable, then apply it to the held rows. The WAL
    /// write happens under the locks, so replay order matches lock
    /// order.
    pub(super) async fn commit(mut self, event: Event) -> Result<(), EngineError> {
        self.engine.wal_append(event.clone()).await?;
        let mut rows = RowSet {
            booking: self.booking.as_mut().map(|(_, g)| &mut **g),
            rooms: self.rooms.iter_mut().map(|(id, g)| (*id, &mut **g)).collect(),
        };
        self.engine.stores.apply(&event, &mut rows);
        Ok(())
    }
}
