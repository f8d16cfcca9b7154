use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

use super::txn::RowSet;

pub type SharedBooking = Arc<RwLock<Booking>>;
pub type SharedRoom = Arc<RwLock<Room>>;

// ── Rooms ────────────────────────────────────────────────────────

pub struct RoomStore {
    rows: DashMap<Ulid, SharedRoom>,
    numbers: DashMap<String, Ulid>,
}

impl Default for RoomStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomStore {
    pub fn new() -> Self {
        Self { rows: DashMap::new(), numbers: DashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn contains(&self, id: &Ulid) -> bool {
        self.rows.contains_key(id)
    }

    pub fn get(&self, id: &Ulid) -> Option<SharedRoom> {
        self.rows.get(id).map(|e| e.value().clone())
    }

    pub fn id_for_number(&self, number: &str) -> Option<Ulid> {
        self.numbers.get(number).map(|e| *e.value())
    }

    pub fn insert(&self, room: Room) {
        self.numbers.insert(room.number.clone(), room.id);
        self.rows.insert(room.id, Arc::new(RwLock::new(room)));
    }

    /// Reserve a room number before the row exists. Fails with the
    /// holder's id when the number is taken; the entry API makes the
    /// check-and-claim atomic.
    pub fn claim_number(&self, number: &str, id: Ulid) -> Result<(), Ulid> {
        match self.numbers.entry(number.to_string()) {
            Entry::Occupied(e) => Err(*e.get()),
            Entry::Vacant(e) => {
                e.insert(id);
                Ok(())
            }
        }
    }

    /// Undo `claim_number` after a failed commit.
    pub fn release_number(&self, number: &str) {
        self.numbers.remove(number);
    }

    pub fn ids(&self) -> Vec<Ulid> {
        self.rows.iter().map(|e| *e.key()).collect()
    }
}

// ── Bookings ─────────────────────────────────────────────────────

pub struct BookingStore {
    rows: DashMap<Ulid, SharedBooking>,
    /// Status mirror, updated on every commit. Lets the conflict
    /// validator read holder statuses without touching other bookings'
    /// row locks.
    status: DashMap<Ulid, BookingStatus>,
}

impl Default for BookingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BookingStore {
    pub fn new() -> Self {
        Self { rows: DashMap::new(), status: DashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn contains(&self, id: &Ulid) -> bool {
        self.rows.contains_key(id)
    }

    pub fn get(&self, id: &Ulid) -> Option<SharedBooking> {
        self.rows.get(id).map(|e| e.value().clone())
    }

    pub fn status_of(&self, id: &Ulid) -> Option<BookingStatus> {
        self.status.get(id).map(|e| *e.value())
    }

    pub fn insert(&self, booking: Booking) {
        self.status.insert(booking.id, booking.status);
        self.rows.insert(booking.id, Arc::new(RwLock::new(booking)));
    }

    pub(super) fn set_status(&self, id: Ulid, status: BookingStatus) {
        self.status.insert(id, status);
    }

    pub fn ids(&self) -> Vec<Ulid> {
        self.rows.iter().map(|e| *e.key()).collect()
    }
}

// ── Assignments ──────────────────────────────────────────────────

pub struct AssignmentLedger {
    rows: DashMap<Ulid, Assignment>,
    by_booking: DashMap<Ulid, Vec<Ulid>>,
    by_room: DashMap<Ulid, Vec<Ulid>>,
}

impl Default for AssignmentLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl AssignmentLedger {
    pub fn new() -> Self {
        Self { rows: DashMap::new(), by_booking: DashMap::new(), by_room: DashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn record(&self, assignment: Assignment) {
        self.by_booking.entry(assignment.booking_id).or_default().push(assignment.id);
        self.by_room.entry(assignment.room_id).or_default().push(assignment.id);
        self.rows.insert(assignment.id, assignment);
    }

    pub fn remove(&self, id: &Ulid) -> Option<Assignment> {
        let (_, assignment) = self.rows.remove(id)?;
        if let Some(mut ids) = self.by_booking.get_mut(&assignment.booking_id) {
            ids.retain(|a| a != id);
        }
        if let Some(mut ids) = self.by_room.get_mut(&assignment.room_id) {
            ids.retain(|a| a != id);
        }
        Some(assignment)
    }

    pub fn get(&self, id: &Ulid) -> Option<Assignment> {
        self.rows.get(id).map(|e| e.value().clone())
    }

    pub fn for_booking(&self, booking_id: &Ulid) -> Vec<Assignment> {
        self.by_booking
            .get(booking_id)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn for_room(&self, room_id: &Ulid) -> Vec<Assignment> {
        self.by_room
            .get(room_id)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn all(&self) -> Vec<Assignment> {
        self.rows.iter().map(|e| e.value().clone()).collect()
    }
}

// ── Cancellations ────────────────────────────────────────────────

pub struct CancellationLog {
    rows: DashMap<Ulid, Cancellation>,
    by_booking: DashMap<Ulid, Ulid>,
}

impl Default for CancellationLog {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationLog {
    pub fn new() -> Self {
        Self { rows: DashMap::new(), by_booking: DashMap::new() }
    }

    pub fn record(&self, record: Cancellation) {
        self.by_booking.insert(record.booking_id, record.id);
        self.rows.insert(record.id, record);
    }

    pub fn amend(&self, id: &Ulid, cancel_type: CancelType, reason: Option<String>) -> bool {
        match self.rows.get_mut(id) {
            Some(mut record) => {
                record.cancel_type = cancel_type;
                record.reason = reason;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &Ulid) -> Option<Cancellation> {
        self.rows.get(id).map(|e| e.value().clone())
    }

    pub fn for_booking(&self, booking_id: &Ulid) -> Option<Cancellation> {
        let id = *self.by_booking.get(booking_id)?.value();
        self.get(&id)
    }

    pub fn all(&self) -> Vec<Cancellation> {
        self.rows.iter().map(|e| e.value().clone()).collect()
    }
}

// ── Event application ────────────────────────────────────────────

#[derive(Default)]
pub struct Stores {
    pub rooms: RoomStore,
    pub bookings: BookingStore,
    pub assignments: AssignmentLedger,
    pub cancellations: CancellationLog,
}

impl Stores {
    /// Apply one committed event to the stores. `rows` carries the
    /// locked booking/room rows the event touches; commit and replay
    /// both funnel through here so state transitions exist in exactly
    /// one place.
    pub fn apply(&self, event: &Event, rows: &mut RowSet<'_>) {
        match event {
            Event::RoomAdded { room } => {
                self.rooms.insert(room.clone());
            }
            Event::RoomStatusSet { room_id, status, at } => {
                if let Some(room) = rows.rooms.get_mut(room_id) {
                    room.status = *status;
                    room.updated_at = *at;
                }
            }
            Event::BookingCreated { booking } => {
                self.bookings.insert(booking.clone());
            }
            Event::RoomsAssigned { booking_id, assignments, booking_status, room_status, at } => {
                for assignment in assignments {
                    if let Some(room) = rows.rooms.get_mut(&assignment.room_id) {
                        room.status = *room_status;
                        room.updated_at = *at;
                    }
                    self.assignments.record(assignment.clone());
                }
                if let Some(booking) = rows.booking.as_deref_mut() {
                    booking.status = *booking_status;
                    booking.updated_at = *at;
                }
                self.bookings.set_status(*booking_id, *booking_status);
            }
            Event::StatusChanged { booking_id, to, at, .. } => {
                if let Some(booking) = rows.booking.as_deref_mut() {
                    booking.status = *to;
                    booking.updated_at = *at;
                }
                self.bookings.set_status(*booking_id, *to);
            }
            Event::CheckedIn { booking_id, room_ids, at } => {
                for room_id in room_ids {
                    if let Some(room) = rows.rooms.get_mut(room_id) {
                        room.status = RoomStatus::Occupied;
                        room.updated_at = *at;
                    }
                }
                if let Some(booking) = rows.booking.as_deref_mut() {
                    booking.status = BookingStatus::CheckedIn;
                    booking.updated_at = *at;
                }
                self.bookings.set_status(*booking_id, BookingStatus::CheckedIn);
            }
            Event::CheckedOut { booking_id, room_ids, at } => {
                for room_id in room_ids {
                    if let Some(room) = rows.rooms.get_mut(room_id) {
                        room.status = RoomStatus::Available;
                        room.updated_at = *at;
                    }
                }
                if let Some(booking) = rows.booking.as_deref_mut() {
                    booking.status = BookingStatus::CheckedOut;
                    booking.updated_at = *at;
                }
                self.bookings.set_status(*booking_id, BookingStatus::CheckedOut);
            }
            Event::BookingCancelled { record, released, at, .. } => {
                for rel in released {
                    self.assignments.remove(&rel.assignment_id);
                    if let Some(room) = rows.rooms.get_mut(&rel.room_id) {
                        room.status = RoomStatus::Available;
                        room.updated_at = *at;
                    }
                }
                if let Some(booking) = rows.booking.as_deref_mut() {
                    booking.status = BookingStatus::Cancelled;
                    booking.updated_at = *at;
                }
                self.bookings.set_status(record.booking_id, BookingStatus::Cancelled);
                self.cancellations.record(record.clone());
            }
            Event::CancellationAmended { cancel_id, cancel_type, reason, .. } => {
                self.cancellations.amend(cancel_id, *cancel_type, reason.clone());
            }
            Event::AssignmentRecorded { assignment } => {
                self.assignments.record(assignment.clone());
            }
            Event::CancellationRecorded { record } => {
                self.cancellations.record(record.clone());
            }
        }
    }
}
