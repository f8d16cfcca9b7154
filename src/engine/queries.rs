use ulid::Ulid;

use crate::model::*;

use super::transitions::is_active_status;
use super::{Engine, EngineError};

impl Engine {
    /// Full booking view: the row, its assignment history, and its
    /// cancellation record if any.
    pub async fn get_booking(&self, booking_id: Ulid) -> Result<BookingDetail, EngineError> {
        let row = self
            .stores
            .bookings
            .get(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let booking = row.read().await.clone();

        let mut assignments = self.stores.assignments.for_booking(&booking_id);
        assignments.sort_by_key(|a| (a.created_at, a.id));
        let cancellation = self.stores.cancellations.for_booking(&booking_id);

        Ok(BookingDetail { booking, assignments, cancellation })
    }

    /// Whether the booking currently holds rooms, and how many. A
    /// booking outside the active set holds nothing, so history rows
    /// kept after check-out do not count.
    pub fn is_room_assigned(&self, booking_id: Ulid) -> Result<RoomOccupancy, EngineError> {
        let status = self
            .stores
            .bookings
            .status_of(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let room_count = if is_active_status(status) {
            self.stores.assignments.for_booking(&booking_id).len()
        } else {
            0
        };
        Ok(RoomOccupancy { is_assigned: room_count > 0, room_count })
    }

    /// Every assignment recorded against the booking, oldest first.
    /// Includes history rows kept after check-out.
    pub fn get_assigned_rooms(&self, booking_id: Ulid) -> Result<Vec<Assignment>, EngineError> {
        if !self.stores.bookings.contains(&booking_id) {
            return Err(EngineError::NotFound(booking_id));
        }
        let mut assignments = self.stores.assignments.for_booking(&booking_id);
        assignments.sort_by_key(|a| (a.created_at, a.id));
        Ok(assignments)
    }

    pub async fn get_room(&self, room_id: Ulid) -> Result<Room, EngineError> {
        let row = self.stores.rooms.get(&room_id).ok_or(EngineError::NotFound(room_id))?;
        Ok(row.read().await.clone())
    }

    pub async fn find_room(&self, number: &str) -> Result<Room, EngineError> {
        let id = self
            .stores
            .rooms
            .id_for_number(number)
            .ok_or_else(|| EngineError::UnknownRoomNumber(number.to_string()))?;
        self.get_room(id).await
    }

    /// Every room, sorted by number.
    pub async fn list_rooms(&self) -> Vec<Room> {
        let mut rooms = Vec::with_capacity(self.stores.rooms.len());
        for id in self.stores.rooms.ids() {
            if let Some(row) = self.stores.rooms.get(&id) {
                rooms.push(row.read().await.clone());
            }
        }
        rooms.sort_by(|a, b| a.number.cmp(&b.number));
        rooms
    }

    /// Rooms open for assignment right now, sorted by number.
    pub async fn available_rooms(&self) -> Vec<Room> {
        let mut rooms = self.list_rooms().await;
        rooms.retain(|r| r.status == RoomStatus::Available);
        rooms
    }

    pub fn get_cancellation(&self, cancel_id: Ulid) -> Result<Cancellation, EngineError> {
        self.stores
            .cancellations
            .get(&cancel_id)
            .ok_or(EngineError::NotFound(cancel_id))
    }

    /// Committed status from the mirror, no row lock taken.
    pub fn status_of(&self, booking_id: Ulid) -> Result<BookingStatus, EngineError> {
        self.stores
            .bookings
            .status_of(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))
    }

    pub fn room_count(&self) -> usize {
        self.stores.rooms.len()
    }

    pub fn booking_count(&self) -> usize {
        self.stores.bookings.len()
    }

    /// Assignments on a room joined with each holder's committed
    /// status.
    pub(super) fn holders_for_room(&self, room_id: &Ulid) -> Vec<(Assignment, BookingStatus)> {
        self.stores
            .assignments
            .for_room(room_id)
            .into_iter()
            .filter_map(|a| {
                let status = self.stores.bookings.status_of(&a.booking_id)?;
                Some((a, status))
            })
            .collect()
    }
}
