//! Booking lifecycle commands. Every mutation validates its input,
//! opens a transaction, and commits exactly one WAL event; a failure
//! at any point drops the transaction with nothing persisted.

use std::collections::HashSet;
use std::time::Instant;

use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{self, ConflictCheck, now_ms, validate_stay};
use super::transitions::{allowed_targets, can_transition, is_assignable_status};
use super::{Engine, EngineError};

fn record_outcome<T>(command: &'static str, result: &Result<T, EngineError>, started: Instant) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    crate::observability::record_command(command, outcome, started);
}

impl Engine {
    // ── Bookings ─────────────────────────────────────────────

    pub async fn create_booking(&self, input: CreateBooking) -> Result<Booking, EngineError> {
        let started = Instant::now();
        let result = self.do_create_booking(input).await;
        record_outcome("create_booking", &result, started);
        result
    }

    async fn do_create_booking(&self, input: CreateBooking) -> Result<Booking, EngineError> {
        if self.stores.bookings.len() >= MAX_BOOKINGS {
            return Err(EngineError::LimitExceeded("too many bookings"));
        }
        if input.guest_count < MIN_GUESTS_PER_BOOKING || input.guest_count > MAX_GUESTS_PER_BOOKING
        {
            return Err(EngineError::LimitExceeded("guest count out of range"));
        }
        if let Some(ref req) = input.special_request
            && req.len() > MAX_SPECIAL_REQUEST_LEN {
                return Err(EngineError::LimitExceeded("special request too long"));
            }

        match (input.channel, &input.guest) {
            (BookingChannel::WalkIn, GuestIdentity::Phone(phone)) => {
                if phone.is_empty() {
                    return Err(EngineError::Validation(
                        "walk-in booking needs a contact phone".into(),
                    ));
                }
                if phone.len() > MAX_PHONE_LEN {
                    return Err(EngineError::LimitExceeded("phone too long"));
                }
                if input.receptionist.is_none() {
                    return Err(EngineError::Validation(
                        "walk-in booking needs the receptionist on duty".into(),
                    ));
                }
            }
            (BookingChannel::Online, GuestIdentity::Customer(_)) => {
                if input.receptionist.is_some() {
                    return Err(EngineError::Validation(
                        "online booking cannot carry a receptionist".into(),
                    ));
                }
            }
            (BookingChannel::WalkIn, GuestIdentity::Customer(_)) => {
                return Err(EngineError::Validation(
                    "walk-in booking identifies its guest by phone".into(),
                ));
            }
            (BookingChannel::Online, GuestIdentity::Phone(_)) => {
                return Err(EngineError::Validation(
                    "online booking needs a customer account".into(),
                ));
            }
        }

        let now = now_ms();
        let booked_at = input.booked_at.unwrap_or(now);
        if !(MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS).contains(&booked_at) {
            return Err(EngineError::LimitExceeded("timestamp out of range"));
        }

        // Every booking enters Pending on both channels; rooms or an
        // explicit confirmation move it on.
        let booking = Booking {
            id: Ulid::new(),
            channel: input.channel,
            guest: input.guest,
            guest_count: input.guest_count,
            special_request: input.special_request,
            receptionist: input.receptionist,
            status: BookingStatus::Pending,
            booked_at,
            created_at: now,
            updated_at: now,
        };

        let txn = self.begin_floating().await?;
        txn.commit(Event::BookingCreated { booking: booking.clone() }).await?;
        tracing::info!(booking = %booking.id, channel = %booking.channel, "booking created");
        Ok(booking)
    }

    // ── Room assignment ──────────────────────────────────────

    pub async fn assign_rooms(
        &self,
        booking_id: Ulid,
        rooms: Vec<RoomRequest>,
    ) -> Result<AssignmentSummary, EngineError> {
        let started = Instant::now();
        let result = self.do_assign_rooms(booking_id, rooms).await;
        record_outcome("assign_rooms", &result, started);
        result
    }

    /// Assign a batch of rooms to one booking, all-or-nothing. The
    /// booking advances per its channel: Pending moves to Confirmed,
    /// and an online Confirmed booking checks in on the spot (rooms go
    /// straight to Occupied).
    async fn do_assign_rooms(
        &self,
        booking_id: Ulid,
        rooms: Vec<RoomRequest>,
    ) -> Result<AssignmentSummary, EngineError> {
        if rooms.is_empty() {
            return Err(EngineError::Validation("no rooms in assignment".into()));
        }
        if rooms.len() > MAX_ROOMS_PER_BATCH {
            return Err(EngineError::LimitExceeded("too many rooms in one batch"));
        }

        let mut txn = self.begin(booking_id).await?;
        let booking = txn.booking_row().clone();

        if !is_assignable_status(booking.status) {
            return Err(EngineError::NotAssignable { booking_id, status: booking.status });
        }
        let active_rooms = self.stores.assignments.for_booking(&booking_id).len();
        if active_rooms > 0 {
            return Err(EngineError::AlreadyAssigned { booking_id, active_rooms });
        }

        // Resolve refs and reject duplicates before taking room locks.
        let default_stay = Stay::new(booking.booked_at, booking.booked_at + DEFAULT_STAY_MS);
        let mut requests: Vec<(Ulid, Stay)> = Vec::with_capacity(rooms.len());
        let mut seen = HashSet::new();
        for request in &rooms {
            let room_id = self.resolve_room(&request.room)?;
            if !seen.insert(room_id) {
                return Err(EngineError::Validation("duplicate room in batch".into()));
            }
            let stay = request.stay.unwrap_or(default_stay);
            validate_stay(&stay)?;
            requests.push((room_id, stay));
        }

        let room_ids: Vec<Ulid> = requests.iter().map(|(id, _)| *id).collect();
        txn.lock_rooms(&room_ids).await?;

        // Validate every room under its lock; any failure drops the
        // whole batch uncommitted.
        for (room_id, _) in &requests {
            let holders = self.holders_for_room(room_id);
            match conflict::evaluate(self.stores.rooms.contains(room_id), booking_id, &holders) {
                ConflictCheck::Free => {}
                ConflictCheck::ConflictWith { booking_id: held_by, status } => {
                    metrics::counter!(
                        crate::observability::ROOM_CONFLICTS_TOTAL,
                        "command" => "assign_rooms"
                    )
                    .increment(1);
                    return Err(EngineError::RoomConflict {
                        room_id: *room_id,
                        held_by,
                        holder_status: status,
                    });
                }
                ConflictCheck::RoomNotFound => return Err(EngineError::NotFound(*room_id)),
            }
            let room = txn.room(room_id).expect("txn: room row locked");
            if room.status != RoomStatus::Available {
                return Err(EngineError::RoomUnavailable { room_id: *room_id, status: room.status });
            }
        }

        let next_status = match (booking.channel, booking.status) {
            (_, BookingStatus::Pending) => BookingStatus::Confirmed,
            (BookingChannel::Online, BookingStatus::Confirmed) => BookingStatus::CheckedIn,
            (_, current) => current,
        };
        let room_status = if next_status == BookingStatus::CheckedIn {
            RoomStatus::Occupied
        } else {
            RoomStatus::Reserved
        };

        let at = now_ms();
        let assignments: Vec<Assignment> = requests
            .into_iter()
            .map(|(room_id, stay)| Assignment {
                id: Ulid::new(),
                booking_id,
                room_id,
                stay,
                created_at: at,
            })
            .collect();
        let assigned_count = assignments.len();

        txn.commit(Event::RoomsAssigned {
            booking_id,
            assignments,
            booking_status: next_status,
            room_status,
            at,
        })
        .await?;

        tracing::info!(booking = %booking_id, rooms = assigned_count, status = %next_status, "rooms assigned");
        Ok(AssignmentSummary { assigned_count, room_status })
    }

    fn resolve_room(&self, room: &RoomRef) -> Result<Ulid, EngineError> {
        match room {
            RoomRef::Id(id) => {
                if self.stores.rooms.contains(id) {
                    Ok(*id)
                } else {
                    Err(EngineError::NotFound(*id))
                }
            }
            RoomRef::Number(number) => self
                .stores
                .rooms
                .id_for_number(number)
                .ok_or_else(|| EngineError::UnknownRoomNumber(number.clone())),
        }
    }

    // ── Status transitions ───────────────────────────────────

    pub async fn transition_status(
        &self,
        booking_id: Ulid,
        to: BookingStatus,
    ) -> Result<StatusChange, EngineError> {
        let started = Instant::now();
        let result = self.do_transition_status(booking_id, to).await;
        record_outcome("transition_status", &result, started);
        result
    }

    /// Move a booking to `to`. Targets with side effects delegate to
    /// the dedicated commands so rooms and records stay consistent no
    /// matter which door the caller came in through.
    async fn do_transition_status(
        &self,
        booking_id: Ulid,
        to: BookingStatus,
    ) -> Result<StatusChange, EngineError> {
        match to {
            BookingStatus::CheckedIn => {
                let (from, _) = self.do_check_in(booking_id).await?;
                Ok(StatusChange { old_status: from, new_status: BookingStatus::CheckedIn })
            }
            BookingStatus::CheckedOut => {
                let (from, _) = self.do_check_out(booking_id).await?;
                Ok(StatusChange { old_status: from, new_status: BookingStatus::CheckedOut })
            }
            BookingStatus::Cancelled => {
                let (from, _) = self.do_cancel(booking_id, CancelType::Other, None).await?;
                Ok(StatusChange { old_status: from, new_status: BookingStatus::Cancelled })
            }
            to => {
                let txn = self.begin(booking_id).await?;
                let booking = txn.booking_row();
                let (channel, from) = (booking.channel, booking.status);
                if !can_transition(channel, from, to) {
                    return Err(EngineError::InvalidTransition {
                        from,
                        to,
                        allowed: allowed_targets(channel, from),
                    });
                }
                let at = now_ms();
                txn.commit(Event::StatusChanged { booking_id, from, to, at }).await?;
                tracing::info!(booking = %booking_id, %from, %to, "status changed");
                Ok(StatusChange { old_status: from, new_status: to })
            }
        }
    }

    // ── Check-in / check-out ─────────────────────────────────

    pub async fn check_in(&self, booking_id: Ulid) -> Result<CheckInReceipt, EngineError> {
        let started = Instant::now();
        let result = self.do_check_in(booking_id).await.map(|(_, receipt)| receipt);
        record_outcome("check_in", &result, started);
        result
    }

    async fn do_check_in(
        &self,
        booking_id: Ulid,
    ) -> Result<(BookingStatus, CheckInReceipt), EngineError> {
        let mut txn = self.begin(booking_id).await?;
        let booking = txn.booking_row();
        let (channel, from) = (booking.channel, booking.status);
        if !can_transition(channel, from, BookingStatus::CheckedIn) {
            return Err(EngineError::InvalidTransition {
                from,
                to: BookingStatus::CheckedIn,
                allowed: allowed_targets(channel, from),
            });
        }

        let assignments = self.stores.assignments.for_booking(&booking_id);
        if assignments.is_empty() {
            return Err(EngineError::Validation("no rooms assigned".into()));
        }
        let room_ids: Vec<Ulid> = assignments.iter().map(|a| a.room_id).collect();
        txn.lock_rooms(&room_ids).await?;

        let at = now_ms();
        let rooms_updated = room_ids.len();
        txn.commit(Event::CheckedIn { booking_id, room_ids, at }).await?;
        tracing::info!(booking = %booking_id, rooms = rooms_updated, "checked in");
        Ok((from, CheckInReceipt { rooms_updated }))
    }

    pub async fn check_out(&self, booking_id: Ulid) -> Result<CheckOutReceipt, EngineError> {
        let started = Instant::now();
        let result = self.do_check_out(booking_id).await.map(|(_, receipt)| receipt);
        record_outcome("check_out", &result, started);
        result
    }

    /// Rooms return to Available; assignment rows stay on the books as
    /// stay history.
    async fn do_check_out(
        &self,
        booking_id: Ulid,
    ) -> Result<(BookingStatus, CheckOutReceipt), EngineError> {
        let mut txn = self.begin(booking_id).await?;
        let booking = txn.booking_row();
        let (channel, from) = (booking.channel, booking.status);
        if !can_transition(channel, from, BookingStatus::CheckedOut) {
            return Err(EngineError::InvalidTransition {
                from,
                to: BookingStatus::CheckedOut,
                allowed: allowed_targets(channel, from),
            });
        }

        let room_ids: Vec<Ulid> = self
            .stores
            .assignments
            .for_booking(&booking_id)
            .iter()
            .map(|a| a.room_id)
            .collect();
        txn.lock_rooms(&room_ids).await?;

        let at = now_ms();
        let rooms_released = room_ids.len();
        txn.commit(Event::CheckedOut { booking_id, room_ids, at }).await?;
        tracing::info!(booking = %booking_id, rooms = rooms_released, "checked out");
        Ok((from, CheckOutReceipt { rooms_released }))
    }

    // ── Cancellation ─────────────────────────────────────────

    pub async fn cancel_booking(
        &self,
        booking_id: Ulid,
        cancel_type: CancelType,
        reason: Option<String>,
    ) -> Result<CancelReceipt, EngineError> {
        let started = Instant::now();
        let result = self
            .do_cancel(booking_id, cancel_type, reason)
            .await
            .map(|(_, receipt)| receipt);
        record_outcome("cancel_booking", &result, started);
        result
    }

    /// Cancel a booking: release its rooms, drop its assignments, and
    /// write the cancellation record, atomically.
    async fn do_cancel(
        &self,
        booking_id: Ulid,
        cancel_type: CancelType,
        reason: Option<String>,
    ) -> Result<(BookingStatus, CancelReceipt), EngineError> {
        if let Some(ref r) = reason
            && r.len() > MAX_REASON_LEN {
                return Err(EngineError::LimitExceeded("cancellation reason too long"));
            }

        let mut txn = self.begin(booking_id).await?;
        let booking = txn.booking_row();
        let (channel, from) = (booking.channel, booking.status);
        if !can_transition(channel, from, BookingStatus::Cancelled) {
            return Err(EngineError::InvalidTransition {
                from,
                to: BookingStatus::Cancelled,
                allowed: allowed_targets(channel, from),
            });
        }

        let released: Vec<ReleasedRoom> = self
            .stores
            .assignments
            .for_booking(&booking_id)
            .iter()
            .map(|a| ReleasedRoom { assignment_id: a.id, room_id: a.room_id })
            .collect();
        let room_ids: Vec<Ulid> = released.iter().map(|r| r.room_id).collect();
        txn.lock_rooms(&room_ids).await?;

        let at = now_ms();
        let record = Cancellation {
            id: Ulid::new(),
            booking_id,
            cancel_type,
            reason,
            created_at: at,
        };
        let cancel_id = record.id;
        let rooms_released = released.len();
        txn.commit(Event::BookingCancelled { record, from, released, at }).await?;
        tracing::info!(booking = %booking_id, rooms = rooms_released, %cancel_type, "booking cancelled");
        Ok((from, CancelReceipt { cancel_id, rooms_released }))
    }

    pub async fn amend_cancellation(
        &self,
        cancel_id: Ulid,
        cancel_type: CancelType,
        reason: Option<String>,
    ) -> Result<Cancellation, EngineError> {
        let started = Instant::now();
        let result = self.do_amend_cancellation(cancel_id, cancel_type, reason).await;
        record_outcome("amend_cancellation", &result, started);
        result
    }

    async fn do_amend_cancellation(
        &self,
        cancel_id: Ulid,
        cancel_type: CancelType,
        reason: Option<String>,
    ) -> Result<Cancellation, EngineError> {
        if let Some(ref r) = reason
            && r.len() > MAX_REASON_LEN {
                return Err(EngineError::LimitExceeded("cancellation reason too long"));
            }
        if self.stores.cancellations.get(&cancel_id).is_none() {
            return Err(EngineError::NotFound(cancel_id));
        }

        let txn = self.begin_floating().await?;
        let at = now_ms();
        txn.commit(Event::CancellationAmended { cancel_id, cancel_type, reason, at }).await?;
        self.stores
            .cancellations
            .get(&cancel_id)
            .ok_or(EngineError::NotFound(cancel_id))
    }

    // ── Room inventory ───────────────────────────────────────

    pub async fn add_room(&self, number: String, room_type: Ulid) -> Result<Room, EngineError> {
        let started = Instant::now();
        let result = self.do_add_room(number, room_type).await;
        record_outcome("add_room", &result, started);
        result
    }

    async fn do_add_room(&self, number: String, room_type: Ulid) -> Result<Room, EngineError> {
        if number.is_empty() {
            return Err(EngineError::Validation("room number is empty".into()));
        }
        if number.len() > MAX_ROOM_NUMBER_LEN {
            return Err(EngineError::LimitExceeded("room number too long"));
        }
        if self.stores.rooms.len() >= MAX_ROOMS {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }

        let txn = self.begin_floating().await?;
        let at = now_ms();
        let room = Room {
            id: Ulid::new(),
            number,
            room_type,
            status: RoomStatus::Available,
            updated_at: at,
        };

        // Two concurrent add_rooms both hold the gate shared, so number
        // uniqueness rides on the claim, not the gate.
        if let Err(holder) = self.stores.rooms.claim_number(&room.number, room.id) {
            return Err(EngineError::AlreadyExists(holder));
        }
        match txn.commit(Event::RoomAdded { room: room.clone() }).await {
            Ok(()) => {
                tracing::info!(room = %room.id, number = %room.number, "room added");
                Ok(room)
            }
            Err(e) => {
                self.stores.rooms.release_number(&room.number);
                Err(e)
            }
        }
    }

    pub async fn set_room_maintenance(
        &self,
        room: RoomRef,
        on: bool,
    ) -> Result<Room, EngineError> {
        let started = Instant::now();
        let result = self.do_set_room_maintenance(&room, on).await;
        record_outcome("set_room_maintenance", &result, started);
        result
    }

    /// Flip a room between Available and Maintenance. Rooms held by a
    /// booking (Reserved or Occupied) cannot be flipped either way.
    async fn do_set_room_maintenance(&self, room: &RoomRef, on: bool) -> Result<Room, EngineError> {
        let room_id = self.resolve_room(room)?;
        let mut txn = self.begin_floating().await?;
        txn.lock_rooms(&[room_id]).await?;
        let current = txn.room(&room_id).expect("txn: room row locked").clone();

        let target = if on { RoomStatus::Maintenance } else { RoomStatus::Available };
        if current.status == target {
            return Ok(current);
        }
        match (current.status, target) {
            (RoomStatus::Available, RoomStatus::Maintenance)
            | (RoomStatus::Maintenance, RoomStatus::Available) => {}
            _ => return Err(EngineError::RoomUnavailable { room_id, status: current.status }),
        }

        let at = now_ms();
        txn.commit(Event::RoomStatusSet { room_id, status: target, at }).await?;
        tracing::info!(room = %room_id, status = %target, "room status set");
        Ok(Room { status: target, updated_at: at, ..current })
    }
}
