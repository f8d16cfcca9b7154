use ulid::Ulid;

use crate::model::BookingStatus;

#[derive(Debug)]
pub enum EngineError {
    Validation(String),
    LimitExceeded(&'static str),
    NotFound(Ulid),
    UnknownRoomNumber(String),
    AlreadyExists(Ulid),
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
        allowed: &'static [BookingStatus],
    },
    NotAssignable {
        booking_id: Ulid,
        status: BookingStatus,
    },
    RoomConflict {
        room_id: Ulid,
        held_by: Ulid,
        holder_status: BookingStatus,
    },
    RoomUnavailable {
        room_id: Ulid,
        status: crate::model::RoomStatus,
    },
    AlreadyAssigned {
        booking_id: Ulid,
        active_rooms: usize,
    },
    Busy(&'static str),
    Wal(String),
}

impl EngineError {
    /// Stable error class for the response envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_)
            | EngineError::LimitExceeded(_)
            | EngineError::AlreadyExists(_) => "ValidationError",
            EngineError::NotFound(_) | EngineError::UnknownRoomNumber(_) => "NotFound",
            EngineError::InvalidTransition { .. } | EngineError::NotAssignable { .. } => {
                "InvalidTransition"
            }
            EngineError::RoomConflict { .. } | EngineError::RoomUnavailable { .. } => {
                "RoomConflict"
            }
            EngineError::AlreadyAssigned { .. } => "AlreadyAssigned",
            EngineError::Busy(_) => "Busy",
            EngineError::Wal(_) => "PersistenceError",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "validation failed: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::UnknownRoomNumber(number) => {
                write!(f, "unknown room number: {number:?}")
            }
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::InvalidTransition { from, to, allowed } => {
                if allowed.is_empty() {
                    write!(f, "cannot move booking from {from} to {to}: {from} is terminal")
                } else {
                    let allowed: Vec<String> = allowed.iter().map(|s| s.to_string()).collect();
                    write!(
                        f,
                        "cannot move booking from {from} to {to}; allowed: {}",
                        allowed.join(", ")
                    )
                }
            }
            EngineError::NotAssignable { booking_id, status } => {
                write!(f, "booking {booking_id} cannot take rooms while {status}")
            }
            EngineError::RoomConflict { room_id, held_by, holder_status } => {
                write!(f, "room {room_id} is held by booking {held_by} ({holder_status})")
            }
            EngineError::RoomUnavailable { room_id, status } => {
                write!(f, "room {room_id} is {status}")
            }
            EngineError::AlreadyAssigned { booking_id, active_rooms } => {
                write!(
                    f,
                    "booking {booking_id} already has {active_rooms} assigned room(s); cancel first to rebook"
                )
            }
            EngineError::Busy(what) => write!(f, "busy: timed out waiting for {what}"),
            EngineError::Wal(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
