use ulid::Ulid;

use crate::model::*;

use super::transitions::is_active_status;
use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

pub(crate) fn validate_stay(stay: &Stay) -> Result<(), EngineError> {
    use crate::limits::*;
    if stay.check_in_at >= stay.check_out_at {
        return Err(EngineError::Validation(
            "stay check-in must be before check-out".into(),
        ));
    }
    if stay.check_in_at < MIN_VALID_TIMESTAMP_MS || stay.check_out_at > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if stay.duration_ms() > MAX_STAY_DURATION_MS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(())
}

/// Outcome of checking one room for a candidate booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConflictCheck {
    Free,
    ConflictWith { booking_id: Ulid, status: BookingStatus },
    RoomNotFound,
}

/// Decide whether `candidate` may take a room, given every assignment
/// currently recorded against that room and each holder's status.
///
/// A room is taken while any other booking holds an active assignment
/// on it. Whether the stays would overlap does not matter: the front
/// desk model is one active booking per room, cancel to rebook.
pub(crate) fn evaluate(
    room_exists: bool,
    candidate: Ulid,
    holders: &[(Assignment, BookingStatus)],
) -> ConflictCheck {
    if !room_exists {
        return ConflictCheck::RoomNotFound;
    }
    for (assignment, status) in holders {
        if assignment.booking_id == candidate {
            continue;
        }
        if is_active_status(*status) {
            return ConflictCheck::ConflictWith {
                booking_id: assignment.booking_id,
                status: *status,
            };
        }
    }
    ConflictCheck::Free
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holder(booking_id: Ulid, status: BookingStatus) -> (Assignment, BookingStatus) {
        (
            Assignment {
                id: Ulid::new(),
                booking_id,
                room_id: Ulid::new(),
                stay: Stay::new(0, 1_000),
                created_at: 0,
            },
            status,
        )
    }

    #[test]
    fn free_room_is_free() {
        assert_eq!(evaluate(true, Ulid::new(), &[]), ConflictCheck::Free);
    }

    #[test]
    fn missing_room_reported_first() {
        let holders = vec![holder(Ulid::new(), BookingStatus::Confirmed)];
        assert_eq!(evaluate(false, Ulid::new(), &holders), ConflictCheck::RoomNotFound);
    }

    #[test]
    fn active_holder_blocks() {
        let other = Ulid::new();
        let holders = vec![holder(other, BookingStatus::CheckedIn)];
        assert_eq!(
            evaluate(true, Ulid::new(), &holders),
            ConflictCheck::ConflictWith { booking_id: other, status: BookingStatus::CheckedIn }
        );
    }

    #[test]
    fn inactive_holders_do_not_block() {
        let holders = vec![
            holder(Ulid::new(), BookingStatus::Cancelled),
            holder(Ulid::new(), BookingStatus::CheckedOut),
            holder(Ulid::new(), BookingStatus::NoShow),
        ];
        assert_eq!(evaluate(true, Ulid::new(), &holders), ConflictCheck::Free);
    }

    #[test]
    fn own_assignment_is_skipped() {
        let candidate = Ulid::new();
        let holders = vec![holder(candidate, BookingStatus::Confirmed)];
        assert_eq!(evaluate(true, candidate, &holders), ConflictCheck::Free);
    }

    #[test]
    fn first_active_holder_wins() {
        let first = Ulid::new();
        let holders = vec![
            holder(Ulid::new(), BookingStatus::Cancelled),
            holder(first, BookingStatus::Paid),
            holder(Ulid::new(), BookingStatus::Confirmed),
        ];
        assert_eq!(
            evaluate(true, Ulid::new(), &holders),
            ConflictCheck::ConflictWith { booking_id: first, status: BookingStatus::Paid }
        );
    }

    #[test]
    fn stay_validation() {
        assert!(validate_stay(&Stay { check_in_at: 1_000, check_out_at: 2_000 }).is_ok());
        assert!(matches!(
            validate_stay(&Stay { check_in_at: 2_000, check_out_at: 1_000 }),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            validate_stay(&Stay { check_in_at: -5, check_out_at: 1_000 }),
            Err(EngineError::LimitExceeded("timestamp out of range"))
        ));
        let too_long = Stay {
            check_in_at: 0,
            check_out_at: crate::limits::MAX_STAY_DURATION_MS + 1,
        };
        assert!(matches!(
            validate_stay(&too_long),
            Err(EngineError::LimitExceeded("stay too long"))
        ));
    }
}
