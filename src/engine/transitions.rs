//! The booking state machine as one data-driven table. Every status
//! change, including the ones `check_in`/`check_out`/`cancel_booking`
//! perform internally, is gated through `allowed_targets`.

use crate::model::{BookingChannel, BookingStatus};

use BookingStatus::*;

/// Statuses a booking may move to from `from`, given its channel.
/// Terminal statuses return an empty slice.
pub fn allowed_targets(channel: BookingChannel, from: BookingStatus) -> &'static [BookingStatus] {
    match (channel, from) {
        (_, Pending) => &[Confirmed, Cancelled],
        // Online bookings are prepaid: Confirmed skips Paid entirely.
        (BookingChannel::WalkIn, Confirmed) => &[Paid, Cancelled],
        (BookingChannel::Online, Confirmed) => &[CheckedIn, Cancelled],
        (_, Paid) => &[CheckedIn, Cancelled],
        (_, CheckedIn) => &[CheckedOut],
        (_, CheckedOut) | (_, Cancelled) | (_, NoShow) | (_, Completed) => &[],
    }
}

pub fn can_transition(channel: BookingChannel, from: BookingStatus, to: BookingStatus) -> bool {
    allowed_targets(channel, from).contains(&to)
}

/// Whether a booking in this status holds its assigned rooms against
/// other bookings.
pub fn is_active_status(status: BookingStatus) -> bool {
    !matches!(status, Cancelled | NoShow | Completed | CheckedOut)
}

/// Whether a booking in this status may take on new room assignments.
pub fn is_assignable_status(status: BookingStatus) -> bool {
    matches!(status, Pending | Confirmed | Paid)
}
