use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

/// Requested stay window `[check_in_at, check_out_at)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stay {
    pub check_in_at: Ms,
    pub check_out_at: Ms,
}

impl Stay {
    pub fn new(check_in_at: Ms, check_out_at: Ms) -> Self {
        debug_assert!(check_in_at < check_out_at, "Stay check-in must be before check-out");
        Self { check_in_at, check_out_at }
    }

    pub fn duration_ms(&self) -> Ms {
        self.check_out_at - self.check_in_at
    }

    pub fn overlaps(&self, other: &Stay) -> bool {
        self.check_in_at < other.check_out_at && other.check_in_at < self.check_out_at
    }
}

/// How the booking entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingChannel {
    /// Taken at the front desk by a receptionist.
    WalkIn,
    /// Placed by a registered customer, prepaid.
    Online,
}

/// Booking lifecycle states. `NoShow` and `Completed` occur in imported
/// legacy rows; the state machine never produces them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Paid,
    CheckedIn,
    CheckedOut,
    Cancelled,
    NoShow,
    Completed,
}

/// Physical room states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomStatus {
    Available,
    Reserved,
    Occupied,
    Maintenance,
}

/// Why a booking was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelType {
    CustomerRequest,
    HotelPolicy,
    NoShow,
    PaymentIssue,
    ForceMajeure,
    SystemError,
    Other,
}

/// Who the booking is for — exactly one identity source, matched to the
/// channel (walk-in: phone, online: customer account).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuestIdentity {
    Customer(Ulid),
    Phone(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Ulid,
    pub channel: BookingChannel,
    pub guest: GuestIdentity,
    pub guest_count: u32,
    pub special_request: Option<String>,
    /// Receptionist who took the booking (walk-in only).
    pub receptionist: Option<Ulid>,
    pub status: BookingStatus,
    pub booked_at: Ms,
    pub created_at: Ms,
    pub updated_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: Ulid,
    /// Human-readable number, unique across the inventory.
    pub number: String,
    pub room_type: Ulid,
    pub status: RoomStatus,
    pub updated_at: Ms,
}

/// Booking-to-room link. Removed on cancellation, retained as history
/// after check-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: Ulid,
    pub booking_id: Ulid,
    pub room_id: Ulid,
    pub stay: Stay,
    pub created_at: Ms,
}

/// Cancellation record. One per cancelled booking; editable only
/// through the explicit amend path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cancellation {
    pub id: Ulid,
    pub booking_id: Ulid,
    pub cancel_type: CancelType,
    pub reason: Option<String>,
    pub created_at: Ms,
}

/// An (assignment, room) pair released by a cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleasedRoom {
    pub assignment_id: Ulid,
    pub room_id: Ulid,
}

/// One record per committed transaction — this is the WAL record format.
/// Multi-row effects (a batch assignment, a cancellation's releases)
/// ride in a single record, so replay of any log prefix lands on a
/// transaction boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomAdded {
        room: Room,
    },
    RoomStatusSet {
        room_id: Ulid,
        status: RoomStatus,
        at: Ms,
    },
    BookingCreated {
        booking: Booking,
    },
    RoomsAssigned {
        booking_id: Ulid,
        assignments: Vec<Assignment>,
        booking_status: BookingStatus,
        room_status: RoomStatus,
        at: Ms,
    },
    StatusChanged {
        booking_id: Ulid,
        from: BookingStatus,
        to: BookingStatus,
        at: Ms,
    },
    CheckedIn {
        booking_id: Ulid,
        room_ids: Vec<Ulid>,
        at: Ms,
    },
    CheckedOut {
        booking_id: Ulid,
        room_ids: Vec<Ulid>,
        at: Ms,
    },
    BookingCancelled {
        record: Cancellation,
        from: BookingStatus,
        released: Vec<ReleasedRoom>,
        at: Ms,
    },
    CancellationAmended {
        cancel_id: Ulid,
        cancel_type: CancelType,
        reason: Option<String>,
        at: Ms,
    },
    /// Compaction snapshot row; never produced by a live transaction.
    AssignmentRecorded {
        assignment: Assignment,
    },
    /// Compaction snapshot row; never produced by a live transaction.
    CancellationRecorded {
        record: Cancellation,
    },
}

// ── Command inputs ───────────────────────────────────────────────

/// Input to `create_booking`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBooking {
    pub channel: BookingChannel,
    pub guest: GuestIdentity,
    pub guest_count: u32,
    #[serde(default)]
    pub special_request: Option<String>,
    #[serde(default)]
    pub receptionist: Option<Ulid>,
    /// Defaults to now when absent.
    #[serde(default)]
    pub booked_at: Option<Ms>,
}

/// A room as the front desk refers to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomRef {
    Id(Ulid),
    Number(String),
}

/// One room in an assignment batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRequest {
    pub room: RoomRef,
    /// Defaults to one night from `booked_at` when absent.
    #[serde(default)]
    pub stay: Option<Stay>,
}

// ── Command results ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentSummary {
    pub assigned_count: usize,
    /// Status every assigned room ended at (Reserved, or Occupied when
    /// the assignment was itself the check-in act).
    pub room_status: RoomStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub old_status: BookingStatus,
    pub new_status: BookingStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInReceipt {
    pub rooms_updated: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutReceipt {
    pub rooms_released: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelReceipt {
    pub cancel_id: Ulid,
    pub rooms_released: usize,
}

// ── Query results ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingDetail {
    pub booking: Booking,
    pub assignments: Vec<Assignment>,
    pub cancellation: Option<Cancellation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomOccupancy {
    pub is_assigned: bool,
    /// Rooms the booking holds while it is active; 0 once it has
    /// checked out or been cancelled.
    pub room_count: usize,
}

// ── Legacy text parsing ──────────────────────────────────────────
//
// Imported rows spell statuses every way ("no-show", "No Show",
// "CHECKEDIN"), so parsing folds case and separators.

/// Failure to parse a legacy status/type token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub what: &'static str,
    pub value: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: {:?}", self.what, self.value)
    }
}

impl std::error::Error for ParseError {}

fn fold(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .flat_map(char::to_lowercase)
        .collect()
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BookingStatus::Pending => "Pending",
            BookingStatus::Confirmed => "Confirmed",
            BookingStatus::Paid => "Paid",
            BookingStatus::CheckedIn => "CheckedIn",
            BookingStatus::CheckedOut => "CheckedOut",
            BookingStatus::Cancelled => "Cancelled",
            BookingStatus::NoShow => "NoShow",
            BookingStatus::Completed => "Completed",
        })
    }
}

impl FromStr for BookingStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match fold(s).as_str() {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "paid" => Ok(BookingStatus::Paid),
            "checkedin" => Ok(BookingStatus::CheckedIn),
            "checkedout" => Ok(BookingStatus::CheckedOut),
            "cancelled" | "canceled" => Ok(BookingStatus::Cancelled),
            "noshow" => Ok(BookingStatus::NoShow),
            "completed" => Ok(BookingStatus::Completed),
            _ => Err(ParseError { what: "booking status", value: s.to_string() }),
        }
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RoomStatus::Available => "Available",
            RoomStatus::Reserved => "Reserved",
            RoomStatus::Occupied => "Occupied",
            RoomStatus::Maintenance => "Maintenance",
        })
    }
}

impl FromStr for RoomStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match fold(s).as_str() {
            "available" => Ok(RoomStatus::Available),
            "reserved" => Ok(RoomStatus::Reserved),
            "occupied" => Ok(RoomStatus::Occupied),
            "maintenance" => Ok(RoomStatus::Maintenance),
            _ => Err(ParseError { what: "room status", value: s.to_string() }),
        }
    }
}

impl fmt::Display for CancelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CancelType::CustomerRequest => "CustomerRequest",
            CancelType::HotelPolicy => "HotelPolicy",
            CancelType::NoShow => "NoShow",
            CancelType::PaymentIssue => "PaymentIssue",
            CancelType::ForceMajeure => "ForceMajeure",
            CancelType::SystemError => "SystemError",
            CancelType::Other => "Other",
        })
    }
}

impl FromStr for CancelType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match fold(s).as_str() {
            "customerrequest" => Ok(CancelType::CustomerRequest),
            "hotelpolicy" => Ok(CancelType::HotelPolicy),
            "noshow" => Ok(CancelType::NoShow),
            "paymentissue" => Ok(CancelType::PaymentIssue),
            "forcemajeure" => Ok(CancelType::ForceMajeure),
            "systemerror" => Ok(CancelType::SystemError),
            "other" => Ok(CancelType::Other),
            _ => Err(ParseError { what: "cancel type", value: s.to_string() }),
        }
    }
}

impl fmt::Display for BookingChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BookingChannel::WalkIn => "WalkIn",
            BookingChannel::Online => "Online",
        })
    }
}

impl FromStr for BookingChannel {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match fold(s).as_str() {
            "walkin" => Ok(BookingChannel::WalkIn),
            "online" => Ok(BookingChannel::Online),
            _ => Err(ParseError { what: "booking channel", value: s.to_string() }),
        }
    }
}
