//! Hard caps on inputs and stored state. Commands that would cross one
//! fail with `EngineError::LimitExceeded` naming the limit.

use crate::model::Ms;

pub const MIN_GUESTS_PER_BOOKING: u32 = 1;
pub const MAX_GUESTS_PER_BOOKING: u32 = 50;

/// Rooms accepted in one assignment batch.
pub const MAX_ROOMS_PER_BATCH: usize = 16;

pub const MAX_PHONE_LEN: usize = 32;
pub const MAX_ROOM_NUMBER_LEN: usize = 16;
pub const MAX_SPECIAL_REQUEST_LEN: usize = 512;
pub const MAX_REASON_LEN: usize = 512;

/// Sanity window for client-supplied timestamps: 1970 through year 3000.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
pub const MAX_VALID_TIMESTAMP_MS: Ms = 32_503_680_000_000;

/// Longest bookable stay (366 days).
pub const MAX_STAY_DURATION_MS: Ms = 31_622_400_000;

/// Stay assumed when an assignment omits one (one night).
pub const DEFAULT_STAY_MS: Ms = 86_400_000;

/// How long a transaction waits on a contended row before giving up.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;

pub const MAX_ROOMS: usize = 10_000;
pub const MAX_BOOKINGS: usize = 1_000_000;
