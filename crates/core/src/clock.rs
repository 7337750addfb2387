//! Timestamps at the precision the ledger store persists.

use chrono::{DateTime, DurationRound, TimeDelta, Utc};

/// Current time truncated to microseconds.
///
/// Postgres `timestamptz` keeps microseconds; truncating at the source keeps
/// in-memory and persisted values (and therefore cursors) identical.
pub fn now() -> DateTime<Utc> {
    truncate(Utc::now())
}

/// Truncate a timestamp to store precision.
pub fn truncate(t: DateTime<Utc>) -> DateTime<Utc> {
    t.duration_trunc(TimeDelta::microseconds(1)).unwrap_or(t)
}
