//! Calendar arithmetic for care schedules.
//!
//! Everything here is pure: no clock reads, no I/O. Callers pass `now` in.

mod recurrence;
mod window;

pub use recurrence::*;
pub use window::*;

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, Offset, TimeZone, Utc};

use crate::errors::AppError;

/// Map a local wall-clock time to an instant.
///
/// Ambiguous times (clocks turned back) take the earlier instant. Times that fall in a
/// DST gap are read with the offset in force before the gap, which moves them forward
/// by the size of the gap (30 minutes on Lord Howe, an hour in most zones).
pub(crate) fn resolve_local<Z: TimeZone>(
    tz: &Z,
    local: NaiveDateTime,
) -> Result<DateTime<Utc>, AppError> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => Ok(dt.with_timezone(&Utc)),
        LocalResult::None => {
            let out_of_range =
                || AppError::Internal(format!("Local time {} is out of range", local));
            // A day back is safely before the transition for any real offset
            let earlier = local
                .checked_sub_signed(Duration::hours(24))
                .ok_or_else(out_of_range)?;
            let before = tz.offset_from_utc_datetime(&earlier).fix();
            let utc = local
                .checked_sub_signed(Duration::seconds(i64::from(before.local_minus_utc())))
                .ok_or_else(out_of_range)?;
            Ok(Utc.from_utc_datetime(&utc))
        }
    }
}
