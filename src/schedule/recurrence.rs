//! Next-occurrence computation for recurring care tasks.

use chrono::{DateTime, Days, Months, NaiveDateTime, TimeZone, Utc};

use super::resolve_local;
use crate::errors::AppError;
use crate::models::CareFrequency;

/// Compute the due instant that follows `current_due_at`, with calendar math in UTC.
#[allow(dead_code)]
pub fn next_due_at(
    current_due_at: DateTime<Utc>,
    frequency: CareFrequency,
) -> Result<DateTime<Utc>, AppError> {
    next_due_at_in(current_due_at, frequency, &Utc)
}

/// Compute the next due instant, adding days or months to the wall-clock time in `tz`.
///
/// Monthly steps clamp to the last day of the target month: Jan 31 becomes Feb 28
/// (or 29), never early March.
pub fn next_due_at_in<Z: TimeZone>(
    current_due_at: DateTime<Utc>,
    frequency: CareFrequency,
    tz: &Z,
) -> Result<DateTime<Utc>, AppError> {
    let local = current_due_at.with_timezone(tz).naive_local();
    let next_local = advance(local, frequency).ok_or_else(|| {
        AppError::Internal(format!("Due date {} is out of range", current_due_at))
    })?;
    resolve_local(tz, next_local)
}

fn advance(local: NaiveDateTime, frequency: CareFrequency) -> Option<NaiveDateTime> {
    match frequency {
        CareFrequency::Daily => local.checked_add_days(Days::new(1)),
        CareFrequency::Weekly => local.checked_add_days(Days::new(7)),
        // chrono saturates the day-of-month here
        CareFrequency::Monthly => local.checked_add_months(Months::new(1)),
    }
}
