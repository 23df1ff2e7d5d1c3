//! Local-day boundaries and first-occurrence placement.

use chrono::{DateTime, Days, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

use super::resolve_local;
use crate::errors::AppError;

/// Local hour at which a newly registered plant's first task is due.
pub const FIRST_TASK_HOUR: u32 = 9;

/// Inclusive instant range covering one local calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DayWindow {
    #[cfg(test)]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }
}

/// The calendar date of `now` as seen in `tz`.
pub fn local_date<Z: TimeZone>(now: DateTime<Utc>, tz: &Z) -> NaiveDate {
    now.with_timezone(tz).date_naive()
}

/// Local midnight to the last millisecond before the next local midnight.
pub fn day_window<Z: TimeZone>(now: DateTime<Utc>, tz: &Z) -> Result<DayWindow, AppError> {
    let date = local_date(now, tz);
    let next_date = date
        .checked_add_days(Days::new(1))
        .ok_or_else(|| AppError::BadRequest(format!("Date {} is out of range", date)))?;

    let start = resolve_local(tz, date.and_time(NaiveTime::MIN))?;
    let next_start = resolve_local(tz, next_date.and_time(NaiveTime::MIN))?;

    Ok(DayWindow {
        start,
        end: next_start - Duration::milliseconds(1),
    })
}

/// Today at 09:00 local time; the first care task of a new registration lands here.
pub fn first_due_at<Z: TimeZone>(now: DateTime<Utc>, tz: &Z) -> Result<DateTime<Utc>, AppError> {
    let nine = NaiveTime::from_hms_opt(FIRST_TASK_HOUR, 0, 0)
        .ok_or_else(|| AppError::Internal("Invalid first task hour".to_string()))?;
    resolve_local(tz, local_date(now, tz).and_time(nine))
}
