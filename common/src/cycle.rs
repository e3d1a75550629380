use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};

use crate::error::AppError;

/// Length of a subscription usage cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleLength {
    /// Boundaries on the first day of each month, 00:00 UTC.
    CalendarMonth,
    Fixed(Duration),
}

impl CycleLength {
    /// The boundary that ends the cycle a fresh subscription starts at `now`.
    pub fn first_reset_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            CycleLength::CalendarMonth => {
                let (year, month) = if now.month() == 12 {
                    (now.year() + 1, 1)
                } else {
                    (now.year(), now.month() + 1)
                };
                NaiveDate::from_ymd_opt(year, month, 1)
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
                    .map(|naive| naive.and_utc())
                    .unwrap_or(DateTime::<Utc>::MAX_UTC)
            }
            CycleLength::Fixed(length) => now + *length,
        }
    }

    /// Moves a boundary forward by exactly one cycle.
    pub fn advance(&self, boundary: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            CycleLength::CalendarMonth => boundary
                .checked_add_months(Months::new(1))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            CycleLength::Fixed(length) => boundary
                .checked_add_signed(*length)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Returns the next boundary strictly after `now` when `reset_at` has been
    /// crossed, or `None` while the current cycle is still running.
    ///
    /// Boundaries keep their cadence: they advance in whole cycles from the
    /// old `reset_at`, never snap to `now`.
    pub fn roll_forward(
        &self,
        reset_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        if now < reset_at {
            return None;
        }

        match self {
            CycleLength::Fixed(length) => {
                let step = length.num_milliseconds().max(1);
                let elapsed = (now - reset_at).num_milliseconds();
                let cycles = elapsed / step + 1;
                Some(
                    reset_at
                        .checked_add_signed(Duration::milliseconds(step.saturating_mul(cycles)))
                        .unwrap_or(DateTime::<Utc>::MAX_UTC),
                )
            }
            CycleLength::CalendarMonth => {
                let mut next = self.advance(reset_at);
                while next <= now {
                    next = self.advance(next);
                }
                Some(next)
            }
        }
    }
}

impl FromStr for CycleLength {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "monthly" | "month" => Ok(CycleLength::CalendarMonth),
            other => match other.parse::<i64>() {
                Ok(secs) if secs > 0 => Ok(CycleLength::Fixed(Duration::seconds(secs))),
                _ => Err(AppError::BadRequest(format!(
                    "Cycle length must be 'monthly' or a positive number of seconds, got '{}'",
                    value
                ))),
            },
        }
    }
}
