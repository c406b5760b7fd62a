//! Billing period boundaries. Periods always follow the calendar month.

use chrono::{Datelike, NaiveDate};

/// First day of the month after `today`.
pub fn next_reset(today: NaiveDate) -> Option<NaiveDate> {
    let (year, month) = if today.month() == 12 {
        (today.year() + 1, 1)
    } else {
        (today.year(), today.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// Whole days from `today` until the next billing period starts.
pub fn days_until_reset(today: NaiveDate) -> u32 {
    next_reset(today)
        .map(|reset| (reset - today).num_days().max(1) as u32)
        .unwrap_or(1)
}
