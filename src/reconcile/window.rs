use crate::models::NormalizedPoint;
use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, Utc};

/// Same month/day `years` earlier. A day that does not exist in the target
/// year overflows into the next month (Feb 29 → Mar 1). Windows reaching
/// past the calendar's range start at `NaiveDate::MIN`.
fn years_before(d: NaiveDate, years: u32) -> NaiveDate {
    let Some(year) = i32::try_from(years).ok().and_then(|y| d.year().checked_sub(y)) else {
        return NaiveDate::MIN;
    };
    NaiveDate::from_ymd_opt(year, d.month(), d.day())
        .or_else(|| {
            NaiveDate::from_ymd_opt(year, d.month(), 1)
                .and_then(|first| first.checked_add_days(Days::new(u64::from(d.day()) - 1)))
        })
        .unwrap_or(NaiveDate::MIN)
}

/// First instant (epoch ms) inside the trailing window: midnight UTC of
/// today's date, `years` calendar years back.
pub fn window_start_ms(now: DateTime<Utc>, years: u32) -> i64 {
    years_before(now.date_naive(), years)
        .and_time(NaiveTime::default())
        .and_utc()
        .timestamp_millis()
}

/// Keep points at or after `start_ms`, preserving order.
pub fn filter_window(series: Vec<NormalizedPoint>, start_ms: i64) -> Vec<NormalizedPoint> {
    series.into_iter().filter(|p| p.timestamp >= start_ms).collect()
}
