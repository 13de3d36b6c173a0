//! # Day Boundaries
//!
//! "Today" is the Gregorian day of `as_of` in a caller-supplied offset, so
//! expiry views are reproducible across devices and tests.
//!
//! ```text
//!            expired              │          expiring (window = W days)
//!   ─────────────────────────────┼──────────────────────────────────────┼──
//!                          start_of_today                 start_of_today + W
//!   expiry <  start              │  start <= expiry <= start + W (both inclusive)
//! ```
//!
//! Offsets are fixed: callers in a zone with daylight saving pass the offset
//! in effect at `as_of`. The window end is then exactly `W * 24h` after the
//! start, so across a transition it lands one hour off local midnight.

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, TimeZone, Utc};

/// Start of the calendar day containing `as_of`, observed in `tz`.
///
/// ## Example
/// ```rust
/// use chrono::{FixedOffset, TimeZone, Utc};
/// use pantry_core::calendar::start_of_day;
///
/// let tz = FixedOffset::east_opt(2 * 3600).unwrap();
/// let as_of = Utc.with_ymd_and_hms(2026, 1, 9, 23, 30, 0).unwrap();
/// // 01:30 on the 10th in UTC+2
/// assert_eq!(start_of_day(as_of, &tz), Utc.with_ymd_and_hms(2026, 1, 9, 22, 0, 0).unwrap());
/// ```
pub fn start_of_day(as_of: DateTime<Utc>, tz: &FixedOffset) -> DateTime<Utc> {
    let local_date = as_of.with_timezone(tz).date_naive();
    let midnight = local_date.and_time(NaiveTime::MIN);
    // Fixed offsets have no gaps or folds, so the mapping is always single.
    tz.from_local_datetime(&midnight)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&(midnight - *tz)))
}

/// Resolved `[start, end]` bounds for expiry queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryWindow {
    pub start_of_today: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

impl ExpiryWindow {
    /// Window of `window_days` whole 24-hour days from the start of today.
    ///
    /// `tz` must be the offset in effect at `as_of`; it is applied to both
    /// ends.
    pub fn new(as_of: DateTime<Utc>, window_days: u32, tz: &FixedOffset) -> Self {
        let start_of_today = start_of_day(as_of, tz);
        ExpiryWindow {
            start_of_today,
            window_end: start_of_today + Duration::days(i64::from(window_days)),
        }
    }

    /// Strictly before the start of today.
    pub fn is_expired(&self, expiry: DateTime<Utc>) -> bool {
        expiry < self.start_of_today
    }

    /// Inside `[start_of_today, window_end]`, both ends inclusive.
    pub fn is_expiring(&self, expiry: DateTime<Utc>) -> bool {
        expiry >= self.start_of_today && expiry <= self.window_end
    }
}
