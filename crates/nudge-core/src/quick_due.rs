//! Quick-due presets consumed by the reschedule path: "today", "tomorrow"
//! and "this week" at a fixed default time of day.

use chrono::{DateTime, Datelike, Duration, NaiveTime};
use chrono_tz::Tz;

use crate::clock::resolve_local;

pub const DEFAULT_DUE_HOUR: u32 = 18;
pub const DEFAULT_DUE_MINUTE: u32 = 0;

/// Today at `hour:minute` local time.
pub fn due_today(now: DateTime<Tz>, hour: u32, minute: u32) -> DateTime<Tz> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0)
        .unwrap_or_else(|| NaiveTime::from_hms_opt(DEFAULT_DUE_HOUR, DEFAULT_DUE_MINUTE, 0).unwrap_or(NaiveTime::MIN));
    resolve_local(now.timezone(), now.date_naive().and_time(time), now)
}

/// Tomorrow at `hour:minute` local time.
pub fn due_tomorrow(now: DateTime<Tz>, hour: u32, minute: u32) -> DateTime<Tz> {
    due_today(now, hour, minute) + Duration::days(1)
}

/// Sunday of the current Monday-based week, at `hour:minute` local time.
pub fn due_this_week(now: DateTime<Tz>, hour: u32, minute: u32) -> DateTime<Tz> {
    let days_to_sunday = 6 - i64::from(now.weekday().num_days_from_monday());
    due_today(now, hour, minute) + Duration::days(days_to_sunday)
}
