//! Wall-clock access and the persisted timestamp encoding.
//!
//! Every instant the engine compares or persists is truncated to minute
//! granularity in the one deployment timezone. The stored textual form keeps
//! the UTC offset so a database survives a timezone change of the deployment
//! without reinterpretation.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::error::CoreError;

/// Minute-precision ISO 8601 with UTC offset, e.g. `2025-01-10T18:00+05:00`.
pub const STORED_FORMAT: &str = "%Y-%m-%dT%H:%M%:z";

/// Accepted on read for rows written by older deployments.
const STORED_FORMAT_SECONDS: &str = "%Y-%m-%dT%H:%M:%S%:z";

/// Drops seconds and sub-second precision.
pub fn truncate_to_minute<T: TimeZone>(dt: DateTime<T>) -> DateTime<T> {
    dt.clone()
        .with_second(0)
        .and_then(|d| d.with_nanosecond(0))
        .unwrap_or(dt)
}

/// Encodes an instant in the persisted textual form.
pub fn format_stored(dt: &DateTime<Tz>) -> String {
    truncate_to_minute(dt.clone())
        .format(STORED_FORMAT)
        .to_string()
}

/// Decodes the persisted textual form back into the deployment timezone.
///
/// `format_stored` followed by `parse_stored` is lossless at minute precision.
pub fn parse_stored(text: &str, tz: Tz) -> Result<DateTime<Tz>, CoreError> {
    for fmt in [STORED_FORMAT, STORED_FORMAT_SECONDS] {
        if let Ok(dt) = DateTime::parse_from_str(text, fmt) {
            return Ok(truncate_to_minute(dt.with_timezone(&tz)));
        }
    }
    Err(CoreError::InvalidTimestamp(text.to_string()))
}

/// Start of the local day containing `now`.
pub fn local_midnight(now: DateTime<Tz>) -> DateTime<Tz> {
    let midnight = now.date_naive().and_hms_opt(0, 0, 0).unwrap_or_else(|| {
        // 00:00:00 always exists on a NaiveDate.
        now.naive_local()
    });
    resolve_local(now.timezone(), midnight, now)
}

/// Maps a naive local time into the zone, shifting forward across DST gaps.
pub(crate) fn resolve_local(tz: Tz, naive: NaiveDateTime, fallback: DateTime<Tz>) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive).earliest() {
        Some(dt) => dt,
        None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .unwrap_or(fallback),
    }
}

/// Source of "now" for the jobs. Implementations must already apply the
/// deployment timezone and minute truncation.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Tz>;
    fn timezone(&self) -> Tz;
}

/// Production clock over the system time.
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        truncate_to_minute(Utc::now().with_timezone(&self.tz))
    }

    fn timezone(&self) -> Tz {
        self.tz
    }
}
