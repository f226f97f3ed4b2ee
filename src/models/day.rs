//! Calendar-day keys for per-day records.
//!
//! A day key is the millisecond timestamp of local midnight for the day a
//! timestamp falls on. Two timestamps on the same calendar day always share
//! a key, which is what keeps `daily_records` at one row per day.

use chrono::{DateTime, Duration, Local, TimeZone, Utc};

/// Milliseconds in a nominal day. DST days may be shorter or longer.
pub const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;

/// Normalizes a timestamp to the start of its day in the system time zone.
pub fn day_start(timestamp_ms: i64) -> i64 {
    day_start_in(timestamp_ms, &Local)
}

/// Normalizes a timestamp to the start of its day in `tz`.
///
/// When midnight does not exist locally (a DST gap), the first valid hour of
/// the day is used. When it exists twice, the earlier instant wins.
pub fn day_start_in<Tz: TimeZone>(timestamp_ms: i64, tz: &Tz) -> i64 {
    let Some(utc) = DateTime::<Utc>::from_timestamp_millis(timestamp_ms) else {
        return timestamp_ms;
    };
    let Some(midnight) = utc.with_timezone(tz).date_naive().and_hms_opt(0, 0, 0) else {
        return timestamp_ms;
    };

    (0..24)
        .find_map(|hour| {
            tz.from_local_datetime(&(midnight + Duration::hours(hour)))
                .earliest()
        })
        .map(|start| start.timestamp_millis())
        .unwrap_or(timestamp_ms)
}

/// Day key for the current day.
pub fn today() -> i64 {
    day_start(Utc::now().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn millis(rfc3339: &str) -> i64 {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .timestamp_millis()
    }

    #[test]
    fn test_same_day_different_times_share_key() {
        let morning = millis("2025-03-10T06:15:00Z");
        let evening = millis("2025-03-10T22:45:30Z");

        assert_eq!(day_start_in(morning, &Utc), day_start_in(evening, &Utc));
        assert_eq!(day_start_in(morning, &Utc), millis("2025-03-10T00:00:00Z"));
    }

    #[test]
    fn test_adjacent_days_differ_by_one_day() {
        let today = day_start_in(millis("2025-03-10T12:00:00Z"), &Utc);
        let tomorrow = day_start_in(millis("2025-03-11T00:00:00Z"), &Utc);

        assert_eq!(tomorrow - today, DAY_MILLIS);
    }

    #[test]
    fn test_offset_zone_uses_local_midnight() {
        let tz = FixedOffset::east_opt(5 * 3600).unwrap();
        // 2025-03-10T21:00Z is already 2025-03-11 02:00 at +05:00
        let key = day_start_in(millis("2025-03-10T21:00:00Z"), &tz);

        assert_eq!(key, millis("2025-03-11T00:00:00+05:00"));
    }

    #[test]
    fn test_key_is_idempotent() {
        let key = day_start_in(millis("2025-07-04T13:14:15Z"), &Utc);
        assert_eq!(day_start_in(key, &Utc), key);
    }

    #[test]
    fn test_today_is_a_day_key() {
        let key = today();
        assert_eq!(day_start(key), key);
    }
}
