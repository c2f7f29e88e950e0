//! Conversions between user wall-clock input and stored UTC instants.
//!
//! Users pick dates and times in a local zone (see
//! [`EngineConfig::local_timezone`](crate::config::EngineConfig)); everything
//! persisted is UTC.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Convert a local wall-clock time to UTC.
///
/// Ambiguous times (fall-back overlap) resolve to the earlier instant. Times
/// inside a spring-forward gap are shifted forward by the one-hour gap.
pub fn local_to_utc(local: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            let shifted = local + Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .map_or_else(|| shifted.and_utc(), |dt| dt.with_timezone(&Utc))
        }
    }
}

pub fn utc_to_local(instant: DateTime<Utc>, tz: Tz) -> NaiveDateTime {
    instant.with_timezone(&tz).naive_local()
}

/// The last second (23:59:59) of a local calendar date, as UTC.
pub fn local_date_end_of_day(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let end = date
        .and_hms_opt(23, 59, 59)
        .unwrap_or_else(|| date.and_time(chrono::NaiveTime::MIN));
    local_to_utc(end, tz)
}

/// Parse `YYYY-MM-DDTHH:MM[:SS]` as local time and convert to UTC.
pub fn parse_local_datetime(raw: &str, tz: Tz) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|local| local_to_utc(local, tz))
}

/// Parse a `YYYY-MM-DD` recurrence end date into the UTC instant that ends it.
pub fn parse_local_date_end(raw: &str, tz: Tz) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .ok()
        .map(|date| local_date_end_of_day(date, tz))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn shanghai_is_eight_hours_ahead() {
        let utc = parse_local_datetime("2025-09-15T10:00", chrono_tz::Asia::Shanghai).unwrap();
        assert_eq!(utc, Utc.with_ymd_and_hms(2025, 9, 15, 2, 0, 0).unwrap());
    }

    #[test]
    fn end_date_is_last_local_second() {
        let end = parse_local_date_end("2025-09-19", chrono_tz::Asia::Shanghai).unwrap();
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 9, 19, 15, 59, 59).unwrap());
        assert_eq!(
            utc_to_local(end, chrono_tz::Asia::Shanghai).to_string(),
            "2025-09-19 23:59:59"
        );
    }

    #[test]
    fn spring_forward_gap_shifts_forward() {
        // 02:30 does not exist in New York on 2026-03-08.
        let local = NaiveDate::from_ymd_opt(2026, 3, 8)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap();
        let utc = local_to_utc(local, chrono_tz::America::New_York);
        assert_eq!(utc, Utc.with_ymd_and_hms(2026, 3, 8, 7, 30, 0).unwrap());
    }

    #[test]
    fn garbage_is_none() {
        assert!(parse_local_datetime("next tuesday", chrono_tz::UTC).is_none());
        assert!(parse_local_date_end("2025-13-01", chrono_tz::UTC).is_none());
    }
}
