//! Duration argument parsing.
//!
//! Accepts relative durations (`30s`, `5m`, `2h`, capped at 24 hours) and
//! absolute `HH:MM` clock times, which resolve to the number of seconds
//! until the next occurrence of that local wall-clock time.

use chrono::{Local, NaiveTime, Timelike};

/// Upper bound for relative durations: 24 hours.
const MAX_RELATIVE_SECS: u64 = 86_400;

/// Parse a duration string into seconds.
///
/// Returns `None` for anything unparseable: zero or negative counts,
/// relative durations over 24 hours, out-of-range clock fields.
pub fn parse_duration(input: &str) -> Option<u64> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }

    if s.contains(':') {
        return parse_clock_time(s);
    }

    let (last_idx, _) = s.char_indices().last()?;
    let (digits, unit) = s.split_at(last_idx);
    let count: u64 = digits.parse().ok()?;
    if count == 0 {
        return None;
    }

    let secs = match unit {
        "s" => count,
        "m" => count.checked_mul(60)?,
        "h" => count.checked_mul(3600)?,
        _ => return None,
    };

    (secs <= MAX_RELATIVE_SECS).then_some(secs)
}

/// `HH:MM` resolved to seconds until the next occurrence of that time.
fn parse_clock_time(s: &str) -> Option<u64> {
    let (hh, mm) = s.split_once(':')?;
    let hour: u32 = hh.parse().ok()?;
    let minute: u32 = mm.parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }

    let target = NaiveTime::from_hms_opt(hour, minute, 0)?;
    let now = Local::now().time();
    let now_secs = now.num_seconds_from_midnight() as i64;
    let target_secs = target.num_seconds_from_midnight() as i64;

    let mut delta = target_secs - now_secs;
    if delta <= 0 {
        delta += 86_400;
    }
    Some(delta as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_seconds() {
        assert_eq!(parse_duration("30s"), Some(30));
        assert_eq!(parse_duration("1s"), Some(1));
    }

    #[test]
    fn parses_minutes() {
        assert_eq!(parse_duration("90m"), Some(90 * 60));
        assert_eq!(parse_duration("1m"), Some(60));
    }

    #[test]
    fn parses_hours() {
        assert_eq!(parse_duration("2h"), Some(2 * 3600));
        assert_eq!(parse_duration("1h"), Some(3600));
    }

    #[test]
    fn tolerates_surrounding_whitespace() {
        assert_eq!(parse_duration(" 30s "), Some(30));
        assert_eq!(parse_duration("  5m  "), Some(5 * 60));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_duration("invalid"), None);
        assert_eq!(parse_duration("30x"), None);
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("abc"), None);
        assert_eq!(parse_duration("s"), None);
        assert_eq!(parse_duration("é"), None);
    }

    #[test]
    fn rejects_zero_and_over_cap() {
        assert_eq!(parse_duration("0s"), None);
        assert_eq!(parse_duration("0m"), None);
        assert_eq!(parse_duration("25h"), None);
        assert_eq!(parse_duration("86400s"), Some(86_400));
        assert_eq!(parse_duration("24h"), Some(86_400));
        assert_eq!(parse_duration("1441m"), None);
    }

    #[test]
    fn absolute_time_resolves_to_future_offset() {
        let result = parse_duration("06:00").unwrap();
        assert!(result > 0);
        assert!(result <= 86_400);
    }

    #[test]
    fn rejects_out_of_range_clock_fields() {
        assert_eq!(parse_duration("25:00"), None);
        assert_eq!(parse_duration("12:60"), None);
        assert_eq!(parse_duration(":30"), None);
        assert_eq!(parse_duration("12:"), None);
    }
}
