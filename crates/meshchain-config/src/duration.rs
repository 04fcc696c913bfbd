//! Duration strings in entry files.
//!
//! Timeouts are written the same way as health-check intervals elsewhere:
//! `"5s"`, `"500ms"`, `"2m"`, or a bare number of seconds.

use std::time::Duration;

/// Parse a duration string like "5s", "500ms", "1m". Sub-millisecond
/// values use "us" or "ns". Values that overflow are rejected.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(n) = s.strip_suffix("ns") {
        n.parse::<u128>().ok().and_then(from_nanos)
    } else if let Some(us) = s.strip_suffix("us") {
        us.parse::<u128>().ok().and_then(|u| u.checked_mul(1_000)).and_then(from_nanos)
    } else if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

fn from_nanos(n: u128) -> Option<Duration> {
    let secs = u64::try_from(n / 1_000_000_000).ok()?;
    Some(Duration::new(secs, (n % 1_000_000_000) as u32))
}

/// Render a duration in the shortest form [`parse_duration`] reads back
/// exactly.
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos % 1_000 != 0 {
        format!("{nanos}ns")
    } else if nanos % 1_000_000 != 0 {
        format!("{}us", d.as_micros())
    } else if nanos % 1_000_000_000 != 0 {
        format!("{}ms", d.as_millis())
    } else {
        format!("{}s", d.as_secs())
    }
}

/// `#[serde(with = "...")]` adapter for `Duration` fields; zero is the
/// unset value.
pub mod serde_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        if raw.is_empty() {
            return Ok(Duration::ZERO);
        }
        super::parse_duration(&raw)
            .ok_or_else(|| D::Error::custom(format!("invalid duration {raw:?}")))
    }
}

pub fn is_zero(d: &Duration) -> bool {
    d.is_zero()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("soon"), None);
    }

    #[test]
    fn format_duration_prefers_seconds() {
        assert_eq!(format_duration(Duration::from_secs(5)), "5s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }

    #[test]
    fn overflowing_minutes_are_rejected() {
        assert_eq!(parse_duration("307445734561825861m"), None);
        assert_eq!(
            parse_duration("307445734561825860m"),
            Some(Duration::from_secs(307445734561825860 * 60))
        );
    }

    #[test]
    fn sub_millisecond_durations_round_trip() {
        for d in [
            Duration::from_micros(1500),
            Duration::from_nanos(1_000_000_001),
            Duration::from_millis(250),
            Duration::from_secs(90),
        ] {
            assert_eq!(parse_duration(&format_duration(d)), Some(d), "{d:?}");
        }
        assert_eq!(format_duration(Duration::from_micros(1500)), "1500us");
        assert_eq!(parse_duration("20ns"), Some(Duration::from_nanos(20)));
    }
}
