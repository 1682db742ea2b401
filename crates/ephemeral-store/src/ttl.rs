//! TTL selectors and expiration computation

use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Fixed set of lifetimes an upload may ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TtlSelector {
    TenSeconds,
    ThirtySeconds,
    ThirtyMinutes,
    #[default]
    OneHour,
    ThreeHours,
    SixHours,
    OneDay,
    SevenDays,
}

impl TtlSelector {
    pub const ALL: [TtlSelector; 8] = [
        TtlSelector::TenSeconds,
        TtlSelector::ThirtySeconds,
        TtlSelector::ThirtyMinutes,
        TtlSelector::OneHour,
        TtlSelector::ThreeHours,
        TtlSelector::SixHours,
        TtlSelector::OneDay,
        TtlSelector::SevenDays,
    ];

    /// Parse a selector string. Matching is exact; unknown values fall back
    /// to one hour so a malformed TTL never fails an upload.
    pub fn parse(selector: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|s| s.as_str() == selector)
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TtlSelector::TenSeconds => "10s",
            TtlSelector::ThirtySeconds => "30s",
            TtlSelector::ThirtyMinutes => "30m",
            TtlSelector::OneHour => "1h",
            TtlSelector::ThreeHours => "3h",
            TtlSelector::SixHours => "6h",
            TtlSelector::OneDay => "24h",
            TtlSelector::SevenDays => "7d",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            TtlSelector::TenSeconds => Duration::seconds(10),
            TtlSelector::ThirtySeconds => Duration::seconds(30),
            TtlSelector::ThirtyMinutes => Duration::minutes(30),
            TtlSelector::OneHour => Duration::hours(1),
            TtlSelector::ThreeHours => Duration::hours(3),
            TtlSelector::SixHours => Duration::hours(6),
            TtlSelector::OneDay => Duration::hours(24),
            TtlSelector::SevenDays => Duration::days(7),
        }
    }
}

impl fmt::Display for TtlSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Absolute expiry for an upload made at `now` with the given selector
pub fn resolve_expiration(selector: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    now + TtlSelector::parse(selector).duration()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_table() {
        let expected = [
            ("10s", 10),
            ("30s", 30),
            ("30m", 30 * 60),
            ("1h", 60 * 60),
            ("3h", 3 * 60 * 60),
            ("6h", 6 * 60 * 60),
            ("24h", 24 * 60 * 60),
            ("7d", 7 * 24 * 60 * 60),
        ];

        for (selector, secs) in expected {
            let ttl = TtlSelector::parse(selector);
            assert_eq!(ttl.as_str(), selector);
            assert_eq!(ttl.duration().num_seconds(), secs, "selector {}", selector);
        }
    }

    #[test]
    fn test_unknown_selector_falls_back_to_one_hour() {
        let now = Utc::now();
        assert_eq!(
            resolve_expiration("bogus", now),
            resolve_expiration("1h", now)
        );
        assert_eq!(TtlSelector::parse(""), TtlSelector::OneHour);
        assert_eq!(TtlSelector::parse("10S"), TtlSelector::OneHour);
    }

    #[test]
    fn test_expiration_is_after_now() {
        let now = Utc::now();
        for ttl in TtlSelector::ALL {
            assert!(resolve_expiration(ttl.as_str(), now) > now);
        }
    }

    #[test]
    fn test_selector_match_is_exact() {
        assert_eq!(TtlSelector::parse(" 10s"), TtlSelector::OneHour);
        assert_eq!(TtlSelector::parse("7d\n"), TtlSelector::OneHour);
        assert_eq!(TtlSelector::parse("7d"), TtlSelector::SevenDays);
    }
}
