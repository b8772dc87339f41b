//! Canonical timeframe roles and interval label parsing.
//!
//! Raw market payloads label their candle tables in many ways ("1", "5m",
//! "4h", "htf"). Everything downstream of the normalizer only speaks in
//! terms of the four canonical roles defined here.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Relative granularity tier of a candle table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeframeRole {
    /// Finest granularity (typically 1 minute)
    Base,
    /// Lower timeframe
    Ltf,
    /// Medium timeframe
    Mtf,
    /// Higher timeframe
    Htf,
}

impl TimeframeRole {
    /// All roles, finest first.
    pub const ALL: [TimeframeRole; 4] = [Self::Base, Self::Ltf, Self::Mtf, Self::Htf];

    /// Returns the canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Ltf => "ltf",
            Self::Mtf => "mtf",
            Self::Htf => "htf",
        }
    }

    /// Position of this role in the finest-to-coarsest ordering.
    #[must_use]
    pub const fn rank(self) -> usize {
        match self {
            Self::Base => 0,
            Self::Ltf => 1,
            Self::Mtf => 2,
            Self::Htf => 3,
        }
    }

    /// Exact (case-insensitive) match against the canonical names.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "base" => Some(Self::Base),
            "ltf" => Some(Self::Ltf),
            "mtf" => Some(Self::Mtf),
            "htf" => Some(Self::Htf),
            _ => None,
        }
    }

    /// Heuristic role for a raw interval in minutes.
    ///
    /// `< 5` → base, `5..15` → ltf, `15..120` → mtf, `>= 120` → htf.
    #[must_use]
    pub const fn from_minutes(minutes: u32) -> Option<Self> {
        match minutes {
            0 => None,
            1..=4 => Some(Self::Base),
            5..=14 => Some(Self::Ltf),
            15..=119 => Some(Self::Mtf),
            _ => Some(Self::Htf),
        }
    }
}

impl fmt::Display for TimeframeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses an interval label into minutes.
///
/// Accepts bare numbers ("15", read as minutes) and suffixed forms
/// ("5m", "30min", "4h", "1d"). Returns `None` for anything else.
#[must_use]
pub fn parse_interval_minutes(label: &str) -> Option<u32> {
    let label = label.trim().to_ascii_lowercase();
    let digits_end = label
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(label.len());
    if digits_end == 0 {
        return None;
    }

    let value: u32 = label[..digits_end].parse().ok()?;
    let multiplier = match &label[digits_end..] {
        "" | "m" | "min" | "mins" | "minute" | "minutes" => 1,
        "h" | "hr" | "hour" | "hours" => 60,
        "d" | "day" | "days" => 1440,
        _ => return None,
    };

    value.checked_mul(multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_names_round_trip() {
        for role in TimeframeRole::ALL {
            assert_eq!(TimeframeRole::from_name(role.as_str()), Some(role));
        }
        assert_eq!(TimeframeRole::from_name("HTF"), Some(TimeframeRole::Htf));
        assert_eq!(TimeframeRole::from_name("weekly"), None);
    }

    #[test]
    fn heuristic_bands() {
        assert_eq!(TimeframeRole::from_minutes(1), Some(TimeframeRole::Base));
        assert_eq!(TimeframeRole::from_minutes(5), Some(TimeframeRole::Ltf));
        assert_eq!(TimeframeRole::from_minutes(15), Some(TimeframeRole::Mtf));
        assert_eq!(TimeframeRole::from_minutes(60), Some(TimeframeRole::Mtf));
        assert_eq!(TimeframeRole::from_minutes(120), Some(TimeframeRole::Htf));
        assert_eq!(TimeframeRole::from_minutes(1440), Some(TimeframeRole::Htf));
        assert_eq!(TimeframeRole::from_minutes(0), None);
    }

    #[test]
    fn parses_suffixed_labels() {
        assert_eq!(parse_interval_minutes("1"), Some(1));
        assert_eq!(parse_interval_minutes("5m"), Some(5));
        assert_eq!(parse_interval_minutes("30min"), Some(30));
        assert_eq!(parse_interval_minutes("4h"), Some(240));
        assert_eq!(parse_interval_minutes(" 1D "), Some(1440));
    }

    #[test]
    fn rejects_non_numeric_labels() {
        assert_eq!(parse_interval_minutes("htf"), None);
        assert_eq!(parse_interval_minutes("5x"), None);
        assert_eq!(parse_interval_minutes(""), None);
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_string(&TimeframeRole::Mtf).unwrap();
        assert_eq!(json, "\"mtf\"");
    }
}
