//! Human-readable interval strings ("30s", "1m", "7d")

use crate::RateLimitError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const SECOND_MILLIS: u64 = 1_000;
const MINUTE_MILLIS: u64 = 60 * SECOND_MILLIS;
const HOUR_MILLIS: u64 = 60 * MINUTE_MILLIS;
const DAY_MILLIS: u64 = 24 * HOUR_MILLIS;

/// Parse `{number}{unit}` into milliseconds.
///
/// Units are `s`, `m`, `h` and `d`. The numeric part must be a non-empty run
/// of ASCII digits.
///
/// ```
/// assert_eq!(durable_ratelimit::parse_duration("1m").unwrap(), 60_000);
/// assert!(durable_ratelimit::parse_duration("10").is_err());
/// ```
pub fn parse_duration(input: &str) -> Result<u64, RateLimitError> {
    let invalid = || RateLimitError::InvalidDurationFormat(input.to_owned());

    let digits_end = input
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(invalid)?;
    let (number, unit) = input.split_at(digits_end);
    if number.is_empty() {
        return Err(invalid());
    }

    let unit_millis = match unit {
        "s" => SECOND_MILLIS,
        "m" => MINUTE_MILLIS,
        "h" => HOUR_MILLIS,
        "d" => DAY_MILLIS,
        _ => return Err(invalid()),
    };

    number
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(unit_millis))
        .ok_or_else(invalid)
}

/// A parsed interval that remembers its source text.
///
/// Deserializes from the same string form accepted by [`parse_duration`].
#[derive(Clone, PartialEq, Eq)]
pub struct Interval {
    text: Box<str>,
    millis: u64,
}

impl Interval {
    /// Parse an interval string
    pub fn parse(text: &str) -> Result<Self, RateLimitError> {
        let millis = parse_duration(text)?;
        Ok(Self {
            text: text.into(),
            millis,
        })
    }

    pub(crate) fn known(text: &str, millis: u64) -> Self {
        Self {
            text: text.into(),
            millis,
        }
    }

    /// Interval length in milliseconds
    pub fn as_millis(&self) -> u64 {
        self.millis
    }

    /// Interval as a std duration
    pub fn as_duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.millis)
    }

    /// Source text, e.g. `"7d"`
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl std::str::FromStr for Interval {
    type Err = RateLimitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Debug for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Interval({} = {}ms)", self.text, self.millis)
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

impl Serialize for Interval {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for Interval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}
