//! Go-style duration strings: `75s`, `11m`, `168h`, `1h30m`, `1.5h`, `250ms`.

use std::fmt;
use std::time::Duration;

use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// ## Summary
/// Parses a duration such as `1h30m`. A bare `0` is accepted.
///
/// ## Errors
/// Returns a message naming the offending input when it is empty, lacks a unit, or uses an
/// unknown unit.
pub fn parse(input: &str) -> Result<Duration, String> {
    let text = input.trim();
    if text == "0" {
        return Ok(Duration::ZERO);
    }
    if text.is_empty() {
        return Err("empty duration".to_owned());
    }

    let mut total: u128 = 0;
    let mut rest = text;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("missing unit in duration {input:?}"))?;
        if number_end == 0 {
            return Err(format!("invalid duration {input:?}"));
        }
        let (number, tail) = rest.split_at(number_end);

        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_end);

        let scale: u128 = match unit {
            "ns" => 1,
            "us" | "µs" => 1_000,
            "ms" => 1_000_000,
            "s" => NANOS_PER_SEC,
            "m" => 60 * NANOS_PER_SEC,
            "h" => 60 * 60 * NANOS_PER_SEC,
            other => return Err(format!("unknown unit {other:?} in duration {input:?}")),
        };

        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        let bad_number = |_err| format!("invalid number {number:?} in duration {input:?}");
        let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().map_err(bad_number)? };
        total += whole * scale;

        if !fraction.is_empty() {
            let digits = u32::try_from(fraction.len()).map_err(|_err| format!("invalid duration {input:?}"))?;
            let fraction: u128 = fraction.parse().map_err(bad_number)?;
            total += fraction * scale / 10u128.pow(digits.min(30));
        }

        rest = tail;
    }

    let nanos = u64::try_from(total).map_err(|_err| format!("duration {input:?} is too large"))?;
    Ok(Duration::from_nanos(nanos))
}

/// ## Summary
/// Formats a duration the way [`parse`] reads it, using the largest units first.
#[must_use]
pub fn format(duration: Duration) -> String {
    let secs = duration.as_secs();
    let nanos = duration.subsec_nanos();

    if secs == 0 {
        return match nanos {
            0 => "0s".to_owned(),
            n if n % 1_000_000 == 0 => format!("{}ms", n / 1_000_000),
            n => format!("{n}ns"),
        };
    }

    let mut out = String::new();
    let (hours, minutes, seconds) = (secs / 3600, secs % 3600 / 60, secs % 60);
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if nanos > 0 {
        let fraction = format!("{nanos:09}");
        out.push_str(&format!("{seconds}.{}s", fraction.trim_end_matches('0')));
    } else if seconds > 0 {
        out.push_str(&format!("{seconds}s"));
    }
    out
}

/// ## Summary
/// `serde(with)` serializer.
///
/// ## Errors
/// Propagates the serializer's error.
pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format(*duration))
}

/// ## Summary
/// `serde(with)` deserializer. Accepts a duration string or an integer number of seconds.
///
/// ## Errors
/// Returns a deserialization error for malformed strings.
pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    deserializer.deserialize_any(DurationVisitor)
}

struct DurationVisitor;

impl Visitor<'_> for DurationVisitor {
    type Value = Duration;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a duration such as \"90s\" or \"1h30m\"")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Duration, E> {
        parse(value).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Duration, E> {
        Ok(Duration::from_secs(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Duration, E> {
        u64::try_from(value)
            .map(Duration::from_secs)
            .map_err(|_err| E::custom("negative duration"))
    }
}
