//! Duration-literal parsing for OVER and EVERY clauses.
//!
//! Accepts the `<number><unit>` form with units `ns`, `us`, `µs`, `ms`,
//! `s`, `m`, `h`. Segments concatenate: `2h30m`, `1m30s`, `1.5h`.

use crate::fluxsql::sql::error::SqlError;
use std::time::Duration;

/// Parse a duration literal such as `1h`, `100ms` or `2h30m`.
pub fn parse_duration(text: &str) -> Result<Duration, SqlError> {
    if text.is_empty() {
        return Err(SqlError::parse_error("empty duration", None));
    }

    let mut total_nanos: f64 = 0.0;
    let mut rest = text;

    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .ok_or_else(|| {
                SqlError::parse_error(format!("missing unit in duration '{}'", text), None)
            })?;
        if digits_end == 0 {
            return Err(SqlError::parse_error(
                format!("invalid duration '{}'", text),
                None,
            ));
        }
        let number: f64 = rest[..digits_end].parse().map_err(|_| {
            SqlError::parse_error(format!("invalid number in duration '{}'", text), None)
        })?;
        rest = &rest[digits_end..];

        let (unit_nanos, unit_len) = match_unit(rest).ok_or_else(|| {
            SqlError::parse_error(format!("unknown unit in duration '{}'", text), None)
        })?;
        rest = &rest[unit_len..];

        total_nanos += number * unit_nanos;
    }

    Ok(Duration::from_nanos(total_nanos as u64))
}

/// Match the longest unit prefix; returns (nanoseconds per unit, byte length).
fn match_unit(s: &str) -> Option<(f64, usize)> {
    // Longest first so "ms" is not read as "m"
    for (unit, nanos) in [
        ("ns", 1.0),
        ("us", 1_000.0),
        ("µs", 1_000.0),
        ("ms", 1_000_000.0),
        ("s", 1_000_000_000.0),
        ("m", 60_000_000_000.0),
        ("h", 3_600_000_000_000.0),
    ] {
        if s.starts_with(unit) {
            return Some((nanos, unit.len()));
        }
    }
    None
}
