use std::time::Duration;

use crate::error::{ApierError, ApierResult};

/// Parse a usage string.
///
/// An empty string is zero and a bare integer counts nanoseconds. Anything
/// else is a sequence of decimal numbers with a unit each (`h`, `m`, `s`,
/// `ms`, `us`/`µs`, `ns`), e.g. `1h2m3s`, `1.5s` or `250ms`.
pub fn parse_duration_with_nanos(input: &str) -> ApierResult<Duration> {
    let s = input.trim();
    if s.is_empty() {
        return Ok(Duration::ZERO);
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        let nanos: u64 = s.parse().map_err(|_| invalid(input, "too large"))?;
        return Ok(Duration::from_nanos(nanos));
    }

    let mut rest = s.strip_prefix('+').unwrap_or(s);
    if rest.starts_with('-') {
        return Err(invalid(input, "negative durations are not supported"));
    }
    if rest.is_empty() {
        return Err(invalid(input, "missing value"));
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(num_len);
        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let per_unit: u128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60_000_000_000,
            "h" => 3_600_000_000_000,
            "" => return Err(invalid(input, "missing unit")),
            other => return Err(invalid(input, &format!("unknown unit {other:?}"))),
        };
        total = total
            .checked_add(component_nanos(input, number, per_unit)?)
            .ok_or_else(|| invalid(input, "overflow"))?;
        rest = tail;
    }
    let nanos = u64::try_from(total).map_err(|_| invalid(input, "overflow"))?;
    Ok(Duration::from_nanos(nanos))
}

/// `number` (digits with an optional fraction) times `per_unit` nanoseconds.
fn component_nanos(input: &str, number: &str, per_unit: u128) -> ApierResult<u128> {
    let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
    if (whole.is_empty() && frac.is_empty()) || frac.contains('.') {
        return Err(invalid(input, "expected a number"));
    }
    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid(input, "overflow"))?
    };
    let mut nanos = whole
        .checked_mul(per_unit)
        .ok_or_else(|| invalid(input, "overflow"))?;
    // Fraction digits beyond nanosecond precision are dropped.
    let mut scale = per_unit;
    for digit in frac.bytes() {
        scale /= 10;
        if scale == 0 {
            break;
        }
        nanos = nanos
            .checked_add(u128::from(digit - b'0') * scale)
            .ok_or_else(|| invalid(input, "overflow"))?;
    }
    Ok(nanos)
}

fn invalid(input: &str, reason: &str) -> ApierError {
    ApierError::InvalidUsage {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_is_zero() {
        assert_eq!(parse_duration_with_nanos("").unwrap(), Duration::ZERO);
    }

    #[test]
    fn bare_integer_is_nanoseconds() {
        assert_eq!(parse_duration_with_nanos("1500").unwrap(), Duration::from_nanos(1500));
    }

    #[test]
    fn unit_sequences() {
        let cases = [
            ("1h2m3s", Duration::from_secs(3723)),
            ("1.5s", Duration::from_millis(1500)),
            ("250ms", Duration::from_millis(250)),
            ("10us", Duration::from_micros(10)),
            ("3ns", Duration::from_nanos(3)),
            ("2m", Duration::from_secs(120)),
            ("+30s", Duration::from_secs(30)),
        ];
        for (input, expected) in cases {
            assert_eq!(parse_duration_with_nanos(input).unwrap(), expected, "{input}");
        }
    }

    #[test]
    fn rejects_garbage() {
        for input in ["abc", "5x", "1..5s", "-1s", "s", "1h2", ".s"] {
            let err = parse_duration_with_nanos(input).unwrap_err();
            assert!(matches!(err, ApierError::InvalidUsage { .. }), "{input}");
        }
    }

    #[test]
    fn fraction_overflow_is_an_error() {
        // The whole part times 1000 sits just below u128::MAX; the fraction tips it over.
        let err = parse_duration_with_nanos("340282366920938463463374607431768211.999us")
            .unwrap_err();
        assert!(matches!(err, ApierError::InvalidUsage { ref reason, .. } if reason == "overflow"));
    }

    proptest! {
        #[test]
        fn whole_seconds(secs in 0u64..1_000_000) {
            let parsed = parse_duration_with_nanos(&format!("{secs}s")).unwrap();
            prop_assert_eq!(parsed, Duration::from_secs(secs));
        }
    }
}
