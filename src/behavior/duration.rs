//! Duration text in the `1h2m3.5s` style used by operators.
//!
//! Parsing accepts a signed sequence of decimal numbers, each with an
//! optional fraction and a mandatory unit (`ns`, `us`, `µs`, `μs`, `ms`,
//! `s`, `m`, `h`). A bare `0` is valid. A bare integer is read as
//! milliseconds. Formatting produces the canonical shortest form, so a
//! value set through `/latency/60` reads back as `60ms`.

use std::time::Duration;

use crate::error::ErrorCode;

const NANOS_PER_SECOND: u128 = 1_000_000_000;

const UNITS: &[(&str, u128)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("μs", 1_000),
    ("ms", 1_000_000),
    ("s", NANOS_PER_SECOND),
    ("m", 60 * NANOS_PER_SECOND),
    ("h", 3_600 * NANOS_PER_SECOND),
];

/// Parse a latency value, rejecting anything negative or malformed.
pub fn parse_duration(raw: &str) -> Result<Duration, ErrorCode> {
    let raw = raw.trim();
    let nanos = match parse_unit_duration(raw) {
        Some(nanos) => nanos,
        None => {
            let millis: i64 = raw.parse().map_err(|_| ErrorCode::InvalidDuration)?;
            i128::from(millis) * 1_000_000
        }
    };
    u64::try_from(nanos)
        .map(Duration::from_nanos)
        .map_err(|_| ErrorCode::InvalidDuration)
}

/// Signed nanoseconds for unit-suffixed input, `None` if it is not in that form.
fn parse_unit_duration(input: &str) -> Option<i128> {
    let (negative, mut rest) = match input.as_bytes().first() {
        Some(b'-') => (true, &input[1..]),
        Some(b'+') => (false, &input[1..]),
        _ => (false, input),
    };
    if rest == "0" {
        return Some(0);
    }
    if rest.is_empty() {
        return None;
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let (int_part, after) = rest.split_at(int_len);
        let (frac_part, after) = match after.strip_prefix('.') {
            Some(tail) => {
                let frac_len = tail.bytes().take_while(u8::is_ascii_digit).count();
                tail.split_at(frac_len)
            }
            None => ("", after),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }

        let unit_len = after
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after.len());
        let (unit, tail) = after.split_at(unit_len);
        let scale = UNITS.iter().find(|(name, _)| *name == unit)?.1;

        let whole: u128 = if int_part.is_empty() { 0 } else { int_part.parse().ok()? };
        let mut nanos = whole.checked_mul(scale)?;
        if !frac_part.is_empty() {
            // digits past nanosecond precision of an hour cannot change the result
            let digits = &frac_part[..frac_part.len().min(18)];
            let numerator: u128 = digits.parse().ok()?;
            let denominator = 10u128.pow(digits.len() as u32);
            nanos = nanos.checked_add(numerator * scale / denominator)?;
        }

        total = total.checked_add(nanos)?;
        if total > i64::MAX as u128 {
            return None;
        }
        rest = tail;
    }

    let total = total as i128;
    Some(if negative { -total } else { total })
}

/// Render a duration in canonical form (`0s`, `250µs`, `1.5ms`, `1m0s`).
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < 1_000 {
        return format!("{nanos}ns");
    }
    if nanos < 1_000_000 {
        return format!("{}µs", decimal(nanos, 3));
    }
    if nanos < NANOS_PER_SECOND {
        return format!("{}ms", decimal(nanos, 6));
    }

    let secs = nanos / NANOS_PER_SECOND;
    let fraction = fraction(nanos % NANOS_PER_SECOND, 9);
    let (hours, minutes, seconds) = (secs / 3_600, (secs / 60) % 60, secs % 60);

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h{minutes}m"));
    } else if minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    out.push_str(&format!("{seconds}{fraction}s"));
    out
}

fn decimal(value: u128, precision: u32) -> String {
    let scale = 10u128.pow(precision);
    format!("{}{}", value / scale, fraction(value % scale, precision as usize))
}

fn fraction(remainder: u128, width: usize) -> String {
    if remainder == 0 {
        return String::new();
    }
    let digits = format!("{remainder:0width$}");
    format!(".{}", digits.trim_end_matches('0'))
}
