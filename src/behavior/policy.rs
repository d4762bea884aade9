//! Value types making up the runtime fault policy.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rand::Rng;

use crate::error::ErrorCode;

/// An integer probability in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Percentage(u8);

impl Percentage {
    pub const NEVER: Percentage = Percentage(0);
    pub const ALWAYS: Percentage = Percentage(100);

    pub fn new(value: i64) -> Result<Self, ErrorCode> {
        u8::try_from(value)
            .ok()
            .filter(|v| *v <= 100)
            .map(Percentage)
            .ok_or(ErrorCode::InvalidPercentage)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Draw uniformly from `0..100` and report whether the draw landed below
    /// this percentage. `0` never hits and `100` always does.
    pub fn roll(self) -> bool {
        self.0 > 0 && rand::thread_rng().gen_range(0..100u8) < self.0
    }
}

impl FromStr for Percentage {
    type Err = ErrorCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: i64 = s.trim().parse().map_err(|_| ErrorCode::InvalidPercentage)?;
        Percentage::new(value)
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parse the failure-absorption flag, case-insensitively.
pub fn parse_flag(raw: &str) -> Result<bool, ErrorCode> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "on" | "yes" | "y" | "true" | "t" => Ok(true),
        "0" | "off" | "no" | "n" | "false" | "f" => Ok(false),
        _ => Err(ErrorCode::InvalidBoolean),
    }
}

/// The four knobs applied to each request handled by an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuntimeBehavior {
    /// Chance of failing a request with an injected internal failure.
    pub error_percent: Percentage,
    /// Chance of sending a duplicated `Content-Type` on echo responses.
    pub duplicate_header_percent: Percentage,
    /// Delay applied before any other processing.
    pub latency: Duration,
    /// Turn non-200 next-hop answers into 200 envelopes.
    pub absorb_failures: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_bounds() {
        assert_eq!(Percentage::new(0).unwrap(), Percentage::NEVER);
        assert_eq!(Percentage::new(100).unwrap(), Percentage::ALWAYS);
        assert_eq!(Percentage::new(101), Err(ErrorCode::InvalidPercentage));
        assert_eq!(Percentage::new(-1), Err(ErrorCode::InvalidPercentage));
        assert_eq!("abc".parse::<Percentage>(), Err(ErrorCode::InvalidPercentage));
        assert_eq!("35".parse::<Percentage>().unwrap().get(), 35);
    }

    #[test]
    fn test_roll_extremes() {
        for _ in 0..1_000 {
            assert!(!Percentage::NEVER.roll());
            assert!(Percentage::ALWAYS.roll());
        }
    }

    #[test]
    fn test_roll_is_roughly_proportional() {
        let half = Percentage::new(50).unwrap();
        let hits = (0..10_000).filter(|_| half.roll()).count();
        assert!((4_000..6_000).contains(&hits), "hits = {hits}");
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("true"), Ok(true));
        assert_eq!(parse_flag("1"), Ok(true));
        assert_eq!(parse_flag("F"), Ok(false));
        assert_eq!(parse_flag("Yes"), Ok(true));
        assert_eq!(parse_flag("off"), Ok(false));
        assert_eq!(parse_flag("maybe"), Err(ErrorCode::InvalidBoolean));
        assert_eq!(parse_flag(""), Err(ErrorCode::InvalidBoolean));
    }
}
