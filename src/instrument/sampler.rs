//! Sampling decisions for new root traces.

use thiserror::Error;

/// A sample rate that cannot be honoured.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SamplerError {
    #[error("sample rate {0} is outside the range [0.0, 1.0]")]
    OutOfRange(f64),

    #[error("sample rate {0} is finer than the smallest increment of 0.0001")]
    TooFine(f64),
}

/// Deterministic sampler keyed on the trace id, so every hop that sees the
/// same id takes the same decision.
#[derive(Debug, Clone, Copy)]
pub struct BoundarySampler {
    boundary: i64,
    salt: i64,
}

impl BoundarySampler {
    pub fn new(rate: f64, salt: i64) -> Result<Self, SamplerError> {
        if !(0.0..=1.0).contains(&rate) {
            return Err(SamplerError::OutOfRange(rate));
        }
        if rate > 0.0 && rate < 0.0001 {
            return Err(SamplerError::TooFine(rate));
        }
        Ok(Self {
            boundary: (rate * 10_000.0) as i64,
            salt,
        })
    }

    pub fn sample(&self, id: u64) -> bool {
        if self.boundary <= 0 {
            return false;
        }
        if self.boundary >= 10_000 {
            return true;
        }
        ((id as i64 ^ self.salt) % 10_000).abs() < self.boundary
    }
}

/// Independent coin flip per trace.
#[derive(Debug, Clone, Copy)]
pub struct RandomSampler {
    rate: f64,
}

impl RandomSampler {
    pub fn new(rate: f64) -> Result<Self, SamplerError> {
        if !(0.0..=1.0).contains(&rate) {
            return Err(SamplerError::OutOfRange(rate));
        }
        Ok(Self { rate })
    }

    pub fn sample(&self) -> bool {
        if self.rate >= 1.0 {
            return true;
        }
        self.rate > 0.0 && rand::random::<f64>() < self.rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_rates() {
        assert_eq!(BoundarySampler::new(1.5, 0).unwrap_err(), SamplerError::OutOfRange(1.5));
        assert_eq!(BoundarySampler::new(-0.1, 0).unwrap_err(), SamplerError::OutOfRange(-0.1));
        assert_eq!(BoundarySampler::new(0.00001, 0).unwrap_err(), SamplerError::TooFine(0.00001));
        assert!(BoundarySampler::new(f64::NAN, 0).is_err());
        assert!(RandomSampler::new(2.0).is_err());
    }

    #[test]
    fn test_boundary_extremes() {
        let always = BoundarySampler::new(1.0, 42).unwrap();
        let never = BoundarySampler::new(0.0, 42).unwrap();
        for id in [0u64, 1, 9_999, u64::MAX, 0x8000_0000_0000_0000] {
            assert!(always.sample(id));
            assert!(!never.sample(id));
        }
    }

    #[test]
    fn test_boundary_is_deterministic() {
        let sampler = BoundarySampler::new(0.5, 7).unwrap();
        for id in [3u64, 12_345, 987_654_321] {
            assert_eq!(sampler.sample(id), sampler.sample(id));
        }
    }

    #[test]
    fn test_boundary_rate_is_approximate() {
        let sampler = BoundarySampler::new(0.25, 0).unwrap();
        let hits = (0..10_000u64).filter(|id| sampler.sample(*id)).count();
        assert_eq!(hits, 2_500);
    }

    #[test]
    fn test_random_extremes() {
        let always = RandomSampler::new(1.0).unwrap();
        let never = RandomSampler::new(0.0).unwrap();
        assert!((0..100).all(|_| always.sample()));
        assert!((0..100).all(|_| !never.sample()));
    }
}
