//! Jittered exponential backoff for requeued requests

use std::time::Duration;

use rand::Rng;
use thiserror::Error;

/// A jittered exponential backoff strategy.
#[derive(Copy, Clone, Debug)]
pub struct ExponentialBackoff {
    /// The minimum amount of time to wait before retrying.
    min: Duration,
    /// The maximum amount of time to wait before retrying.
    max: Duration,
    /// The ratio of the base delay that may be randomly added.
    jitter: f64,
}

#[derive(Clone, Debug, Error)]
#[error("invalid backoff: {0}")]
pub struct InvalidBackoff(&'static str);

impl ExponentialBackoff {
    pub fn new(min: Duration, max: Duration, jitter: f64) -> Result<Self, InvalidBackoff> {
        if min > max {
            return Err(InvalidBackoff("maximum must not be less than minimum"));
        }
        if max == Duration::ZERO {
            return Err(InvalidBackoff("maximum must be non-zero"));
        }
        if !(jitter >= 0.0 && jitter.is_finite()) {
            return Err(InvalidBackoff("jitter must be a non-negative number"));
        }
        Ok(Self { min, max, jitter })
    }

    /// Delay before retry number `failures` (1 for the first retry)
    pub fn delay(&self, failures: u32) -> Duration {
        let base = self.base(failures.saturating_sub(1));
        base + self.jitter(base, &mut rand::thread_rng())
    }

    fn base(&self, iterations: u32) -> Duration {
        self.min
            .saturating_mul(2_u32.saturating_pow(iterations))
            .min(self.max)
    }

    /// Uniform duration on `[0, base * jitter]`, never pushing past `max`
    fn jitter<R: Rng>(&self, base: Duration, rng: &mut R) -> Duration {
        if self.jitter == 0.0 {
            return Duration::ZERO;
        }
        let factor = rng.gen::<f64>() * self.jitter;
        base.mul_f64(factor).min(self.max - base)
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(500),
            max: Duration::from_secs(300),
            jitter: 0.1,
        }
    }
}
