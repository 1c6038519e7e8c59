use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Delay formula applied before a retry attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackoffStrategy {
    /// `base × attempt`
    Linear,
    /// `base × 2^(attempt − 1)`
    Exponential,
    /// `base`
    Fixed,
}

impl BackoffStrategy {
    /// Delay before the `attempt`-th retry (1-based). Saturates instead of overflowing.
    pub fn delay(&self, base: Duration, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self {
            BackoffStrategy::Linear => base.saturating_mul(attempt),
            BackoffStrategy::Exponential => {
                let factor = 2u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
                base.saturating_mul(factor)
            }
            BackoffStrategy::Fixed => base,
        }
    }
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        BackoffStrategy::Exponential
    }
}

impl fmt::Display for BackoffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackoffStrategy::Linear => write!(f, "linear"),
            BackoffStrategy::Exponential => write!(f, "exponential"),
            BackoffStrategy::Fixed => write!(f, "fixed"),
        }
    }
}

impl FromStr for BackoffStrategy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(BackoffStrategy::Linear),
            "exponential" => Ok(BackoffStrategy::Exponential),
            "fixed" => Ok(BackoffStrategy::Fixed),
            other => Err(CoreError::Config(format!(
                "invalid backoff strategy '{other}', expected linear, exponential or fixed"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_millis(100);

    #[test]
    fn exponential_doubles_per_attempt() {
        let s = BackoffStrategy::Exponential;
        assert_eq!(s.delay(BASE, 1), Duration::from_millis(100));
        assert_eq!(s.delay(BASE, 2), Duration::from_millis(200));
        assert_eq!(s.delay(BASE, 3), Duration::from_millis(400));
        assert_eq!(s.delay(BASE, 5), Duration::from_millis(1600));
    }

    #[test]
    fn linear_scales_with_attempt() {
        let s = BackoffStrategy::Linear;
        assert_eq!(s.delay(BASE, 1), Duration::from_millis(100));
        assert_eq!(s.delay(BASE, 4), Duration::from_millis(400));
    }

    #[test]
    fn fixed_ignores_attempt() {
        let s = BackoffStrategy::Fixed;
        assert_eq!(s.delay(BASE, 1), BASE);
        assert_eq!(s.delay(BASE, 9), BASE);
    }

    #[test]
    fn huge_attempt_saturates() {
        let d = BackoffStrategy::Exponential.delay(BASE, 200);
        assert_eq!(d, BASE.saturating_mul(u32::MAX));
    }

    #[test]
    fn parse_names() {
        assert_eq!("Linear".parse::<BackoffStrategy>().unwrap(), BackoffStrategy::Linear);
        assert_eq!(" fixed ".parse::<BackoffStrategy>().unwrap(), BackoffStrategy::Fixed);
        assert!("random".parse::<BackoffStrategy>().is_err());
    }
}
