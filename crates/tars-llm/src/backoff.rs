//! Full-jitter exponential backoff
//!
//! The delay for attempt `n` is drawn uniformly from
//! `[0, min(cap, base * 2^n)]`. The random source is a parameter so callers
//! can seed it.

use std::time::Duration;

use rand::Rng;

/// Which delay preset a transient failure uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffTier {
    /// Vendor throttling
    RateLimit,
    /// Server errors, overload and connection failures
    ServerError,
}

/// Upper bound of the delay for `attempt`: `min(cap, base * 2^attempt)`
pub fn ceiling(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let factor = 2_u32.checked_pow(attempt).unwrap_or(u32::MAX);
    base.checked_mul(factor).map_or(cap, |scaled| scaled.min(cap))
}

/// Jittered delay in `[0, ceiling(attempt, base, cap)]`
pub fn delay<R: Rng + ?Sized>(attempt: u32, base: Duration, cap: Duration, rng: &mut R) -> Duration {
    let upper = ceiling(attempt, base, cap);
    if upper.is_zero() {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(rng.random_range(0.0..=upper.as_secs_f64()))
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn ceiling_doubles_until_cap() {
        let base = Duration::from_secs(1);
        let cap = Duration::from_secs(30);
        assert_eq!(ceiling(1, base, cap), Duration::from_secs(2));
        assert_eq!(ceiling(4, base, cap), Duration::from_secs(16));
        assert_eq!(ceiling(5, base, cap), cap);
        assert_eq!(ceiling(200, base, cap), cap);
    }

    #[test]
    fn delay_stays_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let tiers = [
            (Duration::from_secs(2), Duration::from_secs(90)),
            (Duration::from_secs(1), Duration::from_secs(30)),
            (Duration::from_millis(250), Duration::from_secs(5)),
        ];
        for (base, cap) in tiers {
            for attempt in 0..12 {
                for _ in 0..50 {
                    let d = delay(attempt, base, cap, &mut rng);
                    assert!(d <= ceiling(attempt, base, cap), "attempt {attempt}: {d:?}");
                }
            }
        }
    }

    #[test]
    fn zero_base_never_sleeps() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(delay(3, Duration::ZERO, Duration::from_secs(30), &mut rng), Duration::ZERO);
    }
}
