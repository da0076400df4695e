//! Exponential retry backoff with jitter.
//!
//! A pure function of the attempt number plus an injected random source, so
//! retry timing is testable without real clocks.

use std::time::Duration;

use rand::Rng;

/// Base delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(30);

/// Upper bound for the computed delay, before jitter.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(3600);

/// Jitter amplitude as a fraction of the computed delay (±20%).
const JITTER_RATIO: f64 = 0.2;

/// Compute the delay before retry number `attempt` (1-based: the delay
/// scheduled after the first failed attempt is `attempt = 1`).
///
/// The delay grows as `base * 2^(attempt - 1)`, is capped at `max`, and is
/// then spread by ±20% jitter so a burst of simultaneous failures does not
/// retry in lockstep.
pub fn retry_delay<R: Rng>(
    attempt: u32,
    base: Duration,
    max: Duration,
    rng: &mut R,
) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let raw = base.saturating_mul(2u32.saturating_pow(exponent));
    let capped = raw.min(max);

    let jitter_span = capped.as_secs_f64() * JITTER_RATIO;
    let jitter = rng.random_range(-jitter_span..=jitter_span);
    let jittered = (capped.as_secs_f64() + jitter).max(0.0);

    Duration::from_secs_f64(jittered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn first_retry_close_to_base() {
        let d = retry_delay(1, Duration::from_secs(30), DEFAULT_MAX_DELAY, &mut rng());
        assert!(d >= Duration::from_secs(24), "got {d:?}");
        assert!(d <= Duration::from_secs(36), "got {d:?}");
    }

    #[test]
    fn delay_doubles_per_attempt() {
        // Strip jitter by comparing midpoints over many samples.
        let mut r = rng();
        let avg = |attempt: u32, r: &mut StdRng| -> f64 {
            (0..500)
                .map(|_| {
                    retry_delay(attempt, Duration::from_secs(10), DEFAULT_MAX_DELAY, r)
                        .as_secs_f64()
                })
                .sum::<f64>()
                / 500.0
        };
        let a1 = avg(1, &mut r);
        let a2 = avg(2, &mut r);
        let a3 = avg(3, &mut r);
        assert!((a2 / a1 - 2.0).abs() < 0.2, "a1={a1} a2={a2}");
        assert!((a3 / a2 - 2.0).abs() < 0.2, "a2={a2} a3={a3}");
    }

    #[test]
    fn delay_capped_at_max() {
        let max = Duration::from_secs(300);
        let d = retry_delay(30, Duration::from_secs(30), max, &mut rng());
        // Cap plus worst-case positive jitter.
        assert!(d <= Duration::from_secs_f64(300.0 * 1.2), "got {d:?}");
    }

    #[test]
    fn huge_attempt_does_not_overflow() {
        let d = retry_delay(u32::MAX, Duration::from_secs(30), DEFAULT_MAX_DELAY, &mut rng());
        assert!(d <= Duration::from_secs_f64(3600.0 * 1.2));
    }

    #[test]
    fn delay_never_negative() {
        for attempt in 1..10 {
            let d = retry_delay(attempt, Duration::from_millis(1), Duration::from_secs(1), &mut rng());
            assert!(d >= Duration::ZERO);
        }
    }
}
