//! Request pacing

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

use crate::{Error, Result};

/// Gap between request starts at `rate_per_second`
pub fn interval_for(rate_per_second: f64) -> Result<Duration> {
    if !(rate_per_second.is_finite() && rate_per_second > 0.0) {
        return Err(Error::invalid(format!(
            "rate must be a positive number of requests per second, got {rate_per_second}"
        )));
    }
    Duration::try_from_secs_f64(1.0 / rate_per_second)
        .map_err(|e| Error::invalid(format!("rate {rate_per_second}: {e}")))
}

/// Time to wait before the next request so starts stay `interval` apart
///
/// Never negative: a request that overran its slot is followed immediately.
#[must_use]
pub fn pacing_delay(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

/// Shared limiter for concurrent workers
pub struct Pacer {
    limiter: DefaultDirectRateLimiter,
}

impl Pacer {
    /// Allow one request per `1 / rate_per_second` with no bursting
    pub fn new(rate_per_second: f64) -> Result<Self> {
        let interval = interval_for(rate_per_second)?;
        let quota = Quota::with_period(interval)
            .ok_or_else(|| Error::invalid("rate too high to pace"))?
            .allow_burst(NonZeroU32::MIN);
        Ok(Self {
            limiter: RateLimiter::direct(quota),
        })
    }

    /// Wait for the next slot
    pub async fn ready(&self) {
        self.limiter.until_ready().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_interval() {
        assert_eq!(interval_for(5.0).unwrap(), Duration::from_millis(200));
        assert_eq!(interval_for(0.5).unwrap(), Duration::from_secs(2));
        assert!(interval_for(0.0).is_err());
        assert!(interval_for(f64::NAN).is_err());
    }

    #[test]
    fn test_delay_accounts_for_elapsed() {
        let interval = Duration::from_millis(200);
        assert_eq!(
            pacing_delay(interval, Duration::from_millis(50)),
            Duration::from_millis(150)
        );
        assert_eq!(pacing_delay(interval, Duration::from_millis(900)), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_pacer_spaces_requests() {
        let pacer = Pacer::new(50.0).unwrap();
        let started = Instant::now();
        for _ in 0..4 {
            pacer.ready().await;
        }
        // first slot is free, three more at 20ms each
        assert!(started.elapsed() >= Duration::from_millis(55));
    }
}
