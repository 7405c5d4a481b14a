//! Shared outbound request throttle.
//!
//! One GCRA limiter per client, cloned into every worker. Burst is 1, so
//! consecutive acquisitions are spaced at least one period apart and no
//! one-second window ever holds more than the configured number of calls.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{Quota, RateLimiter};

use crate::error::ConfigError;

type DirectLimiter =
    RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>;

/// Token gate shared by every concurrent caller of a client.
#[derive(Clone)]
pub struct Throttle {
    limiter: Arc<DirectLimiter>,
    per_second: NonZeroU32,
}

impl Throttle {
    /// Allow at most `per_second` acquisitions in any one-second window.
    pub fn per_second(per_second: u32) -> Result<Self, ConfigError> {
        let per_second = NonZeroU32::new(per_second)
            .ok_or_else(|| ConfigError::invalid("requests_per_second", "0"))?;
        let quota = Quota::with_period(spacing(per_second))
            .ok_or_else(|| ConfigError::invalid("requests_per_second", per_second.to_string()))?
            .allow_burst(NonZeroU32::MIN);

        Ok(Self { limiter: Arc::new(RateLimiter::direct(quota)), per_second })
    }

    /// Wait for the next token.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }

    /// Configured budget, in acquisitions per second.
    #[must_use]
    pub const fn rate(&self) -> u32 {
        self.per_second.get()
    }
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle").field("per_second", &self.per_second).finish()
    }
}

/// Period between tokens, rounded up to the next nanosecond so that
/// `n` periods always span at least a full second.
fn spacing(per_second: NonZeroU32) -> Duration {
    let n = u64::from(per_second.get());
    Duration::from_nanos(1_000_000_000_u64.div_ceil(n))
}
