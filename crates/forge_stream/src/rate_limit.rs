//! Minimum-interval throttle for outbound requests and paced replay.

use std::time::{Duration, Instant};

use tracing::debug;

/// Source of the current instant.
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Admits at most one request per `min_interval`.
#[derive(Debug)]
pub struct RateLimiter<C: Clock = SystemClock> {
    clock: C,
    min_interval: Duration,
    last_admitted: Option<Instant>,
}

impl RateLimiter<SystemClock> {
    pub fn new(min_interval: Duration) -> Self {
        Self::with_clock(SystemClock, min_interval)
    }
}

impl<C: Clock> RateLimiter<C> {
    pub fn with_clock(clock: C, min_interval: Duration) -> Self {
        Self {
            clock,
            min_interval,
            last_admitted: None,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Time left before the next request may go out.
    pub fn time_until_ready(&self) -> Duration {
        match self.last_admitted {
            Some(last) => self
                .min_interval
                .saturating_sub(self.clock.now().saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    /// Admit a request now, or return how long the caller must wait.
    pub fn try_acquire(&mut self) -> Result<(), Duration> {
        let now = self.clock.now();
        if let Some(last) = self.last_admitted {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.min_interval {
                return Err(self.min_interval - elapsed);
            }
        }
        self.last_admitted = Some(now);
        Ok(())
    }

    /// Wait until a request is allowed, then admit it.
    pub async fn acquire(&mut self) {
        let wait = self.time_until_ready();
        if !wait.is_zero() {
            debug!(wait_ms = wait.as_millis() as u64, "Throttling request");
            tokio::time::sleep(wait).await;
        }
        self.last_admitted = Some(self.clock.now());
    }

    /// Forget the last admission.
    pub fn reset(&mut self) {
        self.last_admitted = None;
    }
}
