//! # Retry Policies
//!
//! The schedules themselves and the retry loop that drives them.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::info;
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::ConfigError;
use crate::error::RetryError;

/// Draws a multiplicative jitter factor uniformly from `[0.5, 1.5)`.
pub fn jitter() -> f64 {
    rand::thread_rng().gen_range(0.5..1.5)
}

/// An immutable retry schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryPolicy {
    /// Waits `delay * jitter` between attempts.
    Fixed { max_attempts: u32, delay: Duration },
    /// Waits a jittered delay that doubles after every attempt, capped at
    /// `max_delay`.
    Exponential {
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
    },
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::Fixed { max_attempts, delay }
    }

    /// A `base_delay` above `max_delay` is lowered to `max_delay`.
    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self::Exponential {
            max_attempts,
            base_delay: base_delay.min(max_delay),
            max_delay,
        }
    }

    /// Validates a configuration and builds the policy it describes.
    pub fn from_config(config: &RetryConfig) -> Result<Self, ConfigError> {
        match *config {
            RetryConfig::Fixed { max_attempts, delay } => {
                let delay = seconds("delay", delay)?;
                Ok(Self::fixed(max_attempts, delay))
            }
            RetryConfig::Exponential { max_attempts, base_delay, max_delay } => {
                if base_delay > max_delay {
                    return Err(ConfigError::DelayOrder { base_delay, max_delay });
                }
                let base = seconds("base_delay", base_delay)?;
                let max = seconds("max_delay", max_delay)?;
                Ok(Self::exponential(max_attempts, base, max))
            }
        }
    }

    /// Parses and validates a JSON configuration in one step.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Self::from_config(&RetryConfig::from_json(text)?)
    }

    /// Number of retries permitted after the first failure.
    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::Fixed { max_attempts, .. } => *max_attempts,
            Self::Exponential { max_attempts, .. } => *max_attempts,
        }
    }

    /// A fresh delay schedule for one retry loop.
    pub fn backoff(&self) -> Backoff {
        let current = match self {
            Self::Fixed { delay, .. } => *delay,
            Self::Exponential { base_delay, .. } => *base_delay,
        };
        Backoff { policy: *self, current }
    }

    /// Runs `op` until it succeeds or the attempt budget is spent.
    pub async fn retry<T, E, F, Fut>(&self, op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.retry_if(op, |_| true).await
    }

    /// Like [`retry`](Self::retry), but failures for which `should_retry`
    /// returns false end the loop immediately with [`RetryError::Aborted`].
    pub async fn retry_if<T, E, F, Fut, P>(
        &self,
        mut op: F,
        mut should_retry: P,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnMut(&E) -> bool,
        E: std::fmt::Display,
    {
        let max_attempts = self.max_attempts();
        let mut backoff = self.backoff();
        let mut attempt = 0;

        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !should_retry(&err) {
                return Err(RetryError::Aborted(err));
            }

            if attempt >= max_attempts {
                warn!(attempts = attempt + 1, error = %err, "retries exhausted");
                return Err(RetryError::Exhausted {
                    attempts: attempt + 1,
                    last: err,
                });
            }

            let delay = backoff.next_delay(jitter());
            info!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

impl TryFrom<&RetryConfig> for RetryPolicy {
    type Error = ConfigError;

    fn try_from(config: &RetryConfig) -> Result<Self, ConfigError> {
        Self::from_config(config)
    }
}

/// The delay state of a single retry loop.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    current: Duration,
}

impl Backoff {
    /// Computes the wait before the next attempt using the given jitter
    /// factor, and advances the schedule.
    ///
    /// For the exponential schedule the jittered value is capped at
    /// `max_delay` first and then doubled to seed the next round, so the
    /// returned delays never decrease.
    pub fn next_delay(&mut self, jitter: f64) -> Duration {
        match self.policy {
            RetryPolicy::Fixed { delay, .. } => delay.mul_f64(jitter),
            RetryPolicy::Exponential { max_delay, .. } => {
                let delay = self.current.mul_f64(jitter).min(max_delay);
                self.current = delay.saturating_mul(2);
                delay
            }
        }
    }
}

fn seconds(field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::InvalidDelay { field, value })
}
