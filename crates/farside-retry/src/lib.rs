//! # Farside Retry
//!
//! Re-executes a fallible async operation until it succeeds or its attempt
//! budget runs out. Two schedules are provided: a fixed jittered delay and a
//! jittered exponential backoff with a ceiling.
//!
//! A [`RetryPolicy`] is immutable and holds no state between calls. Every
//! call to [`RetryPolicy::retry`] builds a private [`Backoff`], so one policy
//! can be shared freely between tasks.
//!
//! ## Invariants
//!
//! - An operation is executed at most `max_attempts + 1` times.
//! - The final failure is never swallowed; it is returned inside
//!   [`RetryError::Exhausted`].
//! - Successful attempts are never repeated.

mod config;
mod error;
mod policy;

pub use config::RetryConfig;
pub use error::ConfigError;
pub use error::RetryError;
pub use policy::Backoff;
pub use policy::RetryPolicy;
pub use policy::jitter;

#[cfg(test)]
mod tests;
