//! # Error Definitions

/// Failure of a retried operation.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryError<E> {
    /// Every permitted attempt failed. Carries the last failure.
    Exhausted { attempts: u32, last: E },
    /// The failure was classified as permanent and not retried.
    Aborted(E),
}

impl<E> RetryError<E> {
    /// Returns the underlying failure, discarding the retry bookkeeping.
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Aborted(e) => e,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exhausted { attempts, last } => {
                write!(f, "Retries exhausted after {} attempts: {}", attempts, last)
            }
            Self::Aborted(e) => write!(f, "Non-retryable failure: {}", e),
        }
    }
}

impl<E> std::error::Error for RetryError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Exhausted { last, .. } => Some(last),
            Self::Aborted(e) => Some(e),
        }
    }
}

/// Rejected retry configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The configuration could not be parsed, including an unknown `kind`.
    Parse(String),
    /// A delay was negative, NaN or infinite.
    InvalidDelay { field: &'static str, value: f64 },
    /// `base_delay` exceeds `max_delay`.
    DelayOrder { base_delay: f64, max_delay: f64 },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(msg) => write!(f, "Invalid retry configuration: {}", msg),
            Self::InvalidDelay { field, value } => {
                write!(f, "Invalid delay for `{}`: {}", field, value)
            }
            Self::DelayOrder { base_delay, max_delay } => write!(
                f,
                "base_delay ({}) must not exceed max_delay ({})",
                base_delay, max_delay
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}
