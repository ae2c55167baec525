use crate::config::RetryConfig;
use std::time::Duration;

/// High-level classification of a fetch failure for retry purposes.
///
/// Callers map HTTP status codes or transport errors into these kinds; the
/// policy only ever reasons about the kind, never the concrete error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operation timed out (connect/read).
    Timeout,
    /// Server asked us to slow down (429, 503).
    Throttled,
    /// Network-level failure (connection reset, DNS, broken body).
    Connection,
    /// Retryable server-side HTTP status that is not throttling (5xx).
    Http5xx(u16),
    /// Anything else; not retried.
    Other,
}

/// Decision returned by the retry policy for one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Give up and surface the error.
    NoRetry,
    /// Sleep for the given delay, then try again.
    RetryAfter(Duration),
}

/// Exponential backoff with a cap: `base * 2^(attempt-1)`, at most `max_delay`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Base delay for backoff.
    pub base_delay: Duration,
    /// Upper bound on any single backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Builds a policy from the config section, falling back to defaults
    /// when the section is absent.
    pub fn from_config(cfg: Option<&RetryConfig>) -> Self {
        match cfg {
            Some(r) => Self {
                max_attempts: r.max_attempts,
                base_delay: Duration::from_secs_f64(r.base_delay_secs),
                max_delay: Duration::from_secs(r.max_delay_secs),
            },
            None => Self::default(),
        }
    }

    /// Decides what to do after attempt number `attempt` (1-based) failed
    /// with an error of `kind`.
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::NoRetry;
        }
        match kind {
            ErrorKind::Other => RetryDecision::NoRetry,
            ErrorKind::Timeout
            | ErrorKind::Throttled
            | ErrorKind::Connection
            | ErrorKind::Http5xx(_) => {
                let shift = attempt.saturating_sub(1).min(8);
                let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
                RetryDecision::RetryAfter(delay)
            }
        }
    }
}
