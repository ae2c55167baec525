//! Retry and backoff policy.
//!
//! Encapsulates error classification (timeouts, throttling, connection
//! failures) and exponential backoff decisions so the segment downloader,
//! the manifest fetch, and the direct-download path share one policy.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{classify, classify_http_status, classify_transport_error};
pub use error::FetchError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::run_with_retry;
