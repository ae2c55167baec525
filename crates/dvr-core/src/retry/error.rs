//! Fetch error type for retry classification.

use thiserror::Error;

/// Error from one HTTP fetch attempt (segment, manifest, or direct asset).
/// Kept specific so the retry policy can classify it before the pipeline
/// wraps it into anyhow context.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Response carried a non-2xx status.
    #[error("HTTP {0}")]
    Status(u16),
    /// Transport-level failure (timeout, connect, broken body).
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    /// Disk write failed (disk full, permissions). Not retried.
    #[error("storage: {0}")]
    Storage(#[from] std::io::Error),
}
