//! Classify HTTP statuses and reqwest transport errors into retry kinds.

use super::error::FetchError;
use super::policy::ErrorKind;

/// Classify an HTTP status code. 429/503 count as throttling; any other 5xx
/// (including 500/502/504) is a retryable server error; the rest is final.
pub fn classify_http_status(code: u16) -> ErrorKind {
    match code {
        429 | 503 => ErrorKind::Throttled,
        500..=599 => ErrorKind::Http5xx(code),
        _ => ErrorKind::Other,
    }
}

/// Classify a reqwest transport error.
pub fn classify_transport_error(e: &reqwest::Error) -> ErrorKind {
    if e.is_timeout() {
        return ErrorKind::Timeout;
    }
    if e.is_connect() || e.is_request() || e.is_body() {
        return ErrorKind::Connection;
    }
    ErrorKind::Other
}

/// Classify a fetch error into an ErrorKind for the retry policy.
pub fn classify(e: &FetchError) -> ErrorKind {
    match e {
        FetchError::Status(code) => classify_http_status(*code),
        FetchError::Transport(t) => classify_transport_error(t),
        FetchError::Storage(_) => ErrorKind::Other,
    }
}
