//! Run control: cooperative stop flag checked by long-running loops.
//!
//! The CLI sets the flag on Ctrl-C. The probe poll loop checks it between
//! sleeps and the fetch pool checks it before claiming the next segment, so
//! in-flight work winds down without leaving corrupt output behind.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Error returned when a run is stopped by the user.
#[derive(Debug, Error)]
#[error("stopped by user")]
pub struct Stopped;

/// Shared cooperative stop flag. Cheap to clone; all clones observe the
/// same state.
#[derive(Debug, Clone, Default)]
pub struct StopFlag {
    inner: Arc<AtomicBool>,
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request stop. Idempotent; safe from any task.
    pub fn trigger(&self) {
        self.inner.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.load(Ordering::Relaxed)
    }

    /// `Err(Stopped)` once the flag is set; for use with `?`.
    pub fn check(&self) -> Result<(), Stopped> {
        if self.is_stopped() {
            Err(Stopped)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_clear_and_latches() {
        let flag = StopFlag::new();
        assert!(!flag.is_stopped());
        assert!(flag.check().is_ok());
        flag.trigger();
        assert!(flag.is_stopped());
        assert!(flag.check().is_err());
        flag.trigger();
        assert!(flag.is_stopped());
    }

    #[test]
    fn clones_share_state() {
        let flag = StopFlag::new();
        let observer = flag.clone();
        flag.trigger();
        assert!(observer.is_stopped());
    }
}
