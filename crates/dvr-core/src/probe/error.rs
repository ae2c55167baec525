use std::time::Duration;

use chromiumoxide::error::CdpError;

use crate::control::Stopped;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// Chrome could not be started or configured.
    #[error("browser launch failed: {0}")]
    Launch(String),

    /// A CDP command could not be assembled.
    #[error("protocol parameter error: {0}")]
    Protocol(String),

    /// Navigation did not settle inside the budget. The only variant a
    /// caller should retry a whole probe run on.
    #[error("navigation did not settle within {0:?}")]
    NavigationTimeout(Duration),

    /// The browser session broke underneath us.
    #[error("browser session error: {0}")]
    Browser(#[from] CdpError),

    #[error(transparent)]
    Stopped(#[from] Stopped),
}

impl ProbeError {
    pub fn is_navigation_timeout(&self) -> bool {
        matches!(self, ProbeError::NavigationTimeout(_))
    }
}
