//! Dynamic URL discovery.
//!
//! Pages in this corner of the web do not put the asset URL in their
//! HTML. A script fires after load, talks to some player API, and only
//! then does the real manifest URL cross the wire. The probe drives a
//! real Chrome over CDP, watches the network for a response matching a
//! per-site signal rule, and extracts the value from it.
//!
//! A probe run walks a small state machine:
//!
//! ```text
//! Init -> AwaitingPrimarySignal -> Found
//!                               -> AwaitingSecondarySignal -> Found
//!                               -> Done(exhausted)
//! ```
//!
//! Each awaiting stage navigates, observes up to a stage timeout while
//! nudging the page, and when its attempt budget is spent falls back to
//! regex extraction over the rendered HTML and then over a plain HTTP
//! copy of the page. Secondary-stage navigation carries the Referer and
//! Origin of the originating page, since embed hosts check them.

mod error;
mod fallback;
mod rules;
mod session;
mod watch;

pub use error::ProbeError;
pub use rules::{
    normalize_discovered_url, AssetKind, ProbeRules, SignalRule, ValueSource,
};

use std::fmt;

use chromiumoxide::Page;

use crate::config::ProbeConfig;
use crate::control::StopFlag;
use crate::downloader::origin_of;

/// Immutable input for one probe run.
#[derive(Debug, Clone)]
pub struct ProbeTarget {
    pub page_url: String,
    pub rules: ProbeRules,
}

impl ProbeTarget {
    pub fn new(page_url: impl Into<String>, rules: ProbeRules) -> Self {
        Self { page_url: page_url.into(), rules }
    }
}

/// How the final value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchedVia {
    /// A network response matched the signal rule.
    Network,
    /// Regex over page HTML after the observer came up empty.
    HtmlFallback,
}

impl fmt::Display for MatchedVia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchedVia::Network => f.write_str("network"),
            MatchedVia::HtmlFallback => f.write_str("html-fallback"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Discovered {
    pub url: String,
    pub via: MatchedVia,
}

/// Outcome of one probe run. `discovered` absent means the probe
/// exhausted every strategy; that is a skip, not an error.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub discovered: Option<Discovered>,
    /// Navigations performed across both stages.
    pub attempts: u32,
}

impl ProbeResult {
    pub fn is_exhausted(&self) -> bool {
        self.discovered.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeOutcome {
    Success,
    Exhausted,
}

/// The probe state machine. Transitions are pure; the session driver
/// supplies navigation and observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeState {
    Init,
    AwaitingPrimarySignal { attempt: u32 },
    AwaitingSecondarySignal { attempt: u32 },
    Done(ProbeOutcome),
}

impl ProbeState {
    fn begin() -> Self {
        ProbeState::AwaitingPrimarySignal { attempt: 1 }
    }

    /// The current stage produced a value.
    fn matched(self, has_secondary: bool) -> Self {
        match self {
            ProbeState::AwaitingPrimarySignal { .. } if has_secondary => {
                ProbeState::AwaitingSecondarySignal { attempt: 1 }
            }
            ProbeState::AwaitingPrimarySignal { .. }
            | ProbeState::AwaitingSecondarySignal { .. } => {
                ProbeState::Done(ProbeOutcome::Success)
            }
            done => done,
        }
    }

    /// The current stage ran out of time (and, past its budget, out of
    /// fallbacks).
    fn timed_out(self, budget: u32) -> Self {
        match self {
            ProbeState::AwaitingPrimarySignal { attempt } if attempt < budget => {
                ProbeState::AwaitingPrimarySignal { attempt: attempt + 1 }
            }
            ProbeState::AwaitingSecondarySignal { attempt } if attempt < budget => {
                ProbeState::AwaitingSecondarySignal { attempt: attempt + 1 }
            }
            ProbeState::AwaitingPrimarySignal { .. }
            | ProbeState::AwaitingSecondarySignal { .. } => {
                ProbeState::Done(ProbeOutcome::Exhausted)
            }
            other => other,
        }
    }
}

/// What one observation stage acts on.
struct Stage {
    url: String,
    referer: Option<String>,
    rule: SignalRule,
}

/// A live browser session. One session serves any number of probe runs;
/// the underlying Chrome profile persists between them.
pub struct ProbeSession {
    browser: session::BrowserSession,
    settings: ProbeConfig,
}

impl ProbeSession {
    pub async fn launch(settings: ProbeConfig) -> Result<Self, ProbeError> {
        let browser = session::BrowserSession::launch(&settings).await?;
        Ok(Self { browser, settings })
    }

    /// Runs the discovery state machine against one page.
    ///
    /// `Err(NavigationTimeout)` is the only error worth retrying at the
    /// caller level; everything else is either fatal or already folded
    /// into an exhausted [`ProbeResult`].
    pub async fn probe(
        &self,
        client: &reqwest::Client,
        target: &ProbeTarget,
        stop: &StopFlag,
    ) -> Result<ProbeResult, ProbeError> {
        let page = self.browser.new_page().await?;
        let result = self.drive(client, &page, target, stop).await;
        if let Err(err) = page.close().await {
            tracing::debug!(error = %err, "page close failed");
        }
        result
    }

    async fn drive(
        &self,
        client: &reqwest::Client,
        page: &Page,
        target: &ProbeTarget,
        stop: &StopFlag,
    ) -> Result<ProbeResult, ProbeError> {
        let has_secondary = target.rules.secondary.is_some();
        let mut state = ProbeState::Init;
        let mut attempts = 0u32;
        let mut stage = Stage {
            url: target.page_url.clone(),
            referer: None,
            rule: target.rules.primary.clone(),
        };
        let mut found: Option<Discovered> = None;

        loop {
            let (attempt, budget) = match state {
                ProbeState::Init => {
                    state = ProbeState::begin();
                    continue;
                }
                ProbeState::AwaitingPrimarySignal { attempt } => (attempt, 1),
                ProbeState::AwaitingSecondarySignal { attempt } => {
                    (attempt, self.settings.nav_retries.max(1))
                }
                ProbeState::Done(_) => break,
            };
            stop.check()?;
            attempts += 1;

            if let Some(referer) = stage.referer.as_deref() {
                let origin = origin_of(referer);
                self.browser
                    .set_stage_headers(page, referer, origin.as_deref())
                    .await?;
            }
            tracing::debug!(url = %stage.url, attempt, "navigating for observation");
            self.browser
                .navigate(page, &stage.url, stage.referer.as_deref(), self.settings.nav_timeout())
                .await?;

            let matched = self.observe(page, &stage.rule, stop).await?;
            let outcome = match matched {
                Some(value) => Some((normalize_discovered_url(&value), MatchedVia::Network)),
                None if attempt >= budget => self
                    .stage_fallback(client, page, &stage, stop)
                    .await?
                    .map(|value| (value, MatchedVia::HtmlFallback)),
                None => None,
            };

            state = match outcome {
                Some((value, via)) => {
                    let next = state.matched(has_secondary);
                    if let ProbeState::AwaitingSecondarySignal { .. } = next {
                        tracing::info!(embed = %value, "primary signal found, moving to embed stage");
                        if let Some(secondary) = target.rules.secondary.clone() {
                            stage = Stage {
                                url: value,
                                referer: Some(target.page_url.clone()),
                                rule: secondary,
                            };
                        }
                    } else {
                        tracing::info!(url = %value, via = %via, "asset URL discovered");
                        found = Some(Discovered { url: value, via });
                    }
                    next
                }
                None => {
                    tracing::debug!(url = %stage.url, attempt, "stage attempt ended without a match");
                    state.timed_out(budget)
                }
            };
        }

        if found.is_none() {
            tracing::warn!(page = %target.page_url, attempts, "probe exhausted, nothing discovered");
        }
        Ok(ProbeResult { discovered: found, attempts })
    }

    /// Waits for the observer to deliver a value, nudging the page at
    /// the poll interval, until the stage timeout.
    async fn observe(
        &self,
        page: &Page,
        rule: &SignalRule,
        stop: &StopFlag,
    ) -> Result<Option<String>, ProbeError> {
        let (guard, mut rx) = watch::install(page, rule).await?;
        let deadline = tokio::time::Instant::now() + self.settings.stage_timeout();
        let poll = self.settings.poll_interval();
        let mut tick = 0u32;
        let value = loop {
            stop.check()?;
            tokio::select! {
                matched = &mut rx => break matched.ok(),
                _ = tokio::time::sleep_until(deadline) => break None,
                _ = tokio::time::sleep(poll) => {
                    self.browser.nudge(page, tick).await;
                    tick += 1;
                }
            }
        };
        drop(guard);
        Ok(value)
    }

    /// Regex extraction once the observer budget is spent: rendered DOM
    /// first, then a plain HTTP copy of the stage URL.
    async fn stage_fallback(
        &self,
        client: &reqwest::Client,
        page: &Page,
        stage: &Stage,
        stop: &StopFlag,
    ) -> Result<Option<String>, ProbeError> {
        let Some(pattern) = stage.rule.html_fallback.as_deref() else {
            return Ok(None);
        };
        stop.check()?;

        match self.browser.content(page).await {
            Ok(html) => {
                if let Some(hit) = rules::first_capture(pattern, &html) {
                    tracing::debug!("fallback matched in rendered content");
                    return Ok(Some(normalize_discovered_url(&hit)));
                }
            }
            Err(err) => tracing::debug!(error = %err, "rendered content unavailable"),
        }

        tracing::info!(url = %stage.url, "observer exhausted, trying plain HTTP fallback");
        Ok(fallback::fetch_and_match(client, &stage.url, stage.referer.as_deref(), pattern)
            .await
            .map(|hit| normalize_discovered_url(&hit)))
    }

    pub async fn close(self) {
        self.browser.close().await;
    }
}
