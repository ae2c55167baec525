//! CDP response observer. One observer is installed per observation
//! stage and torn down again on every exit path; the guard's Drop aborts
//! the event-draining task so a stale callback can never leak into the
//! next stage or the next probe run.

use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventResponseReceived, GetResponseBodyParams,
};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::error::ProbeError;
use super::rules::{self, SignalRule, ValueSource};

/// Aborts the observer task when the observation stage ends.
pub(super) struct WatchGuard {
    task: JoinHandle<()>,
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Enables the Network domain on `page` and spawns a task that scans
/// response events against `rule`. The first response that matches and
/// yields a value resolves the returned channel; the task then exits.
pub(super) async fn install(
    page: &Page,
    rule: &SignalRule,
) -> Result<(WatchGuard, oneshot::Receiver<String>), ProbeError> {
    page.execute(EnableParams::default()).await?;
    let mut events = page.event_listener::<EventResponseReceived>().await?;

    let (tx, rx) = oneshot::channel();
    let rule = rule.clone();
    let page = page.clone();
    let task = tokio::spawn(async move {
        let mut tx = Some(tx);
        while let Some(event) = events.next().await {
            if !(200..300).contains(&event.response.status) {
                continue;
            }
            if !rule.matches_url(&event.response.url) {
                continue;
            }
            tracing::debug!(url = %event.response.url, "response matched signal rule");
            let Some(value) = response_value(&page, &event, &rule).await else {
                // No usable value in this one; keep scanning.
                continue;
            };
            if let Some(tx) = tx.take() {
                let _ = tx.send(value);
            }
            break;
        }
    });

    Ok((WatchGuard { task }, rx))
}

/// Pulls the target value out of a matched response per the rule's
/// value source.
async fn response_value(
    page: &Page,
    event: &EventResponseReceived,
    rule: &SignalRule,
) -> Option<String> {
    match &rule.value {
        ValueSource::ResponseUrl => Some(event.response.url.clone()),
        ValueSource::Json { field } => {
            let params = GetResponseBodyParams::new(event.request_id.clone());
            let body = match page.execute(params).await {
                Ok(resp) => {
                    if resp.result.base64_encoded {
                        tracing::debug!(url = %event.response.url, "response body is binary, skipping");
                        return None;
                    }
                    resp.result.body
                }
                Err(err) => {
                    tracing::debug!(url = %event.response.url, error = %err, "response body unavailable");
                    return None;
                }
            };
            match serde_json::from_str::<serde_json::Value>(&body) {
                Ok(doc) => json_field(&doc, field).and_then(|v| v.as_str().map(str::to_owned)),
                // Not JSON after all; the fallback pattern gets a shot
                // at the raw body.
                Err(_) => rule
                    .html_fallback
                    .as_deref()
                    .and_then(|pattern| rules::first_capture(pattern, &body)),
            }
        }
    }
}

fn json_field<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let mut current = value;
    for key in path.split('.') {
        current = current.get(key)?;
    }
    Some(current)
}
