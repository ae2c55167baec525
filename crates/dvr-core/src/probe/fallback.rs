//! Last-resort extraction: when the observer never fires, fetch the
//! stage URL over plain HTTP and regex the body. Some sites inline the
//! asset URL in page script where no network request ever carries it.

use crate::downloader::site_headers;

use super::rules;

/// Fetches `url` with browser-equivalent Referer/Origin headers and
/// applies `pattern` to the body. Transport problems are a miss, not an
/// error; by this point the probe has nothing left to lose.
pub(super) async fn fetch_and_match(
    client: &reqwest::Client,
    url: &str,
    referer: Option<&str>,
    pattern: &str,
) -> Option<String> {
    let headers = site_headers(referer);
    let response = match client.get(url).headers(headers).send().await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(url, error = %err, "fallback request failed");
            return None;
        }
    };
    let status = response.status();
    if !status.is_success() {
        tracing::warn!(url, status = status.as_u16(), "fallback request refused");
        return None;
    }
    let body = match response.text().await {
        Ok(body) => body,
        Err(err) => {
            tracing::warn!(url, error = %err, "fallback body unreadable");
            return None;
        }
    };
    rules::first_capture(pattern, &body)
}
