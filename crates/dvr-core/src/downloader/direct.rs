//! Single-stream download for assets the probe resolves directly,
//! with no manifest in between.

use std::path::Path;

use anyhow::Context;
use reqwest::header::HeaderMap;
use tokio::io::AsyncWriteExt;

use crate::control::{StopFlag, Stopped};
use crate::retry::{run_with_retry, FetchError};
use crate::storage;

use super::FetchOptions;

/// Streams `url` into `dest`, staging through the `.part` name and
/// renaming once the body is complete. Returns the byte count written.
/// Each retry attempt restarts the transfer from the beginning.
pub async fn download_direct(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    opts: &FetchOptions,
    stop: &StopFlag,
) -> anyhow::Result<u64> {
    let part = storage::temp_path(dest);
    let headers = opts.headers();

    let written = run_with_retry(&opts.policy, || {
        let client = client.clone();
        let url = url.to_string();
        let headers = headers.clone();
        let part = part.clone();
        let stop = stop.clone();
        async move { stream_once(&client, &url, headers, &part, &stop).await }
    })
    .await
    .with_context(|| format!("direct download of {url}"))?;

    let Some(written) = written else {
        // Stopped mid-stream: the partial is useless, clean it up.
        let _ = tokio::fs::remove_file(&part).await;
        return Err(Stopped.into());
    };

    storage::finalize(&part, dest).with_context(|| format!("finalizing {}", dest.display()))?;
    tracing::debug!(bytes = written, path = %dest.display(), "direct stream finalized");
    Ok(written)
}

/// One attempt. `Ok(None)` means the stop flag fired mid-transfer and
/// the attempt must not be retried.
async fn stream_once(
    client: &reqwest::Client,
    url: &str,
    headers: HeaderMap,
    part: &Path,
    stop: &StopFlag,
) -> Result<Option<u64>, FetchError> {
    let mut response = client.get(url).headers(headers).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }

    // create() truncates, so a retried attempt starts clean.
    let mut file = tokio::fs::File::create(part).await?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await? {
        if stop.is_stopped() {
            return Ok(None);
        }
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(Some(written))
}
