//! One segment, end to end: transfer, unwrap, write.

use std::path::Path;

use bytes::Bytes;
use reqwest::header::HeaderMap;

use crate::carrier;
use crate::manifest::SegmentRef;
use crate::retry::{run_with_retry, FetchError};

use super::{FetchOptions, SegmentResult, SegmentStatus};

/// Transfers one segment and writes its payload to `dest`. Failures are
/// folded into the returned status; the pool keeps running either way.
pub(super) async fn fetch_segment(
    client: &reqwest::Client,
    seg: &SegmentRef,
    dest: &Path,
    opts: &FetchOptions,
) -> SegmentResult {
    let body = match fetch_bytes(client, &seg.location, opts).await {
        Ok(body) => body,
        Err(err) => {
            tracing::warn!(index = seg.index, url = %seg.location, error = %err, "segment fetch failed");
            return failed(seg.index, SegmentStatus::FetchFailed);
        }
    };

    let payload: &[u8] = if opts.unwrap_payload {
        match carrier::extract_payload(&body, opts.chunk_tag) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(index = seg.index, url = %seg.location, error = %err, "segment carried no payload");
                return failed(seg.index, SegmentStatus::ExtractFailed);
            }
        }
    } else {
        &body
    };

    if let Err(err) = tokio::fs::write(dest, payload).await {
        tracing::warn!(index = seg.index, path = %dest.display(), error = %err, "segment write failed");
        return failed(seg.index, SegmentStatus::FetchFailed);
    }

    tracing::debug!(index = seg.index, bytes = payload.len(), "segment done");
    SegmentResult {
        index: seg.index,
        path: Some(dest.to_path_buf()),
        status: SegmentStatus::Ok,
    }
}

fn failed(index: usize, status: SegmentStatus) -> SegmentResult {
    SegmentResult { index, path: None, status }
}

async fn fetch_bytes(
    client: &reqwest::Client,
    url: &str,
    opts: &FetchOptions,
) -> Result<Bytes, FetchError> {
    let headers = opts.headers();
    run_with_retry(&opts.policy, || {
        let client = client.clone();
        let url = url.to_string();
        let headers = headers.clone();
        async move { fetch_once(&client, &url, headers).await }
    })
    .await
}

async fn fetch_once(
    client: &reqwest::Client,
    url: &str,
    headers: HeaderMap,
) -> Result<Bytes, FetchError> {
    let response = client.get(url).headers(headers).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }
    Ok(response.bytes().await?)
}
