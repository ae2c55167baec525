//! Concurrent segment fetcher.
//!
//! A fixed-width pool of workers drains a shared queue of segment
//! references. Each worker claims the next unclaimed segment, transfers
//! it, unwraps the carrier payload and writes the result into the job
//! workdir. Completion order is whatever the network gives us; the
//! caller always receives results sorted by segment index.

mod direct;
mod segment;

pub use direct::download_direct;

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use reqwest::header::{self, HeaderMap, HeaderValue};
use tokio::sync::mpsc;
use url::Url;

use crate::carrier;
use crate::control::StopFlag;
use crate::manifest::SegmentRef;
use crate::retry::RetryPolicy;
use crate::storage::Workdir;

/// Pool width used when the config does not say otherwise.
pub const DEFAULT_WORKERS: usize = 8;

/// Desktop browser identity presented on every plain HTTP request.
/// Segment hosts tend to refuse obviously non-browser clients.
pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// How far a single segment got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentStatus {
    /// Payload extracted and written to disk.
    Ok,
    /// The HTTP transfer failed after retries, or the file write failed.
    FetchFailed,
    /// The body arrived but carried no extractable payload.
    ExtractFailed,
}

/// Outcome of one segment transfer. `path` is set only for [`SegmentStatus::Ok`].
#[derive(Debug, Clone)]
pub struct SegmentResult {
    pub index: usize,
    pub path: Option<PathBuf>,
    pub status: SegmentStatus,
}

impl SegmentResult {
    pub fn is_ok(&self) -> bool {
        self.status == SegmentStatus::Ok
    }
}

/// Knobs shared by every transfer of one job.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Page URL sent as `Referer` (and its origin as `Origin`).
    pub referer: Option<String>,
    /// Run carrier extraction on each body. Off for hosts that serve
    /// segments undisguised.
    pub unwrap_payload: bool,
    /// Custom ancillary chunk tag checked before the trailing scan.
    pub chunk_tag: [u8; 4],
    pub policy: RetryPolicy,
    pub workers: usize,
}

impl FetchOptions {
    pub fn new(chunk_tag: [u8; 4]) -> Self {
        Self {
            referer: None,
            unwrap_payload: true,
            chunk_tag,
            policy: RetryPolicy::default(),
            workers: DEFAULT_WORKERS,
        }
    }

    pub(crate) fn headers(&self) -> HeaderMap {
        site_headers(self.referer.as_deref())
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::new(carrier::DEFAULT_CHUNK_TAG)
    }
}

/// Fetches every segment of `segments` into `dir`, at most `opts.workers`
/// transfers in flight. Returns one result per segment, sorted by index,
/// regardless of the order transfers finished in. A failed segment is
/// reported in place; it never aborts its siblings.
pub async fn fetch_all(
    client: &reqwest::Client,
    segments: &[SegmentRef],
    dir: &Workdir,
    opts: &FetchOptions,
    stop: &StopFlag,
) -> Vec<SegmentResult> {
    if segments.is_empty() {
        return Vec::new();
    }
    let width = opts.workers.max(1).min(segments.len());

    let queue: VecDeque<(SegmentRef, PathBuf)> = segments
        .iter()
        .map(|seg| (seg.clone(), dir.segment_path(seg.index)))
        .collect();
    let queue = Arc::new(Mutex::new(queue));
    let (tx, mut rx) = mpsc::channel::<SegmentResult>(segments.len());

    tracing::debug!(segments = segments.len(), workers = width, "segment pool starting");

    let mut handles = Vec::with_capacity(width);
    for _ in 0..width {
        let queue = Arc::clone(&queue);
        let tx = tx.clone();
        let client = client.clone();
        let opts = opts.clone();
        let stop = stop.clone();
        handles.push(tokio::spawn(async move {
            loop {
                if stop.is_stopped() {
                    tracing::debug!("segment worker stopping early");
                    break;
                }
                let item = queue.lock().unwrap().pop_front();
                let Some((seg, dest)) = item else { break };
                let result = segment::fetch_segment(&client, &seg, &dest, &opts).await;
                if tx.send(result).await.is_err() {
                    break;
                }
            }
        }));
    }
    drop(tx);

    let mut results = Vec::with_capacity(segments.len());
    while let Some(result) = rx.recv().await {
        results.push(result);
    }
    for handle in handles {
        let _ = handle.await;
    }

    results.sort_by_key(|r| r.index);
    results
}

/// Paths of the segments that made it, in index order. Input is assumed
/// sorted, as [`fetch_all`] returns it.
pub fn successful_paths(results: &[SegmentResult]) -> Vec<PathBuf> {
    results
        .iter()
        .filter(|r| r.is_ok())
        .filter_map(|r| r.path.clone())
        .collect()
}

/// Builds the `Referer`/`Origin` pair segment hosts check before serving.
pub fn site_headers(referer: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let Some(referer) = referer else {
        return headers;
    };
    if let Ok(value) = HeaderValue::from_str(referer) {
        headers.insert(header::REFERER, value);
    }
    if let Some(origin) = origin_of(referer) {
        if let Ok(value) = HeaderValue::from_str(&origin) {
            headers.insert(header::ORIGIN, value);
        }
    }
    headers
}

pub(crate) fn origin_of(url: &str) -> Option<String> {
    let origin = Url::parse(url).ok()?.origin();
    if !origin.is_tuple() {
        return None;
    }
    Some(origin.ascii_serialization())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_carry_referer_and_origin() {
        let headers = site_headers(Some("https://example.com/watch/abc123?x=1"));
        assert_eq!(headers.get(header::REFERER).unwrap(), "https://example.com/watch/abc123?x=1");
        assert_eq!(headers.get(header::ORIGIN).unwrap(), "https://example.com");
    }

    #[test]
    fn origin_keeps_explicit_port() {
        let headers = site_headers(Some("http://127.0.0.1:8099/page"));
        assert_eq!(headers.get(header::ORIGIN).unwrap(), "http://127.0.0.1:8099");
    }

    #[test]
    fn no_referer_means_no_headers() {
        assert!(site_headers(None).is_empty());
    }

    #[test]
    fn unparseable_referer_is_dropped_from_origin() {
        let headers = site_headers(Some("not a url"));
        assert!(headers.get(header::ORIGIN).is_none());
    }

    #[test]
    fn successful_paths_skips_failures() {
        let results = vec![
            SegmentResult {
                index: 1,
                path: Some(PathBuf::from("/tmp/seg_00001.m4s")),
                status: SegmentStatus::Ok,
            },
            SegmentResult { index: 2, path: None, status: SegmentStatus::FetchFailed },
            SegmentResult {
                index: 3,
                path: Some(PathBuf::from("/tmp/seg_00003.m4s")),
                status: SegmentStatus::Ok,
            },
        ];
        let paths = successful_paths(&results);
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("seg_00001.m4s"));
        assert!(paths[1].ends_with("seg_00003.m4s"));
    }

    #[test]
    fn default_options_use_default_tag() {
        let opts = FetchOptions::default();
        assert_eq!(opts.chunk_tag, *b"seGB");
        assert!(opts.unwrap_payload);
        assert_eq!(opts.workers, DEFAULT_WORKERS);
    }
}
