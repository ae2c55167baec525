//! End-to-end orchestration: probe a page, acquire what it revealed,
//! reassemble, report.
//!
//! One [`Pipeline`] carries the shared HTTP client and the resolved
//! configuration for a whole run. Per-page failures are the caller's to
//! log and skip; only setup problems (bad config, missing ffmpeg)
//! should end a batch.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use url::Url;

use crate::checksum;
use crate::config::DvrConfig;
use crate::control::StopFlag;
use crate::downloader::{self, FetchOptions};
use crate::manifest::SegmentManifest;
use crate::naming;
use crate::probe::{
    AssetKind, Discovered, ProbeResult, ProbeRules, ProbeSession, ProbeTarget,
};
use crate::remux;
use crate::retry::{run_with_retry, FetchError, RetryPolicy};
use crate::storage::Workdir;

/// Whole-probe retry budget for navigation timeouts.
const PROBE_ROUNDS: u32 = 3;
const PROBE_RETRY_PAUSE: Duration = Duration::from_secs(2);

/// What one acquisition produced. This is the record handed to whatever
/// bookkeeping sits on top.
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub output: PathBuf,
    pub ok_segments: usize,
    pub total_segments: usize,
    pub sha256: String,
}

/// Per-page outcome of a grab run. `report` absent means the page was
/// skipped because the probe exhausted every strategy.
#[derive(Debug, Clone)]
pub struct GrabOutcome {
    pub page_url: String,
    pub discovered: Option<Discovered>,
    pub probe_attempts: u32,
    pub report: Option<FetchReport>,
}

impl GrabOutcome {
    pub fn is_skip(&self) -> bool {
        self.report.is_none()
    }

    fn skipped(page_url: &str, attempts: u32) -> Self {
        Self {
            page_url: page_url.to_string(),
            discovered: None,
            probe_attempts: attempts,
            report: None,
        }
    }
}

pub struct Pipeline {
    cfg: DvrConfig,
    chunk_tag: [u8; 4],
    client: reqwest::Client,
}

impl Pipeline {
    /// Builds the shared HTTP client and validates the parts of the
    /// config every job depends on.
    pub fn new(cfg: DvrConfig) -> Result<Self> {
        let chunk_tag = cfg.chunk_tag_bytes()?;
        let client = reqwest::Client::builder()
            .user_agent(downloader::USER_AGENT)
            .timeout(Duration::from_secs(cfg.segment_timeout_secs))
            .build()
            .context("building HTTP client")?;
        Ok(Self { cfg, chunk_tag, client })
    }

    pub fn config(&self) -> &DvrConfig {
        &self.cfg
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Confirms the external multiplexer is runnable. Called once before a
    /// batch so a missing tool fails fast instead of after the first probe.
    pub async fn verify_tools(&self) -> Result<()> {
        remux::verify_tool(self.ffmpeg()).await?;
        Ok(())
    }

    fn fetch_options(&self, referer: Option<String>, unwrap_payload: bool) -> FetchOptions {
        FetchOptions {
            referer,
            unwrap_payload,
            chunk_tag: self.chunk_tag,
            policy: RetryPolicy::from_config(self.cfg.retry.as_ref()),
            workers: self.cfg.workers,
        }
    }

    fn ffmpeg(&self) -> &str {
        self.cfg.ffmpeg_path.as_deref().unwrap_or(remux::DEFAULT_TOOL)
    }

    fn work_root(&self) -> Option<&Path> {
        self.cfg.work_root.as_deref().map(Path::new)
    }

    /// Probes one page end to end and, if anything was discovered,
    /// acquires it. A probe that exhausts every strategy yields a
    /// skip outcome, not an error.
    pub async fn grab_page(
        &self,
        session: &ProbeSession,
        page_url: &str,
        rules: &ProbeRules,
        output_override: Option<&Path>,
        stop: &StopFlag,
    ) -> Result<GrabOutcome> {
        let target = ProbeTarget::new(page_url, rules.clone());
        let probed = self.probe_with_retry(session, &target, stop).await?;
        let Some(found) = probed.discovered else {
            return Ok(GrabOutcome::skipped(page_url, probed.attempts));
        };

        let output = match output_override {
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(naming::output_name(page_url)),
        };

        let report = match rules.kind {
            AssetKind::Manifest => {
                self.fetch_manifest_job(&found.url, Some(page_url), &output, rules.plain, stop)
                    .await?
            }
            AssetKind::Direct => {
                self.download_direct_job(&found.url, Some(page_url), &output, stop).await?
            }
        };

        Ok(GrabOutcome {
            page_url: page_url.to_string(),
            discovered: Some(found),
            probe_attempts: probed.attempts,
            report: Some(report),
        })
    }

    /// Runs the probe, retrying the whole run on navigation timeouts.
    /// A budget of timed-out rounds degrades to an exhausted result so
    /// the batch moves on; any other probe error propagates.
    pub async fn probe_with_retry(
        &self,
        session: &ProbeSession,
        target: &ProbeTarget,
        stop: &StopFlag,
    ) -> Result<ProbeResult> {
        for round in 1..=PROBE_ROUNDS {
            stop.check()?;
            match session.probe(&self.client, target, stop).await {
                Ok(result) => return Ok(result),
                Err(err) if err.is_navigation_timeout() => {
                    tracing::warn!(page = %target.page_url, round, error = %err, "probe round timed out");
                    if round < PROBE_ROUNDS {
                        tokio::time::sleep(PROBE_RETRY_PAUSE).await;
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
        tracing::warn!(page = %target.page_url, rounds = PROBE_ROUNDS, "all probe rounds timed out, treating page as exhausted");
        Ok(ProbeResult { discovered: None, attempts: PROBE_ROUNDS })
    }

    /// Fetches a manifest and pool-downloads its segments, then remuxes
    /// the ordered parts into `output`. Missing segments are tolerated with
    /// a warning; zero segments or a failed remux keep the workdir on
    /// disk for inspection.
    pub async fn fetch_manifest_job(
        &self,
        manifest_url: &str,
        referer: Option<&str>,
        output: &Path,
        plain: bool,
        stop: &StopFlag,
    ) -> Result<FetchReport> {
        remux::verify_tool(self.ffmpeg()).await?;

        let manifest = self.fetch_manifest(manifest_url, referer).await?;
        if manifest.is_empty() {
            anyhow::bail!("manifest at {manifest_url} has no segment entries");
        }
        let total = manifest.len();
        tracing::info!(segments = total, url = manifest_url, "manifest resolved");

        let workdir = Workdir::create(self.work_root())?;
        let opts = self.fetch_options(referer.map(str::to_owned), !plain);
        let results =
            downloader::fetch_all(&self.client, manifest.segments(), &workdir, &opts, stop).await;
        // A stop mid-pool leaves a truncated result set; never remux it.
        stop.check()?;

        let parts = downloader::successful_paths(&results);
        if parts.is_empty() {
            let kept = workdir.keep();
            anyhow::bail!(
                "none of {total} segments retrieved from {manifest_url}; workdir kept at {}",
                kept.display()
            );
        }
        if parts.len() < total {
            tracing::warn!(ok = parts.len(), total, "segments missing, remuxing best-effort");
        }

        if let Err(err) = remux::reassemble(self.ffmpeg(), &parts, &workdir.list_path(), output).await
        {
            let kept = workdir.keep();
            tracing::warn!(workdir = %kept.display(), "remux failed, parts kept for inspection");
            return Err(err).with_context(|| format!("reassembling {}", output.display()));
        }

        let sha256 = checksum::sha256_file(output)?;
        tracing::info!(
            output = %output.display(),
            ok = parts.len(),
            total,
            sha256 = %sha256,
            "job complete"
        );

        if self.cfg.keep_workdir {
            let kept = workdir.keep();
            tracing::info!(workdir = %kept.display(), "keeping segment workdir as requested");
        } else if let Err(err) = workdir.remove() {
            tracing::warn!(error = %err, "workdir cleanup failed");
        }

        Ok(FetchReport {
            output: output.to_path_buf(),
            ok_segments: parts.len(),
            total_segments: total,
            sha256,
        })
    }

    /// Single-stream acquisition for directly discovered assets.
    pub async fn download_direct_job(
        &self,
        asset_url: &str,
        referer: Option<&str>,
        output: &Path,
        stop: &StopFlag,
    ) -> Result<FetchReport> {
        let opts = self.fetch_options(referer.map(str::to_owned), false);
        let bytes =
            downloader::download_direct(&self.client, asset_url, output, &opts, stop).await?;
        let sha256 = checksum::sha256_file(output)?;
        tracing::info!(bytes, output = %output.display(), sha256 = %sha256, "job complete");
        Ok(FetchReport {
            output: output.to_path_buf(),
            ok_segments: 1,
            total_segments: 1,
            sha256,
        })
    }

    /// Downloads and parses the manifest, resolving relative segment
    /// locations against the manifest URL.
    pub async fn fetch_manifest(
        &self,
        url: &str,
        referer: Option<&str>,
    ) -> Result<SegmentManifest> {
        let headers = downloader::site_headers(referer);
        let policy = RetryPolicy::from_config(self.cfg.retry.as_ref());
        let text = run_with_retry(&policy, || {
            let client = self.client.clone();
            let url = url.to_string();
            let headers = headers.clone();
            async move {
                let response = client.get(&url).headers(headers).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(FetchError::Status(status.as_u16()));
                }
                Ok(response.text().await?)
            }
        })
        .await
        .with_context(|| format!("fetching manifest {url}"))?;

        let mut manifest = SegmentManifest::parse(&text);
        if let Ok(base) = Url::parse(url) {
            manifest.resolve_relative(&base);
        }
        Ok(manifest)
    }
}
