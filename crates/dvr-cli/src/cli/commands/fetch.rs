//! `dvr fetch <manifest-url>` – acquire a known manifest without probing.

use anyhow::Result;
use dvr_core::config::DvrConfig;
use dvr_core::control::StopFlag;
use dvr_core::naming;
use dvr_core::pipeline::Pipeline;
use std::path::{Path, PathBuf};

pub async fn run_fetch(
    cfg: DvrConfig,
    manifest_url: &str,
    referer: Option<&str>,
    output: Option<&Path>,
    plain: bool,
    stop: &StopFlag,
) -> Result<()> {
    let pipeline = Pipeline::new(cfg)?;
    let output = match output {
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(naming::output_name(manifest_url)),
    };

    let report = pipeline
        .fetch_manifest_job(manifest_url, referer, &output, plain, stop)
        .await?;

    println!("output  {}", report.output.display());
    println!("parts   {}/{}", report.ok_segments, report.total_segments);
    println!("sha256  {}", report.sha256);
    Ok(())
}
