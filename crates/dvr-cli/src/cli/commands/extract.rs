//! `dvr extract <container>` – unwrap one disguised container file.

use anyhow::{Context, Result};
use dvr_core::carrier;
use dvr_core::config::DvrConfig;
use std::path::Path;

pub async fn run_extract(cfg: &DvrConfig, container: &Path, output: Option<&Path>) -> Result<()> {
    let tag = cfg.chunk_tag_bytes()?;
    let raw = std::fs::read(container)
        .with_context(|| format!("reading {}", container.display()))?;
    let payload = carrier::extract_payload(&raw, tag)
        .with_context(|| format!("extracting payload from {}", container.display()))?;

    let dest = match output {
        Some(path) => path.to_path_buf(),
        None => container.with_extension("m4s"),
    };
    std::fs::write(&dest, payload).with_context(|| format!("writing {}", dest.display()))?;
    println!("{}  {} bytes", dest.display(), payload.len());
    Ok(())
}
