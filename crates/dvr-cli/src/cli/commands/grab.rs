//! `dvr grab <page>...` – probe each page and acquire what it reveals.

use anyhow::Result;
use dvr_core::config::DvrConfig;
use dvr_core::control::StopFlag;
use dvr_core::pipeline::{GrabOutcome, Pipeline};
use dvr_core::probe::{AssetKind, ProbeRules, ProbeSession};
use std::path::Path;

pub async fn run_grab(
    cfg: DvrConfig,
    pages: &[String],
    rules: &ProbeRules,
    output: Option<&Path>,
    stop: &StopFlag,
) -> Result<()> {
    if output.is_some() && pages.len() > 1 {
        anyhow::bail!("--output takes a single page, got {} pages", pages.len());
    }

    let pipeline = Pipeline::new(cfg)?;
    if rules.kind == AssetKind::Manifest {
        pipeline.verify_tools().await?;
    }

    // One browser serves the whole batch; pages get fresh tabs.
    let session = ProbeSession::launch(pipeline.config().probe_settings()).await?;

    let mut done = 0usize;
    let mut skipped = 0usize;
    let mut failed = 0usize;
    for page in pages {
        if stop.is_stopped() {
            tracing::info!("stop requested, leaving remaining pages");
            break;
        }
        match pipeline.grab_page(&session, page, rules, output, stop).await {
            Ok(outcome) if outcome.is_skip() => {
                println!(
                    "SKIP  {page}  (nothing discovered after {} probe attempt(s))",
                    outcome.probe_attempts
                );
                skipped += 1;
            }
            Ok(outcome) => {
                print_outcome(&outcome);
                done += 1;
            }
            Err(err) => {
                if stop.is_stopped() {
                    tracing::info!("stop requested, leaving remaining pages");
                    break;
                }
                tracing::error!(page = %page, "page failed: {err:#}");
                eprintln!("FAIL  {page}: {err:#}");
                failed += 1;
            }
        }
    }

    session.close().await;

    println!(
        "{done} done, {skipped} skipped, {failed} failed of {} page(s)",
        pages.len()
    );
    if done == 0 && failed > 0 {
        anyhow::bail!("no page succeeded");
    }
    Ok(())
}

fn print_outcome(outcome: &GrabOutcome) {
    println!("OK    {}", outcome.page_url);
    if let Some(found) = &outcome.discovered {
        println!("      url     {}  (via {})", found.url, found.via);
    }
    if let Some(report) = &outcome.report {
        println!("      output  {}", report.output.display());
        println!("      parts   {}/{}", report.ok_segments, report.total_segments);
        println!("      sha256  {}", report.sha256);
    }
}
