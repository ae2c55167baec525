//! `dvr probe <page>` – run discovery only and print what it finds.

use anyhow::Result;
use dvr_core::config::DvrConfig;
use dvr_core::control::StopFlag;
use dvr_core::pipeline::Pipeline;
use dvr_core::probe::{ProbeRules, ProbeSession, ProbeTarget};

pub async fn run_probe(
    cfg: DvrConfig,
    page_url: &str,
    rules: &ProbeRules,
    stop: &StopFlag,
) -> Result<()> {
    let pipeline = Pipeline::new(cfg)?;
    let session = ProbeSession::launch(pipeline.config().probe_settings()).await?;
    let target = ProbeTarget::new(page_url, rules.clone());
    let result = pipeline.probe_with_retry(&session, &target, stop).await;
    session.close().await;

    let result = result?;
    match result.discovered {
        Some(found) => {
            println!("{}", found.url);
            println!("  via       {}", found.via);
            println!("  attempts  {}", result.attempts);
            Ok(())
        }
        None => anyhow::bail!(
            "nothing discovered on {page_url} after {} attempt(s)",
            result.attempts
        ),
    }
}
