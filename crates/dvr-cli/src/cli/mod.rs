//! CLI for the DVR media grabber.

mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use dvr_core::config;
use dvr_core::control::StopFlag;
use dvr_core::probe::{AssetKind, ProbeRules, SignalRule, ValueSource};
use std::path::{Path, PathBuf};

use commands::{run_checksum, run_extract, run_fetch, run_grab, run_probe};

/// Top-level CLI for the DVR media grabber.
#[derive(Debug, Parser)]
#[command(name = "dvr")]
#[command(about = "DVR: discover script-revealed media and reassemble it", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

/// Site rule selection shared by `grab` and `probe`: either a TOML rules
/// file, or enough flags to build a one-stage rule on the spot.
#[derive(Debug, Args)]
pub struct RuleArgs {
    /// TOML rules file with a [primary] and optional [secondary] table.
    #[arg(long, value_name = "FILE")]
    pub rules: Option<PathBuf>,

    /// Substring a matching response URL must contain (repeatable; all must match).
    #[arg(long = "match", value_name = "SUBSTR")]
    pub match_substrings: Vec<String>,

    /// Read the value from this JSON body field (dotted path) instead of the response URL.
    #[arg(long, value_name = "FIELD")]
    pub json_field: Option<String>,

    /// Regex tried against the page HTML when no response ever matches.
    #[arg(long, value_name = "REGEX")]
    pub fallback: Option<String>,

    /// The discovered URL is the asset itself, not a segment manifest.
    #[arg(long)]
    pub direct: bool,
}

impl RuleArgs {
    /// Effective rule set: the file wins when given, otherwise the flags
    /// describe a single primary rule.
    pub fn resolve(&self) -> Result<ProbeRules> {
        if let Some(path) = &self.rules {
            return ProbeRules::load(path);
        }
        let value = match &self.json_field {
            Some(field) => ValueSource::Json { field: field.clone() },
            None => ValueSource::ResponseUrl,
        };
        let rules = ProbeRules {
            primary: SignalRule {
                url_contains: self.match_substrings.clone(),
                value,
                html_fallback: self.fallback.clone(),
            },
            secondary: None,
            kind: if self.direct { AssetKind::Direct } else { AssetKind::Manifest },
            plain: false,
        };
        rules.validate()?;
        Ok(rules)
    }
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Probe pages and acquire whatever they reveal (full pipeline).
    Grab {
        /// Page URLs to process, in order.
        #[arg(required = true)]
        pages: Vec<String>,

        #[command(flatten)]
        rule_args: RuleArgs,

        /// Output file (single page only; default derives from the page URL).
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Segment fetch pool width (overrides the config).
        #[arg(long, value_name = "N")]
        workers: Option<usize>,

        /// Keep the per-page working directory after a successful remux.
        #[arg(long)]
        keep_parts: bool,
    },

    /// Probe a page and print what it reveals, without downloading.
    Probe {
        /// Page URL to probe.
        page_url: String,

        #[command(flatten)]
        rule_args: RuleArgs,
    },

    /// Fetch a known manifest URL: download, extract and remux its segments.
    Fetch {
        /// Manifest URL.
        manifest_url: String,

        /// Output file (default derives from the manifest URL).
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Referer header for manifest and segment requests.
        #[arg(long, value_name = "URL")]
        referer: Option<String>,

        /// Segment fetch pool width (overrides the config).
        #[arg(long, value_name = "N")]
        workers: Option<usize>,

        /// Segments are served undisguised; skip payload extraction.
        #[arg(long)]
        plain: bool,

        /// Keep the working directory after a successful remux.
        #[arg(long)]
        keep_parts: bool,
    },

    /// Extract the hidden payload from one disguised container file.
    Extract {
        /// Path to the container file.
        container: PathBuf,

        /// Output file (default: container path with extension `.m4s`).
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Compute SHA-256 of a file (e.g. after a grab).
    Checksum {
        /// Path to the file.
        path: String,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let mut cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        let stop = StopFlag::new();
        spawn_ctrl_c_trigger(stop.clone());

        match cli.command {
            CliCommand::Grab { pages, rule_args, output, workers, keep_parts } => {
                let rules = rule_args.resolve()?;
                if let Some(n) = workers {
                    cfg.workers = n;
                }
                if keep_parts {
                    cfg.keep_workdir = true;
                }
                run_grab(cfg, &pages, &rules, output.as_deref(), &stop).await?;
            }
            CliCommand::Probe { page_url, rule_args } => {
                let rules = rule_args.resolve()?;
                run_probe(cfg, &page_url, &rules, &stop).await?;
            }
            CliCommand::Fetch { manifest_url, output, referer, workers, plain, keep_parts } => {
                if let Some(n) = workers {
                    cfg.workers = n;
                }
                if keep_parts {
                    cfg.keep_workdir = true;
                }
                run_fetch(
                    cfg,
                    &manifest_url,
                    referer.as_deref(),
                    output.as_deref(),
                    plain,
                    &stop,
                )
                .await?;
            }
            CliCommand::Extract { container, output } => {
                run_extract(&cfg, &container, output.as_deref()).await?;
            }
            CliCommand::Checksum { path } => run_checksum(Path::new(&path)).await?,
        }

        Ok(())
    }
}

/// First Ctrl-C sets the stop flag so loops wind down cleanly.
fn spawn_ctrl_c_trigger(stop: StopFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping");
            stop.trigger();
        }
    });
}
