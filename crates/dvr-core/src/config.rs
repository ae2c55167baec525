use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Retry policy parameters (optional `[retry]` section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per fetch (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_secs: 0.25,
            max_delay_secs: 30,
        }
    }
}

/// Probe tuning (optional `[probe]` section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Wall-clock budget per observation stage, in seconds.
    pub stage_timeout_secs: u64,
    /// Budget for one page navigation, in seconds.
    pub nav_timeout_secs: u64,
    /// Reload/re-navigate attempts for the secondary stage.
    pub nav_retries: u32,
    /// Poll interval while awaiting the response observer, in milliseconds.
    pub poll_interval_ms: u64,
    /// Run the browser without a visible window.
    pub headless: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            stage_timeout_secs: 25,
            nav_timeout_secs: 45,
            nav_retries: 3,
            poll_interval_ms: 300,
            headless: true,
        }
    }
}

impl ProbeConfig {
    pub fn stage_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.stage_timeout_secs)
    }

    pub fn nav_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.nav_timeout_secs)
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }
}

/// Global configuration loaded from `~/.config/dvr/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DvrConfig {
    /// Segment fetch worker pool width.
    pub workers: usize,
    /// Per-request timeout for segment and manifest fetches, in seconds.
    pub segment_timeout_secs: u64,
    /// Four ASCII characters tagging the custom payload chunk.
    pub chunk_tag: String,
    /// Keep the per-job working directory even after a successful remux.
    #[serde(default)]
    pub keep_workdir: bool,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// Optional probe tuning; if missing, built-in defaults are used.
    #[serde(default)]
    pub probe: Option<ProbeConfig>,
    /// Explicit ffmpeg binary; None resolves `ffmpeg` from PATH.
    #[serde(default)]
    pub ffmpeg_path: Option<String>,
    /// Root directory for per-job working directories; None = system temp.
    #[serde(default)]
    pub work_root: Option<String>,
}

impl Default for DvrConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            segment_timeout_secs: 60,
            chunk_tag: "seGB".to_string(),
            keep_workdir: false,
            retry: None,
            probe: None,
            ffmpeg_path: None,
            work_root: None,
        }
    }
}

impl DvrConfig {
    /// The custom chunk tag as raw bytes; errors if the configured string is
    /// not exactly 4 ASCII characters.
    pub fn chunk_tag_bytes(&self) -> Result<[u8; 4]> {
        crate::carrier::parse_chunk_tag(&self.chunk_tag).ok_or_else(|| {
            anyhow::anyhow!(
                "chunk_tag must be exactly 4 ASCII characters, got {:?}",
                self.chunk_tag
            )
        })
    }

    /// Probe settings with defaults applied.
    pub fn probe_settings(&self) -> ProbeConfig {
        self.probe.clone().unwrap_or_default()
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("dvr")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<DvrConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = DvrConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: DvrConfig = toml::from_str(&data)?;
    cfg.chunk_tag_bytes()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = DvrConfig::default();
        assert_eq!(cfg.workers, 8);
        assert_eq!(cfg.segment_timeout_secs, 60);
        assert_eq!(cfg.chunk_tag, "seGB");
        assert!(!cfg.keep_workdir);
        assert!(cfg.retry.is_none());
        assert!(cfg.probe.is_none());
        assert_eq!(cfg.chunk_tag_bytes().unwrap(), *b"seGB");
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = DvrConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: DvrConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.workers, cfg.workers);
        assert_eq!(parsed.segment_timeout_secs, cfg.segment_timeout_secs);
        assert_eq!(parsed.chunk_tag, cfg.chunk_tag);
    }

    #[test]
    fn config_toml_custom_values() {
        let toml = r#"
            workers = 4
            segment_timeout_secs = 30
            chunk_tag = "paYl"
            keep_workdir = true
            ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"
        "#;
        let cfg: DvrConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.workers, 4);
        assert_eq!(cfg.segment_timeout_secs, 30);
        assert_eq!(cfg.chunk_tag_bytes().unwrap(), *b"paYl");
        assert!(cfg.keep_workdir);
        assert_eq!(cfg.ffmpeg_path.as_deref(), Some("/opt/ffmpeg/bin/ffmpeg"));
        assert!(cfg.work_root.is_none());
    }

    #[test]
    fn config_toml_retry_and_probe_sections() {
        let toml = r#"
            workers = 8
            segment_timeout_secs = 60
            chunk_tag = "seGB"

            [retry]
            max_attempts = 3
            base_delay_secs = 0.5
            max_delay_secs = 15

            [probe]
            stage_timeout_secs = 20
            nav_timeout_secs = 30
            nav_retries = 2
            poll_interval_ms = 250
            headless = false
        "#;
        let cfg: DvrConfig = toml::from_str(toml).unwrap();
        let retry = cfg.retry.as_ref().unwrap();
        assert_eq!(retry.max_attempts, 3);
        assert!((retry.base_delay_secs - 0.5).abs() < 1e-9);
        assert_eq!(retry.max_delay_secs, 15);
        let probe = cfg.probe_settings();
        assert_eq!(probe.stage_timeout_secs, 20);
        assert_eq!(probe.nav_retries, 2);
        assert_eq!(probe.poll_interval_ms, 250);
        assert!(!probe.headless);
    }

    #[test]
    fn bad_chunk_tag_is_rejected() {
        let toml = r#"
            workers = 8
            segment_timeout_secs = 60
            chunk_tag = "toolong"
        "#;
        let cfg: DvrConfig = toml::from_str(toml).unwrap();
        assert!(cfg.chunk_tag_bytes().is_err());
    }

    #[test]
    fn probe_defaults_when_section_missing() {
        let probe = DvrConfig::default().probe_settings();
        assert_eq!(probe.stage_timeout_secs, 25);
        assert_eq!(probe.nav_timeout_secs, 45);
        assert_eq!(probe.nav_retries, 3);
        assert_eq!(probe.poll_interval_ms, 300);
        assert!(probe.headless);
    }
}
