//! Reserver configuration stored under `.reserver/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::inspection::SuccessPolicy;
use crate::core::interval::RetryConfig;

/// Reserver configuration (TOML).
///
/// Edited by humans and by the `config set` / UI save actions. Missing fields
/// default to the values the reserver ships with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ReserverConfig {
    pub retry: RetryConfig,
    pub reservation: ReservationConfig,
    pub logger: LoggerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReservationConfig {
    /// Treat a vanished reserve button (with no error visible) as success.
    ///
    /// This is a heuristic; disable it to require the explicit "finished" button.
    pub infer_success_from_missing_action: bool,

    /// Page snapshot written by the browser bridge, relative to the project root.
    pub page_path: PathBuf,

    /// Click requests appended for the browser bridge, relative to the project root.
    pub actions_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggerConfig {
    /// Researcher names whose studies are logged (exact match).
    pub target_researchers: Vec<String>,

    /// Spreadsheet web-app endpoint. Empty disables remote logging.
    pub web_app_url: String,

    /// Study list snapshot written by the browser bridge.
    pub studies_path: PathBuf,

    /// Quiet period after the last list change before checking.
    pub debounce_ms: u64,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            infer_success_from_missing_action: true,
            page_path: PathBuf::from(".reserver/page.json"),
            actions_path: PathBuf::from(".reserver/actions.jsonl"),
        }
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            target_researchers: Vec::new(),
            web_app_url: String::new(),
            studies_path: PathBuf::from(".reserver/studies.json"),
            debounce_ms: 1_000,
        }
    }
}

impl ReservationConfig {
    pub fn success_policy(&self) -> SuccessPolicy {
        SuccessPolicy::from_flag(self.infer_success_from_missing_action)
    }
}

impl ReserverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.retry.min_secs == 0 {
            return Err(anyhow!("retry.min_secs must be > 0"));
        }
        if self.logger.debounce_ms == 0 {
            return Err(anyhow!("logger.debounce_ms must be > 0"));
        }
        if self.retry.min_secs > self.retry.max_secs {
            warn!(
                min_secs = self.retry.min_secs,
                max_secs = self.retry.max_secs,
                "retry range is inverted; attempts will use min_secs"
            );
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ReserverConfig::default()`.
pub fn load_config(path: &Path) -> Result<ReserverConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config missing; using defaults");
        let cfg = ReserverConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ReserverConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ReserverConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Explicit save of a new retry range: validated strictly, then persisted.
pub fn save_retry_range(path: &Path, retry: RetryConfig) -> Result<ReserverConfig> {
    retry.validate_range()?;
    let mut cfg = load_config(path)?;
    cfg.retry = retry;
    write_config(path, &cfg)?;
    debug!(min_secs = retry.min_secs, max_secs = retry.max_secs, "retry range saved");
    Ok(cfg)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
