//! Initialization helpers for `.reserver/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::config::{ReserverConfig, write_config};
use crate::core::signals::PageSnapshot;

const RESERVER_GITIGNORE: &str = "actions.jsonl\nlogged_studies.json\n*.tmp\n";

/// Canonical paths within `.reserver/` for a project root.
#[derive(Debug, Clone)]
pub struct ReserverPaths {
    pub root: PathBuf,
    pub reserver_dir: PathBuf,
    pub gitignore_path: PathBuf,
    pub config_path: PathBuf,
    pub logged_studies_path: PathBuf,
}

impl ReserverPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let reserver_dir = root.join(".reserver");
        Self {
            root: root.clone(),
            reserver_dir: reserver_dir.clone(),
            gitignore_path: reserver_dir.join(".gitignore"),
            config_path: reserver_dir.join("config.toml"),
            logged_studies_path: reserver_dir.join("logged_studies.json"),
        }
    }

    /// Resolve a configured path against the project root.
    pub fn resolve(&self, configured: &Path) -> PathBuf {
        if configured.is_absolute() {
            configured.to_path_buf()
        } else {
            self.root.join(configured)
        }
    }
}

/// Options for `init_reserver`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing reserver-owned files.
    pub force: bool,
}

/// Create `.reserver/` scaffolding in `root`: default config and an empty page snapshot.
///
/// Fails if `.reserver/` already exists unless `options.force` is set.
pub fn init_reserver(root: &Path, options: &InitOptions) -> Result<ReserverPaths> {
    let paths = ReserverPaths::new(root);
    if paths.reserver_dir.exists() && !options.force {
        return Err(anyhow!(
            "reserver init: .reserver already exists (use --force to overwrite)"
        ));
    }
    if paths.reserver_dir.exists() && !paths.reserver_dir.is_dir() {
        return Err(anyhow!(
            "reserver init: .reserver exists but is not a directory"
        ));
    }

    fs::create_dir_all(&paths.reserver_dir)
        .with_context(|| format!("create {}", paths.reserver_dir.display()))?;
    fs::write(&paths.gitignore_path, RESERVER_GITIGNORE)
        .with_context(|| format!("write {}", paths.gitignore_path.display()))?;

    let cfg = ReserverConfig::default();
    write_config(&paths.config_path, &cfg)?;

    let page_path = paths.resolve(&cfg.reservation.page_path);
    let mut snapshot = serde_json::to_string_pretty(&PageSnapshot::default())
        .context("serialize empty page snapshot")?;
    snapshot.push('\n');
    fs::write(&page_path, snapshot).with_context(|| format!("write {}", page_path.display()))?;

    Ok(paths)
}
