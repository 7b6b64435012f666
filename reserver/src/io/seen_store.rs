//! Local record of studies already logged (`.reserver/logged_studies.json`).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::core::study_filter::StudyRecord;

/// Logged studies keyed by study id.
pub type LoggedStudies = BTreeMap<String, StudyRecord>;

/// Load logged studies.
///
/// A missing file is empty. A corrupt file is logged, removed and treated as
/// empty so the watcher can keep running.
pub fn load_logged_studies(path: &Path) -> Result<LoggedStudies> {
    if !path.exists() {
        return Ok(LoggedStudies::new());
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    match serde_json::from_str::<LoggedStudies>(&contents) {
        Ok(studies) => {
            debug!(count = studies.len(), path = %path.display(), "loaded logged studies");
            Ok(studies)
        }
        Err(err) => {
            warn!(error = %err, path = %path.display(), "logged studies corrupt; clearing");
            fs::remove_file(path).with_context(|| format!("remove {}", path.display()))?;
            Ok(LoggedStudies::new())
        }
    }
}

/// Atomically write logged studies (temp file + rename).
pub fn write_logged_studies(path: &Path, studies: &LoggedStudies) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(studies).context("serialize logged studies")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("logged studies path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, buf).with_context(|| format!("write temp {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

/// Forget every logged study locally. The spreadsheet is untouched.
pub fn clear_logged_studies(path: &Path) -> Result<usize> {
    let count = load_logged_studies(path)?.len();
    write_logged_studies(path, &LoggedStudies::new())?;
    Ok(count)
}
