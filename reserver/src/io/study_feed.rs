//! Study list snapshot written by the browser bridge.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::study_filter::StudyCard;

/// Read the current study cards. A missing file means the list has not rendered yet.
pub fn load_study_cards(path: &Path) -> Result<Vec<StudyCard>> {
    if !path.exists() {
        debug!(path = %path.display(), "study list not available yet");
        return Ok(Vec::new());
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read study list {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse study list {}", path.display()))
}
