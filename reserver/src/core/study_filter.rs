//! Selection of newly listed studies from watched researchers.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use chrono::{DateTime, TimeZone};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

static BY_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^by\s+").expect("valid regex"));
static PLACES_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*places?$").expect("valid regex"));

/// One card from the study list snapshot. Fields mirror what the list renders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyCard {
    /// `data-testid` of the enclosing list item.
    pub id: Option<String>,
    pub title: Option<String>,
    /// Host line, e.g. `"By Jane Doe"`.
    pub host: Option<String>,
    pub reward: Option<String>,
    /// Places tag, e.g. `"12 places"`.
    pub places: Option<String>,
}

/// A study that matched a watched researcher, as logged locally and remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyRecord {
    pub date: String,
    pub time: String,
    pub title: String,
    pub researcher: String,
    pub reward: String,
    pub places: String,
    pub id: String,
}

impl StudyRecord {
    /// One-line rendering for the local log.
    pub fn display_line(&self) -> String {
        format!(
            "{} {}: {} - {} ({} / {} places)",
            self.date, self.time, self.researcher, self.title, self.reward, self.places
        )
    }
}

/// Researcher name from a host line, without a leading "By ".
pub fn researcher_name(host: &str) -> Option<String> {
    let name = BY_PREFIX.replace(host.trim(), "").trim().to_string();
    (!name.is_empty()).then_some(name)
}

/// Place count from a tag such as `"3 places"`; `"0"` when nothing remains.
pub fn places_count(text: &str) -> String {
    let count = PLACES_SUFFIX.replace(text.trim(), "").trim().to_string();
    if count.is_empty() {
        "0".to_string()
    } else {
        count
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Records for cards by `targets` whose ids are not in `seen`.
///
/// Cards without an id or a researcher are skipped with a warning. Output keeps
/// card order and never repeats an id.
pub fn select_new_matches<Tz: TimeZone>(
    cards: &[StudyCard],
    targets: &[String],
    seen: &BTreeMap<String, StudyRecord>,
    now: &DateTime<Tz>,
) -> Vec<StudyRecord>
where
    Tz::Offset: std::fmt::Display,
{
    let mut batch = BTreeSet::new();
    let mut records = Vec::new();
    for card in cards {
        let title = non_empty(card.title.as_deref()).unwrap_or("Untitled");
        let Some(id) = non_empty(card.id.as_deref()) else {
            warn!(title, "study has no id; skipping");
            continue;
        };
        let Some(researcher) = card.host.as_deref().and_then(researcher_name) else {
            warn!(id, title, "study has no researcher; skipping");
            continue;
        };
        if !targets.iter().any(|target| target == &researcher) {
            continue;
        }
        if seen.contains_key(id) || !batch.insert(id.to_string()) {
            continue;
        }
        records.push(StudyRecord {
            date: now.format("%Y-%m-%d").to_string(),
            time: now.format("%H:%M:%S").to_string(),
            title: title.to_string(),
            researcher,
            reward: non_empty(card.reward.as_deref())
                .unwrap_or("N/A")
                .to_string(),
            places: places_count(card.places.as_deref().unwrap_or("0 places")),
            id: id.to_string(),
        });
    }
    records
}
