use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate};
use engine_logging::{engine_debug, engine_info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{DateWindow, Extractor, HtmlItem, Source, SourceError};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("could not read fixture: {0}")]
    Io(#[from] io::Error),
    #[error("malformed fixture: {0}")]
    Json(#[from] serde_json::Error),
}

/// Captured item markup per group, one inner list per round.
///
/// ```json
/// { "groups": { "rust": [["<article>..</article>", ".."], [".."]] } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayFixture {
    pub groups: BTreeMap<String, Vec<Vec<String>>>,
}

impl ReplayFixture {
    pub fn from_json(text: &str) -> Result<Self, ReplayError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn rounds(&self, group_key: &str) -> Option<&Vec<Vec<String>>> {
        self.groups.get(group_key).or_else(|| {
            self.groups
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(group_key))
                .map(|(_, rounds)| rounds)
        })
    }
}

/// Offline source that walks a fixture round by round.
///
/// With a dating extractor, items whose timestamp falls outside the window
/// passed to `open` are left out of each round. Items without a readable
/// timestamp are always kept.
#[derive(Clone, Default)]
pub struct ReplaySource {
    fixture: ReplayFixture,
    rounds: Vec<Vec<String>>,
    position: usize,
    group_key: String,
    window: Option<DateWindow>,
    dating: Option<Arc<dyn Extractor<HtmlItem>>>,
}

impl ReplaySource {
    pub fn new(fixture: ReplayFixture) -> Self {
        Self {
            fixture,
            ..Self::default()
        }
    }

    pub fn with_dating(mut self, extractor: Arc<dyn Extractor<HtmlItem>>) -> Self {
        self.dating = Some(extractor);
        self
    }

    fn in_window(&self, item: &HtmlItem) -> bool {
        let (Some(window), Some(dating)) = (self.window, &self.dating) else {
            return true;
        };
        match dating.extract(item, &self.group_key) {
            Ok(record) => item_date(record.timestamp()).is_none_or(|date| window.contains(date)),
            Err(_) => true,
        }
    }
}

fn item_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|stamp| stamp.date_naive())
        .ok()
        .or_else(|| {
            raw.get(..10)
                .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
        })
}

#[async_trait::async_trait]
impl Source for ReplaySource {
    type Cursor = HtmlItem;

    async fn open(
        &mut self,
        group_key: &str,
        window: Option<DateWindow>,
    ) -> Result<(), SourceError> {
        let rounds = self
            .fixture
            .rounds(group_key)
            .ok_or_else(|| SourceError::Open {
                group_key: group_key.to_string(),
                message: "group not present in fixture".to_string(),
            })?;
        self.rounds = rounds.clone();
        self.position = 0;
        self.group_key = group_key.to_string();
        self.window = window;
        engine_info!("Replaying {} rounds", self.rounds.len());
        Ok(())
    }

    async fn ready(&mut self) -> bool {
        self.position < self.rounds.len()
    }

    async fn current_items(&mut self) -> Result<Vec<HtmlItem>, SourceError> {
        let Some(round) = self.rounds.get(self.position) else {
            return Ok(Vec::new());
        };
        let items: Vec<HtmlItem> = round
            .iter()
            .map(HtmlItem::new)
            .filter(|item| self.in_window(item))
            .collect();
        if items.len() < round.len() {
            engine_debug!("{} items outside the date window", round.len() - items.len());
        }
        Ok(items)
    }

    async fn advance(&mut self) -> bool {
        if self.position + 1 < self.rounds.len() {
            self.position += 1;
            true
        } else {
            false
        }
    }
}
