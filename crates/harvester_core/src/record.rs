use std::collections::BTreeMap;

use url::Url;

/// Well-known text field holding the item's author handle or display name.
pub const FIELD_AUTHOR: &str = "author";
/// Well-known text field holding the item's body or caption.
pub const FIELD_TEXT: &str = "text";
/// Well-known text field holding the item's publication timestamp.
pub const FIELD_TIMESTAMP: &str = "timestamp";

/// Uniqueness key of a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub source_item_id: String,
    pub group_key: String,
}

/// One harvested item: identity plus source-specific text and counter fields.
///
/// Missing text reads as `""` and missing counters as `0`, so extraction can
/// produce partial records without special casing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    pub source_item_id: String,
    pub group_key: String,
    pub fields: BTreeMap<String, String>,
    pub counters: BTreeMap<String, u64>,
}

impl Record {
    pub fn new(source_item_id: impl Into<String>, group_key: impl Into<String>) -> Self {
        Self {
            source_item_id: source_item_id.into(),
            group_key: group_key.into(),
            ..Self::default()
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_field(name, value);
        self
    }

    pub fn with_counter(mut self, name: impl Into<String>, value: u64) -> Self {
        self.set_counter(name, value);
        self
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn set_counter(&mut self, name: impl Into<String>, value: u64) {
        self.counters.insert(name.into(), value);
    }

    pub fn field(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn author(&self) -> &str {
        self.field(FIELD_AUTHOR)
    }

    pub fn text(&self) -> &str {
        self.field(FIELD_TEXT)
    }

    pub fn timestamp(&self) -> &str {
        self.field(FIELD_TIMESTAMP)
    }

    /// A record can only be stored once both halves of its key are present.
    pub fn is_identified(&self) -> bool {
        !self.source_item_id.trim().is_empty() && !self.group_key.trim().is_empty()
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            source_item_id: self.source_item_id.clone(),
            group_key: self.group_key.clone(),
        }
    }
}

/// Canonical identity for an item link.
///
/// HTTP(S) URLs lose their query string and trailing slash; the fragment is
/// kept because timeline sources use it as the per-item anchor. Anything that
/// does not parse as a web URL is returned trimmed.
pub fn canonical_item_id(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };
    if !matches!(url.scheme(), "http" | "https") {
        return trimmed.to_string();
    }
    url.set_query(None);
    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }
    url.to_string()
}
