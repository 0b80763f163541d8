use harvester_core::{FIELD_AUTHOR, FIELD_TEXT, FIELD_TIMESTAMP};
use serde::{Deserialize, Serialize};

use super::StoreError;

const RESERVED_COLUMNS: &[&str] = &[
    "id",
    "source_item_id",
    "group_key",
    "sightings",
    "first_seen_at",
    "last_seen_at",
];

/// Column layout of one source type's table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table: String,
    pub text_fields: Vec<String>,
    pub counter_fields: Vec<String>,
}

impl TableSchema {
    pub fn new<T, C>(table: impl Into<String>, text_fields: T, counter_fields: C) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            table: table.into(),
            text_fields: text_fields.into_iter().map(Into::into).collect(),
            counter_fields: counter_fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Keyword search timeline: replies, reposts, likes and views.
    pub fn search_timeline() -> Self {
        Self::new(
            "timeline_posts",
            [FIELD_AUTHOR, FIELD_TEXT, FIELD_TIMESTAMP],
            ["replies", "reposts", "likes", "views"],
        )
    }

    /// Federated tag timeline: replies, boosts and favourites.
    pub fn federated_timeline() -> Self {
        Self::new(
            "federated_posts",
            [FIELD_AUTHOR, FIELD_TEXT, FIELD_TIMESTAMP],
            ["replies", "boosts", "favorites"],
        )
    }

    /// Image grid posts opened one at a time: caption, tags, location, likes.
    pub fn image_grid() -> Self {
        Self::new(
            "image_posts",
            [FIELD_AUTHOR, FIELD_TEXT, "hashtags", "location", FIELD_TIMESTAMP],
            ["likes"],
        )
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if !is_identifier(&self.table) {
            return Err(StoreError::InvalidSchema(format!(
                "table name {:?} is not a plain identifier",
                self.table
            )));
        }
        if self.table == super::sqlite::RUNS_TABLE {
            return Err(StoreError::InvalidSchema(format!(
                "table name {:?} is reserved",
                self.table
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for column in self.text_fields.iter().chain(&self.counter_fields) {
            if !is_identifier(column) {
                return Err(StoreError::InvalidSchema(format!(
                    "column {column:?} is not a plain identifier"
                )));
            }
            if RESERVED_COLUMNS.contains(&column.as_str()) {
                return Err(StoreError::InvalidSchema(format!(
                    "column {column:?} is reserved"
                )));
            }
            if !seen.insert(column.as_str()) {
                return Err(StoreError::InvalidSchema(format!(
                    "column {column:?} declared twice"
                )));
            }
        }
        Ok(())
    }
}

/// Schema selection as written in configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaChoice {
    SearchTimeline,
    FederatedTimeline,
    ImageGrid,
    Custom(TableSchema),
}

impl SchemaChoice {
    pub fn resolve(&self) -> TableSchema {
        match self {
            SchemaChoice::SearchTimeline => TableSchema::search_timeline(),
            SchemaChoice::FederatedTimeline => TableSchema::federated_timeline(),
            SchemaChoice::ImageGrid => TableSchema::image_grid(),
            SchemaChoice::Custom(schema) => schema.clone(),
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
