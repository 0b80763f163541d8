use engine_logging::engine_debug;
use harvester_core::{canonical_item_id, FallbackChain, Record};
use thiserror::Error;

/// Unexpected extraction-level failure. Missing data is not an error; it
/// degrades to empty fields instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("extraction failed: {message}")]
pub struct ExtractError {
    pub message: String,
}

impl ExtractError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub trait Extractor<C>: Send + Sync {
    fn extract(&self, cursor: &C, group_key: &str) -> Result<Record, ExtractError>;
}

pub type ExpansionAction<C> = Box<dyn Fn(&C) -> Result<(), String> + Send + Sync>;

/// Idempotent action run before reading, such as expanding truncated text.
pub struct Expansion<C> {
    name: String,
    attempts: u32,
    action: ExpansionAction<C>,
}

impl<C> Expansion<C> {
    pub fn new<F>(name: impl Into<String>, attempts: u32, action: F) -> Self
    where
        F: Fn(&C) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            attempts: attempts.max(1),
            action: Box::new(action),
        }
    }

    fn run(&self, cursor: &C) {
        for attempt in 1..=self.attempts {
            match (self.action)(cursor) {
                Ok(()) => return,
                Err(err) => engine_debug!(
                    "expansion {} attempt {}/{} failed: {}",
                    self.name,
                    attempt,
                    self.attempts,
                    err
                ),
            }
        }
    }
}

/// Field-by-field extractor built from fallback chains.
///
/// Identity comes from `identity`; when that is empty and natural-key fields
/// are configured, their values are joined with `|` instead.
pub struct RecordExtractor<C> {
    identity: FallbackChain<C, String>,
    natural_key: Vec<String>,
    text_fields: Vec<(String, FallbackChain<C, String>)>,
    counter_fields: Vec<(String, FallbackChain<C, u64>)>,
    expansions: Vec<Expansion<C>>,
}

impl<C> RecordExtractor<C> {
    pub fn new(identity: FallbackChain<C, String>) -> Self {
        Self {
            identity,
            natural_key: Vec::new(),
            text_fields: Vec::new(),
            counter_fields: Vec::new(),
            expansions: Vec::new(),
        }
    }

    pub fn natural_key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.natural_key = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn text_field(mut self, name: impl Into<String>, chain: FallbackChain<C, String>) -> Self {
        self.text_fields.push((name.into(), chain));
        self
    }

    pub fn counter_field(mut self, name: impl Into<String>, chain: FallbackChain<C, u64>) -> Self {
        self.counter_fields.push((name.into(), chain));
        self
    }

    pub fn expansion(mut self, expansion: Expansion<C>) -> Self {
        self.expansions.push(expansion);
        self
    }

    /// Reads every configured field; never fails on missing data.
    pub fn read(&self, cursor: &C, group_key: &str) -> Record {
        for expansion in &self.expansions {
            expansion.run(cursor);
        }

        let mut record = Record::new("", group_key);
        for (name, chain) in &self.text_fields {
            record.set_field(name.clone(), chain.resolve_or_default(cursor));
        }
        for (name, chain) in &self.counter_fields {
            record.set_counter(name.clone(), chain.resolve_or_default(cursor));
        }

        record.source_item_id = match self.identity.resolve(cursor) {
            Some(id) => canonical_item_id(&id),
            None => self.composite_key(&record),
        };
        record
    }

    fn composite_key(&self, record: &Record) -> String {
        if self.natural_key.is_empty() {
            return String::new();
        }
        let parts: Vec<&str> = self
            .natural_key
            .iter()
            .map(|name| record.field(name).trim())
            .collect();
        if parts.iter().all(|part| part.is_empty()) {
            return String::new();
        }
        parts.join("|")
    }
}

impl<C> Extractor<C> for RecordExtractor<C> {
    fn extract(&self, cursor: &C, group_key: &str) -> Result<Record, ExtractError> {
        Ok(self.read(cursor, group_key))
    }
}

impl<C, T: Extractor<C> + ?Sized> Extractor<C> for std::sync::Arc<T> {
    fn extract(&self, cursor: &C, group_key: &str) -> Result<Record, ExtractError> {
        (**self).extract(cursor, group_key)
    }
}
