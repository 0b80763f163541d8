//! Harvester engine: sources, extraction, storage, pacing and the harvest loop.
mod config;
mod engine;
mod error;
mod extract;
mod harvest;
mod html;
mod pacing;
mod progress;
mod replay;
mod report;
mod run;
mod source;
pub mod store;
mod types;

pub use config::{ConfigError, FingerprintSettings, HarvestConfig, RetrySettings};
pub use engine::EngineHandle;
pub use error::HarvestError;
pub use extract::{Expansion, ExpansionAction, ExtractError, Extractor, RecordExtractor};
pub use harvest::{HarvestLoop, HarvestSession};
pub use html::{
    ExtractionRules, FieldRules, HtmlExtractor, HtmlItem, Pick, RuleError, SelectorRule,
    Transform,
};
pub use pacing::{DurationRange, Pacer, PacingConfig};
pub use progress::{ChannelProgressSink, LogProgressSink, ProgressSink};
pub use replay::{ReplayError, ReplayFixture, ReplaySource};
pub use report::{ensure_output_dir, write_report, GroupReport, ReportError, RunReport};
pub use run::Harvester;
pub use source::{AuthError, Authenticator, DateWindow, NoLogin, Source, SourceError};
pub use store::{MemoryStore, RecordStore, SchemaChoice, SqliteStore, StoreError, TableSchema};
pub use types::{CooldownKind, FailureKind, HarvestEvent};
