//! Harvester core: pure record, merge and stop-policy logic.
mod count;
mod fallback;
mod fingerprint;
mod groups;
mod merge;
mod record;
mod session;
mod termination;

pub use count::parse_count;
pub use fallback::{Blank, FallbackChain, Strategy};
pub use fingerprint::{CaptionFingerprints, FingerprintVerdict, DEFAULT_FINGERPRINT_PREFIX};
pub use groups::{dedup_groups, parse_group_list};
pub use merge::{merge_record, UpsertOutcome};
pub use record::{
    canonical_item_id, Record, RecordKey, FIELD_AUTHOR, FIELD_TEXT, FIELD_TIMESTAMP,
};
pub use session::{HarvestPhase, ItemOutcome, RunSummary, SessionState};
pub use termination::{StopReason, TerminationPolicy};
