use std::fmt;
use std::time::Duration;

use harvester_core::{ItemOutcome, RunSummary};

/// Failure classes the loop distinguishes when deciding how far a failure
/// may propagate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A field or a whole item could not be read. Never fatal.
    ExtractionMiss,
    /// The cursor could not move after bounded retries. Ends the group.
    AdvanceFailure,
    /// Login failed. Ends the run.
    AuthFailure,
    /// A store write failed after bounded retries. Ends the group.
    StoreWriteFailure,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::ExtractionMiss => write!(f, "extraction miss"),
            FailureKind::AdvanceFailure => write!(f, "advance failure"),
            FailureKind::AuthFailure => write!(f, "auth failure"),
            FailureKind::StoreWriteFailure => write!(f, "store write failure"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownKind {
    Rows,
    Rounds,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarvestEvent {
    GroupStarted {
        group_key: String,
        seeded_total: u64,
    },
    ItemProcessed {
        group_key: String,
        outcome: ItemOutcome,
        running_total: u64,
        session_count: u64,
    },
    ExtractionMissed {
        group_key: String,
        kind: FailureKind,
        message: String,
    },
    Cooldown {
        group_key: String,
        kind: CooldownKind,
        duration: Duration,
    },
    RoundFinished {
        group_key: String,
        round: u64,
        new_rows: u64,
    },
    GroupFinished(RunSummary),
}
