use std::fmt;

use crate::{StopReason, UpsertOutcome};

/// What happened to one item pulled from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Inserted,
    Merged,
    /// Dropped by the caption fingerprint check before reaching the store.
    SkippedDuplicate,
    /// Extraction yielded no usable identity.
    Missed,
}

impl From<UpsertOutcome> for ItemOutcome {
    fn from(outcome: UpsertOutcome) -> Self {
        match outcome {
            UpsertOutcome::Inserted => ItemOutcome::Inserted,
            UpsertOutcome::Merged => ItemOutcome::Merged,
        }
    }
}

/// Loop position of a group harvest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestPhase {
    Init,
    Stabilizing,
    Extracting,
    Merging,
    Pacing,
    Advancing,
    Stopped(StopReason),
}

impl fmt::Display for HarvestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HarvestPhase::Init => f.write_str("INIT"),
            HarvestPhase::Stabilizing => f.write_str("STABILIZING"),
            HarvestPhase::Extracting => f.write_str("EXTRACTING"),
            HarvestPhase::Merging => f.write_str("MERGING"),
            HarvestPhase::Pacing => f.write_str("PACING"),
            HarvestPhase::Advancing => f.write_str("ADVANCING"),
            HarvestPhase::Stopped(reason) => write!(f, "STOPPED({reason})"),
        }
    }
}

/// Per-group counters for one harvest run. Never persisted; `running_total`
/// can always be recovered from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    group_key: String,
    running_total: u64,
    session_count: u64,
    attempted: u64,
    merged: u64,
    skipped: u64,
    misses: u64,
    rows_since_cooldown: u64,
    rounds_since_cooldown: u64,
    idle_rounds: u32,
    rounds: u64,
    new_in_round: u64,
}

impl SessionState {
    pub fn new(group_key: impl Into<String>, seeded_total: u64) -> Self {
        Self {
            group_key: group_key.into(),
            running_total: seeded_total,
            session_count: 0,
            attempted: 0,
            merged: 0,
            skipped: 0,
            misses: 0,
            rows_since_cooldown: 0,
            rounds_since_cooldown: 0,
            idle_rounds: 0,
            rounds: 0,
            new_in_round: 0,
        }
    }

    pub fn group_key(&self) -> &str {
        &self.group_key
    }

    pub fn running_total(&self) -> u64 {
        self.running_total
    }

    pub fn session_count(&self) -> u64 {
        self.session_count
    }

    pub fn attempted(&self) -> u64 {
        self.attempted
    }

    pub fn rows_since_cooldown(&self) -> u64 {
        self.rows_since_cooldown
    }

    pub fn rounds_since_cooldown(&self) -> u64 {
        self.rounds_since_cooldown
    }

    pub fn idle_rounds(&self) -> u32 {
        self.idle_rounds
    }

    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    pub fn new_in_round(&self) -> u64 {
        self.new_in_round
    }

    pub fn record_attempt(&mut self) {
        self.attempted += 1;
    }

    pub fn record_outcome(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Inserted => {
                self.running_total += 1;
                self.session_count += 1;
                self.rows_since_cooldown += 1;
                self.new_in_round += 1;
            }
            ItemOutcome::Merged => self.merged += 1,
            ItemOutcome::SkippedDuplicate => self.skipped += 1,
            ItemOutcome::Missed => self.misses += 1,
        }
    }

    /// Closes the current round and returns how many rows it inserted.
    pub fn finish_round(&mut self) -> u64 {
        let inserted = self.new_in_round;
        self.rounds += 1;
        self.rounds_since_cooldown += 1;
        if inserted == 0 {
            self.idle_rounds += 1;
        } else {
            self.idle_rounds = 0;
        }
        self.new_in_round = 0;
        inserted
    }

    pub fn reset_row_cooldown(&mut self) {
        self.rows_since_cooldown = 0;
    }

    pub fn reset_round_cooldown(&mut self) {
        self.rounds_since_cooldown = 0;
    }

    pub fn summary(&self, stop_reason: StopReason) -> RunSummary {
        RunSummary {
            group_key: self.group_key.clone(),
            attempted_count: self.attempted,
            saved_count: self.session_count,
            merged_count: self.merged,
            skipped_count: self.skipped,
            miss_count: self.misses,
            rounds: self.rounds,
            running_total: self.running_total,
            stop_reason,
        }
    }
}

/// Outcome of one group's harvest, handed to reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub group_key: String,
    pub attempted_count: u64,
    /// Rows newly inserted during this run.
    pub saved_count: u64,
    pub merged_count: u64,
    pub skipped_count: u64,
    pub miss_count: u64,
    pub rounds: u64,
    pub running_total: u64,
    pub stop_reason: StopReason,
}
