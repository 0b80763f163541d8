use std::fmt;
use std::time::Duration;

use crate::SessionState;

/// Why a group's harvest stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    Timeout,
    RowLimit,
    SessionCap,
    AttemptCap,
    RoundLimit,
    Idle,
    Exhausted,
    StoreFailure,
    Cancelled,
}

impl StopReason {
    pub fn code(self) -> &'static str {
        match self {
            StopReason::Timeout => "TIMEOUT",
            StopReason::RowLimit => "ROW_LIMIT",
            StopReason::SessionCap => "SESSION_CAP",
            StopReason::AttemptCap => "ATTEMPT_CAP",
            StopReason::RoundLimit => "ROUND_LIMIT",
            StopReason::Idle => "IDLE",
            StopReason::Exhausted => "EXHAUSTED",
            StopReason::StoreFailure => "STORE_FAILURE",
            StopReason::Cancelled => "CANCELLED",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        [
            StopReason::Timeout,
            StopReason::RowLimit,
            StopReason::SessionCap,
            StopReason::AttemptCap,
            StopReason::RoundLimit,
            StopReason::Idle,
            StopReason::Exhausted,
            StopReason::StoreFailure,
            StopReason::Cancelled,
        ]
        .into_iter()
        .find(|reason| reason.code() == code)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Independent stop conditions, evaluated at fixed checkpoints of the loop.
///
/// `None` disables a limit; `max_idle_rounds == 0` disables the idle check.
/// Within one checkpoint the first matching condition wins, in the order the
/// fields are declared.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TerminationPolicy {
    pub timeout: Option<Duration>,
    pub row_limit: Option<u64>,
    pub session_row_cap: Option<u64>,
    pub attempt_cap: Option<u64>,
    pub max_rounds: Option<u64>,
    pub max_idle_rounds: u32,
}

impl TerminationPolicy {
    /// Checkpoint 1: before any work, with `running_total` seeded from the store.
    pub fn before_start(&self, session: &SessionState) -> Option<StopReason> {
        self.quota_reached(session)
    }

    /// Checkpoint 2: after each item has been written.
    pub fn after_item(&self, session: &SessionState, elapsed: Duration) -> Option<StopReason> {
        self.timed_out(elapsed)
            .or_else(|| self.quota_reached(session))
            .or_else(|| {
                self.attempt_cap
                    .filter(|cap| session.attempted() >= *cap)
                    .map(|_| StopReason::AttemptCap)
            })
    }

    /// Checkpoint 3: after a full round, once round bookkeeping is done.
    pub fn after_round(&self, session: &SessionState, elapsed: Duration) -> Option<StopReason> {
        if let Some(reason) = self.timed_out(elapsed) {
            return Some(reason);
        }
        if self.max_idle_rounds > 0 && session.idle_rounds() >= self.max_idle_rounds {
            return Some(StopReason::Idle);
        }
        self.max_rounds
            .filter(|max| session.rounds() >= *max)
            .map(|_| StopReason::RoundLimit)
    }

    /// Checkpoint 4: after the bounded advance attempts.
    pub fn after_advance(&self, advanced: bool) -> Option<StopReason> {
        (!advanced).then_some(StopReason::Exhausted)
    }

    fn timed_out(&self, elapsed: Duration) -> Option<StopReason> {
        self.timeout
            .filter(|limit| elapsed > *limit)
            .map(|_| StopReason::Timeout)
    }

    fn quota_reached(&self, session: &SessionState) -> Option<StopReason> {
        if self
            .row_limit
            .is_some_and(|limit| session.running_total() >= limit)
        {
            return Some(StopReason::RowLimit);
        }
        if self
            .session_row_cap
            .is_some_and(|cap| session.session_count() >= cap)
        {
            return Some(StopReason::SessionCap);
        }
        None
    }
}
