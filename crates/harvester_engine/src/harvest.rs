use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use engine_logging::{engine_debug, engine_error, engine_info, engine_warn, enter_group};
use harvester_core::{
    CaptionFingerprints, FingerprintVerdict, HarvestPhase, ItemOutcome, Record, RunSummary,
    SessionState, StopReason, TerminationPolicy, UpsertOutcome,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::store::{RecordStore, StoreError};
use crate::{
    CooldownKind, DateWindow, Extractor, FailureKind, HarvestConfig, HarvestEvent,
    LogProgressSink, Pacer, ProgressSink, RetrySettings, Source,
};

/// Mutable state of one group's harvest, owned by the loop for its duration.
pub struct HarvestSession<C> {
    state: SessionState,
    started: Instant,
    phase: HarvestPhase,
    fingerprints: Option<CaptionFingerprints>,
    round: VecDeque<C>,
    pending: Option<Record>,
    writes_since_flush: usize,
}

impl<C> HarvestSession<C> {
    fn new(group_key: &str, fingerprints: Option<CaptionFingerprints>) -> Self {
        Self {
            state: SessionState::new(group_key, 0),
            started: Instant::now(),
            phase: HarvestPhase::Init,
            fingerprints,
            round: VecDeque::new(),
            pending: None,
            writes_since_flush: 0,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Per-group state machine:
/// `INIT -> STABILIZING -> EXTRACTING -> MERGING -> PACING -> ADVANCING -> .. -> STOPPED`.
///
/// Item-level failures are absorbed as misses; advance and store failures end
/// the group; nothing here ends the run.
pub struct HarvestLoop<S, X, St>
where
    S: Source,
    X: Extractor<S::Cursor>,
    St: RecordStore,
{
    source: S,
    extractor: X,
    store: St,
    policy: TerminationPolicy,
    pacer: Pacer,
    window: Option<DateWindow>,
    commit_batch: usize,
    advance_retry: RetrySettings,
    store_retry: RetrySettings,
    ready_attempts: u32,
    fingerprint_prefix: Option<usize>,
    sink: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
}

impl<S, X, St> HarvestLoop<S, X, St>
where
    S: Source,
    X: Extractor<S::Cursor>,
    St: RecordStore,
{
    pub fn new(source: S, extractor: X, store: St, config: &HarvestConfig) -> Self {
        Self {
            source,
            extractor,
            store,
            policy: config.termination_policy(),
            pacer: Pacer::new(config.pacing.clone()),
            window: config.date_window(Local::now().date_naive()),
            commit_batch: config.commit_batch.max(1),
            advance_retry: config.advance_retry,
            store_retry: config.store_retry,
            ready_attempts: config.ready_attempts.max(1),
            fingerprint_prefix: config
                .fingerprint
                .enabled
                .then_some(config.fingerprint.prefix_chars),
            sink: Arc::new(LogProgressSink),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn set_sink(&mut self, sink: Arc<dyn ProgressSink>) {
        self.sink = sink;
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn store(&self) -> &St {
        &self.store
    }

    /// Harvests one group until a stop condition fires. Always yields a
    /// summary; pending writes are flushed before returning.
    pub async fn run_group(&mut self, group_key: &str) -> RunSummary {
        let _scope = enter_group(group_key);
        let fingerprints = self.fingerprint_prefix.map(CaptionFingerprints::new);
        let mut session = HarvestSession::new(group_key, fingerprints);

        let reason = loop {
            let next = match session.phase {
                HarvestPhase::Init => self.init(&mut session, group_key).await,
                HarvestPhase::Stabilizing => self.stabilize(&mut session).await,
                HarvestPhase::Extracting => self.extract_next(&mut session),
                HarvestPhase::Merging => self.merge_pending(&mut session).await,
                HarvestPhase::Pacing => self.pace(&mut session).await,
                HarvestPhase::Advancing => self.advance(&mut session).await,
                HarvestPhase::Stopped(reason) => break reason,
            };
            engine_debug!("{} -> {}", session.phase, next);
            session.phase = next;
        };

        self.finish(&mut session, reason)
    }

    async fn init(
        &mut self,
        session: &mut HarvestSession<S::Cursor>,
        group_key: &str,
    ) -> HarvestPhase {
        let seeded = match self.store.count(group_key) {
            Ok(count) => count,
            Err(err) => {
                engine_error!(
                    "{}: could not read stored total: {}",
                    FailureKind::StoreWriteFailure,
                    err
                );
                return HarvestPhase::Stopped(StopReason::StoreFailure);
            }
        };
        session.state = SessionState::new(group_key, seeded);
        session.started = Instant::now();
        self.sink.emit(HarvestEvent::GroupStarted {
            group_key: group_key.to_string(),
            seeded_total: seeded,
        });
        engine_info!("Starting with {} stored rows", seeded);

        if let Some(reason) = self.policy.before_start(&session.state) {
            engine_info!("Quota already met before start ({})", reason);
            return HarvestPhase::Stopped(reason);
        }

        if let Err(err) = self.source.open(group_key, self.window).await {
            engine_warn!("{}: {}", FailureKind::AdvanceFailure, err);
            return HarvestPhase::Stopped(StopReason::Exhausted);
        }
        HarvestPhase::Stabilizing
    }

    async fn stabilize(&mut self, session: &mut HarvestSession<S::Cursor>) -> HarvestPhase {
        self.pacer.settle().await;
        if !self.wait_ready().await {
            engine_warn!("Source never became ready");
            return HarvestPhase::Stopped(StopReason::Exhausted);
        }
        self.load_round(session).await;
        HarvestPhase::Extracting
    }

    fn extract_next(&mut self, session: &mut HarvestSession<S::Cursor>) -> HarvestPhase {
        if self.cancel.is_cancelled() {
            return HarvestPhase::Stopped(StopReason::Cancelled);
        }
        let Some(cursor) = session.round.pop_front() else {
            return HarvestPhase::Advancing;
        };

        session.state.record_attempt();
        let group_key = session.state.group_key().to_string();
        let record = match self.extractor.extract(&cursor, &group_key) {
            Ok(record) => record,
            Err(err) => {
                engine_warn!("{}: {}", FailureKind::ExtractionMiss, err);
                self.sink.emit(HarvestEvent::ExtractionMissed {
                    group_key: group_key.clone(),
                    kind: FailureKind::ExtractionMiss,
                    message: err.to_string(),
                });
                Record::new("", group_key)
            }
        };
        session.pending = Some(record);
        HarvestPhase::Merging
    }

    async fn merge_pending(&mut self, session: &mut HarvestSession<S::Cursor>) -> HarvestPhase {
        let Some(record) = session.pending.take() else {
            return HarvestPhase::Pacing;
        };

        let outcome = if !record.is_identified() {
            engine_debug!("Item without identity counted as a miss");
            ItemOutcome::Missed
        } else if session
            .fingerprints
            .as_mut()
            .is_some_and(|fp| fp.observe(&record) == FingerprintVerdict::Repeat)
        {
            engine_debug!("Skipping repeated caption from {:?}", record.author());
            ItemOutcome::SkippedDuplicate
        } else {
            match self.upsert_with_retry(&record).await {
                Ok(outcome) => {
                    session.writes_since_flush += 1;
                    ItemOutcome::from(outcome)
                }
                Err(err) => {
                    engine_error!("{}: {}", FailureKind::StoreWriteFailure, err);
                    return HarvestPhase::Stopped(StopReason::StoreFailure);
                }
            }
        };

        session.state.record_outcome(outcome);
        self.sink.emit(HarvestEvent::ItemProcessed {
            group_key: session.state.group_key().to_string(),
            outcome,
            running_total: session.state.running_total(),
            session_count: session.state.session_count(),
        });

        if session.writes_since_flush >= self.commit_batch {
            if let Err(reason) = self.flush(session) {
                return HarvestPhase::Stopped(reason);
            }
        }

        match self.policy.after_item(&session.state, session.elapsed()) {
            Some(reason) => HarvestPhase::Stopped(reason),
            None => HarvestPhase::Pacing,
        }
    }

    async fn pace(&mut self, session: &mut HarvestSession<S::Cursor>) -> HarvestPhase {
        self.pacer.micro_pause().await;
        if self.pacer.row_cooldown_due(&session.state) {
            if let Err(reason) = self.flush(session) {
                return HarvestPhase::Stopped(reason);
            }
            if let Some(duration) = self.pacer.maybe_row_cooldown(&mut session.state).await {
                self.sink.emit(HarvestEvent::Cooldown {
                    group_key: session.state.group_key().to_string(),
                    kind: CooldownKind::Rows,
                    duration,
                });
            }
        }
        HarvestPhase::Extracting
    }

    async fn advance(&mut self, session: &mut HarvestSession<S::Cursor>) -> HarvestPhase {
        if self.cancel.is_cancelled() {
            return HarvestPhase::Stopped(StopReason::Cancelled);
        }

        let new_rows = session.state.finish_round();
        self.sink.emit(HarvestEvent::RoundFinished {
            group_key: session.state.group_key().to_string(),
            round: session.state.rounds(),
            new_rows,
        });
        if new_rows == 0 {
            engine_info!(
                "No new rows this round (idle {} of {})",
                session.state.idle_rounds(),
                self.policy.max_idle_rounds
            );
        }
        if let Some(reason) = self.policy.after_round(&session.state, session.elapsed()) {
            return HarvestPhase::Stopped(reason);
        }

        let advanced = self.advance_with_retry().await;
        if let Some(reason) = self.policy.after_advance(advanced) {
            engine_info!("{}: cursor did not move", FailureKind::AdvanceFailure);
            return HarvestPhase::Stopped(reason);
        }

        self.pacer.between_rounds().await;
        if self.pacer.round_cooldown_due(&session.state) {
            if let Err(reason) = self.flush(session) {
                return HarvestPhase::Stopped(reason);
            }
            if let Some(duration) = self.pacer.maybe_round_cooldown(&mut session.state).await {
                self.sink.emit(HarvestEvent::Cooldown {
                    group_key: session.state.group_key().to_string(),
                    kind: CooldownKind::Rounds,
                    duration,
                });
            }
        }

        if !self.wait_ready().await {
            engine_debug!("Source not ready after advance; reading whatever is there");
        }
        self.load_round(session).await;
        HarvestPhase::Extracting
    }

    fn finish(
        &mut self,
        session: &mut HarvestSession<S::Cursor>,
        reason: StopReason,
    ) -> RunSummary {
        if let Err(err) = self.store.flush() {
            engine_error!("Final flush failed: {}", err);
        }
        session.writes_since_flush = 0;
        session.phase = HarvestPhase::Stopped(reason);

        let summary = session.state.summary(reason);
        engine_info!(
            "Stopped with {} after {} attempts ({} saved, {} merged, {:.1}s)",
            reason,
            summary.attempted_count,
            summary.saved_count,
            summary.merged_count,
            session.elapsed().as_secs_f64()
        );
        self.sink.emit(HarvestEvent::GroupFinished(summary.clone()));
        summary
    }

    async fn load_round(&mut self, session: &mut HarvestSession<S::Cursor>) {
        match self.source.current_items().await {
            Ok(items) => {
                engine_debug!("Round holds {} items", items.len());
                session.round = items.into();
            }
            Err(err) => {
                engine_warn!("{}: {}", FailureKind::ExtractionMiss, err);
                self.sink.emit(HarvestEvent::ExtractionMissed {
                    group_key: session.state.group_key().to_string(),
                    kind: FailureKind::ExtractionMiss,
                    message: err.to_string(),
                });
                session.round.clear();
            }
        }
    }

    async fn wait_ready(&mut self) -> bool {
        for attempt in 1..=self.ready_attempts {
            if self.source.ready().await {
                return true;
            }
            engine_debug!("Source not ready ({}/{})", attempt, self.ready_attempts);
        }
        false
    }

    async fn advance_with_retry(&mut self) -> bool {
        let attempts = self.advance_retry.attempts.max(1);
        for attempt in 1..=attempts {
            if self.source.advance().await {
                return true;
            }
            if attempt < attempts {
                let backoff = self.advance_retry.backoff(attempt);
                engine_debug!("Advance failed, retrying in {}ms", backoff.as_millis());
                tokio::time::sleep(backoff).await;
            }
        }
        false
    }

    async fn upsert_with_retry(&self, record: &Record) -> Result<UpsertOutcome, StoreError> {
        let attempts = self.store_retry.attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.store.upsert(record) {
                Ok(outcome) => return Ok(outcome),
                Err(err) if attempt < attempts => {
                    let backoff = self.store_retry.backoff(attempt);
                    engine_warn!(
                        "Upsert of {} failed ({}), retry {}/{} in {}ms",
                        record.source_item_id,
                        err,
                        attempt,
                        attempts - 1,
                        backoff.as_millis()
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn flush(&self, session: &mut HarvestSession<S::Cursor>) -> Result<(), StopReason> {
        if session.writes_since_flush == 0 {
            return Ok(());
        }
        match self.store.flush() {
            Ok(()) => {
                engine_debug!("Flushed {} writes", session.writes_since_flush);
                session.writes_since_flush = 0;
                Ok(())
            }
            Err(err) => {
                engine_error!("{}: flush failed: {}", FailureKind::StoreWriteFailure, err);
                Err(StopReason::StoreFailure)
            }
        }
    }
}
