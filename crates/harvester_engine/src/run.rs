use std::sync::Arc;
use std::time::Duration;

use engine_logging::{engine_error, engine_info, engine_warn};
use harvester_core::RunSummary;
use tokio_util::sync::CancellationToken;

use crate::store::RecordStore;
use crate::{
    Authenticator, Extractor, FailureKind, HarvestConfig, HarvestError, HarvestLoop,
    ProgressSink, Source,
};

/// Whole run: one login, then every configured group in order against the
/// same source session.
pub struct Harvester<A, S, X, St>
where
    A: Authenticator,
    S: Source,
    X: Extractor<S::Cursor>,
    St: RecordStore,
{
    auth: A,
    harvest: HarvestLoop<S, X, St>,
    groups: Vec<String>,
    between_groups: Duration,
}

impl<A, S, X, St> Harvester<A, S, X, St>
where
    A: Authenticator,
    S: Source,
    X: Extractor<S::Cursor>,
    St: RecordStore,
{
    pub fn new(
        config: &HarvestConfig,
        auth: A,
        source: S,
        extractor: X,
        store: St,
    ) -> Result<Self, HarvestError> {
        config.validate()?;
        let between_groups = if config.pacing.safe_rate_limits {
            Duration::from_millis(config.between_groups_ms)
        } else {
            Duration::ZERO
        };
        Ok(Self {
            auth,
            harvest: HarvestLoop::new(source, extractor, store, config),
            groups: config.group_keys(),
            between_groups,
        })
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.harvest.set_sink(sink);
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.harvest.cancellation_token()
    }

    pub fn harvest_loop(&self) -> &HarvestLoop<S, X, St> {
        &self.harvest
    }

    /// Logs in, then harvests each group. A failed login aborts before any
    /// group runs; a group that stops early never affects the next one.
    pub async fn run(&mut self) -> Result<Vec<RunSummary>, HarvestError> {
        if let Err(err) = self.auth.login().await {
            engine_error!("{}: {}", FailureKind::AuthFailure, err);
            return Err(err.into());
        }

        let cancel = self.harvest.cancellation_token();
        let mut summaries = Vec::with_capacity(self.groups.len());
        for (idx, group_key) in self.groups.iter().enumerate() {
            if cancel.is_cancelled() {
                engine_info!(
                    "Cancelled; skipping {} remaining groups",
                    self.groups.len() - idx
                );
                break;
            }
            if idx > 0 && !self.between_groups.is_zero() {
                tokio::time::sleep(self.between_groups).await;
            }

            let summary = self.harvest.run_group(group_key).await;
            if let Err(err) = self.harvest.store().record_run(&summary) {
                engine_warn!("Could not record run for #{}: {}", group_key, err);
            }
            summaries.push(summary);
        }

        engine_info!("Run finished: {} groups harvested", summaries.len());
        Ok(summaries)
    }
}
