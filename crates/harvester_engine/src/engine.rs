use std::sync::{mpsc, Arc};
use std::thread;

use harvester_core::RunSummary;
use tokio_util::sync::CancellationToken;

use crate::progress::ChannelProgressSink;
use crate::store::RecordStore;
use crate::{Authenticator, Extractor, HarvestError, HarvestEvent, Harvester, Source};

type RunResult = Result<Vec<RunSummary>, HarvestError>;

/// Runs a `Harvester` on a dedicated thread that owns its tokio runtime.
///
/// Events arrive through `try_recv`; `cancel` asks the loop to stop at its
/// next state boundary.
pub struct EngineHandle {
    event_rx: mpsc::Receiver<HarvestEvent>,
    cancel: CancellationToken,
    worker: Option<thread::JoinHandle<RunResult>>,
}

impl EngineHandle {
    pub fn spawn<A, S, X, St>(harvester: Harvester<A, S, X, St>) -> Self
    where
        A: Authenticator + 'static,
        S: Source + 'static,
        X: Extractor<S::Cursor> + 'static,
        St: RecordStore + 'static,
    {
        let (event_tx, event_rx) = mpsc::channel();
        let mut harvester = harvester.with_sink(Arc::new(ChannelProgressSink::new(event_tx)));
        let cancel = harvester.cancellation_token();

        let worker = thread::spawn(move || -> RunResult {
            let runtime = tokio::runtime::Runtime::new()
                .map_err(|err| HarvestError::Runtime(err.to_string()))?;
            runtime.block_on(harvester.run())
        });

        Self {
            event_rx,
            cancel,
            worker: Some(worker),
        }
    }

    pub fn try_recv(&self) -> Option<HarvestEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.worker
            .as_ref()
            .map_or(true, |worker| worker.is_finished())
    }

    /// Waits for the run to end and returns every group's summary.
    pub fn join(mut self) -> RunResult {
        match self.worker.take() {
            Some(worker) => worker.join().map_err(|_| HarvestError::Panicked)?,
            None => Ok(Vec::new()),
        }
    }
}
