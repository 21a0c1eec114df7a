use futures::future::join_all;
use tokio::task::JoinError;
use tracing::{error, info};

use crate::error::{DispatchError, SchedulerError};
use crate::state::LoopState;

use super::{LoopReport, SchedulerLoop};

impl SchedulerLoop {
    /// Stop selecting, await every in-flight dispatch, then shut the strategy down.
    ///
    /// Dispatch failures are logged and counted; they never prevent shutdown.
    pub(super) async fn drain(mut self) -> LoopReport {
        self.set_state(LoopState::Draining);

        // Answer whatever was already sent; nothing new gets in.
        self.signals.close();
        self.apply_pending_signals();

        let in_flight = std::mem::take(&mut self.in_flight);
        info!(client = %self.client, in_flight = in_flight.len(), "draining in-flight dispatches");

        for result in join_all(in_flight).await {
            self.settle(result);
        }

        self.strategy.on_shutdown();
        self.set_state(LoopState::Terminated);

        let report = LoopReport {
            client: self.client.clone(),
            dispatched: self.dispatched,
            awaited: self.settled,
            failed: self.failed,
            remaining: self.queue.len(),
        };
        info!(
            client = %report.client,
            dispatched = report.dispatched,
            failed = report.failed,
            remaining = report.remaining,
            "scheduler loop terminated"
        );
        report
    }

    /// Count one dispatch outcome. Failures are logged, never propagated.
    pub(super) fn settle(&mut self, result: Result<Result<(), DispatchError>, JoinError>) {
        self.settled += 1;
        let failure = match result {
            Ok(Ok(())) => return,
            Ok(Err(e)) => SchedulerError::from(e),
            Err(e) => SchedulerError::from(e),
        };
        self.failed += 1;
        error!(client = %self.client, error = %failure, "dispatch failed");
    }
}
