use std::sync::{Arc, RwLock};

use fairsched_core::SchedulingConfig;
use fairsched_strategy::{ReadyQueue, Strategy, StrategyRegistry};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::backpressure::BackpressureController;
use crate::dispatch::Dispatcher;
use crate::error::{DispatchError, SchedulerError};
use crate::metrics::SchedulingMetrics;
use crate::state::LoopState;

use super::signals::{SchedulerHandle, Signal};

/// The scheduling loop for one client.
///
/// Owns the ready queue, the backpressure window and the in-flight
/// dispatches exclusively; everything else reaches it through a
/// [`SchedulerHandle`].
pub struct SchedulerLoop {
    pub(super) client: String,
    pub(super) task_queue: String,
    /// Strategy chain built from the client's `+`-joined strategy list.
    pub(super) strategy: Arc<dyn Strategy>,
    pub(super) dispatcher: Arc<dyn Dispatcher>,
    pub(super) queue: ReadyQueue,
    pub(super) backpressure: BackpressureController,
    /// Dispatch calls whose outcome has not been collected yet. Finished
    /// ones are reaped every cycle; the rest are awaited on drain.
    pub(super) in_flight: Vec<JoinHandle<Result<(), DispatchError>>>,
    /// Dispatch outcomes collected so far.
    pub(super) settled: usize,
    /// Collected outcomes that were failures.
    pub(super) failed: usize,
    pub(super) signals: mpsc::UnboundedReceiver<Signal>,
    pub(super) cancel: watch::Receiver<bool>,
    pub(super) metrics: Arc<RwLock<SchedulingMetrics>>,
    pub(super) state: LoopState,
    pub(super) dispatched: u64,
    /// Every handle has been dropped.
    pub(super) closed: bool,
}

/// Outcome of a finished loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoopReport {
    pub client: String,
    /// Tasks handed to the dispatcher over the loop's lifetime.
    pub dispatched: u64,
    /// Dispatch calls whose outcome was collected, either while running or
    /// during drain.
    pub awaited: usize,
    /// Dispatch calls that failed or did not complete.
    pub failed: usize,
    /// Tasks still queued when the loop stopped.
    pub remaining: usize,
}

impl SchedulerLoop {
    /// Build the loop for `client`.
    ///
    /// Fails fast on an invalid config, an unknown client or an
    /// unresolvable strategy list; the loop never starts in that case.
    pub fn new(
        client: &str,
        config: &SchedulingConfig,
        registry: &StrategyRegistry,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<(Self, SchedulerHandle), SchedulerError> {
        config.validate()?;
        let client_config = config.client(client)?;
        let strategy = registry.build_chain(&client_config.strategy)?;

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let metrics = Arc::new(RwLock::new(SchedulingMetrics::new(client)));

        info!(
            client = %client,
            task_queue = %client_config.task_queue,
            strategy = %strategy.name(),
            "scheduler loop created"
        );

        let handle = SchedulerHandle::new(client, signal_tx, cancel_tx, Arc::clone(&metrics));
        let scheduler = Self {
            client: client.to_string(),
            task_queue: client_config.task_queue.clone(),
            strategy,
            dispatcher,
            queue: ReadyQueue::new(),
            backpressure: BackpressureController::new(&config.backpressure),
            in_flight: Vec::new(),
            settled: 0,
            failed: 0,
            signals: signal_rx,
            cancel: cancel_rx,
            metrics,
            state: LoopState::AwaitingTasks,
            dispatched: 0,
            closed: false,
        };
        Ok((scheduler, handle))
    }

    pub fn client(&self) -> &str {
        &self.client
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub(super) fn set_state(&mut self, state: LoopState) {
        if self.state != state {
            debug!(client = %self.client, from = %self.state, to = %state, "state transition");
            self.state = state;
        }
        if let Ok(mut m) = self.metrics.write() {
            m.state = state;
            m.queue_size = self.queue.len();
        }
    }

    pub(super) fn sync_queue_size(&self) {
        if let Ok(mut m) = self.metrics.write() {
            m.queue_size = self.queue.len();
        }
    }

    /// Cancelled explicitly, or nobody can reach the loop any more.
    pub(super) fn is_cancelled(&self) -> bool {
        self.closed || *self.cancel.borrow()
    }
}
