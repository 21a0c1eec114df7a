use std::cmp::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use tracing::{debug, info, warn};

use crate::dispatch::{DispatchRequest, Dispatcher};
use crate::state::LoopState;

use super::signals::Wake;
use super::{LoopReport, SchedulerLoop};

impl SchedulerLoop {
    /// Run until cancelled (or every handle is dropped), then drain.
    pub async fn run(mut self) -> LoopReport {
        info!(
            client = %self.client,
            strategy = %self.strategy.name(),
            task_queue = %self.task_queue,
            "scheduler loop started"
        );

        loop {
            self.apply_pending_signals();
            self.reap_finished();
            if self.is_cancelled() {
                break;
            }

            if self.queue.is_empty() {
                self.set_state(LoopState::AwaitingTasks);
                if !self.await_tasks().await {
                    break;
                }
                continue;
            }

            self.set_state(LoopState::Selecting);
            self.strategy.preprocess(&mut self.queue, Utc::now());
            self.sync_queue_size();

            let Some(index) = self.select_best() else {
                debug!(client = %self.client, "no candidate after preprocessing");
                continue;
            };
            let selected_at = Instant::now();

            let delay = self.backpressure.delay(Utc::now());
            if !delay.is_zero() {
                self.set_state(LoopState::Throttling);
                if !self.throttle(delay).await {
                    break;
                }
            }

            self.set_state(LoopState::Dispatching);
            self.dispatch_at(index, selected_at.elapsed());

            // Let spawned dispatches and other loops make progress.
            tokio::task::yield_now().await;
        }

        self.drain().await
    }

    /// Suspend until the queue is non-empty. Returns `false` on cancellation.
    async fn await_tasks(&mut self) -> bool {
        while self.queue.is_empty() {
            let wake = tokio::select! {
                signal = self.signals.recv() => Wake::Signal(signal),
                changed = self.cancel.changed() => Wake::Cancel(changed.is_err()),
            };
            if !self.handle_wake(wake) {
                return false;
            }
        }
        true
    }

    /// Linear comparator-min over the whole ready queue.
    ///
    /// Comparisons are not transitive across a composite chain, so no heap.
    /// The earliest task wins ties.
    pub(super) fn select_best(&self) -> Option<usize> {
        match self.queue.len() {
            0 => return None,
            1 => return Some(0),
            _ => {}
        }

        let mut best = 0;
        for candidate in 1..self.queue.len() {
            if self.prefers(candidate, best) {
                best = candidate;
            }
        }
        Some(best)
    }

    /// Whether `candidate` beats `best`. Unorderable pairs and comparator
    /// faults count as a tie.
    fn prefers(&self, candidate: usize, best: usize) -> bool {
        let (a, b) = (&self.queue[best], &self.queue[candidate]);
        if !self.strategy.can_compare(a, b) {
            return false;
        }
        match self.strategy.compare(a, b) {
            Ok(ordering) => ordering == Ordering::Greater,
            Err(e) => {
                warn!(
                    client = %self.client,
                    error = %e,
                    "comparison failed, treating pair as tied"
                );
                false
            }
        }
    }

    /// Sleep off backpressure while still serving signals. Returns `false`
    /// if cancelled mid-sleep; the selected task then stays queued.
    async fn throttle(&mut self, delay: Duration) -> bool {
        debug!(client = %self.client, delay_ms = delay.as_millis() as u64, "throttling");
        if let Ok(mut m) = self.metrics.write() {
            m.record_throttle(delay);
        }

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            let wake = tokio::select! {
                _ = &mut sleep => return true,
                signal = self.signals.recv() => Wake::Signal(signal),
                changed = self.cancel.changed() => Wake::Cancel(changed.is_err()),
            };
            if !self.handle_wake(wake) {
                return false;
            }
        }
    }

    /// Collect the outcome of every dispatch call that has already finished.
    pub(super) fn reap_finished(&mut self) {
        if !self.in_flight.iter().any(|handle| handle.is_finished()) {
            return;
        }
        let mut pending = Vec::with_capacity(self.in_flight.len());
        for mut handle in std::mem::take(&mut self.in_flight) {
            if !handle.is_finished() {
                pending.push(handle);
                continue;
            }
            match (&mut handle).now_or_never() {
                Some(result) => self.settle(result),
                None => pending.push(handle),
            }
        }
        self.in_flight = pending;
    }

    /// Remove the task at `index` and hand it to the dispatcher without waiting.
    pub(super) fn dispatch_at(&mut self, index: usize, wait: Duration) {
        let Some(task) = self.queue.remove(index) else {
            return;
        };
        let at = Utc::now();

        if let Ok(mut m) = self.metrics.write() {
            m.record_dispatch(&task.workflow_type, task.tenant().as_deref(), wait, at);
            m.queue_size = self.queue.len();
        }

        info!(
            client = %self.client,
            workflow_type = %task.workflow_type,
            workflow_id = %task.workflow_id,
            task_queue = %self.task_queue,
            "dispatching task"
        );

        let request = DispatchRequest::from_task(task.clone(), self.task_queue.as_str());
        let dispatcher = Arc::clone(&self.dispatcher);
        self.in_flight
            .push(tokio::spawn(async move { dispatcher.dispatch(request).await }));

        self.backpressure.record(at);
        self.strategy.on_dispatch(&task, at);
        self.dispatched += 1;
    }
}
