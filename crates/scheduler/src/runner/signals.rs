use std::sync::{Arc, RwLock};

use chrono::Utc;
use fairsched_core::Task;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::error::SchedulerError;
use crate::metrics::SchedulingMetrics;

use super::SchedulerLoop;

/// Messages applied by the loop between cycle steps.
#[derive(Debug)]
pub(crate) enum Signal {
    SubmitTasks(Vec<Task>),
    ReportUsage { tenant: String, cost: f64 },
    QueueLength(oneshot::Sender<usize>),
}

/// What woke the loop at a suspension point.
pub(super) enum Wake {
    Signal(Option<Signal>),
    /// The cancel flag changed; `true` when the sending side is gone.
    Cancel(bool),
}

// ── Handle ──────────────────────────────────────────────────────────

/// Cloneable entry point to a running [`SchedulerLoop`].
///
/// Dropping every handle cancels the loop.
#[derive(Clone)]
pub struct SchedulerHandle {
    client: String,
    signals: mpsc::UnboundedSender<Signal>,
    cancel: Arc<watch::Sender<bool>>,
    metrics: Arc<RwLock<SchedulingMetrics>>,
}

impl SchedulerHandle {
    pub(super) fn new(
        client: &str,
        signals: mpsc::UnboundedSender<Signal>,
        cancel: watch::Sender<bool>,
        metrics: Arc<RwLock<SchedulingMetrics>>,
    ) -> Self {
        Self {
            client: client.to_string(),
            signals,
            cancel: Arc::new(cancel),
            metrics,
        }
    }

    pub fn client(&self) -> &str {
        &self.client
    }

    /// Append tasks to the ready queue, in order.
    pub fn submit_tasks(&self, tasks: Vec<Task>) -> Result<(), SchedulerError> {
        self.send(Signal::SubmitTasks(tasks))
    }

    /// Fold `cost` into the tenant's usage if the client's strategy tracks usage.
    pub fn report_usage(&self, tenant: impl Into<String>, cost: f64) -> Result<(), SchedulerError> {
        self.send(Signal::ReportUsage {
            tenant: tenant.into(),
            cost,
        })
    }

    /// Current ready-queue size, answered by the loop between steps.
    pub async fn queue_length(&self) -> Result<usize, SchedulerError> {
        let (tx, rx) = oneshot::channel();
        self.send(Signal::QueueLength(tx))?;
        rx.await
            .map_err(|_| SchedulerError::LoopClosed(self.client.clone()))
    }

    /// Request cancellation. The loop drains in-flight dispatches and stops.
    pub fn cancel(&self) {
        info!(client = %self.client, "scheduler loop cancellation requested");
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Snapshot of the loop's metrics.
    pub fn metrics(&self) -> SchedulingMetrics {
        self.metrics
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn send(&self, signal: Signal) -> Result<(), SchedulerError> {
        self.signals
            .send(signal)
            .map_err(|_| SchedulerError::LoopClosed(self.client.clone()))
    }
}

// ── Signal application ──────────────────────────────────────────────

impl SchedulerLoop {
    pub(super) fn apply_signal(&mut self, signal: Signal) {
        match signal {
            Signal::SubmitTasks(tasks) => {
                debug!(client = %self.client, count = tasks.len(), "tasks submitted");
                self.queue.extend(tasks);
                self.sync_queue_size();
            }
            Signal::ReportUsage { tenant, cost } => self.apply_usage(&tenant, cost),
            Signal::QueueLength(reply) => {
                // The caller may have given up waiting.
                let _ = reply.send(self.queue.len());
            }
        }
    }

    fn apply_usage(&mut self, tenant: &str, cost: f64) {
        if !cost.is_finite() || cost < 0.0 {
            warn!(client = %self.client, tenant = %tenant, cost, "ignoring invalid usage report");
            return;
        }
        match self.strategy.as_usage_aware() {
            Some(usage) => {
                info!(client = %self.client, tenant = %tenant, cost, "recording usage");
                usage.record_usage(tenant, cost, Utc::now());
                if let Ok(mut m) = self.metrics.write() {
                    m.record_usage(tenant, cost);
                }
            }
            None => {
                debug!(client = %self.client, tenant = %tenant, "strategy does not track usage");
            }
        }
    }

    /// Apply every signal already waiting, without suspending.
    pub(super) fn apply_pending_signals(&mut self) {
        loop {
            match self.signals.try_recv() {
                Ok(signal) => self.apply_signal(signal),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.closed {
                        debug!(client = %self.client, "all handles dropped");
                    }
                    self.closed = true;
                    break;
                }
            }
        }
    }

    /// Handle a wake-up from a suspension point. Returns `false` once the
    /// loop should stop and drain.
    pub(super) fn handle_wake(&mut self, wake: Wake) -> bool {
        match wake {
            Wake::Signal(Some(signal)) => {
                self.apply_signal(signal);
                true
            }
            Wake::Signal(None) | Wake::Cancel(true) => {
                debug!(client = %self.client, "all handles dropped");
                self.closed = true;
                false
            }
            Wake::Cancel(false) => !self.is_cancelled(),
        }
    }
}
