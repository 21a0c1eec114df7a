use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::SchedulerError;
use crate::runner::SchedulerHandle;

/// "A dispatched unit of work finished", as reported by the execution side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionNotice {
    /// Tenant memo carried by the unit; `None` when it was started without one.
    pub tenant: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CompletionNotice {
    /// Wall-clock seconds the unit ran; never negative.
    pub fn elapsed_seconds(&self) -> f64 {
        let millis = (self.finished_at - self.started_at).num_milliseconds();
        millis.max(0) as f64 / 1000.0
    }
}

/// Turns completion notices into `report_usage` signals on one loop.
#[derive(Clone)]
pub struct UsageReporter {
    handle: SchedulerHandle,
}

impl UsageReporter {
    pub fn new(handle: SchedulerHandle) -> Self {
        Self { handle }
    }

    /// Report one notice. Returns `Ok(false)` when the notice carries no tenant.
    pub fn report(&self, notice: &CompletionNotice) -> Result<bool, SchedulerError> {
        let Some(tenant) = notice.tenant.as_deref() else {
            debug!(client = %self.handle.client(), "completion without tenant, not reported");
            return Ok(false);
        };
        self.handle.report_usage(tenant, notice.elapsed_seconds())?;
        Ok(true)
    }

    /// Forward notices from `rx` until the channel closes or the loop stops.
    pub fn spawn_forwarder(self, mut rx: mpsc::UnboundedReceiver<CompletionNotice>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut reported = 0u64;
            while let Some(notice) = rx.recv().await {
                match self.report(&notice) {
                    Ok(true) => reported += 1,
                    Ok(false) => {}
                    Err(e) => {
                        debug!(error = %e, "usage forwarding stopped");
                        break;
                    }
                }
            }
            info!(client = %self.handle.client(), reported, "usage forwarder finished");
        })
    }
}
