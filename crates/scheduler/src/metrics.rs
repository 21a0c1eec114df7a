use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::LoopState;

/// Per-client scheduling metrics, snapshot-able for dashboards and logs.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulingMetrics {
    pub client: String,
    /// Current ready-queue size.
    pub queue_size: usize,
    /// Total tasks handed to the dispatcher.
    pub tasks_dispatched: u64,
    pub dispatched_by_type: HashMap<String, u64>,
    /// Tasks dispatched per tenant; tasks without a tenant are not counted here.
    pub dispatched_by_tenant: HashMap<String, u64>,
    /// Cumulative reported cost per tenant.
    pub resource_usage_by_tenant: HashMap<String, f64>,
    /// Mean time between selecting a task and dispatching it.
    pub avg_wait_time: Duration,
    pub throttle_count: u64,
    pub throttle_total: Duration,
    pub state: LoopState,
    pub last_dispatch: Option<DateTime<Utc>>,
}

impl SchedulingMetrics {
    pub fn new(client: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            queue_size: 0,
            tasks_dispatched: 0,
            dispatched_by_type: HashMap::new(),
            dispatched_by_tenant: HashMap::new(),
            resource_usage_by_tenant: HashMap::new(),
            avg_wait_time: Duration::ZERO,
            throttle_count: 0,
            throttle_total: Duration::ZERO,
            state: LoopState::AwaitingTasks,
            last_dispatch: None,
        }
    }

    /// Record one dispatch and fold its wait into the running mean.
    pub fn record_dispatch(
        &mut self,
        workflow_type: &str,
        tenant: Option<&str>,
        wait: Duration,
        at: DateTime<Utc>,
    ) {
        self.tasks_dispatched += 1;
        *self
            .dispatched_by_type
            .entry(workflow_type.to_string())
            .or_default() += 1;
        if let Some(tenant) = tenant {
            *self.dispatched_by_tenant.entry(tenant.to_string()).or_default() += 1;
        }
        self.last_dispatch = Some(at);

        // Incremental mean: new_avg = prev_avg + (wait - prev_avg) / count
        let count = self.tasks_dispatched;
        self.avg_wait_time = if count == 1 {
            wait
        } else {
            let prev = self.avg_wait_time.as_nanos() as f64;
            let cur = wait.as_nanos() as f64;
            Duration::from_nanos((prev + (cur - prev) / count as f64) as u64)
        };
    }

    pub fn record_usage(&mut self, tenant: &str, cost: f64) {
        *self
            .resource_usage_by_tenant
            .entry(tenant.to_string())
            .or_default() += cost;
    }

    pub fn record_throttle(&mut self, delay: Duration) {
        self.throttle_count += 1;
        self.throttle_total += delay;
    }
}
