use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fairsched_core::Task;

use crate::error::StrategyError;
use crate::traits::{ReadyQueue, Strategy, UsageAware};

/// Ordered chain of strategies combined by first-non-tie-wins.
///
/// Members that cannot compare a pair are skipped, ties fall through to the
/// next member, and if nothing decides the pair the chain reports a tie.
/// Lifecycle hooks fan out to every member; usage reports reach only the
/// members with the usage capability.
pub struct CompositeStrategy {
    name: String,
    chain: Vec<Arc<dyn Strategy>>,
}

impl CompositeStrategy {
    pub fn new(name: impl Into<String>, chain: Vec<Arc<dyn Strategy>>) -> Self {
        Self {
            name: name.into(),
            chain,
        }
    }

    pub fn members(&self) -> &[Arc<dyn Strategy>] {
        &self.chain
    }
}

impl std::fmt::Debug for CompositeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.chain.iter().map(|s| s.name()).collect();
        f.debug_struct("CompositeStrategy")
            .field("name", &self.name)
            .field("chain", &names)
            .finish()
    }
}

impl Strategy for CompositeStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_compare(&self, _a: &Task, _b: &Task) -> bool {
        true
    }

    fn compare(&self, a: &Task, b: &Task) -> Result<Ordering, StrategyError> {
        for member in &self.chain {
            if !member.can_compare(a, b) {
                continue;
            }
            match member.compare(a, b)? {
                Ordering::Equal => continue,
                decided => return Ok(decided),
            }
        }
        Ok(Ordering::Equal)
    }

    fn preprocess(&self, queue: &mut ReadyQueue, now: DateTime<Utc>) {
        for member in &self.chain {
            member.preprocess(queue, now);
        }
    }

    fn on_dispatch(&self, task: &Task, at: DateTime<Utc>) {
        for member in &self.chain {
            member.on_dispatch(task, at);
        }
    }

    fn on_shutdown(&self) {
        for member in &self.chain {
            member.on_shutdown();
        }
    }

    fn as_usage_aware(&self) -> Option<&dyn UsageAware> {
        Some(self)
    }
}

impl UsageAware for CompositeStrategy {
    fn record_usage(&self, tenant: &str, cost: f64, at: DateTime<Utc>) {
        for usage in self.chain.iter().filter_map(|m| m.as_usage_aware()) {
            usage.record_usage(tenant, cost, at);
        }
    }
}
