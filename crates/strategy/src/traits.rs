use std::cmp::Ordering;
use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use fairsched_core::Task;

use crate::error::StrategyError;

/// A client's pending tasks, in submission order.
pub type ReadyQueue = VecDeque<Task>;

/// A pairwise ranking criterion with optional lifecycle hooks.
///
/// Implementations are shared (`Arc<dyn Strategy>`) between every loop the
/// registry feeds, so all hooks take `&self` and any state lives behind
/// interior locks.
pub trait Strategy: Send + Sync {
    /// Registered name, used in logs.
    fn name(&self) -> &str;

    /// Whether this criterion has enough information to order the pair.
    fn can_compare(&self, a: &Task, b: &Task) -> bool;

    /// `Less` prefers `a`, `Greater` prefers `b`, `Equal` is a tie.
    ///
    /// Only meaningful when [`can_compare`](Self::can_compare) is true.
    fn compare(&self, a: &Task, b: &Task) -> Result<Ordering, StrategyError>;

    /// Mutate the ready queue once per cycle before selection.
    fn preprocess(&self, _queue: &mut ReadyQueue, _now: DateTime<Utc>) {}

    /// Called after a task was handed to the dispatcher.
    fn on_dispatch(&self, _task: &Task, _at: DateTime<Utc>) {}

    /// Called once when the owning loop shuts down.
    fn on_shutdown(&self) {}

    /// Usage-accounting capability, if this strategy has one.
    fn as_usage_aware(&self) -> Option<&dyn UsageAware> {
        None
    }
}

/// Strategies that fold reported tenant usage into their ordering.
pub trait UsageAware: Strategy {
    fn record_usage(&self, tenant: &str, cost: f64, at: DateTime<Utc>);
}
