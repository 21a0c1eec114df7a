use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use fairsched_core::{Task, ATTR_CRITICAL_LEN, ATTR_DEPENDS_ON};

use crate::error::StrategyError;
use crate::traits::Strategy;

/// Dependency-aware critical-path ordering.
///
/// A task is ready once every id in its `dependsOn` list has been
/// dispatched. Ready tasks beat unready ones; among ready tasks the longer
/// `criticalLen` goes first. Two unready tasks tie.
///
/// The dispatched set only grows: ids are recorded on dispatch (not on
/// completion) and never pruned.
#[derive(Debug, Default)]
pub struct CriticalPathStrategy {
    dispatched: RwLock<HashSet<String>>,
}

impl CriticalPathStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether every dependency of `task` has been dispatched.
    pub fn is_ready(&self, task: &Task) -> bool {
        let Some(deps) = task.attr::<Vec<String>>(ATTR_DEPENDS_ON) else {
            return true;
        };
        let dispatched = self.dispatched.read().unwrap_or_else(|e| e.into_inner());
        deps.iter().all(|dep| dispatched.contains(dep))
    }

    /// Whether `workflow_id` has been handed to the dispatcher.
    pub fn was_dispatched(&self, workflow_id: &str) -> bool {
        self.dispatched
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(workflow_id)
    }

    /// Number of recorded dispatches.
    pub fn dispatched_count(&self) -> usize {
        self.dispatched.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Strategy for CriticalPathStrategy {
    fn name(&self) -> &str {
        "critical"
    }

    fn can_compare(&self, _a: &Task, _b: &Task) -> bool {
        true
    }

    fn compare(&self, a: &Task, b: &Task) -> Result<Ordering, StrategyError> {
        match (self.is_ready(a), self.is_ready(b)) {
            (true, false) => Ok(Ordering::Less),
            (false, true) => Ok(Ordering::Greater),
            (false, false) => Ok(Ordering::Equal),
            (true, true) => {
                let ca = a.attr::<i64>(ATTR_CRITICAL_LEN).unwrap_or(0);
                let cb = b.attr::<i64>(ATTR_CRITICAL_LEN).unwrap_or(0);
                Ok(cb.cmp(&ca))
            }
        }
    }

    fn on_dispatch(&self, task: &Task, _at: DateTime<Utc>) {
        self.dispatched
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(task.workflow_id.clone());
    }
}
