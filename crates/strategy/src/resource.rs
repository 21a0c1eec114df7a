use std::cmp::Ordering;
use std::collections::HashMap;

use fairsched_core::{Task, ATTR_REQUIRED_RESOURCES};

use crate::error::StrategyError;
use crate::traits::Strategy;

/// Prefers the task with the smallest total `requiredResources`.
#[derive(Debug, Default)]
pub struct ResourceStrategy;

impl ResourceStrategy {
    pub fn new() -> Self {
        Self
    }
}

fn required_resources(task: &Task) -> Option<HashMap<String, i64>> {
    task.attr::<HashMap<String, i64>>(ATTR_REQUIRED_RESOURCES)
}

/// Sum of all requested resource amounts.
///
/// `None` when the task declares no requirements or the sum does not fit in
/// an `i64`.
pub fn total_resources(task: &Task) -> Option<i64> {
    required_resources(task)?
        .values()
        .try_fold(0i64, |acc, amount| acc.checked_add(*amount))
}

impl Strategy for ResourceStrategy {
    fn name(&self) -> &str {
        "resource"
    }

    fn can_compare(&self, a: &Task, b: &Task) -> bool {
        required_resources(a).is_some() && required_resources(b).is_some()
    }

    fn compare(&self, a: &Task, b: &Task) -> Result<Ordering, StrategyError> {
        if required_resources(a).is_none() || required_resources(b).is_none() {
            return Ok(Ordering::Equal);
        }
        match (total_resources(a), total_resources(b)) {
            (Some(ra), Some(rb)) => Ok(ra.cmp(&rb)),
            _ => Err(StrategyError::incomparable(
                self.name(),
                &a.workflow_id,
                &b.workflow_id,
                "total required resources overflow",
            )),
        }
    }
}
