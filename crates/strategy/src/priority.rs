use std::cmp::Ordering;

use fairsched_core::{Task, ATTR_PRIORITY};

use crate::error::StrategyError;
use crate::traits::Strategy;

/// Higher integer `priority` attribute wins.
#[derive(Debug, Default)]
pub struct PriorityStrategy;

impl PriorityStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Strategy for PriorityStrategy {
    fn name(&self) -> &str {
        "priority"
    }

    fn can_compare(&self, a: &Task, b: &Task) -> bool {
        a.attr::<i64>(ATTR_PRIORITY).is_some() && b.attr::<i64>(ATTR_PRIORITY).is_some()
    }

    fn compare(&self, a: &Task, b: &Task) -> Result<Ordering, StrategyError> {
        match (a.attr::<i64>(ATTR_PRIORITY), b.attr::<i64>(ATTR_PRIORITY)) {
            (Some(pa), Some(pb)) => Ok(pb.cmp(&pa)),
            _ => Ok(Ordering::Equal),
        }
    }
}
