use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use fairsched_core::{AttrValue, Task, ATTR_DEADLINE};
use tracing::debug;

use crate::error::StrategyError;
use crate::traits::{ReadyQueue, Strategy};

/// Earliest deadline first, with expiry of overdue tasks.
#[derive(Debug, Default)]
pub struct DeadlineStrategy;

impl DeadlineStrategy {
    pub fn new() -> Self {
        Self
    }
}

/// Resolve a task's deadline from a native timestamp or an RFC 3339 string.
///
/// Unparsable strings and other types read as no deadline.
pub fn deadline_of(task: &Task) -> Option<DateTime<Utc>> {
    match task.raw_attr(ATTR_DEADLINE)? {
        AttrValue::Timestamp(ts) => Some(*ts),
        AttrValue::Text(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

impl Strategy for DeadlineStrategy {
    fn name(&self) -> &str {
        "deadline"
    }

    fn can_compare(&self, a: &Task, b: &Task) -> bool {
        deadline_of(a).is_some() && deadline_of(b).is_some()
    }

    fn compare(&self, a: &Task, b: &Task) -> Result<Ordering, StrategyError> {
        match (deadline_of(a), deadline_of(b)) {
            (Some(da), Some(db)) => Ok(da.cmp(&db)),
            _ => Ok(Ordering::Equal),
        }
    }

    /// Drop every task whose deadline is strictly before `now`.
    fn preprocess(&self, queue: &mut ReadyQueue, now: DateTime<Utc>) {
        let before = queue.len();
        queue.retain(|task| !matches!(deadline_of(task), Some(dl) if dl < now));
        let expired = before - queue.len();
        if expired > 0 {
            debug!(expired, "evicted overdue tasks");
        }
    }
}
