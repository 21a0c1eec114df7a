use serde::Serialize;

/// Scheduler loop lifecycle.
///
/// `AwaitingTasks -> Selecting -> Throttling -> Dispatching -> Selecting ...`
/// and, once cancelled, `Draining -> Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum LoopState {
    /// Suspended until the ready queue is non-empty.
    #[default]
    AwaitingTasks,
    /// Preprocessing the queue and scanning for the best task.
    Selecting,
    /// Sleeping off backpressure before a dispatch.
    Throttling,
    /// Handing the selected task to the dispatcher.
    Dispatching,
    /// Cancelled; awaiting in-flight dispatches.
    Draining,
    Terminated,
}

impl LoopState {
    /// Whether the loop still selects and dispatches tasks.
    pub fn is_active(self) -> bool {
        !matches!(self, LoopState::Draining | LoopState::Terminated)
    }
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LoopState::AwaitingTasks => "awaiting_tasks",
            LoopState::Selecting => "selecting",
            LoopState::Throttling => "throttling",
            LoopState::Dispatching => "dispatching",
            LoopState::Draining => "draining",
            LoopState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}
