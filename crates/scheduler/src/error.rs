use fairsched_core::ConfigError;
use thiserror::Error;

/// Failure reported by a [`Dispatcher`](crate::Dispatcher).
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatch of '{workflow_id}' failed: {reason}")]
    Failed { workflow_id: String, reason: String },

    #[error("dispatcher unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("dispatch task did not complete: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("scheduler loop for client '{0}' is no longer running")]
    LoopClosed(String),
}
