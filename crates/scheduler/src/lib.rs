//! Per-client scheduling loop: ready queue, strategy-driven selection,
//! sliding-window backpressure, asynchronous dispatch and drain.

pub mod backpressure;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod runner;
pub mod state;
pub mod usage;

pub use backpressure::BackpressureController;
pub use dispatch::{DispatchRequest, Dispatcher, LoggingDispatcher};
pub use error::{DispatchError, SchedulerError};
pub use metrics::SchedulingMetrics;
pub use runner::{LoopReport, SchedulerHandle, SchedulerLoop};
pub use state::LoopState;
pub use usage::{CompletionNotice, UsageReporter};
