//! Per-client scheduler loop.
//!
//! Split into focused submodules:
//! - `core`: SchedulerLoop struct, construction and the final report
//! - `signals`: the handle callers hold and how signals mutate loop state
//! - `cycle`: the select → throttle → dispatch state machine
//! - `drain`: cancellation, in-flight dispatch await and shutdown

mod core;
mod cycle;
mod drain;
mod signals;
#[cfg(test)]
mod tests;

pub use self::core::{LoopReport, SchedulerLoop};
pub use self::signals::SchedulerHandle;
