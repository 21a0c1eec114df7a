//! Pluggable task-ordering strategies.
//!
//! Every strategy is a pairwise comparator over [`Task`]s with optional
//! lifecycle hooks. Strategies are combined into an ordered tie-breaking
//! chain by [`CompositeStrategy`] and looked up by name through the
//! read-only [`StrategyRegistry`].
//!
//! [`Task`]: fairsched_core::Task

pub mod composite;
pub mod critical_path;
pub mod deadline;
pub mod error;
pub mod fairness;
pub mod priority;
pub mod registry;
pub mod resource;
pub mod traits;

pub use composite::CompositeStrategy;
pub use critical_path::CriticalPathStrategy;
pub use deadline::DeadlineStrategy;
pub use error::StrategyError;
pub use fairness::FairnessStrategy;
pub use priority::PriorityStrategy;
pub use registry::StrategyRegistry;
pub use resource::ResourceStrategy;
pub use traits::{ReadyQueue, Strategy, UsageAware};
