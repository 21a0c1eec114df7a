//! Shared data model and configuration for the fairsched workspace.

pub mod config;
pub mod error;
pub mod task;

pub use config::{
    load_dotenv, BackpressureConfig, ClientConfig, FairnessConfig, SchedulingConfig,
    MAX_WINDOW_SECONDS,
};
pub use error::ConfigError;
pub use task::*;
