use std::collections::HashMap;
use std::sync::Arc;

use fairsched_core::{ConfigError, SchedulingConfig};
use tracing::info;

use crate::composite::CompositeStrategy;
use crate::critical_path::CriticalPathStrategy;
use crate::deadline::DeadlineStrategy;
use crate::fairness::FairnessStrategy;
use crate::priority::PriorityStrategy;
use crate::resource::ResourceStrategy;
use crate::traits::Strategy;

type Factory = Box<dyn Fn() -> Arc<dyn Strategy> + Send + Sync>;

enum Entry {
    /// One instance handed to every loop.
    Shared(Arc<dyn Strategy>),
    /// A fresh instance per lookup, for strategies holding per-loop state.
    PerLoop(Factory),
}

impl Entry {
    fn resolve(&self) -> Arc<dyn Strategy> {
        match self {
            Entry::Shared(strategy) => Arc::clone(strategy),
            Entry::PerLoop(factory) => factory(),
        }
    }
}

/// Name -> strategy. Built once at wiring time, then only read.
///
/// Shared entries hand every loop the same instance, which is how fairness
/// usage becomes global across clients. Per-loop entries (the critical path
/// dispatched set) are built fresh for each chain.
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: HashMap<String, Entry>,
}

impl StrategyRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in strategies:
    /// `priority`, `deadline`, `critical`, `fairness`, `resource`.
    pub fn with_defaults(config: &SchedulingConfig) -> Self {
        let mut registry = Self::new();
        registry.register("priority", Arc::new(PriorityStrategy::new()));
        registry.register("deadline", Arc::new(DeadlineStrategy::new()));
        registry.register_factory("critical", || Arc::new(CriticalPathStrategy::new()));
        registry.register(
            "fairness",
            Arc::new(FairnessStrategy::new(
                config.quotas.clone(),
                config.fairness.half_life_seconds,
            )),
        );
        registry.register("resource", Arc::new(ResourceStrategy::new()));
        registry
    }

    /// Register (or replace) a shared strategy under `name`.
    pub fn register(&mut self, name: impl Into<String>, strategy: Arc<dyn Strategy>) {
        let name = name.into();
        info!("Registered strategy: {}", name);
        self.strategies.insert(name, Entry::Shared(strategy));
    }

    /// Register (or replace) a strategy that is constructed anew for every
    /// loop resolving `name`.
    pub fn register_factory<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn Strategy> + Send + Sync + 'static,
    {
        let name = name.into();
        info!("Registered per-loop strategy: {}", name);
        self.strategies.insert(name, Entry::PerLoop(Box::new(factory)));
    }

    /// The shared instance, or a fresh one for per-loop entries.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Strategy>> {
        self.strategies.get(name).map(Entry::resolve)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.strategies.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve a `+`-joined strategy list.
    ///
    /// A single name yields the registered instance itself (or a fresh one
    /// for per-loop entries); several names yield a [`CompositeStrategy`]
    /// over them in order.
    pub fn build_chain(&self, spec: &str) -> Result<Arc<dyn Strategy>, ConfigError> {
        let names: Vec<&str> = spec
            .split('+')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        let mut chain = Vec::with_capacity(names.len());
        for name in &names {
            let strategy = self.get(name).ok_or_else(|| ConfigError::UnknownStrategy {
                name: name.to_string(),
                spec: spec.to_string(),
            })?;
            chain.push(strategy);
        }

        match chain.len() {
            0 => Err(ConfigError::EmptyStrategy),
            1 => Ok(chain.remove(0)),
            _ => Ok(Arc::new(CompositeStrategy::new(names.join("+"), chain))),
        }
    }
}
