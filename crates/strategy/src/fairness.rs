use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use fairsched_core::{Task, ATTR_TENANT_ID};
use tracing::debug;

use crate::error::StrategyError;
use crate::traits::{ReadyQueue, Strategy, UsageAware};

/// Accumulated usage of one tenant and when it was last folded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TenantUsage {
    pub value: f64,
    pub last_update: DateTime<Utc>,
}

/// Quota-normalized fairness over exponentially decayed tenant usage.
///
/// Usage decays continuously with the configured half-life:
/// `value * 0.5^(dt / half_life)`. The tenant with the lowest
/// `usage / quota` share is preferred. Unknown tenants have quota 1.0.
///
/// One instance may be wired into several client loops; the usage table is
/// then shared between them.
#[derive(Debug)]
pub struct FairnessStrategy {
    quotas: HashMap<String, f64>,
    half_life_seconds: f64,
    usage: RwLock<HashMap<String, TenantUsage>>,
}

impl FairnessStrategy {
    pub fn new(quotas: HashMap<String, f64>, half_life_seconds: u64) -> Self {
        Self {
            quotas,
            half_life_seconds: half_life_seconds as f64,
            usage: RwLock::new(HashMap::new()),
        }
    }

    pub fn quota(&self, tenant: &str) -> f64 {
        self.quotas.get(tenant).copied().unwrap_or(1.0)
    }

    /// Stored usage for a tenant, as of its last update.
    pub fn usage(&self, tenant: &str) -> Option<TenantUsage> {
        self.usage
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(tenant)
            .copied()
    }

    /// Usage decayed to `at` without mutating state. Untracked tenants are 0.
    pub fn decayed_usage(&self, tenant: &str, at: DateTime<Utc>) -> f64 {
        self.usage(tenant)
            .map(|u| self.decay(&u, at))
            .unwrap_or(0.0)
    }

    /// Current quota-normalized share.
    pub fn share(&self, tenant: &str) -> f64 {
        let value = self.usage(tenant).map(|u| u.value).unwrap_or(0.0);
        value / self.quota(tenant)
    }

    fn decay(&self, usage: &TenantUsage, now: DateTime<Utc>) -> f64 {
        let dt = (now - usage.last_update).num_milliseconds() as f64 / 1000.0;
        if dt <= 0.0 {
            return usage.value;
        }
        usage.value * 0.5f64.powf(dt / self.half_life_seconds)
    }
}

impl Strategy for FairnessStrategy {
    fn name(&self) -> &str {
        "fairness"
    }

    fn can_compare(&self, a: &Task, b: &Task) -> bool {
        a.attr::<String>(ATTR_TENANT_ID).is_some() && b.attr::<String>(ATTR_TENANT_ID).is_some()
    }

    fn compare(&self, a: &Task, b: &Task) -> Result<Ordering, StrategyError> {
        let (Some(ta), Some(tb)) = (
            a.attr::<String>(ATTR_TENANT_ID),
            b.attr::<String>(ATTR_TENANT_ID),
        ) else {
            return Ok(Ordering::Equal);
        };
        let (sa, sb) = (self.share(&ta), self.share(&tb));
        sa.partial_cmp(&sb).ok_or_else(|| {
            StrategyError::incomparable(
                self.name(),
                &a.workflow_id,
                &b.workflow_id,
                format!("non-finite share ({ta}={sa}, {tb}={sb})"),
            )
        })
    }

    /// Decay every tracked tenant to `now` without adding cost.
    fn preprocess(&self, _queue: &mut ReadyQueue, now: DateTime<Utc>) {
        let mut usage = self.usage.write().unwrap_or_else(|e| e.into_inner());
        for entry in usage.values_mut() {
            *entry = TenantUsage {
                value: self.decay(entry, now),
                last_update: now,
            };
        }
    }

    fn as_usage_aware(&self) -> Option<&dyn UsageAware> {
        Some(self)
    }
}

impl UsageAware for FairnessStrategy {
    fn record_usage(&self, tenant: &str, cost: f64, at: DateTime<Utc>) {
        let mut usage = self.usage.write().unwrap_or_else(|e| e.into_inner());
        let value = match usage.get(tenant) {
            Some(prior) => self.decay(prior, at) + cost,
            None => cost,
        };
        debug!(tenant, cost, value, "recorded tenant usage");
        usage.insert(
            tenant.to_string(),
            TenantUsage {
                value,
                last_update: at,
            },
        );
    }
}
