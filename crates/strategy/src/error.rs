use thiserror::Error;

/// A fault inside a single `compare` call.
///
/// Callers downgrade this to a tie for the pair; it never aborts selection.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("{strategy}: cannot order '{a}' and '{b}': {reason}")]
    Incomparable {
        strategy: String,
        a: String,
        b: String,
        reason: String,
    },
}

impl StrategyError {
    pub fn incomparable(
        strategy: &str,
        a: &str,
        b: &str,
        reason: impl Into<String>,
    ) -> Self {
        Self::Incomparable {
            strategy: strategy.to_string(),
            a: a.to_string(),
            b: b.to_string(),
            reason: reason.into(),
        }
    }
}
