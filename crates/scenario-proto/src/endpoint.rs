//! The endpoint lifecycle contract.

use async_trait::async_trait;

/// Errors an endpoint can raise while starting or applying its stimuli.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    /// The endpoint could not bring its runtime up.
    #[error("startup failed: {0}")]
    Startup(String),

    /// A scenario stimulus ("when" clause) could not be applied.
    #[error("failed to apply stimulus: {0}")]
    Stimulus(String),

    /// The underlying transport rejected an operation.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Result type for endpoint lifecycle calls.
pub type EndpointResult<T> = Result<T, EndpointError>;

/// An endpoint under test.
///
/// The orchestrator drives every endpoint through the same lifecycle:
/// `initialize` once, then `start` followed by `apply_whens` on a dedicated
/// task, while a watchdog repeatedly asks `done` and, once it turns true,
/// calls `verify_assertions` exactly once.
///
/// `done` and `verify_assertions` are invoked while `start`/`apply_whens`
/// may still be running, so implementations must answer them from
/// thread-safe state.
#[async_trait]
pub trait EndpointRunner: Send + Sync {
    /// Unique (per run) name used in diagnostics and reports.
    fn name(&self) -> &str;

    /// Prepares the endpoint for the given scenario.
    ///
    /// Returning `false` fails the whole run before any endpoint starts.
    async fn initialize(&self, scenario_id: &str) -> bool;

    /// Brings the endpoint's runtime up.
    async fn start(&self) -> EndpointResult<()>;

    /// Applies the scenario's stimuli. Always called after `start`.
    async fn apply_whens(&self) -> EndpointResult<()>;

    /// Returns true once the endpoint considers its scenario complete.
    fn done(&self) -> bool;

    /// Returns the assertion failures observed by this endpoint.
    ///
    /// An empty vector means every assertion held.
    fn verify_assertions(&self) -> Vec<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            EndpointError::Startup("queue missing".into()).to_string(),
            "startup failed: queue missing"
        );
        assert_eq!(
            EndpointError::Stimulus("no handler".into()).to_string(),
            "failed to apply stimulus: no handler"
        );
        assert_eq!(
            EndpointError::Transport("closed".into()).to_string(),
            "transport error: closed"
        );
    }
}
