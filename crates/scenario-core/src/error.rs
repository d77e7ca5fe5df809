//! Terminal outcomes of a failed scenario run.

use crate::config::ConfigError;
use crate::isolation::IsolationError;

/// Why a scenario run failed.
///
/// Every variant is terminal: a run is never retried. By the time one of
/// these reaches the caller, every isolation context created for the run
/// has already been destroyed.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    /// The run was asked to execute zero scenarios.
    #[error("no scenarios were supplied")]
    NoScenarios,

    /// Two scenarios host endpoints with the same name.
    #[error("endpoint name '{name}' is used by more than one scenario")]
    DuplicateEndpoint { name: String },

    /// A descriptor instantiated an endpoint under a different name.
    #[error("scenario '{scenario}' instantiated an endpoint named '{endpoint}'")]
    EndpointNameMismatch { scenario: String, endpoint: String },

    /// One or more endpoints returned false from `initialize`.
    #[error("{}", initialization_message(.endpoints))]
    Initialization { endpoints: Vec<String> },

    /// At least one endpoint reported assertion failures.
    #[error("{report}")]
    AssertionsFailed { report: String },

    /// The deadline elapsed before every endpoint was done.
    #[error("{report}")]
    TimedOut { report: String },

    /// An isolation context could not be created.
    #[error(transparent)]
    Isolation(#[from] IsolationError),

    /// The runner configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ScenarioError {
    /// Returns the human-readable report for assertion and timeout failures.
    pub fn report(&self) -> Option<&str> {
        match self {
            ScenarioError::AssertionsFailed { report } | ScenarioError::TimedOut { report } => {
                Some(report)
            }
            _ => None,
        }
    }
}

fn initialization_message(endpoints: &[String]) -> String {
    match endpoints {
        [single] => format!("Endpoint {single} failed to initialize"),
        many => format!("Endpoints {} failed to initialize", many.join(", ")),
    }
}
