//! Scenario descriptors: factories for endpoints under test.

use crate::EndpointRunner;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Static description of the endpoint a scenario hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointScenario {
    /// Name of the endpoint; also names its isolation context.
    pub endpoint_name: String,
}

impl EndpointScenario {
    /// Creates a description for the named endpoint.
    pub fn new(endpoint_name: impl Into<String>) -> Self {
        Self {
            endpoint_name: endpoint_name.into(),
        }
    }
}

/// Identifies one endpoint scenario and produces its endpoint on demand.
///
/// Descriptors are supplied by the caller and never mutated by the
/// orchestrator. Each call to [`instantiate`](Self::instantiate) must return
/// a fresh endpoint.
pub trait ScenarioDescriptor: Send + Sync {
    /// Identity passed to [`EndpointRunner::initialize`].
    ///
    /// Defaults to the fully qualified name of the implementing type.
    fn scenario_id(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }

    /// Describes the endpoint to host.
    fn scenario(&self) -> EndpointScenario;

    /// Creates a new endpoint instance for this scenario.
    ///
    /// The endpoint's [`EndpointRunner::name`] must equal
    /// [`EndpointScenario::endpoint_name`]; runners reject a mismatch.
    fn instantiate(&self) -> Arc<dyn EndpointRunner>;
}
