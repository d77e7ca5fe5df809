//! Scenario initialization: one isolation context and endpoint per descriptor.

use crate::error::ScenarioError;
use crate::isolation::IsolationProvider;
use crate::runner::ActiveRunner;
use crate::teardown::TeardownGuard;
use scenario_proto::ScenarioDescriptor;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Creates a context and endpoint for every descriptor and initializes it.
///
/// Each runner is registered with `guard` before `initialize` is called, so
/// whatever happens next its context is torn down. Names are checked for
/// uniqueness on the descriptors, so an instantiated endpoint must carry
/// its descriptor's name; a mismatch aborts the run. An endpoint whose
/// `initialize` returns false (or does not answer within `init_timeout`)
/// does not stop the batch: the remaining descriptors are still processed,
/// then the run fails with [`ScenarioError::Initialization`] naming every
/// endpoint that failed.
pub async fn initialize_runners(
    descriptors: &[Arc<dyn ScenarioDescriptor>],
    provider: &dyn IsolationProvider,
    guard: &mut TeardownGuard,
    init_timeout: Duration,
) -> Result<(), ScenarioError> {
    ensure_unique_names(descriptors)?;

    let mut failed = Vec::new();

    for descriptor in descriptors {
        let scenario = descriptor.scenario();
        let context = provider.create(&scenario)?;
        let endpoint = descriptor.instantiate();
        let scenario_id = descriptor.scenario_id();
        let endpoint_name = endpoint.name().to_string();

        guard.register(ActiveRunner::new(endpoint, context));
        if endpoint_name != scenario.endpoint_name {
            return Err(ScenarioError::EndpointNameMismatch {
                scenario: scenario.endpoint_name,
                endpoint: endpoint_name,
            });
        }
        let Some(runner) = guard.runners().last() else {
            continue;
        };

        if initialize_in_context(runner, &scenario_id, init_timeout).await {
            debug!(endpoint = %runner.name(), scenario = %scenario_id, "Endpoint initialized");
        } else {
            warn!(endpoint = %runner.name(), scenario = %scenario_id, "Endpoint failed to initialize");
            failed.push(runner.name().to_string());
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(ScenarioError::Initialization { endpoints: failed })
    }
}

fn ensure_unique_names(descriptors: &[Arc<dyn ScenarioDescriptor>]) -> Result<(), ScenarioError> {
    if descriptors.is_empty() {
        return Err(ScenarioError::NoScenarios);
    }

    let mut seen = HashSet::new();
    for descriptor in descriptors {
        let name = descriptor.scenario().endpoint_name;
        if !seen.insert(name.clone()) {
            return Err(ScenarioError::DuplicateEndpoint { name });
        }
    }
    Ok(())
}

/// Runs `initialize` inside the runner's context and waits for the answer.
async fn initialize_in_context(runner: &ActiveRunner, scenario_id: &str, timeout: Duration) -> bool {
    let endpoint = Arc::clone(runner.endpoint());
    let scenario_id = scenario_id.to_string();
    let (tx, rx) = oneshot::channel();

    runner.context().spawn(Box::pin(async move {
        let initialized = endpoint.initialize(&scenario_id).await;
        let _ = tx.send(initialized);
    }));

    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(initialized)) => initialized,
        Ok(Err(_)) => {
            warn!(endpoint = %runner.name(), "Initialization task ended without an answer");
            false
        }
        Err(_) => {
            warn!(
                endpoint = %runner.name(),
                timeout_ms = timeout.as_millis() as u64,
                "Initialization timed out"
            );
            false
        }
    }
}
