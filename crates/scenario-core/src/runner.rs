//! The pairing of an endpoint with the context that hosts it.

use crate::isolation::IsolationContext;
use scenario_proto::EndpointRunner;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// An endpoint together with its isolation context.
///
/// Owned exclusively by the orchestrator for the duration of one run.
/// [`destroy`](Self::destroy) consumes the runner, so a context can only be
/// torn down once.
pub struct ActiveRunner {
    endpoint: Arc<dyn EndpointRunner>,
    context: Box<dyn IsolationContext>,
    fault: Arc<OnceLock<String>>,
}

impl ActiveRunner {
    pub fn new(endpoint: Arc<dyn EndpointRunner>, context: Box<dyn IsolationContext>) -> Self {
        Self {
            endpoint,
            context,
            fault: Arc::new(OnceLock::new()),
        }
    }

    /// Name of the hosted endpoint.
    pub fn name(&self) -> &str {
        self.endpoint.name()
    }

    pub fn endpoint(&self) -> &Arc<dyn EndpointRunner> {
        &self.endpoint
    }

    pub fn context(&self) -> &dyn IsolationContext {
        self.context.as_ref()
    }

    /// Shared slot where the dispatched task records a crash.
    pub(crate) fn fault_slot(&self) -> Arc<OnceLock<String>> {
        Arc::clone(&self.fault)
    }

    /// The fault recorded by the dispatched task, if it crashed.
    pub fn fault(&self) -> Option<&str> {
        self.fault.get().map(String::as_str)
    }

    /// True once the endpoint reports done, or its dispatch task faulted.
    pub fn is_done(&self) -> bool {
        self.fault.get().is_some() || self.endpoint.done()
    }

    /// Collects this endpoint's failures: any dispatch fault first, then the
    /// endpoint's own assertion failures.
    ///
    /// Calls `verify_assertions` on every invocation; the watchdog guarantees
    /// it asks at most once per endpoint.
    pub fn collect_failures(&self) -> Vec<String> {
        let mut failures: Vec<String> = self.fault.get().cloned().into_iter().collect();
        failures.extend(self.endpoint.verify_assertions());
        failures
    }

    /// Tears down the isolation context.
    pub fn destroy(self) {
        debug!(endpoint = %self.endpoint.name(), "Destroying isolation context");
        self.context.destroy();
    }
}

impl fmt::Debug for ActiveRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveRunner")
            .field("endpoint", &self.endpoint.name())
            .field("context", &self.context.name())
            .field("fault", &self.fault.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isolation::{IsolationProvider, TaskIsolation};
    use crate::testing::MockEndpoint;
    use scenario_proto::EndpointScenario;

    fn runner(endpoint: MockEndpoint) -> ActiveRunner {
        let context = TaskIsolation::new()
            .create(&EndpointScenario::new(endpoint.name()))
            .unwrap();
        ActiveRunner::new(Arc::new(endpoint), context)
    }

    #[tokio::test]
    async fn test_fault_counts_as_done_and_leads_failures() {
        let endpoint = MockEndpoint::new("Faulty")
            .never_done()
            .with_failures(["late assertion"]);
        let runner = runner(endpoint);
        assert!(!runner.is_done());

        runner
            .fault_slot()
            .set("Endpoint Faulty faulted during start: boom".to_string())
            .unwrap();

        assert!(runner.is_done());
        assert_eq!(
            runner.collect_failures(),
            vec![
                "Endpoint Faulty faulted during start: boom".to_string(),
                "late assertion".to_string(),
            ]
        );
        runner.destroy();
    }

    #[tokio::test]
    async fn test_debug_shows_names() {
        let runner = runner(MockEndpoint::new("Sender"));
        let debug = format!("{runner:?}");
        assert!(debug.contains("Sender"));
        runner.destroy();
    }
}
