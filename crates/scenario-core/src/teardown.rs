//! Guaranteed teardown of isolation contexts.

use crate::runner::ActiveRunner;
use scopeguard::ScopeGuard;
use tracing::info;

type Teardown = fn(Vec<ActiveRunner>);

/// Owns every [`ActiveRunner`] of a run and destroys their contexts when
/// dropped.
///
/// Register each runner as soon as its context exists. Whether the run ends
/// by returning, by an early `?`, or by unwinding, every registered context
/// is destroyed exactly once, in registration order.
pub struct TeardownGuard {
    runners: ScopeGuard<Vec<ActiveRunner>, Teardown>,
}

impl TeardownGuard {
    pub fn new() -> Self {
        Self {
            runners: scopeguard::guard(Vec::new(), teardown as Teardown),
        }
    }

    /// Hands a runner to the guard.
    pub fn register(&mut self, runner: ActiveRunner) {
        self.runners.push(runner);
    }

    /// The registered runners, in registration order.
    pub fn runners(&self) -> &[ActiveRunner] {
        &self.runners
    }

    pub fn len(&self) -> usize {
        self.runners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runners.is_empty()
    }

    /// Destroys every registered context now.
    pub fn finish(self) {
        drop(self);
    }
}

impl Default for TeardownGuard {
    fn default() -> Self {
        Self::new()
    }
}

fn teardown(runners: Vec<ActiveRunner>) {
    let count = runners.len();
    for runner in runners {
        runner.destroy();
    }
    info!(contexts = count, "Isolation contexts torn down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isolation::IsolationProvider;
    use crate::testing::{MockEndpoint, RecordingIsolation};
    use scenario_proto::EndpointScenario;
    use std::sync::Arc;

    fn register(guard: &mut TeardownGuard, isolation: &RecordingIsolation, name: &str) {
        let context = isolation.create(&EndpointScenario::new(name)).unwrap();
        guard.register(ActiveRunner::new(Arc::new(MockEndpoint::new(name)), context));
    }

    #[tokio::test]
    async fn test_finish_destroys_in_registration_order() {
        let isolation = RecordingIsolation::new();
        let mut guard = TeardownGuard::new();
        register(&mut guard, &isolation, "A");
        register(&mut guard, &isolation, "B");
        assert_eq!(guard.len(), 2);
        assert!(isolation.destroyed().is_empty());

        guard.finish();
        assert_eq!(isolation.destroyed(), vec!["A", "B"]);
        assert!(isolation.all_destroyed_once());
    }

    #[tokio::test]
    async fn test_early_return_still_tears_down() {
        fn partial(isolation: &RecordingIsolation, fail: bool) -> Result<(), String> {
            let mut guard = TeardownGuard::new();
            register(&mut guard, isolation, "A");
            if fail {
                return Err("initialization failed".to_string());
            }
            register(&mut guard, isolation, "B");
            Ok(())
        }

        let isolation = RecordingIsolation::new();
        assert!(partial(&isolation, true).is_err());
        assert_eq!(isolation.created(), vec!["A"]);
        assert!(isolation.all_destroyed_once());
    }

    #[tokio::test]
    async fn test_unwinding_still_tears_down() {
        let isolation = RecordingIsolation::new();
        let recorder = isolation.clone();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let mut guard = TeardownGuard::new();
            register(&mut guard, &recorder, "A");
            panic!("watchdog blew up");
        }));

        assert!(result.is_err());
        assert!(isolation.all_destroyed_once());
    }
}
