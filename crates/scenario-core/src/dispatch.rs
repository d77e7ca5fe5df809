//! Fire-and-forget dispatch of endpoint lifecycles.

use crate::runner::ActiveRunner;
use futures::FutureExt;
use scenario_proto::{EndpointError, EndpointRunner};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// The lifecycle step a dispatched task was in when it faulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStage {
    Start,
    ApplyWhens,
}

impl fmt::Display for DispatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchStage::Start => f.write_str("start"),
            DispatchStage::ApplyWhens => f.write_str("apply_whens"),
        }
    }
}

/// Spawns `start` followed by `apply_whens` for every runner, each inside
/// its own isolation context.
///
/// The tasks are never joined. If one returns an error or panics, a fault
/// message is stored on the runner; the watchdog then treats the endpoint
/// as done and reports the fault as an assertion failure.
pub fn dispatch(runners: &[ActiveRunner]) {
    for runner in runners {
        let endpoint = Arc::clone(runner.endpoint());
        let fault = runner.fault_slot();
        runner
            .context()
            .spawn(Box::pin(drive_endpoint(endpoint, fault)));
        debug!(endpoint = %runner.name(), "Endpoint dispatched");
    }
}

async fn drive_endpoint(endpoint: Arc<dyn EndpointRunner>, fault: Arc<OnceLock<String>>) {
    let name = endpoint.name().to_string();
    let lifecycle = AssertUnwindSafe(async {
        run_stage(DispatchStage::Start, endpoint.start()).await?;
        run_stage(DispatchStage::ApplyWhens, endpoint.apply_whens()).await
    });

    let message = match lifecycle.catch_unwind().await {
        Ok(Ok(())) => {
            debug!(endpoint = %name, "Endpoint started and stimuli applied");
            return;
        }
        Ok(Err((stage, error))) => format!("Endpoint {name} faulted during {stage}: {error}"),
        Err(panic) => format!(
            "Endpoint {name} panicked during dispatch: {}",
            panic_message(panic.as_ref())
        ),
    };

    warn!(endpoint = %name, fault = %message, "Dispatched endpoint faulted");
    let _ = fault.set(message);
}

async fn run_stage(
    stage: DispatchStage,
    step: impl Future<Output = Result<(), EndpointError>>,
) -> Result<(), (DispatchStage, EndpointError)> {
    step.await.map_err(|error| (stage, error))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isolation::{IsolationProvider, TaskIsolation};
    use crate::testing::MockEndpoint;
    use scenario_proto::EndpointScenario;
    use std::time::Duration;

    fn runner_for(endpoint: MockEndpoint) -> ActiveRunner {
        let context = TaskIsolation::new()
            .create(&EndpointScenario::new(endpoint.name()))
            .unwrap();
        ActiveRunner::new(Arc::new(endpoint), context)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_precedes_apply_whens() {
        let endpoint = MockEndpoint::new("Ordered").done_after_whens();
        let tally = endpoint.tally();
        let runners = vec![runner_for(endpoint)];

        dispatch(&runners);
        settle().await;

        assert_eq!(tally.lifecycle(), vec!["start", "apply_whens"]);
        assert!(runners[0].is_done());
        assert!(runners[0].fault().is_none());
        runners.into_iter().for_each(ActiveRunner::destroy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_does_not_wait_for_endpoints() {
        let endpoint = MockEndpoint::new("Slow").with_start_delay(Duration::from_secs(30));
        let tally = endpoint.tally();
        let runners = vec![runner_for(endpoint)];

        dispatch(&runners);
        assert_eq!(tally.start_calls(), 0);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(tally.start_calls(), 1);
        runners.into_iter().for_each(ActiveRunner::destroy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_error_becomes_fault_and_skips_whens() {
        let endpoint = MockEndpoint::new("Broken")
            .never_done()
            .failing_start(EndpointError::Startup("queue missing".into()));
        let tally = endpoint.tally();
        let runners = vec![runner_for(endpoint)];

        dispatch(&runners);
        settle().await;

        assert_eq!(tally.whens_calls(), 0);
        assert!(runners[0].is_done());
        assert_eq!(
            runners[0].fault(),
            Some("Endpoint Broken faulted during start: startup failed: queue missing")
        );
        runners.into_iter().for_each(ActiveRunner::destroy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_whens_error_names_stage() {
        let endpoint = MockEndpoint::new("Stim")
            .never_done()
            .failing_whens(EndpointError::Stimulus("no handler".into()));
        let runners = vec![runner_for(endpoint)];

        dispatch(&runners);
        settle().await;

        assert_eq!(
            runners[0].fault(),
            Some("Endpoint Stim faulted during apply_whens: failed to apply stimulus: no handler")
        );
        runners.into_iter().for_each(ActiveRunner::destroy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_becomes_fault() {
        let endpoint = MockEndpoint::new("Crashy").never_done().panicking_start();
        let runners = vec![runner_for(endpoint)];

        dispatch(&runners);
        settle().await;

        let fault = runners[0].fault().unwrap();
        assert!(fault.starts_with("Endpoint Crashy panicked during dispatch"));
        assert!(fault.contains("Crashy panicked on purpose"));
        runners.into_iter().for_each(ActiveRunner::destroy);
    }

    #[test]
    fn test_panic_message_payloads() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&7_u8), "non-string panic payload");
    }
}
