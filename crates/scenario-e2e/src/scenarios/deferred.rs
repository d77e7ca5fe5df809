//! Deferred delivery: an endpoint that sends itself a reminder and checks it
//! was not delivered early.

use super::{EndpointState, InboxSlot, Message};
use crate::bus::InMemoryBus;
use async_trait::async_trait;
use scenario_proto::{
    Address, EndpointError, EndpointResult, EndpointRunner, EndpointScenario, ScenarioDescriptor,
    SendOptions,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

const SCHEDULER: &str = "Scheduler";

pub struct SchedulerScenario {
    bus: Arc<InMemoryBus>,
    delay: Duration,
}

impl SchedulerScenario {
    pub fn new(bus: Arc<InMemoryBus>, delay: Duration) -> Self {
        Self { bus, delay }
    }
}

impl ScenarioDescriptor for SchedulerScenario {
    fn scenario(&self) -> EndpointScenario {
        EndpointScenario::new(SCHEDULER)
    }

    fn instantiate(&self) -> Arc<dyn EndpointRunner> {
        Arc::new(Scheduler {
            bus: Arc::clone(&self.bus),
            delay: self.delay,
            address: Address::local(SCHEDULER),
            inbox: InboxSlot::default(),
            state: EndpointState::default(),
        })
    }
}

struct Scheduler {
    bus: Arc<InMemoryBus>,
    delay: Duration,
    address: Address,
    inbox: InboxSlot,
    state: EndpointState,
}

#[async_trait]
impl EndpointRunner for Scheduler {
    fn name(&self) -> &str {
        SCHEDULER
    }

    async fn initialize(&self, _scenario_id: &str) -> bool {
        self.inbox.bind(&self.bus, &self.address)
    }

    async fn start(&self) -> EndpointResult<()> {
        if self.inbox.is_bound() {
            Ok(())
        } else {
            Err(EndpointError::Startup("scheduler queue is not bound".into()))
        }
    }

    async fn apply_whens(&self) -> EndpointResult<()> {
        let mut inbox = self
            .inbox
            .take()
            .ok_or_else(|| EndpointError::Stimulus("scheduler inbox already drained".into()))?;

        let options = SendOptions::to(self.address.clone()).delay_delivery_with(self.delay);
        let sent_at = Instant::now();
        self.bus.send(
            &options,
            &Message::Reminder {
                note: "check the outbox".to_string(),
            },
        )?;

        let Some(envelope) = inbox.recv().await else {
            self.state.fail("Reminder queue closed before delivery");
            self.state.complete();
            return Ok(());
        };

        let waited = sent_at.elapsed();
        debug!(waited_ms = waited.as_millis() as u64, "Reminder delivered");
        if waited < self.delay {
            self.state.fail(format!(
                "Reminder arrived after {}ms, expected at least {}ms",
                waited.as_millis(),
                self.delay.as_millis()
            ));
        }
        match envelope.decode::<Message>() {
            Ok(Message::Reminder { .. }) => {}
            Ok(other) => self.state.fail(format!("Unexpected message {other:?}")),
            Err(e) => self.state.fail(format!("Undecodable message: {e}")),
        }
        self.state.complete();
        Ok(())
    }

    fn done(&self) -> bool {
        self.state.is_done()
    }

    fn verify_assertions(&self) -> Vec<String> {
        self.state.failures()
    }
}

#[cfg(test)]
mod tests {
    use crate::bus::InMemoryBus;
    use crate::scenarios::deferred;
    use scenario_core::run_log::{RunHistory, RunOutcome};
    use scenario_core::{IsolationKind, RunnerConfig, ScenarioError, ScenarioRunner};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn config() -> RunnerConfig {
        RunnerConfig::default().with_isolation(IsolationKind::Task)
    }

    #[tokio::test(start_paused = true)]
    async fn test_reminder_arrives_after_delay() {
        let bus = Arc::new(InMemoryBus::new());

        let summary = ScenarioRunner::new(config())
            .unwrap()
            .run(&deferred(&bus, Duration::from_secs(2)))
            .await
            .unwrap();

        assert!(summary.elapsed >= Duration::from_secs(2));
        assert!(summary.ticks >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reminder_past_deadline_times_out() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let log = tmp.path().join("runs.jsonl");
        let bus = Arc::new(InMemoryBus::new());
        let runner = ScenarioRunner::new(config().with_run_log(&log))?;

        let err = runner
            .run(&deferred(&bus, Duration::from_secs(30)))
            .await
            .unwrap_err();

        assert!(matches!(err, ScenarioError::TimedOut { .. }));
        let report = err.report().unwrap_or_default();
        assert!(report.starts_with("The maximum time limit for this test(10s) has been reached"));
        assert!(report.ends_with("Scheduler - Not done\n"));

        let records = RunHistory::new(&log).read_all()?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, RunOutcome::TimedOut);
        Ok(())
    }
}
