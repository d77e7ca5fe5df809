//! Request/reply endpoints.
//!
//! The requester sends numbered pings carrying its own address as the
//! reply-to address; the responder answers each one with a pong using
//! [`SendOptions::reply_to`]. A send-only endpoint pings without a reply-to
//! address, which the responder reports as an assertion failure.

use super::{EndpointState, InboxSlot, Message};
use crate::bus::{Envelope, InMemoryBus};
use async_trait::async_trait;
use scenario_proto::{
    Address, EndpointError, EndpointResult, EndpointRunner, EndpointScenario, MessageIntent,
    ScenarioDescriptor, SendOptions,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

const REQUESTER: &str = "Requester";
const RESPONDER: &str = "Responder";
const SEND_ONLY: &str = "SendOnly";

fn correlation_id(seq: u32) -> String {
    format!("ping-{seq}")
}

// =============================================================================
// Requester
// =============================================================================

pub struct RequesterScenario {
    bus: Arc<InMemoryBus>,
    pings: u32,
}

impl RequesterScenario {
    pub fn new(bus: Arc<InMemoryBus>, pings: u32) -> Self {
        Self { bus, pings }
    }
}

impl ScenarioDescriptor for RequesterScenario {
    fn scenario(&self) -> EndpointScenario {
        EndpointScenario::new(REQUESTER)
    }

    fn instantiate(&self) -> Arc<dyn EndpointRunner> {
        Arc::new(Requester {
            bus: Arc::clone(&self.bus),
            pings: self.pings,
            address: Address::local(REQUESTER),
            inbox: InboxSlot::default(),
            state: EndpointState::default(),
        })
    }
}

struct Requester {
    bus: Arc<InMemoryBus>,
    pings: u32,
    address: Address,
    inbox: InboxSlot,
    state: EndpointState,
}

impl Requester {
    fn check_pong(&self, envelope: &Envelope, seq: u32) {
        let expected = correlation_id(seq);
        if envelope.correlation_id.as_deref() != Some(expected.as_str()) {
            self.state.fail(format!(
                "Pong {seq}: expected correlation id {expected}, got {:?}",
                envelope.correlation_id
            ));
        }
        if envelope.intent != MessageIntent::Reply {
            self.state.fail(format!(
                "Pong {seq}: expected intent Reply, got {:?}",
                envelope.intent
            ));
        }
    }
}

#[async_trait]
impl EndpointRunner for Requester {
    fn name(&self) -> &str {
        REQUESTER
    }

    async fn initialize(&self, _scenario_id: &str) -> bool {
        self.inbox.bind(&self.bus, &self.address)
    }

    async fn start(&self) -> EndpointResult<()> {
        if !self.inbox.is_bound() {
            return Err(EndpointError::Startup("requester queue is not bound".into()));
        }
        if self.pings == 0 {
            self.state.complete();
        }
        Ok(())
    }

    /// Sends every ping, then waits for the pongs.
    async fn apply_whens(&self) -> EndpointResult<()> {
        let mut inbox = self
            .inbox
            .take()
            .ok_or_else(|| EndpointError::Stimulus("requester inbox already drained".into()))?;

        let responder = Address::local(RESPONDER);
        for seq in 0..self.pings {
            let options = SendOptions::to(responder.clone())
                .with_reply_to_address(self.address.clone())
                .with_correlation_id(correlation_id(seq));
            self.bus.send(&options, &Message::Ping { seq })?;
        }

        let mut answered = BTreeSet::new();
        while !self.state.is_done() {
            let Some(envelope) = inbox.recv().await else {
                break;
            };
            match envelope.decode::<Message>() {
                Ok(Message::Pong { seq }) => {
                    self.check_pong(&envelope, seq);
                    answered.insert(seq);
                    debug!(seq, answered = answered.len(), "Pong received");
                    if answered.len() == self.pings as usize {
                        self.state.complete();
                    }
                }
                Ok(other) => self.state.fail(format!("Unexpected message {other:?}")),
                Err(e) => self.state.fail(format!("Undecodable message: {e}")),
            }
        }
        Ok(())
    }

    fn done(&self) -> bool {
        self.state.is_done()
    }

    fn verify_assertions(&self) -> Vec<String> {
        self.state.failures()
    }
}

// =============================================================================
// Responder
// =============================================================================

pub struct ResponderScenario {
    bus: Arc<InMemoryBus>,
    expected: u32,
}

impl ResponderScenario {
    pub fn new(bus: Arc<InMemoryBus>, expected: u32) -> Self {
        Self { bus, expected }
    }
}

impl ScenarioDescriptor for ResponderScenario {
    fn scenario(&self) -> EndpointScenario {
        EndpointScenario::new(RESPONDER)
    }

    fn instantiate(&self) -> Arc<dyn EndpointRunner> {
        Arc::new(Responder {
            bus: Arc::clone(&self.bus),
            expected: self.expected,
            inbox: InboxSlot::default(),
            state: EndpointState::default(),
        })
    }
}

struct Responder {
    bus: Arc<InMemoryBus>,
    expected: u32,
    inbox: InboxSlot,
    state: EndpointState,
}

impl Responder {
    fn answer(&self, envelope: &Envelope, seq: u32) {
        let options = match SendOptions::reply_to(envelope.reply_to.clone()) {
            Ok(options) => options,
            Err(e) => {
                self.state.fail(format!("Ping {seq} could not be answered: {e}"));
                return;
            }
        };
        let options = match &envelope.correlation_id {
            Some(id) => options.with_correlation_id(id.clone()),
            None => options,
        };
        if let Err(e) = self.bus.send(&options, &Message::Pong { seq }) {
            self.state.fail(format!("Pong {seq} was not sent: {e}"));
        }
    }
}

#[async_trait]
impl EndpointRunner for Responder {
    fn name(&self) -> &str {
        RESPONDER
    }

    async fn initialize(&self, _scenario_id: &str) -> bool {
        self.inbox.bind(&self.bus, &Address::local(RESPONDER))
    }

    async fn start(&self) -> EndpointResult<()> {
        if !self.inbox.is_bound() {
            return Err(EndpointError::Startup("responder queue is not bound".into()));
        }
        if self.expected == 0 {
            self.state.complete();
        }
        Ok(())
    }

    /// No stimuli of its own: answers pings until the expected number has
    /// been handled.
    async fn apply_whens(&self) -> EndpointResult<()> {
        let mut inbox = self
            .inbox
            .take()
            .ok_or_else(|| EndpointError::Stimulus("responder inbox already drained".into()))?;

        let mut handled = 0;
        while !self.state.is_done() {
            let Some(envelope) = inbox.recv().await else {
                break;
            };
            match envelope.decode::<Message>() {
                Ok(Message::Ping { seq }) => {
                    self.answer(&envelope, seq);
                    handled += 1;
                    if handled == self.expected {
                        self.state.complete();
                    }
                }
                Ok(other) => self.state.fail(format!("Unexpected message {other:?}")),
                Err(e) => self.state.fail(format!("Undecodable message: {e}")),
            }
        }
        Ok(())
    }

    fn done(&self) -> bool {
        self.state.is_done()
    }

    fn verify_assertions(&self) -> Vec<String> {
        self.state.failures()
    }
}

// =============================================================================
// SendOnly
// =============================================================================

pub struct SendOnlyScenario {
    bus: Arc<InMemoryBus>,
}

impl SendOnlyScenario {
    pub fn new(bus: Arc<InMemoryBus>) -> Self {
        Self { bus }
    }
}

impl ScenarioDescriptor for SendOnlyScenario {
    fn scenario(&self) -> EndpointScenario {
        EndpointScenario::new(SEND_ONLY)
    }

    fn instantiate(&self) -> Arc<dyn EndpointRunner> {
        Arc::new(SendOnly {
            bus: Arc::clone(&self.bus),
            state: EndpointState::default(),
        })
    }
}

/// Sends one ping and is done. Has no queue of its own.
struct SendOnly {
    bus: Arc<InMemoryBus>,
    state: EndpointState,
}

#[async_trait]
impl EndpointRunner for SendOnly {
    fn name(&self) -> &str {
        SEND_ONLY
    }

    async fn initialize(&self, _scenario_id: &str) -> bool {
        true
    }

    async fn start(&self) -> EndpointResult<()> {
        Ok(())
    }

    async fn apply_whens(&self) -> EndpointResult<()> {
        let options = SendOptions::to(Address::local(RESPONDER));
        self.bus.send(&options, &Message::Ping { seq: 0 })?;
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
    use super::*;
    use crate::scenarios::{request_reply, send_only};
    use scenario_core::testing::{RecordingIsolation, init_tracing};
    use scenario_core::{IsolationKind, RunnerConfig, ScenarioError, ScenarioRunner};
    use std::time::Duration;

    fn task_runner(isolation: &RecordingIsolation) -> ScenarioRunner {
        ScenarioRunner::new(RunnerConfig::default().with_isolation(IsolationKind::Task))
            .unwrap()
            .with_provider(Arc::new(isolation.clone()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_reply_succeeds() {
        init_tracing();
        let bus = Arc::new(InMemoryBus::new());
        let isolation = RecordingIsolation::new();

        let summary = task_runner(&isolation)
            .run(&request_reply(&bus, 3))
            .await
            .unwrap();

        assert_eq!(summary.endpoints, vec!["Requester", "Responder"]);
        assert!(summary.elapsed < Duration::from_secs(10));
        assert!(isolation.all_destroyed_once());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_only_ping_cannot_be_answered() {
        let bus = Arc::new(InMemoryBus::new());
        let isolation = RecordingIsolation::new();

        let err = task_runner(&isolation)
            .run(&send_only(&bus))
            .await
            .unwrap_err();

        assert!(matches!(err, ScenarioError::AssertionsFailed { .. }));
        let report = err.report().unwrap();
        assert!(report.contains(
            "Endpoint: Responder\n    Ping 0 could not be answered: Can't reply with null reply-to-address field"
        ));
        assert!(!report.contains("Endpoint: SendOnly"));
        assert!(isolation.all_destroyed_once());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_responder_faults_requester() {
        let bus = Arc::new(InMemoryBus::new());
        let requester: Vec<Arc<dyn ScenarioDescriptor>> =
            vec![Arc::new(RequesterScenario::new(Arc::clone(&bus), 1))];
        let runner = ScenarioRunner::new(
            RunnerConfig::default()
                .with_isolation(IsolationKind::Task)
                .with_max_duration(Duration::from_secs(1)),
        )
        .unwrap();

        let err = runner.run(&requester).await.unwrap_err();

        // The ping itself fails to send, which the dispatcher reports as a
        // fault before the deadline.
        let report = err.report().unwrap();
        assert!(report.contains("Endpoint Requester faulted during apply_whens"));
        assert!(report.contains("queue Responder@localhost is not bound"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_runner_reuse_rebinds_queues() {
        let bus = Arc::new(InMemoryBus::new());
        let isolation = RecordingIsolation::new();
        let runner = task_runner(&isolation);
        let scenarios = request_reply(&bus, 2);

        runner.run(&scenarios).await.unwrap();
        runner.run(&scenarios).await.unwrap();

        assert_eq!(isolation.destroy_count("Requester"), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_request_reply_on_dedicated_runtimes() {
        let bus = Arc::new(InMemoryBus::new());
        let config = RunnerConfig::default()
            .with_isolation(IsolationKind::Runtime)
            .with_poll_interval(Duration::from_millis(20))
            .with_max_duration(Duration::from_secs(5));

        let summary = ScenarioRunner::new(config)
            .unwrap()
            .run(&request_reply(&bus, 5))
            .await
            .unwrap();

        assert_eq!(summary.endpoints.len(), 2);
        assert!(summary.elapsed < Duration::from_secs(5));
    }
}
