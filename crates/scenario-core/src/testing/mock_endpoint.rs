//! Scripted endpoint for exercising the orchestrator.

use async_trait::async_trait;
use scenario_proto::{
    EndpointError, EndpointResult, EndpointRunner, EndpointScenario, ScenarioDescriptor,
};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// When a [`MockEndpoint`] starts reporting `done() == true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// On the n-th call to `done` (1-based) and every call after it.
    AfterPolls(u32),
    /// Once `apply_whens` has returned successfully.
    AfterWhens,
    /// Never.
    Never,
}

#[derive(Debug, Clone)]
enum StageBehavior {
    Succeed,
    Fail(EndpointError),
    Panic,
}

/// Counters shared between a [`MockEndpoint`] and the test observing it.
#[derive(Debug, Default)]
pub struct MockTally {
    instances: AtomicU32,
    initialize_calls: AtomicU32,
    start_calls: AtomicU32,
    whens_calls: AtomicU32,
    done_polls: AtomicU32,
    verify_calls: AtomicU32,
    whens_applied: AtomicBool,
    scenario_id: Mutex<Option<String>>,
    lifecycle: Mutex<Vec<&'static str>>,
}

impl MockTally {
    /// Number of endpoints instantiated from the owning scenario.
    pub fn instances(&self) -> u32 {
        self.instances.load(Ordering::SeqCst)
    }

    pub fn initialize_calls(&self) -> u32 {
        self.initialize_calls.load(Ordering::SeqCst)
    }

    pub fn start_calls(&self) -> u32 {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn whens_calls(&self) -> u32 {
        self.whens_calls.load(Ordering::SeqCst)
    }

    pub fn done_polls(&self) -> u32 {
        self.done_polls.load(Ordering::SeqCst)
    }

    pub fn verify_calls(&self) -> u32 {
        self.verify_calls.load(Ordering::SeqCst)
    }

    /// The scenario id passed to `initialize`.
    pub fn scenario_id(&self) -> Option<String> {
        self.scenario_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Lifecycle calls in the order they happened.
    pub fn lifecycle(&self) -> Vec<&'static str> {
        self.lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, step: &'static str) {
        self.lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(step);
    }
}

/// An endpoint whose lifecycle is scripted by the test.
///
/// Defaults: initializes successfully, is done on the first poll, and
/// reports no failures.
#[derive(Debug, Clone)]
pub struct MockEndpoint {
    name: String,
    initialize_result: bool,
    completion: Completion,
    failures: Vec<String>,
    start: StageBehavior,
    whens: StageBehavior,
    start_delay: Option<Duration>,
    tally: Arc<MockTally>,
}

impl MockEndpoint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initialize_result: true,
            completion: Completion::AfterPolls(1),
            failures: Vec::new(),
            start: StageBehavior::Succeed,
            whens: StageBehavior::Succeed,
            start_delay: None,
            tally: Arc::new(MockTally::default()),
        }
    }

    /// Makes `initialize` return false.
    pub fn failing_initialize(mut self) -> Self {
        self.initialize_result = false;
        self
    }

    pub fn done_after_polls(mut self, polls: u32) -> Self {
        self.completion = Completion::AfterPolls(polls);
        self
    }

    pub fn done_after_whens(mut self) -> Self {
        self.completion = Completion::AfterWhens;
        self
    }

    pub fn never_done(mut self) -> Self {
        self.completion = Completion::Never;
        self
    }

    /// Assertion failures returned by `verify_assertions`.
    pub fn with_failures<I, S>(mut self, failures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failures = failures.into_iter().map(Into::into).collect();
        self
    }

    pub fn failing_start(mut self, error: EndpointError) -> Self {
        self.start = StageBehavior::Fail(error);
        self
    }

    pub fn failing_whens(mut self, error: EndpointError) -> Self {
        self.whens = StageBehavior::Fail(error);
        self
    }

    pub fn panicking_start(mut self) -> Self {
        self.start = StageBehavior::Panic;
        self
    }

    /// Delays `start` by `delay` before it does anything.
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = Some(delay);
        self
    }

    pub fn tally(&self) -> Arc<MockTally> {
        Arc::clone(&self.tally)
    }

    /// Wraps this endpoint in a descriptor.
    pub fn into_scenario(self) -> Arc<dyn ScenarioDescriptor> {
        Arc::new(MockScenario::new(self))
    }

    fn run_stage(&self, behavior: &StageBehavior) -> EndpointResult<()> {
        match behavior {
            StageBehavior::Succeed => Ok(()),
            StageBehavior::Fail(error) => Err(error.clone()),
            StageBehavior::Panic => panic!("{} panicked on purpose", self.name),
        }
    }
}

#[async_trait]
impl EndpointRunner for MockEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self, scenario_id: &str) -> bool {
        self.tally.initialize_calls.fetch_add(1, Ordering::SeqCst);
        self.tally.record("initialize");
        *self
            .tally
            .scenario_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(scenario_id.to_string());
        self.initialize_result
    }

    async fn start(&self) -> EndpointResult<()> {
        if let Some(delay) = self.start_delay {
            tokio::time::sleep(delay).await;
        }
        self.tally.start_calls.fetch_add(1, Ordering::SeqCst);
        self.tally.record("start");
        self.run_stage(&self.start)
    }

    async fn apply_whens(&self) -> EndpointResult<()> {
        self.tally.whens_calls.fetch_add(1, Ordering::SeqCst);
        self.tally.record("apply_whens");
        self.run_stage(&self.whens)?;
        self.tally.whens_applied.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn done(&self) -> bool {
        let polls = self.tally.done_polls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.completion {
            Completion::AfterPolls(required) => polls >= required,
            Completion::AfterWhens => self.tally.whens_applied.load(Ordering::SeqCst),
            Completion::Never => false,
        }
    }

    fn verify_assertions(&self) -> Vec<String> {
        self.tally.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.failures.clone()
    }
}

/// Descriptor that instantiates copies of a scripted [`MockEndpoint`].
///
/// Every instance shares the template's [`MockTally`].
#[derive(Debug, Clone)]
pub struct MockScenario {
    template: MockEndpoint,
}

impl MockScenario {
    pub fn new(template: MockEndpoint) -> Self {
        Self { template }
    }

    pub fn tally(&self) -> Arc<MockTally> {
        self.template.tally()
    }
}

impl ScenarioDescriptor for MockScenario {
    fn scenario(&self) -> EndpointScenario {
        EndpointScenario::new(self.template.name.clone())
    }

    fn instantiate(&self) -> Arc<dyn EndpointRunner> {
        self.template.tally.instances.fetch_add(1, Ordering::SeqCst);
        Arc::new(self.template.clone())
    }
}
