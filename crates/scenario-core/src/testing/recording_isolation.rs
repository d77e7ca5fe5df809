//! Isolation provider that records every create and destroy.

use crate::isolation::{IsolationContext, IsolationError, IsolationProvider, TaskIsolation};
use futures::future::BoxFuture;
use scenario_proto::EndpointScenario;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Default)]
struct Ledger {
    created: Mutex<Vec<String>>,
    destroyed: Mutex<Vec<String>>,
}

impl Ledger {
    fn push(list: &Mutex<Vec<String>>, name: &str) {
        list.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(name.to_string());
    }

    fn snapshot(list: &Mutex<Vec<String>>) -> Vec<String> {
        list.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Wraps another provider and keeps a ledger of context lifecycles.
///
/// Clones share the same ledger, so a test can hand one clone to the runner
/// and inspect the other afterwards.
#[derive(Clone)]
pub struct RecordingIsolation {
    inner: Arc<dyn IsolationProvider>,
    ledger: Arc<Ledger>,
    refused: Arc<HashSet<String>>,
}

impl RecordingIsolation {
    /// Records contexts created by [`TaskIsolation`].
    pub fn new() -> Self {
        Self::wrapping(Arc::new(TaskIsolation::new()))
    }

    /// Records contexts created by `inner`.
    pub fn wrapping(inner: Arc<dyn IsolationProvider>) -> Self {
        Self {
            inner,
            ledger: Arc::new(Ledger::default()),
            refused: Arc::new(HashSet::new()),
        }
    }

    /// Refuses to create a context for the named endpoint.
    pub fn refusing(mut self, endpoint: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.refused).insert(endpoint.into());
        self
    }

    /// Endpoint names whose contexts were created, in order.
    pub fn created(&self) -> Vec<String> {
        Ledger::snapshot(&self.ledger.created)
    }

    /// Endpoint names whose contexts were destroyed, in order.
    pub fn destroyed(&self) -> Vec<String> {
        Ledger::snapshot(&self.ledger.destroyed)
    }

    /// How many times the named endpoint's context was destroyed.
    pub fn destroy_count(&self, endpoint: &str) -> usize {
        self.destroyed().iter().filter(|n| *n == endpoint).count()
    }

    /// True when every created context was destroyed exactly once.
    pub fn all_destroyed_once(&self) -> bool {
        let created = self.created();
        let destroyed = self.destroyed();
        created.len() == destroyed.len()
            && created.iter().all(|name| self.destroy_count(name) == 1)
    }
}

impl Default for RecordingIsolation {
    fn default() -> Self {
        Self::new()
    }
}

impl IsolationProvider for RecordingIsolation {
    fn create(
        &self,
        scenario: &EndpointScenario,
    ) -> Result<Box<dyn IsolationContext>, IsolationError> {
        if self.refused.contains(&scenario.endpoint_name) {
            return Err(IsolationError::Refused {
                endpoint: scenario.endpoint_name.clone(),
                reason: "refused by test".to_string(),
            });
        }

        let inner = self.inner.create(scenario)?;
        Ledger::push(&self.ledger.created, &scenario.endpoint_name);
        Ok(Box::new(RecordingContext {
            inner,
            ledger: Arc::clone(&self.ledger),
        }))
    }
}

struct RecordingContext {
    inner: Box<dyn IsolationContext>,
    ledger: Arc<Ledger>,
}

impl IsolationContext for RecordingContext {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn spawn(&self, task: BoxFuture<'static, ()>) {
        self.inner.spawn(task);
    }

    fn destroy(self: Box<Self>) {
        Ledger::push(&self.ledger.destroyed, self.inner.name());
        self.inner.destroy();
    }
}
