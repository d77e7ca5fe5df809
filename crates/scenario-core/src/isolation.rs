//! Isolation contexts that host one endpoint each.
//!
//! The orchestrator only needs three things from a context: somewhere to run
//! the endpoint's futures, a name for diagnostics, and a `destroy` that
//! reclaims everything the endpoint still has running, even mid-execution.
//!
//! Two providers are available:
//! - [`RuntimeIsolation`]: a dedicated multi-thread tokio runtime per endpoint,
//!   shut down in the background on destroy
//! - [`TaskIsolation`]: tasks on the caller's runtime, aborted on destroy

use crate::config::{IsolationConfig, IsolationKind};
use futures::future::BoxFuture;
use scenario_proto::EndpointScenario;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::AbortHandle;
use tracing::debug;

/// Errors raised while creating an isolation context.
#[derive(Debug, thiserror::Error)]
pub enum IsolationError {
    #[error("failed to create isolation context for endpoint {endpoint}: {source}")]
    Create {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("isolation context for endpoint {endpoint} requires a running tokio runtime")]
    NoRuntime { endpoint: String },

    #[error("isolation context for endpoint {endpoint} was refused: {reason}")]
    Refused { endpoint: String, reason: String },
}

/// A sandbox hosting exactly one endpoint.
pub trait IsolationContext: Send + Sync {
    /// Name of the hosted endpoint.
    fn name(&self) -> &str;

    /// Runs `task` inside this context without waiting for it.
    fn spawn(&self, task: BoxFuture<'static, ()>);

    /// Tears the context down, reclaiming any work still in flight.
    fn destroy(self: Box<Self>);
}

/// Creates isolation contexts.
pub trait IsolationProvider: Send + Sync {
    fn create(
        &self,
        scenario: &EndpointScenario,
    ) -> Result<Box<dyn IsolationContext>, IsolationError>;
}

/// Returns the provider selected by `config`.
pub fn provider_for(config: &IsolationConfig) -> Arc<dyn IsolationProvider> {
    match config.kind {
        IsolationKind::Runtime => Arc::new(RuntimeIsolation::new(config.worker_threads)),
        IsolationKind::Task => Arc::new(TaskIsolation::new()),
    }
}

// =============================================================================
// RuntimeIsolation
// =============================================================================

/// Hosts each endpoint on its own tokio runtime.
#[derive(Debug, Clone)]
pub struct RuntimeIsolation {
    worker_threads: usize,
}

impl RuntimeIsolation {
    pub fn new(worker_threads: usize) -> Self {
        Self {
            worker_threads: worker_threads.max(1),
        }
    }
}

impl Default for RuntimeIsolation {
    fn default() -> Self {
        Self::new(1)
    }
}

impl IsolationProvider for RuntimeIsolation {
    fn create(
        &self,
        scenario: &EndpointScenario,
    ) -> Result<Box<dyn IsolationContext>, IsolationError> {
        let name = scenario.endpoint_name.clone();
        let runtime = Builder::new_multi_thread()
            .worker_threads(self.worker_threads)
            .thread_name(format!("{name}-worker"))
            .enable_all()
            .build()
            .map_err(|source| IsolationError::Create {
                endpoint: name.clone(),
                source,
            })?;

        debug!(endpoint = %name, workers = self.worker_threads, "Created endpoint runtime");
        Ok(Box::new(RuntimeContext {
            name,
            runtime: Some(runtime),
        }))
    }
}

struct RuntimeContext {
    name: String,
    runtime: Option<Runtime>,
}

impl IsolationContext for RuntimeContext {
    fn name(&self) -> &str {
        &self.name
    }

    fn spawn(&self, task: BoxFuture<'static, ()>) {
        if let Some(runtime) = &self.runtime {
            runtime.spawn(task);
        }
    }

    fn destroy(mut self: Box<Self>) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
            debug!(endpoint = %self.name, "Endpoint runtime shut down");
        }
    }
}

impl Drop for RuntimeContext {
    fn drop(&mut self) {
        // Dropping a runtime from async code panics; always shut down in the background.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

// =============================================================================
// TaskIsolation
// =============================================================================

/// Hosts each endpoint as a set of tasks on the caller's runtime.
///
/// Cheaper than [`RuntimeIsolation`] and compatible with paused tokio time,
/// at the cost of sharing worker threads with the host.
#[derive(Debug, Clone, Default)]
pub struct TaskIsolation;

impl TaskIsolation {
    pub fn new() -> Self {
        Self
    }
}

impl IsolationProvider for TaskIsolation {
    fn create(
        &self,
        scenario: &EndpointScenario,
    ) -> Result<Box<dyn IsolationContext>, IsolationError> {
        let handle = Handle::try_current().map_err(|_| IsolationError::NoRuntime {
            endpoint: scenario.endpoint_name.clone(),
        })?;

        debug!(endpoint = %scenario.endpoint_name, "Created task context");
        Ok(Box::new(TaskContext {
            name: scenario.endpoint_name.clone(),
            handle,
            tasks: Mutex::new(Vec::new()),
        }))
    }
}

struct TaskContext {
    name: String,
    handle: Handle,
    tasks: Mutex<Vec<AbortHandle>>,
}

impl IsolationContext for TaskContext {
    fn name(&self) -> &str {
        &self.name
    }

    fn spawn(&self, task: BoxFuture<'static, ()>) {
        let join = self.handle.spawn(task);
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(join.abort_handle());
    }

    fn destroy(self: Box<Self>) {
        let TaskContext { name, tasks, .. } = *self;
        let tasks = tasks.into_inner().unwrap_or_else(PoisonError::into_inner);
        let aborted = tasks.iter().filter(|t| !t.is_finished()).count();
        for task in tasks {
            task.abort();
        }
        debug!(endpoint = %name, aborted, "Task context destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn scenario(name: &str) -> EndpointScenario {
        EndpointScenario::new(name)
    }

    #[test]
    fn test_task_isolation_requires_runtime() {
        let result = TaskIsolation::new().create(&scenario("orphan"));
        assert!(matches!(result, Err(IsolationError::NoRuntime { .. })));
    }

    #[tokio::test]
    async fn test_task_context_runs_spawned_work() {
        let context = TaskIsolation::new().create(&scenario("worker")).unwrap();
        assert_eq!(context.name(), "worker");

        let (tx, rx) = tokio::sync::oneshot::channel();
        context.spawn(Box::pin(async move {
            let _ = tx.send(42);
        }));

        assert_eq!(rx.await.unwrap(), 42);
        context.destroy();
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_context_destroy_aborts_in_flight_work() {
        let context = TaskIsolation::new().create(&scenario("slow")).unwrap();
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);

        context.spawn(Box::pin(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            flag.store(true, Ordering::SeqCst);
        }));

        tokio::task::yield_now().await;
        context.destroy();
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_runtime_context_runs_on_named_thread() {
        let context = RuntimeIsolation::default()
            .create(&scenario("Receiver"))
            .unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel();
        context.spawn(Box::pin(async move {
            let name = std::thread::current().name().map(str::to_string);
            let _ = tx.send(name);
        }));

        let thread_name = rx.await.unwrap();
        assert_eq!(thread_name.as_deref(), Some("Receiver-worker"));
        context.destroy();
    }

    #[tokio::test]
    async fn test_runtime_context_destroy_drops_pending_work() {
        let context = RuntimeIsolation::new(2).create(&scenario("stuck")).unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        context.spawn(Box::pin(async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            let _ = tx.send(());
        }));

        context.destroy();
        // The sender is dropped with the cancelled task.
        assert!(rx.await.is_err());
    }

    #[test]
    fn test_provider_for_config() {
        let config = IsolationConfig {
            kind: IsolationKind::Runtime,
            worker_threads: 1,
        };
        let context = provider_for(&config).create(&scenario("plain")).unwrap();
        assert_eq!(context.name(), "plain");
        context.destroy();
    }
}
