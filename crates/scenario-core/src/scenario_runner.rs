//! The scenario runner: initialize, dispatch, watch, report, tear down.

use crate::config::RunnerConfig;
use crate::dispatch::dispatch;
use crate::error::ScenarioError;
use crate::initializer::initialize_runners;
use crate::isolation::{self, IsolationProvider};
use crate::report;
use crate::run_log::{RunLogger, RunRecord};
use crate::teardown::TeardownGuard;
use crate::watchdog::{Verdict, Watchdog, WatchdogOutcome};
use scenario_proto::ScenarioDescriptor;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// What a successful run observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Endpoint names, in registration order.
    pub endpoints: Vec<String>,
    /// Watchdog ticks until every endpoint was done.
    pub ticks: u32,
    /// Time from dispatch until the final tick.
    pub elapsed: Duration,
}

/// Runs batches of scenarios.
///
/// A runner can be reused; each call to [`run`](Self::run) creates fresh
/// contexts and endpoints and destroys them before returning.
pub struct ScenarioRunner {
    config: RunnerConfig,
    provider: Arc<dyn IsolationProvider>,
    run_log: Option<Mutex<RunLogger>>,
}

impl ScenarioRunner {
    /// Validates `config` and selects the configured isolation provider.
    pub fn new(config: RunnerConfig) -> Result<Self, ScenarioError> {
        config.validate()?;
        let provider = isolation::provider_for(&config.isolation);
        let run_log = config.run_log.clone().map(|path| Mutex::new(RunLogger::new(path)));
        Ok(Self {
            config,
            provider,
            run_log,
        })
    }

    /// Replaces the isolation provider.
    pub fn with_provider(mut self, provider: Arc<dyn IsolationProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Runs every scenario to completion.
    ///
    /// All isolation contexts created for the run are destroyed before this
    /// returns, whether the run succeeded or not.
    pub async fn run(
        &self,
        scenarios: &[Arc<dyn ScenarioDescriptor>],
    ) -> Result<RunSummary, ScenarioError> {
        let started = Instant::now();
        let endpoints: Vec<String> = scenarios
            .iter()
            .map(|s| s.scenario().endpoint_name)
            .collect();
        info!(endpoints = ?endpoints, "Scenario run starting");

        let result = self.execute(scenarios).await;

        match &result {
            Ok(summary) => info!(
                ticks = summary.ticks,
                elapsed_ms = summary.elapsed.as_millis() as u64,
                "Scenario run succeeded"
            ),
            Err(e) => warn!(error = %first_line(&e.to_string()), "Scenario run failed"),
        }

        self.record(endpoints, &result, started.elapsed());
        result
    }

    async fn execute(
        &self,
        scenarios: &[Arc<dyn ScenarioDescriptor>],
    ) -> Result<RunSummary, ScenarioError> {
        let mut guard = TeardownGuard::new();
        let outcome = self.perform(scenarios, &mut guard).await;
        let endpoints = guard.runners().iter().map(|r| r.name().to_string()).collect();
        guard.finish();

        let WatchdogOutcome {
            verdict,
            ticks,
            elapsed,
        } = outcome?;

        match verdict {
            Verdict::Succeeded => Ok(RunSummary {
                endpoints,
                ticks,
                elapsed,
            }),
            Verdict::AssertionsFailed(failures) => Err(ScenarioError::AssertionsFailed {
                report: failures.render(),
            }),
            Verdict::TimedOut(statuses) => Err(ScenarioError::TimedOut {
                report: report::render_timeout(self.config.max_duration(), elapsed, &statuses),
            }),
        }
    }

    async fn perform(
        &self,
        scenarios: &[Arc<dyn ScenarioDescriptor>],
        guard: &mut TeardownGuard,
    ) -> Result<WatchdogOutcome, ScenarioError> {
        initialize_runners(
            scenarios,
            self.provider.as_ref(),
            guard,
            self.config.max_duration(),
        )
        .await?;

        dispatch(guard.runners());
        Ok(Watchdog::new(guard.runners(), &self.config).run().await)
    }

    fn record(
        &self,
        endpoints: Vec<String>,
        result: &Result<RunSummary, ScenarioError>,
        elapsed: Duration,
    ) {
        let Some(run_log) = &self.run_log else {
            return;
        };
        let record = RunRecord::new(endpoints, result, elapsed);
        let Ok(mut logger) = run_log.lock() else {
            warn!("Run log lock poisoned, skipping record");
            return;
        };
        if let Err(e) = logger.log(&record) {
            warn!(path = %logger.path().display(), error = %e, "Failed to write run log");
        }
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or(text)
}

/// Runs `scenarios` with the default configuration.
pub async fn run_scenarios(
    scenarios: &[Arc<dyn ScenarioDescriptor>],
) -> Result<RunSummary, ScenarioError> {
    ScenarioRunner::new(RunnerConfig::default())?
        .run(scenarios)
        .await
}
