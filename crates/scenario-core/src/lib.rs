//! # scenario-core
//!
//! Core orchestration for end-to-end scenarios of message-driven endpoints.
//!
//! A run moves through five stages:
//! - **Initialization**: each scenario gets its own isolation context and
//!   endpoint, which is asked to initialize
//! - **Dispatch**: every endpoint's `start` + `apply_whens` runs on its own task
//! - **Watchdog**: a fixed-interval poll waits for all endpoints to be done,
//!   verifying assertions as each one finishes
//! - **Reporting**: failures or a timeout are rendered into a stable text report
//! - **Teardown**: every isolation context is destroyed exactly once, whatever
//!   the outcome
//!
//! ```no_run
//! use scenario_core::{RunnerConfig, ScenarioRunner};
//! use scenario_proto::ScenarioDescriptor;
//! use std::sync::Arc;
//!
//! # async fn demo(scenarios: Vec<Arc<dyn ScenarioDescriptor>>) -> Result<(), scenario_core::ScenarioError> {
//! let runner = ScenarioRunner::new(RunnerConfig::default())?;
//! let summary = runner.run(&scenarios).await?;
//! println!("{} endpoints passed in {} ticks", summary.endpoints.len(), summary.ticks);
//! # Ok(())
//! # }
//! ```

pub mod config;
mod dispatch;
mod error;
mod initializer;
pub mod isolation;
pub mod report;
mod runner;
pub mod run_log;
mod scenario_runner;
mod teardown;
pub mod testing;
pub mod watchdog;

pub use config::{ConfigError, FailurePolicy, IsolationConfig, IsolationKind, RunnerConfig};
pub use dispatch::{DispatchStage, dispatch};
pub use error::ScenarioError;
pub use initializer::initialize_runners;
pub use isolation::{
    IsolationContext, IsolationError, IsolationProvider, RuntimeIsolation, TaskIsolation,
};
pub use report::{EndpointFailures, EndpointStatus, FailureReport};
pub use run_log::{RunHistory, RunLogger, RunOutcome, RunRecord};
pub use runner::ActiveRunner;
pub use scenario_runner::{RunSummary, ScenarioRunner, run_scenarios};
pub use teardown::TeardownGuard;
pub use watchdog::{Deadline, FailureKind, Verdict, WatchState, Watchdog, WatchdogOutcome};
