//! The completion watchdog.
//!
//! A cooperative, fixed-interval poll over every active endpoint. There is
//! no push notification from endpoints: each tick asks `done()` of every
//! endpoint, verifies newly finished ones exactly once, and decides whether
//! the run is over.
//!
//! ```text
//!            ┌──────────┐  all done, no failures   ┌───────────┐
//!   start ──▶│ Polling  │─────────────────────────▶│ Succeeded │
//!            └──────────┘                          └───────────┘
//!              │     │ failures recorded        ┌──────────────────────┐
//!              │     └─────────────────────────▶│ Failed(Assertions)   │
//!              │ deadline passed                └──────────────────────┘
//!              └───────────────────────────────▶ Failed(Timeout)
//! ```

use crate::config::{FailurePolicy, RunnerConfig};
use crate::report::{EndpointStatus, FailureReport};
use crate::runner::ActiveRunner;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Why a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Assertions,
    Timeout,
}

/// Watchdog state after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Polling,
    Succeeded,
    Failed(FailureKind),
}

/// The absolute point after which a run is declared failed.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    max: Duration,
}

impl Deadline {
    /// A deadline `max` from now.
    pub fn starting_now(max: Duration) -> Self {
        Self {
            started: Instant::now(),
            max,
        }
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// True once strictly more than `max` has elapsed.
    pub fn has_passed(&self) -> bool {
        self.elapsed() > self.max
    }
}

/// Final decision of the watchdog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Succeeded,
    AssertionsFailed(FailureReport),
    TimedOut(Vec<EndpointStatus>),
}

impl Verdict {
    pub fn is_success(&self) -> bool {
        matches!(self, Verdict::Succeeded)
    }
}

/// Verdict plus timing information.
#[derive(Debug, Clone)]
pub struct WatchdogOutcome {
    pub verdict: Verdict,
    /// Number of ticks polled, including the terminal one.
    pub ticks: u32,
    pub elapsed: Duration,
}

/// Polls a set of active runners until they finish, fail, or time out.
pub struct Watchdog<'a> {
    runners: &'a [ActiveRunner],
    poll_interval: Duration,
    max_duration: Duration,
    policy: FailurePolicy,
    verified: Vec<bool>,
    failures: FailureReport,
    ticks: u32,
}

impl<'a> Watchdog<'a> {
    pub fn new(runners: &'a [ActiveRunner], config: &RunnerConfig) -> Self {
        Self {
            runners,
            poll_interval: config.poll_interval(),
            max_duration: config.max_duration(),
            policy: config.failure_policy,
            verified: vec![false; runners.len()],
            failures: FailureReport::new(),
            ticks: 0,
        }
    }

    /// Performs one scan over every runner.
    ///
    /// A runner that is done and not yet verified has its failures collected
    /// exactly once. Under [`FailurePolicy::FailFast`] the scan stops at the
    /// first runner reporting failures; the remaining runners are not asked
    /// anything this tick.
    pub fn tick(&mut self) -> WatchState {
        self.ticks += 1;
        let mut all_done = true;

        for (index, runner) in self.runners.iter().enumerate() {
            if !runner.is_done() {
                all_done = false;
                continue;
            }
            if self.verified[index] {
                continue;
            }

            self.verified[index] = true;
            let failures = runner.collect_failures();
            if failures.is_empty() {
                debug!(endpoint = %runner.name(), tick = self.ticks, "Endpoint done, assertions passed");
                continue;
            }

            warn!(
                endpoint = %runner.name(),
                failures = failures.len(),
                tick = self.ticks,
                "Endpoint reported assertion failures"
            );
            self.failures.record(index, runner.name(), failures);
            if self.policy == FailurePolicy::FailFast {
                break;
            }
        }

        if !self.failures.is_empty() {
            WatchState::Failed(FailureKind::Assertions)
        } else if all_done {
            WatchState::Succeeded
        } else {
            WatchState::Polling
        }
    }

    /// Failures recorded so far.
    pub fn failures(&self) -> &FailureReport {
        &self.failures
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    /// Current `done` status of every runner, in registration order.
    pub fn statuses(&self) -> Vec<EndpointStatus> {
        self.runners
            .iter()
            .map(|runner| EndpointStatus {
                endpoint: runner.name().to_string(),
                done: runner.is_done(),
            })
            .collect()
    }

    /// Polls until a terminal state is reached.
    ///
    /// The deadline starts when this is called. Each non-terminal tick sleeps
    /// the poll interval, then checks the deadline.
    pub async fn run(mut self) -> WatchdogOutcome {
        let deadline = Deadline::starting_now(self.max_duration);
        info!(
            endpoints = self.runners.len(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            max_duration_ms = self.max_duration.as_millis() as u64,
            "Watchdog started"
        );

        loop {
            match self.tick() {
                WatchState::Succeeded => {
                    return self.finish(Verdict::Succeeded, &deadline);
                }
                WatchState::Failed(_) => {
                    let failures = std::mem::take(&mut self.failures);
                    return self.finish(Verdict::AssertionsFailed(failures), &deadline);
                }
                WatchState::Polling => {
                    debug!(tick = self.ticks, "Waiting for endpoints");
                }
            }

            tokio::time::sleep(self.poll_interval).await;

            if deadline.has_passed() {
                warn!(
                    tick = self.ticks,
                    elapsed_ms = deadline.elapsed().as_millis() as u64,
                    "Deadline passed before every endpoint was done"
                );
                let statuses = self.statuses();
                return self.finish(Verdict::TimedOut(statuses), &deadline);
            }
        }
    }

    fn finish(&self, verdict: Verdict, deadline: &Deadline) -> WatchdogOutcome {
        let elapsed = deadline.elapsed();
        info!(
            ticks = self.ticks,
            elapsed_ms = elapsed.as_millis() as u64,
            success = verdict.is_success(),
            "Watchdog finished"
        );
        WatchdogOutcome {
            verdict,
            ticks: self.ticks,
            elapsed,
        }
    }
}
