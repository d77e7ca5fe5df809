//! # scenario-e2e
//!
//! End-to-end scenarios for the orchestrator, built on a small in-memory
//! message bus.
//!
//! Each suite in [`scenarios`] wires real endpoints (request/reply,
//! send-only, deferred delivery) to a shared [`InMemoryBus`] and hands their
//! descriptors to a [`ScenarioRunner`](scenario_core::ScenarioRunner).
//!
//! ```no_run
//! use scenario_core::run_scenarios;
//! use scenario_e2e::{InMemoryBus, scenarios};
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), scenario_core::ScenarioError> {
//! let bus = Arc::new(InMemoryBus::new());
//! run_scenarios(&scenarios::request_reply(&bus, 3)).await?;
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod scenarios;

pub use bus::{BusError, Envelope, InMemoryBus, Inbox};
pub use scenarios::Message;
