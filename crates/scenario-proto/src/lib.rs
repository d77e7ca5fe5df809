//! # scenario-proto
//!
//! Shared types for the Scenario Orchestrator.
//!
//! This crate defines the contract between the orchestrator and the
//! endpoints it drives:
//! - [`EndpointRunner`]: the lifecycle every endpoint under test exposes
//! - [`ScenarioDescriptor`]: a factory producing one endpoint per run
//! - [`SendOptions`]: plain delivery settings used by endpoint runtimes

mod endpoint;
mod scenario;
pub mod send_options;

pub use endpoint::{EndpointError, EndpointResult, EndpointRunner};
pub use scenario::{EndpointScenario, ScenarioDescriptor};
pub use send_options::{Address, AddressError, MessageIntent, SendOptions, SendOptionsError};
