//! Delivery settings attached to outgoing messages.
//!
//! These are plain data carried by endpoint runtimes. The orchestrator never
//! inspects them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Why a message is being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageIntent {
    /// Point-to-point command.
    #[default]
    Send,
    /// Event fanned out to subscribers.
    Publish,
    /// Subscription request.
    Subscribe,
    /// Subscription removal.
    Unsubscribe,
    /// Response to a previously received message.
    Reply,
}

/// Errors produced while parsing an [`Address`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,

    #[error("address '{0}' has an empty queue name")]
    MissingQueue(String),

    #[error("address '{0}' contains more than one '@'")]
    Malformed(String),
}

/// A queue on a machine, written `queue@machine`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub queue: String,
    pub machine: String,
}

impl Address {
    /// Machine used when an address omits one.
    pub const LOCAL_MACHINE: &'static str = "localhost";

    /// Creates an address from its parts.
    pub fn new(queue: impl Into<String>, machine: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            machine: machine.into(),
        }
    }

    /// Creates an address for a queue on the local machine.
    pub fn local(queue: impl Into<String>) -> Self {
        Self::new(queue, Self::LOCAL_MACHINE)
    }

    /// Parses `queue@machine` or a bare `queue`.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(AddressError::Empty);
        }

        let mut parts = trimmed.split('@');
        let queue = parts.next().unwrap_or_default();
        let machine = parts.next();
        if parts.next().is_some() {
            return Err(AddressError::Malformed(trimmed.to_string()));
        }
        if queue.is_empty() {
            return Err(AddressError::MissingQueue(trimmed.to_string()));
        }

        match machine {
            Some(m) if !m.is_empty() => Ok(Self::new(queue, m)),
            _ => Ok(Self::local(queue)),
        }
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.queue, self.machine)
    }
}

/// Errors produced while building [`SendOptions`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendOptionsError {
    #[error(
        "Can't reply with null reply-to-address field. It can happen if you are using a send-only endpoint"
    )]
    MissingReplyAddress,

    #[error(transparent)]
    Address(#[from] AddressError),
}

/// Per-message delivery options.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SendOptions {
    pub intent: MessageIntent,
    pub destination: Option<Address>,
    pub correlation_id: Option<String>,
    pub reply_to_address: Option<Address>,
    pub deliver_at: Option<DateTime<Utc>>,
    pub delay_delivery_with: Option<Duration>,
}

impl SendOptions {
    /// Options for a plain send with no destination yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for a send to `destination`.
    pub fn to(destination: Address) -> Self {
        Self {
            destination: Some(destination),
            ..Self::default()
        }
    }

    /// Options for a send to a destination given as `queue@machine`.
    pub fn parse_destination(destination: &str) -> Result<Self, SendOptionsError> {
        Ok(Self::to(Address::parse(destination)?))
    }

    /// Options for replying to the sender of a received message.
    ///
    /// Fails when the received message carried no reply-to address, which
    /// happens when it came from a send-only endpoint.
    pub fn reply_to(reply_to_address: Option<Address>) -> Result<Self, SendOptionsError> {
        let address = reply_to_address.ok_or(SendOptionsError::MissingReplyAddress)?;
        Ok(Self {
            intent: MessageIntent::Reply,
            ..Self::to(address)
        })
    }

    /// Sets the correlation id.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Sets the address replies should go to.
    pub fn with_reply_to_address(mut self, address: Address) -> Self {
        self.reply_to_address = Some(address);
        self
    }

    /// Defers delivery until `at`.
    pub fn deliver_at(mut self, at: DateTime<Utc>) -> Self {
        self.deliver_at = Some(at);
        self
    }

    /// Defers delivery by `delay`.
    pub fn delay_delivery_with(mut self, delay: Duration) -> Self {
        self.delay_delivery_with = Some(delay);
        self
    }

    /// Returns true if either deferral option is set.
    pub fn is_deferred(&self) -> bool {
        self.deliver_at.is_some() || self.delay_delivery_with.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_intent_is_send() {
        let options = SendOptions::new();
        assert_eq!(options.intent, MessageIntent::Send);
        assert!(options.destination.is_none());
        assert!(!options.is_deferred());
    }

    #[test]
    fn test_parse_address_with_machine() {
        let address = Address::parse("orders@server01").unwrap();
        assert_eq!(address.queue, "orders");
        assert_eq!(address.machine, "server01");
        assert_eq!(address.to_string(), "orders@server01");
    }

    #[test]
    fn test_parse_address_defaults_machine() {
        let address: Address = "billing".parse().unwrap();
        assert_eq!(address, Address::local("billing"));

        let trailing = Address::parse("billing@").unwrap();
        assert_eq!(trailing.machine, Address::LOCAL_MACHINE);
    }

    #[test]
    fn test_parse_address_rejects_bad_input() {
        assert_eq!(Address::parse("  "), Err(AddressError::Empty));
        assert!(matches!(
            Address::parse("@server"),
            Err(AddressError::MissingQueue(_))
        ));
        assert!(matches!(
            Address::parse("a@b@c"),
            Err(AddressError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_destination() {
        let options = SendOptions::parse_destination("audit@box").unwrap();
        assert_eq!(options.destination, Some(Address::new("audit", "box")));
        assert_eq!(options.intent, MessageIntent::Send);

        let err = SendOptions::parse_destination("").unwrap_err();
        assert_eq!(err, SendOptionsError::Address(AddressError::Empty));
    }

    #[test]
    fn test_reply_to_sets_intent_and_destination() {
        let options = SendOptions::reply_to(Some(Address::local("client"))).unwrap();
        assert_eq!(options.intent, MessageIntent::Reply);
        assert_eq!(options.destination, Some(Address::local("client")));
    }

    #[test]
    fn test_reply_to_without_address_fails() {
        let err = SendOptions::reply_to(None).unwrap_err();
        assert_eq!(err, SendOptionsError::MissingReplyAddress);
        assert!(err.to_string().contains("send-only endpoint"));
    }

    #[test]
    fn test_deferral_builders() {
        let options = SendOptions::to(Address::local("timeouts"))
            .with_correlation_id("abc")
            .delay_delivery_with(Duration::from_secs(5));
        assert!(options.is_deferred());
        assert_eq!(options.correlation_id.as_deref(), Some("abc"));

        let at = Utc::now();
        let options = SendOptions::new().deliver_at(at);
        assert_eq!(options.deliver_at, Some(at));
    }

    #[test]
    fn test_intent_serializes_snake_case() {
        let json = serde_json::to_string(&MessageIntent::Unsubscribe).unwrap();
        assert_eq!(json, "\"unsubscribe\"");
    }
}
