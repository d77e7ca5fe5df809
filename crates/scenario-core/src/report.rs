//! Failure aggregation and the two report formats.
//!
//! Both formats are stable so tests can diff them:
//!
//! ```text
//! The test failed because of the following assertions not being met
//! ----------------------------------------------------------------------------
//! Endpoint: Receiver
//!     expected message X, got Y
//!
//! ****************************************************************************
//!
//! ```
//!
//! ```text
//! The maximum time limit for this test(10s) has been reached after 10.02s
//! ----------------------------------------------------------------------------
//! Endpoint statuses:
//! Sender - Done
//! Receiver - Not done
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

const SEPARATOR: &str =
    "----------------------------------------------------------------------------";
const BLOCK_END: &str =
    "****************************************************************************";

/// Failures recorded for a single endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointFailures {
    pub endpoint: String,
    pub messages: Vec<String>,
}

/// Endpoint name to failure messages, iterated in endpoint registration
/// order regardless of the order failures were discovered in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureReport {
    entries: BTreeMap<usize, EndpointFailures>,
}

impl FailureReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records failures for the endpoint registered at `index`.
    ///
    /// Empty `messages` are ignored so the report only names endpoints that
    /// actually failed.
    pub fn record(&mut self, index: usize, endpoint: &str, messages: Vec<String>) {
        if messages.is_empty() {
            return;
        }
        self.entries
            .entry(index)
            .or_insert_with(|| EndpointFailures {
                endpoint: endpoint.to_string(),
                messages: Vec::new(),
            })
            .messages
            .extend(messages);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of endpoints with failures.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Failures recorded for the named endpoint.
    pub fn get(&self, endpoint: &str) -> Option<&[String]> {
        self.iter()
            .find(|f| f.endpoint == endpoint)
            .map(|f| f.messages.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &EndpointFailures> {
        self.entries.values()
    }

    /// Names of the failing endpoints, in registration order.
    pub fn endpoints(&self) -> Vec<String> {
        self.iter().map(|f| f.endpoint.clone()).collect()
    }

    /// Renders the assertion failure report.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("The test failed because of the following assertions not being met\n");
        out.push_str(SEPARATOR);
        out.push('\n');

        for failure in self.iter() {
            out.push_str(&format!("Endpoint: {}\n", failure.endpoint));
            for message in &failure.messages {
                out.push_str(&format!("    {message}\n"));
            }
            out.push('\n');
            out.push_str(BLOCK_END);
            out.push_str("\n\n");
        }

        out
    }
}

/// Last known completion status of an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointStatus {
    pub endpoint: String,
    pub done: bool,
}

impl EndpointStatus {
    pub fn label(&self) -> &'static str {
        if self.done { "Done" } else { "Not done" }
    }
}

/// Renders the timeout report: one status line per endpoint.
pub fn render_timeout(max_duration: Duration, elapsed: Duration, statuses: &[EndpointStatus]) -> String {
    let mut out = format!(
        "The maximum time limit for this test({}s) has been reached after {:.2}s\n",
        max_duration.as_secs_f64(),
        elapsed.as_secs_f64()
    );
    out.push_str(SEPARATOR);
    out.push('\n');
    out.push_str("Endpoint statuses:\n");
    for status in statuses {
        out.push_str(&format!("{} - {}\n", status.endpoint, status.label()));
    }
    out
}
