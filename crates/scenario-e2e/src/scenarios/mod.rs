//! Sample endpoint scenarios.
//!
//! Each suite returns the descriptors for one orchestrated run; the
//! endpoints in a suite share an [`InMemoryBus`].
//!
//! | Suite                | Endpoints               | Expected outcome   |
//! |----------------------|-------------------------|--------------------|
//! | [`request_reply`]    | Requester, Responder    | success            |
//! | [`send_only`]        | SendOnly, Responder     | assertion failure  |
//! | [`deferred`]         | Scheduler               | success or timeout |

mod deferred;
mod request_reply;

pub use deferred::SchedulerScenario;
pub use request_reply::{RequesterScenario, ResponderScenario, SendOnlyScenario};

use crate::bus::{Inbox, InMemoryBus};
use scenario_proto::{Address, ScenarioDescriptor};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::warn;

/// Messages exchanged by the sample endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    Ping { seq: u32 },
    Pong { seq: u32 },
    Reminder { note: String },
}

/// A requester pinging a responder `pings` times.
pub fn request_reply(bus: &Arc<InMemoryBus>, pings: u32) -> Vec<Arc<dyn ScenarioDescriptor>> {
    vec![
        Arc::new(RequesterScenario::new(Arc::clone(bus), pings)),
        Arc::new(ResponderScenario::new(Arc::clone(bus), pings)),
    ]
}

/// A send-only endpoint pinging a responder that cannot reply.
pub fn send_only(bus: &Arc<InMemoryBus>) -> Vec<Arc<dyn ScenarioDescriptor>> {
    vec![
        Arc::new(SendOnlyScenario::new(Arc::clone(bus))),
        Arc::new(ResponderScenario::new(Arc::clone(bus), 1)),
    ]
}

/// An endpoint that reminds itself after `delay`.
pub fn deferred(bus: &Arc<InMemoryBus>, delay: Duration) -> Vec<Arc<dyn ScenarioDescriptor>> {
    vec![Arc::new(SchedulerScenario::new(Arc::clone(bus), delay))]
}

/// Completion flag and assertion failures, readable while the endpoint's
/// receive loop is still running.
#[derive(Debug, Default)]
pub(crate) struct EndpointState {
    done: AtomicBool,
    failures: Mutex<Vec<String>>,
}

impl EndpointState {
    pub(crate) fn complete(&self) {
        self.done.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    pub(crate) fn fail(&self, message: impl Into<String>) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.into());
    }

    pub(crate) fn failures(&self) -> Vec<String> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Inbox slot filled by `initialize` and drained by `apply_whens`.
#[derive(Debug, Default)]
pub(crate) struct InboxSlot(Mutex<Option<Inbox>>);

impl InboxSlot {
    /// Binds `address` on `bus`; false if the queue cannot be bound.
    pub(crate) fn bind(&self, bus: &InMemoryBus, address: &Address) -> bool {
        match bus.bind(address) {
            Ok(inbox) => {
                *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(inbox);
                true
            }
            Err(e) => {
                warn!(queue = %address, error = %e, "Failed to bind endpoint queue");
                false
            }
        }
    }

    pub(crate) fn is_bound(&self) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub(crate) fn take(&self) -> Option<Inbox> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}
