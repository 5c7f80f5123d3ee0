//! Human-in-the-loop signal slot.
//!
//! One slot per workflow instance. The approval task parks on it until a
//! decision arrives; delivery comes from outside the run (CLI prompt, HTTP
//! form, API). A decision is consumed by the approval it resumes.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::error::{Error, Result};

#[derive(Debug)]
struct SignalState {
    slot: watch::Sender<Option<String>>,
    waiting: watch::Sender<bool>,
}

/// Single-slot decision signal shared between a run and its deliverers.
///
/// Two approvals waiting at the same time in one instance would race for
/// the same decision; runs are sequential, so only one approval can wait.
#[derive(Debug, Clone)]
pub struct HumanInLoopSignal {
    state: Arc<SignalState>,
}

impl HumanInLoopSignal {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        let (waiting, _) = watch::channel(false);
        Self {
            state: Arc::new(SignalState { slot, waiting }),
        }
    }

    /// Store a decision, waking the waiting approval if there is one.
    pub fn deliver(&self, decision: impl Into<String>) {
        let decision = decision.into();
        debug!(decision = %decision, "Delivering approval decision");
        self.state.slot.send_replace(Some(decision));
    }

    /// Decision currently held, if any.
    pub fn pending_decision(&self) -> Option<String> {
        self.state.slot.borrow().clone()
    }

    /// Whether an approval is parked on this slot.
    pub fn is_waiting(&self) -> bool {
        *self.state.waiting.borrow()
    }

    /// Receiver notified whenever an approval parks on or leaves the slot.
    pub fn subscribe_waiting(&self) -> watch::Receiver<bool> {
        self.state.waiting.subscribe()
    }

    /// Park until a decision is available, then take it.
    pub async fn wait(&self) -> Result<String> {
        let mut rx = self.state.slot.subscribe();
        self.state.waiting.send_replace(true);

        loop {
            if rx.wait_for(Option::is_some).await.is_err() {
                self.state.waiting.send_replace(false);
                return Err(Error::Execution("Approval signal closed".into()));
            }
            // Clear the flag first so no observer sees a waiting slot with nothing in it
            self.state.waiting.send_replace(false);
            if let Some(decision) = self.state.slot.send_replace(None) {
                return Ok(decision);
            }
            self.state.waiting.send_replace(true);
        }
    }
}

impl Default for HumanInLoopSignal {
    fn default() -> Self {
        Self::new()
    }
}
