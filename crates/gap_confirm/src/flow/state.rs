//! Confirmation state machine and its per-flow tracker.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Progress of one confirmation flow, as shown by a UI stepper.
///
/// `Indexed` and `Error` are terminal. Order matters: `advance` only ever
/// moves to a strictly later state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationState {
    Idle,
    Preparing,
    Pending,
    Indexing,
    Indexed,
    Error,
}

impl ConfirmationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Indexed | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Preparing => "preparing",
            Self::Pending => "pending",
            Self::Indexing => "indexing",
            Self::Indexed => "indexed",
            Self::Error => "error",
        }
    }
}

/// Per-flow state holder: a watch channel for live observation, a transition
/// history, and an activity bit standing in for the stepper-visible flag.
///
/// One tracker per flow run. There is no shared global; two concurrent flows
/// each own their tracker and cannot clobber each other.
pub struct StateTracker {
    tx: watch::Sender<ConfirmationState>,
    history: Mutex<Vec<ConfirmationState>>,
    active: AtomicBool,
}

impl StateTracker {
    pub fn new() -> (Arc<Self>, watch::Receiver<ConfirmationState>) {
        let (tx, rx) = watch::channel(ConfirmationState::Idle);
        let tracker = Arc::new(Self {
            tx,
            history: Mutex::new(Vec::new()),
            active: AtomicBool::new(false),
        });
        (tracker, rx)
    }

    /// Advance to `next`. Backward moves and moves out of a terminal state
    /// are ignored; returns whether the transition was applied.
    pub fn advance(&self, next: ConfirmationState) -> bool {
        let current = self.current();
        if current.is_terminal() || next <= current {
            return false;
        }
        self.tx.send_replace(next);
        if let Ok(mut history) = self.history.lock() {
            history.push(next);
        }
        true
    }

    pub fn current(&self) -> ConfirmationState {
        *self.tx.borrow()
    }

    /// Every applied transition, in order. `Idle` is not recorded.
    pub fn history(&self) -> Vec<ConfirmationState> {
        match self.history.lock() {
            Ok(history) => history.clone(),
            Err(_) => Vec::new(),
        }
    }

    /// Whether a flow run currently owns this tracker.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }
}
