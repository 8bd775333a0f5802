//! The attestation confirmation flow: attest, notify, poll until indexed.

use crate::entity::{Entity, SignError, Signer, TxResult};
use crate::flow::sink::{ErrorContext, ErrorReporter};
use crate::flow::state::{ConfirmationState, StateTracker};
use crate::indexer::{short, ListenerNotify, PollTarget, SnapshotSource};
use crate::journal::{FlowRecord, Journal};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const MAX_POLL_ATTEMPTS: u32 = 1000;
const POLL_INTERVAL_MS: u64 = 1500;

/// Bounded retry budget for the confirmation poll loop.
#[derive(Clone, Copy, Debug)]
pub struct PollBudget {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PollBudget {
    fn default() -> Self {
        Self {
            max_attempts: MAX_POLL_ATTEMPTS,
            interval: Duration::from_millis(POLL_INTERVAL_MS),
        }
    }
}

/// Cancels the flow it was paired with.
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Receiving half given to the flow; checked between (and during) sleeps.
pub struct CancelToken {
    rx: watch::Receiver<bool>,
    // Keeps `changed` pending forever for tokens made by `never`.
    _keep: Option<watch::Sender<bool>>,
}

pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx, _keep: None })
}

impl CancelToken {
    /// A token that can never fire, for flows nobody intends to cancel.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _keep: Some(tx),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Sleep for `interval`, returning early with `true` if cancelled.
    async fn cancelled_within(&mut self, interval: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + interval;
        loop {
            match tokio::time::timeout_at(deadline, self.rx.changed()).await {
                Ok(Ok(())) => {
                    if *self.rx.borrow() {
                        return true;
                    }
                }
                Ok(Err(_)) => {
                    // Handle dropped: no cancellation can arrive any more.
                    tokio::time::sleep_until(deadline).await;
                    return false;
                }
                Err(_) => return false,
            }
        }
    }
}

/// Result of the poll-only half of the flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Predicate held on attempt `attempts`.
    Reflected { attempts: u32 },
    /// Budget ran out with the predicate never holding.
    Exhausted { attempts: u32 },
    Cancelled { attempts: u32 },
}

/// Poll `target` until `is_reflected` holds on a fresh snapshot.
///
/// Strictly sequential: sleep one interval, fetch, test, repeat. A fetch
/// error counts against the budget the same as "not yet indexed". At most
/// `budget.max_attempts` fetches are issued.
pub async fn wait_until_indexed<X, P>(
    index: &X,
    target: &PollTarget,
    mut is_reflected: P,
    budget: PollBudget,
    cancel: &mut CancelToken,
) -> WaitOutcome
where
    X: SnapshotSource,
    P: FnMut(&Value) -> bool + Send,
{
    for attempt in 1..=budget.max_attempts {
        if cancel.cancelled_within(budget.interval).await {
            debug!(attempt, "poll cancelled");
            return WaitOutcome::Cancelled {
                attempts: attempt - 1,
            };
        }
        match index.snapshot(target).await {
            Ok(snapshot) => {
                if is_reflected(&snapshot) {
                    info!(attempt, target = target.kind(), "attestation reflected");
                    return WaitOutcome::Reflected { attempts: attempt };
                }
                debug!(attempt, target = target.kind(), "not yet reflected");
            }
            Err(e) => {
                debug!(attempt, error = %e, "snapshot fetch failed");
            }
        }
    }
    WaitOutcome::Exhausted {
        attempts: budget.max_attempts,
    }
}

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("attest: {0}")]
    Attest(#[from] SignError),
    #[error("task: {0}")]
    Task(String),
}

/// Caller-visible settlement of one flow run.
///
/// `Exhausted` deliberately leaves the state machine at `Indexing` with no
/// terminal transition; surfacing a timeout to users is the caller's call.
#[derive(Debug)]
pub enum FlowOutcome {
    Indexed {
        attempts: u32,
        tx: TxResult,
    },
    Exhausted {
        attempts: u32,
        tx: TxResult,
    },
    Cancelled {
        attempts: u32,
    },
    Failed(FlowError),
}

impl FlowOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Indexed { .. } => "indexed",
            Self::Exhausted { .. } => "exhausted",
            Self::Cancelled { .. } => "cancelled",
            Self::Failed(_) => "error",
        }
    }
}

/// One pending write: the entity to attest plus call-site context.
#[derive(Clone, Debug)]
pub struct AttestationRequest {
    pub entity: Entity,
    /// Address of the acting user, for error reports.
    pub actor: Option<String>,
    /// Call-site operation name, e.g. `grant_create` or `milestone_complete`.
    pub operation: String,
    /// Resource re-fetched while waiting for the indexer.
    pub target: PollTarget,
}

/// Success hook, fired exactly once when the flow reaches `Indexed`.
pub type OnIndexed = Box<dyn FnOnce(&TxResult) + Send>;

/// Drives a transaction through signing, submission, listener notification,
/// and confirmation polling.
///
/// One instance can serve many runs; each run owns its own `StateTracker`
/// and cancel token, so concurrent flows do not interfere.
pub struct ConfirmationFlow<X, R> {
    index: Arc<X>,
    reporter: Arc<R>,
    journal: Option<Arc<Journal>>,
    budget: PollBudget,
}

impl<X, R> Clone for ConfirmationFlow<X, R> {
    fn clone(&self) -> Self {
        Self {
            index: Arc::clone(&self.index),
            reporter: Arc::clone(&self.reporter),
            journal: self.journal.clone(),
            budget: self.budget,
        }
    }
}

struct ActivityGuard<'a>(&'a StateTracker);

impl Drop for ActivityGuard<'_> {
    fn drop(&mut self) {
        // Cleared on every exit path, including unwinds.
        self.0.set_active(false);
    }
}

impl<X, R> ConfirmationFlow<X, R>
where
    X: SnapshotSource + ListenerNotify,
    R: ErrorReporter,
{
    pub fn new(index: Arc<X>, reporter: Arc<R>) -> Self {
        Self {
            index,
            reporter,
            journal: None,
            budget: PollBudget::default(),
        }
    }

    #[must_use]
    pub fn with_journal(mut self, journal: Arc<Journal>) -> Self {
        self.journal = Some(journal);
        self
    }

    #[must_use]
    pub fn with_budget(mut self, budget: PollBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Run the flow to settlement.
    ///
    /// `preparing` → attest → `pending` → best-effort listener notification
    /// (by tx hash, then by attestation UID) → `indexing` → poll loop →
    /// `indexed`, or `error` if the attest call fails. The tracker's activity
    /// bit is cleared whichever way the run settles.
    pub async fn run<S, P>(
        &self,
        tracker: &StateTracker,
        mut cancel: CancelToken,
        request: AttestationRequest,
        signer: &S,
        is_reflected: P,
        on_indexed: Option<OnIndexed>,
    ) -> FlowOutcome
    where
        S: Signer,
        P: FnMut(&Value) -> bool + Send,
    {
        let started = OffsetDateTime::now_utc().unix_timestamp();
        tracker.set_active(true);
        let _guard = ActivityGuard(tracker);

        tracker.advance(ConfirmationState::Preparing);
        let tx = match request.entity.attest(signer).await {
            Ok(tx) => tx,
            Err(e) => {
                let context = ErrorContext {
                    operation: request.operation.clone(),
                    entity_kind: request.entity.kind().as_str(),
                    entity_uid: request.entity.uid().map(str::to_string),
                    actor: request.actor.clone(),
                    chain_id: request.entity.chain_id(),
                };
                self.reporter.report(
                    "attestation submission failed",
                    &e,
                    &context,
                    "There was an error submitting this change. Please try again.",
                );
                tracker.advance(ConfirmationState::Error);
                let outcome = FlowOutcome::Failed(FlowError::Attest(e));
                self.record(&request, &outcome, 0, None, started);
                return outcome;
            }
        };
        tracker.advance(ConfirmationState::Pending);
        info!(
            operation = %request.operation,
            uid = %short(&tx.uid),
            "attestation submitted"
        );

        // Failures here are ignored: the indexer follows the chain on its own.
        if let Some(hash) = tx.tx_hashes.first() {
            if let Err(e) = self.index.notify_listener(hash, request.entity.chain_id()).await {
                debug!(error = %e, "listener notification by tx hash failed");
            }
        }
        if let Err(e) = self.index.notify_listener(&tx.uid, request.entity.chain_id()).await {
            debug!(error = %e, "listener notification by uid failed");
        }

        tracker.advance(ConfirmationState::Indexing);
        let wait = wait_until_indexed(
            self.index.as_ref(),
            &request.target,
            is_reflected,
            self.budget,
            &mut cancel,
        )
        .await;

        let outcome = match wait {
            WaitOutcome::Reflected { attempts } => {
                tracker.advance(ConfirmationState::Indexed);
                if let Some(hook) = on_indexed {
                    hook(&tx);
                }
                FlowOutcome::Indexed {
                    attempts,
                    tx: tx.clone(),
                }
            }
            WaitOutcome::Exhausted { attempts } => {
                warn!(
                    operation = %request.operation,
                    attempts,
                    "poll budget exhausted before the indexer reflected the attestation"
                );
                FlowOutcome::Exhausted {
                    attempts,
                    tx: tx.clone(),
                }
            }
            WaitOutcome::Cancelled { attempts } => FlowOutcome::Cancelled { attempts },
        };
        self.record(&request, &outcome, wait_attempts(wait), Some(&tx), started);
        outcome
    }

    /// Run on a fresh task; returns a handle exposing live state, the
    /// activity bit, cancellation, and the eventual outcome.
    pub fn spawn<S, P>(
        &self,
        request: AttestationRequest,
        signer: S,
        is_reflected: P,
        on_indexed: Option<OnIndexed>,
    ) -> FlowHandle
    where
        X: 'static,
        R: 'static,
        S: Signer + 'static,
        P: FnMut(&Value) -> bool + Send + 'static,
    {
        let flow = self.clone();
        let (tracker, states) = StateTracker::new();
        let (cancel, token) = cancel_pair();
        let task_tracker = Arc::clone(&tracker);
        let task = tokio::spawn(async move {
            flow.run(&task_tracker, token, request, &signer, is_reflected, on_indexed)
                .await
        });
        FlowHandle {
            states,
            tracker,
            cancel,
            task,
        }
    }

    fn record(
        &self,
        request: &AttestationRequest,
        outcome: &FlowOutcome,
        attempts: u32,
        tx: Option<&TxResult>,
        started: i64,
    ) {
        let Some(journal) = &self.journal else {
            return;
        };
        let record = FlowRecord {
            key: Journal::key_for_request(&request.entity, &request.operation),
            entity_kind: request.entity.kind().as_str().to_string(),
            entity_uid: tx
                .map(|t| t.uid.clone())
                .or_else(|| request.entity.uid().map(str::to_string)),
            tx_hash: tx.and_then(|t| t.tx_hashes.first().cloned()),
            chain_id: request.entity.chain_id(),
            operation: request.operation.clone(),
            outcome: outcome.label().to_string(),
            attempts,
            started_utc: started,
            finished_utc: OffsetDateTime::now_utc().unix_timestamp(),
        };
        if let Err(e) = journal.record(&record) {
            // A journal failure must never fail a flow.
            warn!(error = %e, "journal write failed");
        }
    }
}

fn wait_attempts(wait: WaitOutcome) -> u32 {
    match wait {
        WaitOutcome::Reflected { attempts }
        | WaitOutcome::Exhausted { attempts }
        | WaitOutcome::Cancelled { attempts } => attempts,
    }
}

/// Handle to a spawned flow run.
pub struct FlowHandle {
    states: watch::Receiver<ConfirmationState>,
    tracker: Arc<StateTracker>,
    cancel: CancelHandle,
    task: JoinHandle<FlowOutcome>,
}

impl FlowHandle {
    /// Live view of the state machine, for driving a stepper.
    pub fn states(&self) -> watch::Receiver<ConfirmationState> {
        self.states.clone()
    }

    pub fn current_state(&self) -> ConfirmationState {
        self.tracker.current()
    }

    /// Per-flow replacement for the old process-wide stepper flag.
    pub fn is_active(&self) -> bool {
        self.tracker.is_active()
    }

    /// Interrupt the poll loop, including mid-sleep.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn join(self) -> FlowOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => FlowOutcome::Failed(FlowError::Task(e.to_string())),
        }
    }
}
