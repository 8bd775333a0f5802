//! End-to-end flow tests with in-memory indexer and signer stand-ins.

use gap_confirm::entity::{AttestPayload, CommunityData, Entity, GrantData};
use gap_confirm::flow::detect::{collection_len_at_least, uid_present};
use gap_confirm::flow::{ErrorContext, ErrorReporter};
use gap_confirm::indexer::{IndexerError, ListenerNotify, SnapshotSource};
use gap_confirm::{
    cancel_pair, wait_until_indexed, AttestationRequest, ConfirmationFlow, ConfirmationState,
    FlowOutcome, Journal, PollBudget, PollTarget, SignError, Signer, StateTracker, TxResult,
    WaitOutcome,
};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const NEW_UID: &str = "0x1212343456567878909012123434565678789090121234345656787890901212";

fn load_fixture(path: &str) -> Value {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../testdata");
    let full = root.join(path);
    let s =
        std::fs::read_to_string(&full).unwrap_or_else(|e| panic!("read {}: {}", full.display(), e));
    serde_json::from_str(&s).unwrap_or_else(|e| panic!("parse {}: {}", path, e))
}

/// Indexer stand-in: reflects the new UID from `reflect_on` fetches onward.
struct FakeIndex {
    reflect_on: Option<u32>,
    fetches: AtomicU32,
    notifies: AtomicU32,
    notify_fails: bool,
}

impl FakeIndex {
    fn new(reflect_on: Option<u32>) -> Self {
        Self {
            reflect_on,
            fetches: AtomicU32::new(0),
            notifies: AtomicU32::new(0),
            notify_fails: false,
        }
    }

    fn failing_notify(reflect_on: Option<u32>) -> Self {
        Self {
            notify_fails: true,
            ..Self::new(reflect_on)
        }
    }

    fn fetches(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl SnapshotSource for FakeIndex {
    async fn snapshot(&self, _target: &PollTarget) -> Result<Value, IndexerError> {
        let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        match self.reflect_on {
            Some(at) if n >= at => Ok(json!({ "milestones": [{ "uid": NEW_UID }] })),
            _ => Ok(json!({ "milestones": [] })),
        }
    }
}

impl ListenerNotify for FakeIndex {
    async fn notify_listener(&self, _key: &str, _chain_id: u64) -> Result<(), IndexerError> {
        self.notifies.fetch_add(1, Ordering::SeqCst);
        if self.notify_fails {
            Err(IndexerError::Api(503, "unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

struct FakeSigner {
    chain_id: u64,
    reject: bool,
}

impl Signer for FakeSigner {
    fn address(&self) -> &str {
        "0xactor"
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn sign_attestation(&self, _payload: &AttestPayload) -> Result<TxResult, SignError> {
        if self.reject {
            return Err(SignError::Rejected);
        }
        Ok(TxResult {
            tx_hashes: vec!["0xtxhash".into()],
            uid: NEW_UID.into(),
        })
    }
}

#[derive(Default)]
struct RecordingReporter {
    reports: Mutex<Vec<(String, String)>>,
}

impl ErrorReporter for RecordingReporter {
    fn report(
        &self,
        message: &str,
        _error: &(dyn std::error::Error + 'static),
        context: &ErrorContext,
        _user_message: &str,
    ) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push((message.to_string(), context.operation.clone()));
        }
    }
}

fn milestone_request() -> AttestationRequest {
    AttestationRequest {
        entity: Entity::Grant(GrantData {
            chain_id: 10,
            recipient: "0xactor".into(),
            community_uid: "0xcomm".into(),
            title: "Season 4".into(),
            description: "grant".into(),
            ..Default::default()
        }),
        actor: Some("0xactor".into()),
        operation: "grant_create".into(),
        target: PollTarget::ProjectMilestones {
            project_uid: "0xproject".into(),
        },
    }
}

fn quick_budget(max_attempts: u32) -> PollBudget {
    PollBudget {
        max_attempts,
        interval: Duration::from_millis(1500),
    }
}

fn flow_with(
    index: &Arc<FakeIndex>,
    reporter: &Arc<RecordingReporter>,
    budget: PollBudget,
) -> ConfirmationFlow<FakeIndex, RecordingReporter> {
    ConfirmationFlow::new(Arc::clone(index), Arc::clone(reporter)).with_budget(budget)
}

#[tokio::test(start_paused = true)]
async fn flow_reaches_indexed_with_monotonic_states() {
    let index = Arc::new(FakeIndex::new(Some(1)));
    let reporter = Arc::new(RecordingReporter::default());
    let flow = flow_with(&index, &reporter, quick_budget(10));
    let (tracker, _rx) = StateTracker::new();
    let (_cancel, token) = cancel_pair();

    let outcome = flow
        .run(
            &tracker,
            token,
            milestone_request(),
            &FakeSigner {
                chain_id: 10,
                reject: false,
            },
            uid_present(NEW_UID),
            None,
        )
        .await;

    assert!(matches!(outcome, FlowOutcome::Indexed { attempts: 1, .. }));
    assert_eq!(
        tracker.history(),
        vec![
            ConfirmationState::Preparing,
            ConfirmationState::Pending,
            ConfirmationState::Indexing,
            ConfirmationState::Indexed,
        ]
    );
    assert!(!tracker.is_active());
}

#[tokio::test(start_paused = true)]
async fn success_hook_fires_exactly_once() {
    let index = Arc::new(FakeIndex::new(Some(1)));
    let reporter = Arc::new(RecordingReporter::default());
    let flow = flow_with(&index, &reporter, quick_budget(10));
    let (tracker, _rx) = StateTracker::new();
    let (_cancel, token) = cancel_pair();

    let fired = Arc::new(AtomicU32::new(0));
    let fired_in_hook = Arc::clone(&fired);
    let outcome = flow
        .run(
            &tracker,
            token,
            milestone_request(),
            &FakeSigner {
                chain_id: 10,
                reject: false,
            },
            uid_present(NEW_UID),
            Some(Box::new(move |tx| {
                assert_eq!(tx.uid, NEW_UID);
                fired_in_hook.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .await;

    assert!(matches!(outcome, FlowOutcome::Indexed { .. }));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    // Loop exits on first success: exactly one fetch happened.
    assert_eq!(index.fetches(), 1);
}

#[tokio::test(start_paused = true)]
async fn reflected_on_third_attempt_takes_three_intervals() {
    let index = Arc::new(FakeIndex::new(Some(3)));
    let reporter = Arc::new(RecordingReporter::default());
    let flow = flow_with(&index, &reporter, quick_budget(10));
    let (tracker, _rx) = StateTracker::new();
    let (_cancel, token) = cancel_pair();

    let start = tokio::time::Instant::now();
    let outcome = flow
        .run(
            &tracker,
            token,
            milestone_request(),
            &FakeSigner {
                chain_id: 10,
                reject: false,
            },
            uid_present(NEW_UID),
            None,
        )
        .await;

    assert!(matches!(outcome, FlowOutcome::Indexed { attempts: 3, .. }));
    assert_eq!(start.elapsed(), Duration::from_millis(4500));
    assert_eq!(index.fetches(), 3);
}

#[tokio::test(start_paused = true)]
async fn budget_exhaustion_is_not_a_terminal_state() {
    let index = Arc::new(FakeIndex::new(None));
    let reporter = Arc::new(RecordingReporter::default());
    let flow = flow_with(&index, &reporter, PollBudget::default());
    let (tracker, _rx) = StateTracker::new();
    let (_cancel, token) = cancel_pair();

    let outcome = flow
        .run(
            &tracker,
            token,
            milestone_request(),
            &FakeSigner {
                chain_id: 10,
                reject: false,
            },
            uid_present(NEW_UID),
            None,
        )
        .await;

    assert!(matches!(
        outcome,
        FlowOutcome::Exhausted { attempts: 1000, .. }
    ));
    // Exactly the budget, never more.
    assert_eq!(index.fetches(), 1000);
    // No terminal transition: the machine stays at Indexing.
    assert_eq!(tracker.current(), ConfirmationState::Indexing);
    assert!(!tracker.is_active());
}

#[tokio::test(start_paused = true)]
async fn attest_rejection_goes_straight_to_error() {
    let index = Arc::new(FakeIndex::new(Some(1)));
    let reporter = Arc::new(RecordingReporter::default());
    let flow = flow_with(&index, &reporter, quick_budget(10));
    let (tracker, _rx) = StateTracker::new();
    let (_cancel, token) = cancel_pair();

    let outcome = flow
        .run(
            &tracker,
            token,
            milestone_request(),
            &FakeSigner {
                chain_id: 10,
                reject: true,
            },
            uid_present(NEW_UID),
            None,
        )
        .await;

    assert!(matches!(outcome, FlowOutcome::Failed(_)));
    assert_eq!(
        tracker.history(),
        vec![ConfirmationState::Preparing, ConfirmationState::Error]
    );
    // No poll loop started.
    assert_eq!(index.fetches(), 0);
    assert!(!tracker.is_active());
    let reports = reporter.reports.lock().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].1, "grant_create");
}

#[tokio::test(start_paused = true)]
async fn notify_failure_does_not_block_polling() {
    let index = Arc::new(FakeIndex::failing_notify(Some(2)));
    let reporter = Arc::new(RecordingReporter::default());
    let flow = flow_with(&index, &reporter, quick_budget(10));
    let (tracker, _rx) = StateTracker::new();
    let (_cancel, token) = cancel_pair();

    let outcome = flow
        .run(
            &tracker,
            token,
            milestone_request(),
            &FakeSigner {
                chain_id: 10,
                reject: false,
            },
            uid_present(NEW_UID),
            None,
        )
        .await;

    // Both notifications were attempted and failed; the flow went on anyway.
    assert_eq!(index.notifies.load(Ordering::SeqCst), 2);
    assert!(matches!(outcome, FlowOutcome::Indexed { attempts: 2, .. }));
}

#[tokio::test(start_paused = true)]
async fn spawned_flow_can_be_cancelled_mid_poll() {
    let index = Arc::new(FakeIndex::new(None));
    let reporter = Arc::new(RecordingReporter::default());
    let flow = flow_with(&index, &reporter, PollBudget::default());

    let handle = flow.spawn(
        milestone_request(),
        FakeSigner {
            chain_id: 10,
            reject: false,
        },
        uid_present(NEW_UID),
        None,
    );
    // Let the flow get into the poll loop, then pull the plug.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(handle.is_active());
    assert_eq!(handle.current_state(), ConfirmationState::Indexing);
    handle.cancel();
    let outcome = handle.join().await;
    assert!(matches!(outcome, FlowOutcome::Cancelled { .. }));
}

#[tokio::test(start_paused = true)]
async fn wait_until_indexed_counts_fetch_errors_against_budget() {
    struct FailingIndex;
    impl SnapshotSource for FailingIndex {
        async fn snapshot(&self, _target: &PollTarget) -> Result<Value, IndexerError> {
            Err(IndexerError::Api(500, "boom".to_string()))
        }
    }
    let (_cancel, mut token) = cancel_pair();
    let outcome = wait_until_indexed(
        &FailingIndex,
        &PollTarget::Project {
            uid: "0xproject".into(),
        },
        uid_present(NEW_UID),
        quick_budget(4),
        &mut token,
    )
    .await;
    assert_eq!(outcome, WaitOutcome::Exhausted { attempts: 4 });
}

#[tokio::test(start_paused = true)]
async fn flow_records_to_journal() {
    let tmp = tempfile::tempdir().unwrap();
    let journal = Arc::new(Journal::open(tmp.path().join("journal.sqlite")).unwrap());
    let index = Arc::new(FakeIndex::new(Some(1)));
    let reporter = Arc::new(RecordingReporter::default());
    let flow = flow_with(&index, &reporter, quick_budget(10)).with_journal(Arc::clone(&journal));
    let (tracker, _rx) = StateTracker::new();
    let (_cancel, token) = cancel_pair();

    let outcome = flow
        .run(
            &tracker,
            token,
            milestone_request(),
            &FakeSigner {
                chain_id: 10,
                reject: false,
            },
            uid_present(NEW_UID),
            None,
        )
        .await;
    assert!(matches!(outcome, FlowOutcome::Indexed { .. }));

    let runs = journal.recent(10).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].operation, "grant_create");
    assert_eq!(runs[0].outcome, "indexed");
    assert_eq!(runs[0].attempts, 1);
    assert_eq!(runs[0].entity_uid.as_deref(), Some(NEW_UID));
    assert_eq!(runs[0].tx_hash.as_deref(), Some("0xtxhash"));
}

#[test]
fn fixture_project_snapshot_predicates() {
    let snap = load_fixture("project.json");
    let grant_uid = "0xaaaa1111bbbb2222cccc3333dddd4444eeee5555ffff6666aaaa7777bbbb8888";
    assert!(uid_present(grant_uid)(&snap));
    assert!(!uid_present(NEW_UID)(&snap));
    assert!(collection_len_at_least("/grants", 1)(&snap));
    assert!(!collection_len_at_least("/milestones", 1)(&snap));
}

#[test]
fn fixture_milestones_snapshot_predicates() {
    let snap = load_fixture("project_milestones.json");
    assert!(uid_present(NEW_UID)(&snap));
    assert!(collection_len_at_least("/milestones", 2)(&snap));
    assert!(!collection_len_at_least("/milestones", 3)(&snap));
}

#[tokio::test]
async fn chain_mismatch_fails_before_signing() {
    let entity = Entity::Community(CommunityData {
        chain_id: 42161,
        recipient: "0xowner".into(),
        name: "Arbitrum".into(),
        description: "community".into(),
        ..Default::default()
    });
    let err = entity
        .attest(&FakeSigner {
            chain_id: 10,
            reject: false,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SignError::ChainMismatch {
            expected: 42161,
            actual: 10
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn concurrent_flows_do_not_share_state() {
    let reporter = Arc::new(RecordingReporter::default());
    let fast_index = Arc::new(FakeIndex::new(Some(1)));
    let slow_index = Arc::new(FakeIndex::new(None));
    let fast = flow_with(&fast_index, &reporter, quick_budget(10));
    let slow = flow_with(&slow_index, &reporter, quick_budget(5));

    let fast_handle = fast.spawn(
        milestone_request(),
        FakeSigner {
            chain_id: 10,
            reject: false,
        },
        uid_present(NEW_UID),
        None,
    );
    let slow_handle = slow.spawn(
        milestone_request(),
        FakeSigner {
            chain_id: 10,
            reject: false,
        },
        uid_present(NEW_UID),
        None,
    );

    let fast_outcome = fast_handle.join().await;
    assert!(matches!(fast_outcome, FlowOutcome::Indexed { .. }));
    // The fast flow settling must not have advanced or cleared the slow one.
    let slow_outcome = slow_handle.join().await;
    assert!(matches!(slow_outcome, FlowOutcome::Exhausted { .. }));
}
