//! gap_confirm — attestation confirmation flow for Karma GAP.
//!
//! Drives a signed attestation through submission, indexer notification, and
//! bounded confirmation polling, with per-flow progress observation and
//! cancellation. Includes a SQLite journal of settled runs.

pub mod entity;
pub mod flow;
pub mod indexer;
pub mod journal;
pub mod report;

pub use entity::{Entity, EntityKind, SignError, Signer, TxResult};
pub use flow::{
    cancel_pair, wait_until_indexed, AttestationRequest, ConfirmationFlow, ConfirmationState,
    ErrorReporter, FlowHandle, FlowOutcome, PollBudget, StateTracker, TracingReporter, WaitOutcome,
};
pub use indexer::{IndexerClient, IndexerConfig, IndexerError, PollTarget};
pub use journal::{FlowRecord, Journal};
pub use report::ReportData;
