//! Confirmation flow: state machine, poll loop, predicates, error sink.

mod confirm;
pub mod detect;
mod sink;
mod state;

pub use confirm::{
    cancel_pair, wait_until_indexed, AttestationRequest, CancelHandle, CancelToken,
    ConfirmationFlow, FlowError, FlowHandle, FlowOutcome, OnIndexed, PollBudget, WaitOutcome,
};
pub use sink::{ErrorContext, ErrorReporter, TracingReporter};
pub use state::{ConfirmationState, StateTracker};
