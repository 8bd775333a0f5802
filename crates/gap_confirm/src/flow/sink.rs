//! Error-reporting sink: forwards flow failures to an external tracker.

use tracing::error;

/// Contextual metadata attached to every reported failure.
#[derive(Clone, Debug, Default)]
pub struct ErrorContext {
    pub operation: String,
    pub entity_kind: &'static str,
    pub entity_uid: Option<String>,
    pub actor: Option<String>,
    pub chain_id: u64,
}

/// Boundary to an external exception tracker. Must never fail itself.
pub trait ErrorReporter: Send + Sync {
    fn report(
        &self,
        message: &str,
        error: &(dyn std::error::Error + 'static),
        context: &ErrorContext,
        user_message: &str,
    );
}

/// Default reporter: a structured `tracing::error!` line.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(
        &self,
        message: &str,
        error: &(dyn std::error::Error + 'static),
        context: &ErrorContext,
        user_message: &str,
    ) {
        error!(
            operation = %context.operation,
            entity_kind = context.entity_kind,
            entity_uid = context.entity_uid.as_deref().unwrap_or("-"),
            actor = context.actor.as_deref().unwrap_or("-"),
            chain_id = context.chain_id,
            error = %error,
            user_message,
            "{message}"
        );
    }
}
