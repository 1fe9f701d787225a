//! Error taxonomy for the reconciliation engine
//!
//! Provider failures and timeouts are isolated per provider and only become
//! fatal when `continue_on_failure` is off. The global deadline is fatal under
//! the same condition; otherwise the coordinator returns whatever completed.

use crate::reconcile::ReconcileError;
use thiserror::Error;

/// Engine-level errors surfaced by the query coordinator
#[derive(Debug, Error)]
pub enum EngineError {
    /// One provider failed (fatal only with continue_on_failure=false)
    #[error("Provider '{provider}' failed: {message}")]
    ProviderFailure { provider: String, message: String },

    /// One provider exceeded its per-call timeout
    #[error("Provider '{provider}' timed out after {elapsed_ms}ms")]
    ProviderTimeout { provider: String, elapsed_ms: u64 },

    /// The whole query exceeded the global deadline
    #[error("Query exceeded global timeout after {elapsed_ms}ms")]
    GlobalTimeout { elapsed_ms: u64 },

    /// Reconciliation rejected its input
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}
