//! Book metadata reconciliation engine
//!
//! Merges answers from multiple bibliographic metadata providers into one
//! coherent, confidence-weighted view of a book. Three layers, data flowing
//! strictly downward:
//!
//! - [`coordinator`] — concurrent provider fan-out with rate limiting,
//!   per-provider and global timeouts, and partial-failure tolerance
//! - [`reconcile`] — six domain reconcilers (identifiers, subjects,
//!   physical, publication, content, series) plus the coordinator that runs
//!   them over a record batch
//! - [`preview`] — user-facing preview: quality grades, duplicate detection
//!   against an existing library, edition selection, series inference,
//!   recommendations
//!
//! Everything emitted is pure data; this crate performs no persistence and
//! no network I/O of its own (providers bring their own transport).

pub mod coordinator;
pub mod error;
pub mod limiter;
pub mod preview;
pub mod provider;
pub mod reconcile;
pub mod types;

pub use coordinator::{AggregatedResult, ProviderOutcome, QueryConfig, QueryCoordinator};
pub use error::EngineError;
pub use limiter::RateLimiter;
pub use preview::{LibraryEntry, LibraryPreview, PreviewEngine, PreviewOptions};
pub use provider::{MetadataProvider, ProviderError, ProviderResult};
pub use reconcile::{ReconcileError, ReconcileStats, ReconciledMetadata, ReconciliationCoordinator};
pub use types::{
    Conflict, ConflictValue, MetadataRecord, MetadataSource, ReconciledField, SearchCriteria,
};
