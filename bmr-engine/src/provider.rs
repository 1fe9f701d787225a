//! Provider capability contract
//!
//! Every external metadata source sits behind this trait. Providers own their
//! transport and wire-format parsing; the engine only sees typed
//! `MetadataRecord`s. New sources either implement `MetadataProvider`
//! directly or go through [`ProviderAdapter`], which wraps a single search
//! closure plus a reliability table, so unlisted providers need no core
//! changes.

use crate::types::{
    CreatorQuery, DataType, MetadataRecord, MultiCriteriaQuery, SearchCriteria, TitleQuery,
};
use async_trait::async_trait;
use bmr_common::{RateLimitSettings, TimeoutSettings};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Provider call errors
///
/// These never leave the coordinator as-is; they are folded into per-provider
/// outcomes (or into `EngineError::ProviderFailure` when failures are fatal).
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network communication error
    #[error("Network error: {0}")]
    Network(String),

    /// Remote API rejected the request
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Failed to parse a provider response
    #[error("Parse error: {0}")]
    Parse(String),

    /// Provider-side rate limit hit
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Query shape not supported by this provider
    #[error("Unsupported query: {0}")]
    UnsupportedQuery(String),

    /// Internal provider error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for provider calls
pub type ProviderResult = Result<Vec<MetadataRecord>, ProviderError>;

/// Uniform query interface over external metadata sources
///
/// Implementations must be cheap to clone behind `Arc` and safe to call
/// concurrently; the coordinator issues calls from parallel tasks.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Provider name (dedup and provenance key)
    fn name(&self) -> &str;

    /// Static presentation priority (higher sorts first; does not gate execution)
    fn priority(&self) -> i32;

    /// Rate limit shaping for this provider
    fn rate_limit(&self) -> RateLimitSettings {
        RateLimitSettings::default()
    }

    /// Timeout shaping for this provider
    fn timeout(&self) -> TimeoutSettings {
        TimeoutSettings::default()
    }

    /// Search by title
    async fn search_by_title(&self, query: &TitleQuery) -> ProviderResult;

    /// Search by ISBN
    async fn search_by_isbn(&self, isbn: &str) -> ProviderResult;

    /// Search by creator (author/editor)
    async fn search_by_creator(&self, query: &CreatorQuery) -> ProviderResult;

    /// Multi-criteria search
    async fn search_multi_criteria(&self, query: &MultiCriteriaQuery) -> ProviderResult;

    /// Reliability of this provider for one bibliographic dimension (0.0-1.0)
    fn reliability_for(&self, data_type: DataType) -> f64;

    /// Whether this provider covers a dimension at all
    fn supports_data_type(&self, data_type: DataType) -> bool {
        self.reliability_for(data_type) > 0.0
    }

    /// Dispatch a criteria enum to the matching search operation
    async fn search(&self, criteria: &SearchCriteria) -> ProviderResult {
        match criteria {
            SearchCriteria::Title(q) => self.search_by_title(q).await,
            SearchCriteria::Isbn(isbn) => self.search_by_isbn(isbn).await,
            SearchCriteria::Creator(q) => self.search_by_creator(q).await,
            SearchCriteria::Multi(q) => self.search_multi_criteria(q).await,
        }
    }
}

/// Closure-backed search function for [`ProviderAdapter`]
pub type SearchFn =
    Arc<dyn Fn(SearchCriteria) -> BoxFuture<'static, ProviderResult> + Send + Sync>;

/// Generic adapter for providers with no dedicated implementation
///
/// Carries the identity, priority, shaping, and reliability table in data and
/// delegates all four search operations to one closure.
pub struct ProviderAdapter {
    name: String,
    priority: i32,
    rate_limit: RateLimitSettings,
    timeout: TimeoutSettings,
    reliability: HashMap<DataType, f64>,
    search_fn: SearchFn,
}

impl ProviderAdapter {
    pub fn new(name: impl Into<String>, priority: i32, search_fn: SearchFn) -> Self {
        Self {
            name: name.into(),
            priority,
            rate_limit: RateLimitSettings::default(),
            timeout: TimeoutSettings::default(),
            reliability: HashMap::new(),
            search_fn,
        }
    }

    /// Set the reliability for one dimension (implies support)
    pub fn with_reliability(mut self, data_type: DataType, reliability: f64) -> Self {
        self.reliability.insert(data_type, reliability.clamp(0.0, 1.0));
        self
    }

    /// Set the same reliability for every dimension
    pub fn with_uniform_reliability(mut self, reliability: f64) -> Self {
        for data_type in DataType::ALL {
            self.reliability.insert(data_type, reliability.clamp(0.0, 1.0));
        }
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitSettings) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_timeout(mut self, timeout: TimeoutSettings) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl MetadataProvider for ProviderAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn rate_limit(&self) -> RateLimitSettings {
        self.rate_limit.clone()
    }

    fn timeout(&self) -> TimeoutSettings {
        self.timeout.clone()
    }

    async fn search_by_title(&self, query: &TitleQuery) -> ProviderResult {
        (self.search_fn)(SearchCriteria::Title(query.clone())).await
    }

    async fn search_by_isbn(&self, isbn: &str) -> ProviderResult {
        (self.search_fn)(SearchCriteria::Isbn(isbn.to_string())).await
    }

    async fn search_by_creator(&self, query: &CreatorQuery) -> ProviderResult {
        (self.search_fn)(SearchCriteria::Creator(query.clone())).await
    }

    async fn search_multi_criteria(&self, query: &MultiCriteriaQuery) -> ProviderResult {
        (self.search_fn)(SearchCriteria::Multi(query.clone())).await
    }

    fn reliability_for(&self, data_type: DataType) -> f64 {
        self.reliability.get(&data_type).copied().unwrap_or(0.0)
    }
}

// ============================================================================
// Mock Provider for Testing
// ============================================================================

/// In-memory providers for tests and wiring experiments
pub mod mock {
    use super::*;
    use std::time::Duration;

    /// Mock provider for coordinator tests
    pub struct MockProvider {
        pub name: String,
        pub priority: i32,
        pub records: Vec<MetadataRecord>,
        pub should_fail: bool,
        /// Artificial latency before responding
        pub delay: Option<Duration>,
        pub reliability: f64,
        pub supported: Option<Vec<DataType>>,
    }

    impl MockProvider {
        pub fn new(name: &str, priority: i32, records: Vec<MetadataRecord>) -> Self {
            Self {
                name: name.to_string(),
                priority,
                records,
                should_fail: false,
                delay: None,
                reliability: 0.8,
                supported: None,
            }
        }

        pub fn failing(name: &str, priority: i32) -> Self {
            Self {
                name: name.to_string(),
                priority,
                records: Vec::new(),
                should_fail: true,
                delay: None,
                reliability: 0.8,
                supported: None,
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn with_supported(mut self, supported: Vec<DataType>) -> Self {
            self.supported = Some(supported);
            self
        }

        async fn respond(&self) -> ProviderResult {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.should_fail {
                Err(ProviderError::Network("mock failure".to_string()))
            } else {
                Ok(self.records.clone())
            }
        }
    }

    #[async_trait]
    impl MetadataProvider for MockProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        async fn search_by_title(&self, _query: &TitleQuery) -> ProviderResult {
            self.respond().await
        }

        async fn search_by_isbn(&self, _isbn: &str) -> ProviderResult {
            self.respond().await
        }

        async fn search_by_creator(&self, _query: &CreatorQuery) -> ProviderResult {
            self.respond().await
        }

        async fn search_multi_criteria(&self, _query: &MultiCriteriaQuery) -> ProviderResult {
            self.respond().await
        }

        fn reliability_for(&self, data_type: DataType) -> f64 {
            match &self.supported {
                Some(types) if !types.contains(&data_type) => 0.0,
                _ => self.reliability,
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
