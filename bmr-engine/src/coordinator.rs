//! Query Coordinator
//!
//! Fans a query out to all registered providers concurrently, bounded by a
//! semaphore and a global deadline, with each provider call wrapped in its
//! own timeout. Partial failure is the normal case: with
//! `continue_on_failure` (the default) individual failures and timeouts are
//! recorded per provider and excluded from aggregation, never raised.
//!
//! Aggregation merges all returned records, drops those below the confidence
//! floor, deduplicates by `(id, source)` keeping the first occurrence, and
//! sorts the remainder descending by confidence.

use crate::error::EngineError;
use crate::limiter::{guard_timeout, RateLimiter};
use crate::provider::MetadataProvider;
use crate::types::{DataType, MetadataRecord, SearchCriteria};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use uuid::Uuid;

/// Per-query configuration
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// Hard deadline for the whole query
    pub global_timeout: Duration,
    /// Per-provider call timeout
    pub provider_timeout: Duration,
    /// Maximum simultaneous in-flight provider calls
    pub max_concurrency: usize,
    /// Records below this confidence are dropped during aggregation
    pub min_confidence: f64,
    /// Collect failures per provider instead of aborting the query
    pub continue_on_failure: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            global_timeout: Duration::from_secs(30),
            provider_timeout: Duration::from_secs(5),
            max_concurrency: 4,
            min_confidence: 0.0,
            continue_on_failure: true,
        }
    }
}

/// Outcome of one provider's call within a query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderOutcome {
    /// Provider name
    pub provider: String,
    /// Records returned (before filtering)
    pub records: usize,
    /// Call duration in milliseconds
    pub duration_ms: u64,
    /// Failure text; `None` means success. Timeouts are distinguished only
    /// by their message.
    pub error: Option<String>,
}

impl ProviderOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregated result of one fan-out query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub query_id: Uuid,
    /// Filtered, deduplicated records sorted descending by confidence
    pub records: Vec<MetadataRecord>,
    /// One outcome per provider queried
    pub outcomes: Vec<ProviderOutcome>,
    /// Post-filter, post-dedup record count (equals `records.len()`)
    pub total_records: usize,
    pub successful_providers: usize,
    pub failed_providers: usize,
    pub total_duration_ms: u64,
}

enum CallResult {
    Success(Vec<MetadataRecord>),
    Failure(String),
    Timeout(u64),
}

/// Concurrent fan-out coordinator over registered providers
///
/// Constructed once at process start and shared; provider registration is
/// explicit, no ambient registry.
pub struct QueryCoordinator {
    providers: Vec<Arc<dyn MetadataProvider>>,
    limiter: Arc<RateLimiter>,
}

impl QueryCoordinator {
    /// Create a coordinator; providers are deduplicated by name (first wins)
    /// and sorted descending by priority
    pub fn new(providers: Vec<Arc<dyn MetadataProvider>>) -> Self {
        let mut coordinator = Self {
            providers: Vec::new(),
            limiter: Arc::new(RateLimiter::new()),
        };
        for provider in providers {
            coordinator.add_provider(provider);
        }
        coordinator
    }

    /// Register a provider; re-adding an existing name is a no-op
    pub fn add_provider(&mut self, provider: Arc<dyn MetadataProvider>) {
        if self.providers.iter().any(|p| p.name() == provider.name()) {
            debug!(provider = provider.name(), "Provider already registered, skipping");
            return;
        }
        self.providers.push(provider);
        // Priority orders presentation only; ties break on name for determinism
        self.providers.sort_by(|a, b| {
            b.priority()
                .cmp(&a.priority())
                .then_with(|| a.name().cmp(b.name()))
        });
    }

    /// Remove a provider by name; removing an unknown name is a no-op
    pub fn remove_provider(&mut self, name: &str) {
        self.providers.retain(|p| p.name() != name);
    }

    /// Registered providers, priority order
    pub fn providers(&self) -> &[Arc<dyn MetadataProvider>] {
        &self.providers
    }

    /// Providers that cover a given bibliographic dimension
    pub fn providers_for_data_type(&self, data_type: DataType) -> Vec<Arc<dyn MetadataProvider>> {
        self.providers
            .iter()
            .filter(|p| p.supports_data_type(data_type))
            .cloned()
            .collect()
    }

    /// Fan a query out to every registered provider
    ///
    /// # Errors
    /// Only with `continue_on_failure=false`: the first provider failure,
    /// provider timeout, or the global deadline rejects the whole query.
    pub async fn query(
        &self,
        criteria: &SearchCriteria,
        config: &QueryConfig,
    ) -> Result<AggregatedResult, EngineError> {
        let query_id = Uuid::new_v4();
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(config.max_concurrency.max(1)));

        debug!(
            query_id = %query_id,
            providers = self.providers.len(),
            max_concurrency = config.max_concurrency,
            "Fanning out query"
        );

        let mut pending: HashSet<String> =
            self.providers.iter().map(|p| p.name().to_string()).collect();

        let mut calls: FuturesUnordered<_> = self
            .providers
            .iter()
            .map(|provider| {
                let provider = Arc::clone(provider);
                let semaphore = Arc::clone(&semaphore);
                let limiter = Arc::clone(&self.limiter);
                let criteria = criteria.clone();
                // The provider's own request timeout tightens the configured
                // per-call bound, never loosens it.
                let call_timeout = config
                    .provider_timeout
                    .min(Duration::from_millis(provider.timeout().request_timeout_ms));
                async move {
                    let name = provider.name().to_string();
                    let permit = semaphore.acquire_owned().await;
                    if permit.is_err() {
                        return (name, 0, CallResult::Failure("semaphore closed".to_string()));
                    }
                    let delay = Duration::from_millis(provider.rate_limit().request_delay_ms);
                    limiter.wait(&name, delay).await;

                    let call_started = Instant::now();
                    let result =
                        match guard_timeout(&name, call_timeout, provider.search(&criteria)).await
                        {
                            Ok(Ok(records)) => CallResult::Success(records),
                            Ok(Err(e)) => CallResult::Failure(e.to_string()),
                            Err(EngineError::ProviderTimeout { elapsed_ms, .. }) => {
                                CallResult::Timeout(elapsed_ms)
                            }
                            Err(e) => CallResult::Failure(e.to_string()),
                        };
                    let duration_ms = call_started.elapsed().as_millis() as u64;
                    (name, duration_ms, result)
                }
            })
            .collect();

        let deadline = tokio::time::Instant::now() + config.global_timeout;
        let mut outcomes: Vec<ProviderOutcome> = Vec::new();
        let mut collected: Vec<MetadataRecord> = Vec::new();
        let mut hit_global_deadline = false;

        loop {
            tokio::select! {
                next = calls.next() => {
                    let Some((name, duration_ms, result)) = next else { break };
                    pending.remove(&name);
                    match result {
                        CallResult::Success(records) => {
                            debug!(
                                query_id = %query_id,
                                provider = %name,
                                records = records.len(),
                                duration_ms,
                                "Provider returned"
                            );
                            outcomes.push(ProviderOutcome {
                                provider: name,
                                records: records.len(),
                                duration_ms,
                                error: None,
                            });
                            collected.extend(records);
                        }
                        CallResult::Failure(message) => {
                            warn!(
                                query_id = %query_id,
                                provider = %name,
                                error = %message,
                                "Provider failed (isolated)"
                            );
                            if !config.continue_on_failure {
                                return Err(EngineError::ProviderFailure {
                                    provider: name,
                                    message,
                                });
                            }
                            outcomes.push(ProviderOutcome {
                                provider: name,
                                records: 0,
                                duration_ms,
                                error: Some(message),
                            });
                        }
                        CallResult::Timeout(elapsed_ms) => {
                            warn!(
                                query_id = %query_id,
                                provider = %name,
                                elapsed_ms,
                                "Provider timed out (isolated)"
                            );
                            if !config.continue_on_failure {
                                return Err(EngineError::ProviderTimeout {
                                    provider: name,
                                    elapsed_ms,
                                });
                            }
                            outcomes.push(ProviderOutcome {
                                provider: name,
                                records: 0,
                                duration_ms,
                                error: Some(format!("timed out after {}ms", elapsed_ms)),
                            });
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    hit_global_deadline = true;
                    break;
                }
            }
        }

        if hit_global_deadline {
            let elapsed_ms = config.global_timeout.as_millis() as u64;
            if !config.continue_on_failure {
                return Err(EngineError::GlobalTimeout { elapsed_ms });
            }
            warn!(
                query_id = %query_id,
                still_pending = pending.len(),
                elapsed_ms,
                "Global deadline hit, returning partial results"
            );
            let mut unfinished: Vec<String> = pending.drain().collect();
            unfinished.sort();
            for name in unfinished {
                outcomes.push(ProviderOutcome {
                    provider: name,
                    records: 0,
                    duration_ms: elapsed_ms,
                    error: Some("query deadline exceeded".to_string()),
                });
            }
        }

        // Aggregation: confidence floor, (id, source) dedup first-wins,
        // descending confidence sort.
        collected.retain(|r| r.confidence >= config.min_confidence);
        let mut seen: HashSet<(String, String)> = HashSet::new();
        collected.retain(|r| seen.insert((r.id.clone(), r.source.clone())));
        collected.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
        });

        let successful_providers = outcomes.iter().filter(|o| o.succeeded()).count();
        let failed_providers = outcomes.len() - successful_providers;

        debug!(
            query_id = %query_id,
            total_records = collected.len(),
            successful_providers,
            failed_providers,
            "Query complete"
        );

        Ok(AggregatedResult {
            query_id,
            total_records: collected.len(),
            successful_providers,
            failed_providers,
            total_duration_ms: started.elapsed().as_millis() as u64,
            outcomes,
            records: collected,
        })
    }

    /// Run `primary`; if it aggregates zero records, try `fallbacks` in order
    /// until one yields results or all are exhausted
    pub async fn query_with_strategy(
        &self,
        primary: &SearchCriteria,
        fallbacks: &[SearchCriteria],
        config: &QueryConfig,
    ) -> Result<AggregatedResult, EngineError> {
        let mut last = self.query(primary, config).await?;
        if !last.records.is_empty() {
            return Ok(last);
        }
        for (index, fallback) in fallbacks.iter().enumerate() {
            debug!(fallback = index, "Primary query empty, trying fallback");
            last = self.query(fallback, config).await?;
            if !last.records.is_empty() {
                return Ok(last);
            }
        }
        Ok(last)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::MockProvider;
    use crate::types::TitleQuery;

    fn title_criteria() -> SearchCriteria {
        SearchCriteria::Title(TitleQuery {
            title: "Dune".to_string(),
            exact_match: false,
        })
    }

    fn record(id: &str, source: &str, confidence: f64) -> MetadataRecord {
        MetadataRecord::new(id, source, confidence)
    }

    #[test]
    fn test_providers_sorted_by_priority() {
        let coordinator = QueryCoordinator::new(vec![
            Arc::new(MockProvider::new("low", 1, vec![])),
            Arc::new(MockProvider::new("high", 9, vec![])),
            Arc::new(MockProvider::new("mid", 5, vec![])),
        ]);

        let names: Vec<&str> = coordinator.providers().iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["high", "mid", "low"]);
    }

    #[test]
    fn test_add_provider_idempotent() {
        let mut coordinator =
            QueryCoordinator::new(vec![Arc::new(MockProvider::new("openlibrary", 5, vec![]))]);
        coordinator.add_provider(Arc::new(MockProvider::new("openlibrary", 9, vec![])));

        assert_eq!(coordinator.providers().len(), 1);
        assert_eq!(
            coordinator.providers()[0].priority(),
            5,
            "Re-adding an existing name should be a no-op"
        );
    }

    #[test]
    fn test_remove_provider_idempotent() {
        let mut coordinator =
            QueryCoordinator::new(vec![Arc::new(MockProvider::new("openlibrary", 5, vec![]))]);
        coordinator.remove_provider("openlibrary");
        coordinator.remove_provider("openlibrary");
        assert!(coordinator.providers().is_empty());
    }

    #[test]
    fn test_providers_for_data_type_filters() {
        let coordinator = QueryCoordinator::new(vec![
            Arc::new(
                MockProvider::new("covers_only", 5, vec![])
                    .with_supported(vec![DataType::CoverImage]),
            ),
            Arc::new(MockProvider::new("full", 3, vec![])),
        ]);

        let isbn_capable = coordinator.providers_for_data_type(DataType::Isbn);
        assert_eq!(isbn_capable.len(), 1);
        assert_eq!(isbn_capable[0].name(), "full");
    }

    #[tokio::test]
    async fn test_query_aggregates_and_sorts() {
        let coordinator = QueryCoordinator::new(vec![
            Arc::new(MockProvider::new(
                "a",
                5,
                vec![record("1", "a", 0.6), record("2", "a", 0.9)],
            )),
            Arc::new(MockProvider::new("b", 3, vec![record("1", "b", 0.8)])),
        ]);

        let result = coordinator
            .query(&title_criteria(), &QueryConfig::default())
            .await
            .unwrap();

        assert_eq!(result.total_records, 3);
        assert_eq!(result.successful_providers, 2);
        assert_eq!(result.failed_providers, 0);
        let confidences: Vec<f64> = result.records.iter().map(|r| r.confidence).collect();
        assert_eq!(confidences, vec![0.9, 0.8, 0.6], "Descending confidence sort");
    }

    #[tokio::test]
    async fn test_min_confidence_filter() {
        let coordinator = QueryCoordinator::new(vec![Arc::new(MockProvider::new(
            "a",
            5,
            vec![record("1", "a", 0.3), record("2", "a", 0.7)],
        ))]);

        let config = QueryConfig {
            min_confidence: 0.5,
            ..Default::default()
        };
        let result = coordinator.query(&title_criteria(), &config).await.unwrap();
        assert_eq!(result.total_records, 1);
        assert_eq!(result.records[0].id, "2");
    }

    #[tokio::test]
    async fn test_dedup_first_occurrence_wins() {
        let mut first = record("1", "a", 0.7);
        first.title = Some("First".to_string());
        let mut second = record("1", "a", 0.7);
        second.title = Some("Second".to_string());

        let coordinator =
            QueryCoordinator::new(vec![Arc::new(MockProvider::new("a", 5, vec![first, second]))]);

        let result = coordinator
            .query(&title_criteria(), &QueryConfig::default())
            .await
            .unwrap();

        assert_eq!(result.total_records, 1);
        assert_eq!(result.records[0].title.as_deref(), Some("First"));
    }

    #[tokio::test]
    async fn test_partial_failure_tolerated() {
        let coordinator = QueryCoordinator::new(vec![
            Arc::new(MockProvider::new("good1", 5, vec![record("1", "good1", 0.8)])),
            Arc::new(MockProvider::failing("bad", 4)),
            Arc::new(MockProvider::new("good2", 3, vec![record("2", "good2", 0.7)])),
        ]);

        let result = coordinator
            .query(&title_criteria(), &QueryConfig::default())
            .await
            .unwrap();

        assert_eq!(result.successful_providers, 2);
        assert_eq!(result.failed_providers, 1);
        assert_eq!(result.total_records, 2);
        assert_eq!(
            result.successful_providers + result.failed_providers,
            result.outcomes.len()
        );
    }

    #[tokio::test]
    async fn test_failure_fatal_without_continue() {
        let coordinator = QueryCoordinator::new(vec![Arc::new(MockProvider::failing("bad", 4))]);

        let config = QueryConfig {
            continue_on_failure: false,
            ..Default::default()
        };
        let result = coordinator.query(&title_criteria(), &config).await;
        assert!(matches!(
            result,
            Err(EngineError::ProviderFailure { .. })
        ));
    }

    #[tokio::test]
    async fn test_provider_timeout_isolated() {
        let coordinator = QueryCoordinator::new(vec![
            Arc::new(
                MockProvider::new("slow", 5, vec![record("1", "slow", 0.9)])
                    .with_delay(Duration::from_millis(500)),
            ),
            Arc::new(MockProvider::new("fast", 3, vec![record("2", "fast", 0.7)])),
        ]);

        let config = QueryConfig {
            provider_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let result = coordinator.query(&title_criteria(), &config).await.unwrap();

        assert_eq!(result.successful_providers, 1);
        assert_eq!(result.failed_providers, 1);
        let slow = result.outcomes.iter().find(|o| o.provider == "slow").unwrap();
        assert!(slow.error.as_deref().unwrap().contains("timed out"));
        assert_eq!(result.total_records, 1);
    }

    #[tokio::test]
    async fn test_global_deadline_returns_partial() {
        let coordinator = QueryCoordinator::new(vec![
            Arc::new(MockProvider::new("fast", 5, vec![record("1", "fast", 0.8)])),
            Arc::new(
                MockProvider::new("glacial", 3, vec![record("2", "glacial", 0.9)])
                    .with_delay(Duration::from_secs(10)),
            ),
        ]);

        let config = QueryConfig {
            global_timeout: Duration::from_millis(100),
            provider_timeout: Duration::from_secs(30),
            ..Default::default()
        };
        let result = coordinator.query(&title_criteria(), &config).await.unwrap();

        assert_eq!(result.total_records, 1, "Completed provider's records kept");
        let glacial = result
            .outcomes
            .iter()
            .find(|o| o.provider == "glacial")
            .unwrap();
        assert_eq!(glacial.error.as_deref(), Some("query deadline exceeded"));
    }

    #[tokio::test]
    async fn test_strategy_falls_back_on_empty() {
        let coordinator =
            QueryCoordinator::new(vec![Arc::new(MockProvider::new("a", 5, vec![record("1", "a", 0.8)]))]);

        // Primary returns records filtered out entirely; fallback succeeds.
        let config = QueryConfig {
            min_confidence: 0.9,
            ..Default::default()
        };
        let empty = coordinator
            .query_with_strategy(&title_criteria(), &[], &config)
            .await
            .unwrap();
        assert!(empty.records.is_empty());

        let config = QueryConfig::default();
        let result = coordinator
            .query_with_strategy(&title_criteria(), &[title_criteria()], &config)
            .await
            .unwrap();
        assert_eq!(result.total_records, 1);
    }
}
