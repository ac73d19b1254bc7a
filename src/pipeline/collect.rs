//! Collection orchestrator: fans a query out to every registered provider
//! concurrently, with an independent timeout per provider. One slow or broken
//! source degrades its own slice of the feed and nothing else.

use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::domain::{EventQuery, ProviderResult};
use crate::observability::metrics::collection;
use crate::providers::{EventProvider, ProviderRegistry};

pub struct CollectionOrchestrator {
    registry: Arc<ProviderRegistry>,
    provider_timeout: Duration,
}

impl CollectionOrchestrator {
    pub fn new(registry: Arc<ProviderRegistry>, provider_timeout: Duration) -> Self {
        Self {
            registry,
            provider_timeout,
        }
    }

    /// Query every provider concurrently. Always returns one `ProviderResult`
    /// per registered provider; timeouts, panics, and provider errors all
    /// become failed results rather than propagating.
    pub async fn collect(&self, query: &EventQuery) -> Vec<ProviderResult> {
        let started = Instant::now();

        let tasks: Vec<_> = self
            .registry
            .providers()
            .iter()
            .map(|provider| {
                let provider = Arc::clone(provider);
                let query = query.clone();
                let limit = self.provider_timeout;
                tokio::spawn(async move { run_provider(provider, &query, limit).await })
            })
            .collect();

        let mut results = Vec::with_capacity(tasks.len());
        for (outcome, provider) in join_all(tasks)
            .await
            .into_iter()
            .zip(self.registry.providers())
        {
            match outcome {
                Ok(result) => results.push(result),
                Err(join_err) => {
                    warn!("provider task for {} panicked: {}", provider.provider_id(), join_err);
                    collection::provider_error(provider.provider_id());
                    results.push(ProviderResult::failed(
                        provider.provider_id(),
                        format!("task panicked: {}", join_err),
                        started.elapsed().as_millis() as u64,
                    ));
                }
            }
        }

        let fetched: usize = results.iter().map(|r| r.events.len()).sum();
        collection::duration_seconds(started.elapsed().as_secs_f64());
        collection::records_fetched(fetched);

        if !results.is_empty() && results.iter().all(|r| !r.success) {
            warn!(
                providers = results.len(),
                "all providers failed for query '{}'; producing empty candidate set",
                query.canonical_string()
            );
        } else {
            info!(
                providers = results.len(),
                records = fetched,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "collection finished"
            );
        }

        results
    }
}

async fn run_provider(
    provider: Arc<dyn EventProvider>,
    query: &EventQuery,
    limit: Duration,
) -> ProviderResult {
    let id = provider.provider_id();
    let started = Instant::now();

    match timeout(limit, provider.search(query)).await {
        Ok(Ok(events)) => {
            let elapsed = started.elapsed().as_millis() as u64;
            collection::provider_success(id);
            info!(provider = id, count = events.len(), elapsed_ms = elapsed, "provider ok");
            ProviderResult::ok(id, events, elapsed)
        }
        Ok(Err(err)) => {
            let elapsed = started.elapsed().as_millis() as u64;
            collection::provider_error(id);
            warn!(provider = id, elapsed_ms = elapsed, "provider failed: {}", err);
            ProviderResult::failed(id, err.to_string(), elapsed)
        }
        Err(_) => {
            let elapsed = started.elapsed().as_millis() as u64;
            collection::provider_timeout(id);
            warn!(provider = id, timeout_ms = limit.as_millis() as u64, "provider timed out");
            ProviderResult::failed(id, format!("timed out after {:?}", limit), elapsed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::{PipelineError, Result};
    use crate::domain::{EventCategory, EventRecord};
    use async_trait::async_trait;

    struct FakeProvider {
        id: &'static str,
        behavior: Behavior,
    }

    enum Behavior {
        Return(usize),
        Fail,
        Hang,
    }

    #[async_trait]
    impl EventProvider for FakeProvider {
        fn provider_id(&self) -> &'static str {
            self.id
        }

        async fn search(&self, query: &EventQuery) -> Result<Vec<EventRecord>> {
            match self.behavior {
                Behavior::Return(n) => Ok((0..n)
                    .map(|i| {
                        EventRecord::new(format!("Event {}", i), query.category, self.id)
                    })
                    .collect()),
                Behavior::Fail => Err(PipelineError::Provider {
                    message: "upstream 500".to_string(),
                }),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(Vec::new())
                }
            }
        }
    }

    fn orchestrator(providers: Vec<Arc<dyn EventProvider>>) -> CollectionOrchestrator {
        CollectionOrchestrator::new(
            Arc::new(ProviderRegistry::from_providers(providers)),
            Duration::from_millis(200),
        )
    }

    #[tokio::test]
    async fn partial_failure_keeps_successful_results() {
        let orch = orchestrator(vec![
            Arc::new(FakeProvider { id: "alpha", behavior: Behavior::Return(3) }),
            Arc::new(FakeProvider { id: "beta", behavior: Behavior::Fail }),
        ]);

        let results = orch.collect(&EventQuery::new(EventCategory::Music, "Seattle, WA")).await;
        assert_eq!(results.len(), 2);

        let alpha = results.iter().find(|r| r.provider == "alpha").unwrap();
        assert!(alpha.success);
        assert_eq!(alpha.events.len(), 3);

        let beta = results.iter().find(|r| r.provider == "beta").unwrap();
        assert!(!beta.success);
        assert!(beta.error.as_deref().unwrap().contains("upstream 500"));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_provider_times_out_independently() {
        let orch = orchestrator(vec![
            Arc::new(FakeProvider { id: "fast", behavior: Behavior::Return(1) }),
            Arc::new(FakeProvider { id: "slow", behavior: Behavior::Hang }),
        ]);

        let results = orch.collect(&EventQuery::new(EventCategory::Music, "Seattle, WA")).await;

        let fast = results.iter().find(|r| r.provider == "fast").unwrap();
        assert!(fast.success);
        let slow = results.iter().find(|r| r.provider == "slow").unwrap();
        assert!(!slow.success);
        assert!(slow.error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn all_failed_yields_failed_results_not_error() {
        let orch = orchestrator(vec![
            Arc::new(FakeProvider { id: "alpha", behavior: Behavior::Fail }),
            Arc::new(FakeProvider { id: "beta", behavior: Behavior::Fail }),
        ]);

        let results = orch.collect(&EventQuery::new(EventCategory::Music, "Seattle, WA")).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.success && r.events.is_empty()));
    }

    #[tokio::test]
    async fn empty_registry_returns_no_results() {
        let orch = orchestrator(Vec::new());
        let results = orch.collect(&EventQuery::new(EventCategory::Music, "Seattle, WA")).await;
        assert!(results.is_empty());
    }
}
