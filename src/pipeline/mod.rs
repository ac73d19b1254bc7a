//! The curation pipeline: collection fan-out followed by the filter chain.
//!
//! Stage order is fixed and load-bearing. Validation runs first because it is
//! the cheapest check; rules next so blacklisted sources never reach the
//! heavier filters; geography before dates because out-of-region records are
//! more common than out-of-window ones; deduplication last so it only ever
//! compares records that survived every filter.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::common::error::Result;
use crate::config::AppConfig;
use crate::domain::{CuratedFeed, EventQuery, EventRecord, ProviderResult, SourceStats};
use crate::lists::ListStore;
use crate::observability::metrics;
use crate::providers::ProviderRegistry;

pub mod collect;
pub mod dates;
pub mod dedup;
pub mod geo;
pub mod rules;
pub mod validate;

pub use collect::CollectionOrchestrator;
pub use dates::DateRangeFilter;
pub use dedup::{DedupConfig, SimilarityDeduplicator};
pub use geo::{GeoOptions, GeographicFilter};
pub use rules::RulesEngine;
pub use validate::{ValidationConfig, ValidationGate, Verdict};

/// Anything that can turn a query into a finished feed. The refresh
/// coordinator depends on this seam so tests can substitute a fake builder.
#[async_trait]
pub trait FeedBuilder: Send + Sync {
    async fn build_feed(&self, query: &EventQuery) -> Result<CuratedFeed>;
}

/// The full pipeline, wired once at startup and shared across requests.
pub struct EventPipeline {
    orchestrator: CollectionOrchestrator,
    gate: ValidationGate,
    rules: Arc<RulesEngine>,
    dates: DateRangeFilter,
    dedup: SimilarityDeduplicator,
    strict_location: bool,
}

impl EventPipeline {
    pub fn new(config: &AppConfig, registry: Arc<ProviderRegistry>, lists: Arc<ListStore>) -> Self {
        let rules = Arc::new(RulesEngine::open(&config.rules_path, lists));
        Self {
            orchestrator: CollectionOrchestrator::new(registry, config.provider_timeout),
            gate: ValidationGate::new(ValidationConfig::default()),
            rules,
            dates: DateRangeFilter::new(config.timezone),
            dedup: SimilarityDeduplicator::new(DedupConfig::default()),
            strict_location: config.strict_location,
        }
    }

    /// Handle to the rules engine, for the periodic reload task.
    pub fn rules_engine(&self) -> Arc<RulesEngine> {
        Arc::clone(&self.rules)
    }

    fn apply_validation(
        &self,
        records: Vec<EventRecord>,
        rejections: &mut BTreeMap<String, usize>,
    ) -> Vec<EventRecord> {
        records
            .into_iter()
            .filter(|record| match self.gate.validate(record) {
                Verdict::Valid => {
                    metrics::validation::accepted();
                    true
                }
                Verdict::Rejected(reason) => {
                    metrics::validation::rejected(reason.as_str());
                    *rejections.entry(reason.as_str().to_string()).or_default() += 1;
                    debug!("validation rejected '{}': {}", record.title, reason);
                    false
                }
            })
            .collect()
    }

    fn apply_rules(
        &self,
        records: Vec<EventRecord>,
        rejections: &mut BTreeMap<String, usize>,
    ) -> Vec<EventRecord> {
        records
            .into_iter()
            .filter(|record| {
                let url = record.primary_url().unwrap_or("");
                let description = record.description.as_deref().unwrap_or("");
                let check = self.rules.check_url(url, &record.title, description);
                if check.blocked {
                    *rejections.entry("rules_blocked".to_string()).or_default() += 1;
                    debug!(
                        "rules blocked '{}' (score {}): {:?}",
                        record.title, check.score, check.reasons
                    );
                }
                !check.blocked
            })
            .collect()
    }
}

#[async_trait]
impl FeedBuilder for EventPipeline {
    async fn build_feed(&self, query: &EventQuery) -> Result<CuratedFeed> {
        let provider_results = self.orchestrator.collect(query).await;
        let source_stats = source_stats_from(&provider_results);

        let candidates: Vec<EventRecord> = provider_results
            .into_iter()
            .flat_map(|r| r.events)
            .collect();
        let collected = candidates.len();

        let mut rejections: BTreeMap<String, usize> = BTreeMap::new();

        let records = self.apply_validation(candidates, &mut rejections);
        let records = self.apply_rules(records, &mut rejections);

        let geo = GeographicFilter::new(
            &query.location,
            GeoOptions {
                radius_miles: None,
                strict_mode: self.strict_location,
            },
        );
        let before = records.len();
        let records = geo.filter(records);
        if before > records.len() {
            *rejections.entry("out_of_region".to_string()).or_default() += before - records.len();
        }

        let before = records.len();
        let records = self.dates.filter(records, &query.date_range, Utc::now());
        if before > records.len() {
            *rejections.entry("outside_date_range".to_string()).or_default() +=
                before - records.len();
        }

        let deduped = self.dedup.deduplicate_records(records);
        let mut events = deduped.unique_events;

        // Sort by start time (undated records last), then truncate. The
        // dedup step already placed the best record in each group.
        events.sort_by(|a, b| match (a.start_time, b.start_time) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        events.truncate(query.limit);

        info!(
            collected,
            kept = events.len(),
            duplicates_removed = deduped.duplicates_removed,
            "feed built for '{}'",
            query.canonical_string()
        );

        Ok(CuratedFeed {
            events,
            source_stats,
            rejections,
            duplicates_removed: deduped.duplicates_removed,
            generated_at: Utc::now(),
        })
    }
}

fn source_stats_from(results: &[ProviderResult]) -> BTreeMap<String, SourceStats> {
    results
        .iter()
        .map(|r| {
            (
                r.provider.clone(),
                SourceStats {
                    count: r.events.len(),
                    processing_time_ms: r.elapsed_ms,
                    error: r.error.clone(),
                },
            )
        })
        .collect()
}
