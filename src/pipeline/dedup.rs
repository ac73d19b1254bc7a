//! Similarity Deduplicator: clusters near-duplicate records across all
//! sources and picks one canonical record per cluster.
//!
//! Providers frequently return the same real-world event under different
//! titles, IDs, and URLs. Pairwise similarity is a weighted blend of
//! normalized-title, venue, date, and location-text comparisons; clustering
//! is greedy and seed-anchored: each unclustered record seeds a group and
//! absorbs every later, still-unclustered record whose score against the
//! seed (not the whole group) exceeds the threshold. Two records both
//! similar to a seed can co-group even if they would score lower against
//! each other; that approximation is intentional and pinned by tests.
//!
//! O(n²) pairwise comparisons; per-query record counts are bounded in the
//! low hundreds.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strsim::levenshtein;
use tracing::debug;

use crate::domain::{EventRecord, ProviderResult};
use crate::observability::metrics;

const TITLE_WEIGHT: f64 = 3.0;
const VENUE_WEIGHT: f64 = 2.0;
const DATE_WEIGHT: f64 = 2.0;
const LOCATION_WEIGHT: f64 = 1.0;

/// Seconds beyond which two start times contribute zero date similarity.
const DATE_WINDOW_SECS: f64 = 24.0 * 3600.0;

/// Common words that carry no identity signal in titles and venue names.
const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "of", "at", "in", "on", "for", "with", "to", "amp",
];

/// Structured APIs outrank scraped and AI-parsed sources when choosing the
/// canonical record for a group.
static SOURCE_PRIORITY: Lazy<HashMap<&'static str, i32>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("ticketmaster", 100);
    m.insert("eventbrite", 90);
    m.insert("predicthq", 80);
    m.insert("seatgeek", 70);
    m.insert("serpapi", 60);
    m.insert("exa", 50);
    m.insert("perplexity", 40);
    m.insert("venue_scraper", 30);
    m
});

const DEFAULT_SOURCE_PRIORITY: i32 = 10;

fn source_priority(source_id: &str) -> i32 {
    SOURCE_PRIORITY
        .get(source_id.to_lowercase().as_str())
        .copied()
        .unwrap_or(DEFAULT_SOURCE_PRIORITY)
}

/// A set of records judged to represent the same real-world event, plus the
/// selected canonical record. Every input record belongs to exactly one
/// group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateGroup {
    pub canonical: EventRecord,
    pub members: Vec<EventRecord>,
}

/// Outcome of one deduplication pass.
#[derive(Debug, Clone)]
pub struct DedupResult {
    /// Canonical records, in group-creation order.
    pub unique_events: Vec<EventRecord>,
    pub duplicates_removed: usize,
    pub groups: Vec<DuplicateGroup>,
}

#[derive(Debug, Clone)]
pub struct DedupConfig {
    /// Pairwise score a record must exceed against a group's seed to join.
    pub similarity_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.75,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimilarityDeduplicator {
    config: DedupConfig,
}

impl SimilarityDeduplicator {
    pub fn new(config: DedupConfig) -> Self {
        Self { config }
    }

    /// Flatten all provider results and cluster near-duplicates.
    pub fn deduplicate(&self, provider_results: &[ProviderResult]) -> DedupResult {
        let records: Vec<EventRecord> = provider_results
            .iter()
            .flat_map(|r| r.events.iter().cloned())
            .collect();
        self.deduplicate_records(records)
    }

    /// Cluster a flat record list, preserving first-seen order.
    pub fn deduplicate_records(&self, records: Vec<EventRecord>) -> DedupResult {
        let n = records.len();
        let mut clustered = vec![false; n];
        let mut groups: Vec<DuplicateGroup> = Vec::new();

        for i in 0..n {
            if clustered[i] {
                continue;
            }
            clustered[i] = true;
            let mut members = vec![records[i].clone()];

            for j in (i + 1)..n {
                if clustered[j] {
                    continue;
                }
                // Seed-anchored: later records are compared against the
                // group's seed, never against other members.
                let score = pairwise_similarity(&records[i], &records[j]);
                metrics::dedup::pair_score(score);
                if score > self.config.similarity_threshold {
                    debug!(
                        "Grouping '{}' ({}) with seed '{}' ({}), score {:.3}",
                        records[j].title, records[j].source_id, records[i].title, records[i].source_id, score
                    );
                    clustered[j] = true;
                    members.push(records[j].clone());
                }
            }

            let canonical = select_canonical(&members);
            groups.push(DuplicateGroup { canonical, members });
        }

        let unique_events: Vec<EventRecord> = groups.iter().map(|g| g.canonical.clone()).collect();
        let duplicates_removed = n - unique_events.len();
        metrics::dedup::groups_formed(groups.len());
        metrics::dedup::duplicates_removed(duplicates_removed);

        DedupResult {
            unique_events,
            duplicates_removed,
            groups,
        }
    }
}

/// Weighted similarity in [0, 1] for one unordered pair. Components where
/// either record lacks the field drop out of the weighted denominator;
/// scoring them zero would sink sparse-but-identical pairs.
pub fn pairwise_similarity(a: &EventRecord, b: &EventRecord) -> f64 {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;

    weighted_sum += TITLE_WEIGHT * edit_ratio(&normalize_text(&a.title), &normalize_text(&b.title));
    weight_total += TITLE_WEIGHT;

    if let (Some(va), Some(vb)) = (non_empty(&a.venue_name), non_empty(&b.venue_name)) {
        weighted_sum += VENUE_WEIGHT * edit_ratio(&normalize_text(va), &normalize_text(vb));
        weight_total += VENUE_WEIGHT;
    }

    if let (Some(ta), Some(tb)) = (a.start_time, b.start_time) {
        weighted_sum += DATE_WEIGHT * date_similarity_secs((ta - tb).num_seconds().unsigned_abs() as f64);
        weight_total += DATE_WEIGHT;
    }

    if let (Some(la), Some(lb)) = (location_blob(a), location_blob(b)) {
        weighted_sum += LOCATION_WEIGHT * edit_ratio(&normalize_text(&la), &normalize_text(&lb));
        weight_total += LOCATION_WEIGHT;
    }

    if weight_total == 0.0 {
        return 0.0;
    }
    weighted_sum / weight_total
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn location_blob(record: &EventRecord) -> Option<String> {
    if let Some(text) = non_empty(&record.location_text) {
        return Some(text.to_string());
    }
    match (non_empty(&record.city), non_empty(&record.state)) {
        (Some(city), Some(state)) => Some(format!("{} {}", city, state)),
        (Some(city), None) => Some(city.to_string()),
        _ => None,
    }
}

/// 1.0 for identical timestamps, 0.0 beyond 24 hours, linear in between.
fn date_similarity_secs(diff_secs: f64) -> f64 {
    if diff_secs >= DATE_WINDOW_SECS {
        0.0
    } else {
        1.0 - diff_secs / DATE_WINDOW_SECS
    }
}

/// Normalized edit-distance ratio: `(max_len - distance) / max_len`.
fn edit_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    let distance = levenshtein(a, b);
    (max_len.saturating_sub(distance)) as f64 / max_len as f64
}

/// Lowercase, strip punctuation, drop stopwords, collapse whitespace.
fn normalize_text(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned
        .split_whitespace()
        .filter(|word| !STOPWORDS.contains(word))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Pick the canonical record for a group: highest source priority, ties
/// broken by completeness, then first-seen order. The winner carries merge
/// metadata for the whole group.
fn select_canonical(members: &[EventRecord]) -> EventRecord {
    let best_index = (0..members.len())
        .max_by(|&x, &y| {
            let a = &members[x];
            let b = &members[y];
            (source_priority(&a.source_id), a.completeness_score())
                .cmp(&(source_priority(&b.source_id), b.completeness_score()))
                // max_by keeps the later element on ties; prefer first-seen.
                .then(y.cmp(&x))
        })
        .unwrap_or(0);

    let mut canonical = members[best_index].clone();
    canonical.merged_count = members.len();
    let mut sources: Vec<String> = Vec::new();
    for member in members {
        if !sources.contains(&member.source_id) {
            sources.push(member.source_id.clone());
        }
    }
    canonical.merged_sources = sources;
    canonical
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EventCategory;
    use chrono::{TimeZone, Utc};

    fn record(title: &str, venue: &str, start: &str, source: &str) -> EventRecord {
        let mut r = EventRecord::new(title, EventCategory::Music, source);
        r.venue_name = Some(venue.to_string());
        r.start_time = Some(
            chrono::DateTime::parse_from_rfc3339(start)
                .unwrap()
                .with_timezone(&Utc),
        );
        r
    }

    #[test]
    fn jazz_night_scenario_merges_with_ticketmaster_canonical() {
        let a = record("Jazz Night", "Blue Note", "2025-06-01T20:00:00Z", "ticketmaster");
        let b = record("jazz night!!", "The Blue Note", "2025-06-01T20:30:00Z", "venue_scraper");

        let dedup = SimilarityDeduplicator::default();
        let result = dedup.deduplicate_records(vec![b, a]);

        assert_eq!(result.unique_events.len(), 1);
        assert_eq!(result.duplicates_removed, 1);
        let canonical = &result.unique_events[0];
        assert_eq!(canonical.source_id, "ticketmaster");
        assert_eq!(canonical.merged_count, 2);
        assert!(canonical.merged_sources.contains(&"venue_scraper".to_string()));
    }

    #[test]
    fn unrelated_records_are_never_grouped() {
        let a = record("Jazz Night", "Blue Note", "2025-06-01T20:00:00Z", "ticketmaster");
        let b = record(
            "Monster Truck Rally",
            "County Fairgrounds",
            "2025-08-15T14:00:00Z",
            "serpapi",
        );
        assert_eq!(pairwise_similarity(&a, &b) > 0.75, false);

        let dedup = SimilarityDeduplicator::default();
        let result = dedup.deduplicate_records(vec![a, b]);
        assert_eq!(result.unique_events.len(), 2);
        assert_eq!(result.duplicates_removed, 0);
    }

    #[test]
    fn identical_titles_and_venue_within_an_hour_group_together() {
        let a = record("Symphony No. 9", "Davies Hall", "2025-06-01T19:00:00Z", "predicthq");
        let b = record("Symphony No 9", "Davies Hall", "2025-06-01T19:45:00Z", "exa");
        assert!(pairwise_similarity(&a, &b) > 0.75);
    }

    #[test]
    fn partial_failure_leaves_other_provider_records_intact() {
        let failed = ProviderResult::failed("perplexity", "timeout", 30_000);
        let events = vec![
            record("Jazz Night", "Blue Note", "2025-06-01T20:00:00Z", "ticketmaster"),
            record("Monster Truck Rally", "Fairgrounds", "2025-06-03T14:00:00Z", "ticketmaster"),
            record("Pottery Workshop", "Clay Studio", "2025-06-05T10:00:00Z", "ticketmaster"),
            record("Symphony Gala", "Davies Hall", "2025-06-07T19:00:00Z", "ticketmaster"),
            record("Standup Showcase", "Punch Line", "2025-06-09T21:00:00Z", "ticketmaster"),
        ];
        let ok = ProviderResult::ok("ticketmaster", events, 800);

        let dedup = SimilarityDeduplicator::default();
        let result = dedup.deduplicate(&[failed, ok]);
        assert_eq!(result.unique_events.len(), 5);
    }

    #[test]
    fn canonical_selection_is_idempotent() {
        let members = vec![
            record("Jazz Night", "Blue Note", "2025-06-01T20:00:00Z", "exa"),
            record("Jazz Night Live", "Blue Note", "2025-06-01T20:00:00Z", "ticketmaster"),
            record("jazz night", "The Blue Note", "2025-06-01T20:30:00Z", "venue_scraper"),
        ];
        let first = select_canonical(&members);
        for _ in 0..10 {
            let again = select_canonical(&members);
            assert_eq!(again.source_id, first.source_id);
            assert_eq!(again.title, first.title);
        }
    }

    #[test]
    fn completeness_breaks_priority_ties() {
        let sparse = record("Jazz Night", "Blue Note", "2025-06-01T20:00:00Z", "serpapi");
        let mut rich = sparse.clone();
        rich.description = Some("An evening of jazz standards".to_string());
        rich.ticket_url = Some("https://tickets.example.com/jazz".to_string());

        let canonical = select_canonical(&[sparse, rich.clone()]);
        assert_eq!(canonical.description, rich.description);
    }

    #[test]
    fn clustering_is_seed_anchored() {
        // B and C each clear the threshold against seed A; they join A's
        // group in one pass regardless of their mutual score.
        let a = record("Jazz Night Live Session", "Blue Note", "2025-06-01T20:00:00Z", "ticketmaster");
        let b = record("Jazz Night Live", "Blue Note", "2025-06-01T20:10:00Z", "serpapi");
        let c = record("Jazz Night Live Sessions", "Blue Note", "2025-06-01T21:00:00Z", "exa");
        assert!(pairwise_similarity(&a, &b) > 0.75);
        assert!(pairwise_similarity(&a, &c) > 0.75);

        let dedup = SimilarityDeduplicator::default();
        let result = dedup.deduplicate_records(vec![a, b, c]);
        assert_eq!(result.unique_events.len(), 1);
        assert_eq!(result.groups[0].members.len(), 3);
    }

    #[test]
    fn missing_fields_drop_out_of_the_denominator() {
        let mut a = EventRecord::new("Jazz Night", EventCategory::Music, "exa");
        let mut b = EventRecord::new("Jazz Night", EventCategory::Music, "serpapi");
        a.venue_name = None;
        b.venue_name = None;
        // Title-only comparison: identical titles score 1.0.
        assert_eq!(pairwise_similarity(&a, &b), 1.0);
    }

    #[test]
    fn normalization_strips_punctuation_and_stopwords() {
        assert_eq!(normalize_text("Jazz Night!!"), "jazz night");
        assert_eq!(normalize_text("The Blue Note"), "blue note");
        assert_eq!(normalize_text("An Evening of Jazz, at the Park"), "evening jazz park");
    }
}
