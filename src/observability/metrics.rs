//! Metric catalog for the curation pipeline.
//!
//! Every metric name used in the system lives in the [`MetricName`] enum so
//! call sites never carry magic strings, and the Prometheus naming
//! conventions are applied in exactly one place.

use std::fmt;

/// Enum representing all metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Collection metrics
    CollectionProviderSuccess,
    CollectionProviderError,
    CollectionProviderTimeout,
    CollectionDuration,
    CollectionRecordsFetched,

    // Validation gate metrics
    ValidationAccepted,
    ValidationRejected,

    // Rules filter metrics
    RulesBlocked,
    RulesAllowMatched,
    RulesScore,

    // Geographic filter metrics
    GeoKept,
    GeoDropped,
    GeoMissingLocation,

    // Date filter metrics
    DateKept,
    DateDropped,
    DateUnparsed,

    // Deduplication metrics
    DedupGroupsFormed,
    DedupDuplicatesRemoved,
    DedupPairScore,

    // Cache metrics
    CacheHit,
    CacheMiss,
    CacheStaleServed,
    CacheWriteSuccess,
    CacheWriteError,

    // Refresh metrics
    RefreshStarted,
    RefreshSucceeded,
    RefreshFailed,
    RefreshRejectedInFlight,
    RefreshDuration,
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricName::CollectionProviderSuccess => "curate_collection_provider_success_total",
            MetricName::CollectionProviderError => "curate_collection_provider_error_total",
            MetricName::CollectionProviderTimeout => "curate_collection_provider_timeout_total",
            MetricName::CollectionDuration => "curate_collection_duration_seconds",
            MetricName::CollectionRecordsFetched => "curate_collection_records_fetched_total",

            MetricName::ValidationAccepted => "curate_validation_accepted_total",
            MetricName::ValidationRejected => "curate_validation_rejected_total",

            MetricName::RulesBlocked => "curate_rules_blocked_total",
            MetricName::RulesAllowMatched => "curate_rules_allow_matched_total",
            MetricName::RulesScore => "curate_rules_score",

            MetricName::GeoKept => "curate_geo_kept_total",
            MetricName::GeoDropped => "curate_geo_dropped_total",
            MetricName::GeoMissingLocation => "curate_geo_missing_location_total",

            MetricName::DateKept => "curate_date_kept_total",
            MetricName::DateDropped => "curate_date_dropped_total",
            MetricName::DateUnparsed => "curate_date_unparsed_total",

            MetricName::DedupGroupsFormed => "curate_dedup_groups_formed_total",
            MetricName::DedupDuplicatesRemoved => "curate_dedup_duplicates_removed_total",
            MetricName::DedupPairScore => "curate_dedup_pair_score",

            MetricName::CacheHit => "curate_cache_hit_total",
            MetricName::CacheMiss => "curate_cache_miss_total",
            MetricName::CacheStaleServed => "curate_cache_stale_served_total",
            MetricName::CacheWriteSuccess => "curate_cache_write_success_total",
            MetricName::CacheWriteError => "curate_cache_write_error_total",

            MetricName::RefreshStarted => "curate_refresh_started_total",
            MetricName::RefreshSucceeded => "curate_refresh_succeeded_total",
            MetricName::RefreshFailed => "curate_refresh_failed_total",
            MetricName::RefreshRejectedInFlight => "curate_refresh_rejected_in_flight_total",
            MetricName::RefreshDuration => "curate_refresh_duration_seconds",
        };
        f.write_str(name)
    }
}

fn increment(name: MetricName) {
    metrics::counter!(name.to_string()).increment(1);
}

fn record(name: MetricName, value: f64) {
    metrics::histogram!(name.to_string()).record(value);
}

pub mod collection {
    use super::*;

    pub fn provider_success(provider: &str) {
        metrics::counter!(
            MetricName::CollectionProviderSuccess.to_string(),
            "provider" => provider.to_string()
        )
        .increment(1);
    }

    pub fn provider_error(provider: &str) {
        metrics::counter!(
            MetricName::CollectionProviderError.to_string(),
            "provider" => provider.to_string()
        )
        .increment(1);
    }

    pub fn provider_timeout(provider: &str) {
        metrics::counter!(
            MetricName::CollectionProviderTimeout.to_string(),
            "provider" => provider.to_string()
        )
        .increment(1);
    }

    pub fn duration_seconds(secs: f64) {
        record(MetricName::CollectionDuration, secs);
    }

    pub fn records_fetched(count: usize) {
        metrics::counter!(MetricName::CollectionRecordsFetched.to_string()).increment(count as u64);
    }
}

pub mod validation {
    use super::*;

    pub fn accepted() {
        increment(MetricName::ValidationAccepted);
    }

    pub fn rejected(reason: &str) {
        metrics::counter!(
            MetricName::ValidationRejected.to_string(),
            "reason" => reason.to_string()
        )
        .increment(1);
    }
}

pub mod rules {
    use super::*;

    pub fn blocked() {
        increment(MetricName::RulesBlocked);
    }

    pub fn allow_matched() {
        increment(MetricName::RulesAllowMatched);
    }

    pub fn score(value: f64) {
        record(MetricName::RulesScore, value);
    }
}

pub mod geo {
    use super::*;

    pub fn kept() {
        increment(MetricName::GeoKept);
    }

    pub fn dropped() {
        increment(MetricName::GeoDropped);
    }

    pub fn missing_location() {
        increment(MetricName::GeoMissingLocation);
    }
}

pub mod dates {
    use super::*;

    pub fn kept() {
        increment(MetricName::DateKept);
    }

    pub fn dropped() {
        increment(MetricName::DateDropped);
    }

    pub fn unparsed() {
        increment(MetricName::DateUnparsed);
    }
}

pub mod dedup {
    use super::*;

    pub fn groups_formed(count: usize) {
        metrics::counter!(MetricName::DedupGroupsFormed.to_string()).increment(count as u64);
    }

    pub fn duplicates_removed(count: usize) {
        metrics::counter!(MetricName::DedupDuplicatesRemoved.to_string()).increment(count as u64);
    }

    pub fn pair_score(value: f64) {
        record(MetricName::DedupPairScore, value);
    }
}

pub mod cache {
    use super::*;

    pub fn hit() {
        increment(MetricName::CacheHit);
    }

    pub fn miss() {
        increment(MetricName::CacheMiss);
    }

    pub fn stale_served() {
        increment(MetricName::CacheStaleServed);
    }

    pub fn write_success() {
        increment(MetricName::CacheWriteSuccess);
    }

    pub fn write_error() {
        increment(MetricName::CacheWriteError);
    }
}

pub mod refresh {
    use super::*;

    pub fn started() {
        increment(MetricName::RefreshStarted);
    }

    pub fn succeeded() {
        increment(MetricName::RefreshSucceeded);
    }

    pub fn failed() {
        increment(MetricName::RefreshFailed);
    }

    pub fn rejected_in_flight() {
        increment(MetricName::RefreshRejectedInFlight);
    }

    pub fn duration_seconds(secs: f64) {
        record(MetricName::RefreshDuration, secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_follow_prometheus_conventions() {
        assert_eq!(
            MetricName::CacheHit.to_string(),
            "curate_cache_hit_total"
        );
        assert_eq!(
            MetricName::RefreshDuration.to_string(),
            "curate_refresh_duration_seconds"
        );
    }
}
