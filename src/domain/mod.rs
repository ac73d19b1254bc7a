use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Normalized event categories shared across all providers.
///
/// Provider clients are responsible for mapping vendor-specific category
/// strings into this enum before a record enters the pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Music,
    Theatre,
    Comedy,
    Art,
    Food,
    Sports,
    Lectures,
    Movies,
    Tech,
    General,
}

impl EventCategory {
    /// Best-effort mapping from a free-form vendor category string.
    pub fn from_vendor(raw: &str) -> Self {
        let lower = raw.trim().to_lowercase();
        match lower.as_str() {
            "music" | "concert" | "concerts" => Self::Music,
            "theatre" | "theater" | "performing-arts" | "performing arts" => Self::Theatre,
            "comedy" | "standup" | "stand-up" => Self::Comedy,
            "art" | "arts" | "expos" | "exhibits" | "museum" => Self::Art,
            "food" | "food & drink" | "festivals" | "festival" => Self::Food,
            "sports" | "sport" => Self::Sports,
            "lectures" | "lecture" | "talks" | "conferences" => Self::Lectures,
            "movies" | "film" | "cinema" => Self::Movies,
            "tech" | "technology" => Self::Tech,
            _ => Self::General,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Music => "music",
            Self::Theatre => "theatre",
            Self::Comedy => "comedy",
            Self::Art => "art",
            Self::Food => "food",
            Self::Sports => "sports",
            Self::Lectures => "lectures",
            Self::Movies => "movies",
            Self::Tech => "tech",
            Self::General => "general",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One candidate event, normalized from any provider.
///
/// A record entering the deduplicator always carries a non-empty `title`
/// and a `source_id`; everything else is best-effort.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: EventCategory,
    #[serde(default)]
    pub venue_name: Option<String>,
    #[serde(default)]
    pub location_text: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Provider tag, e.g. "ticketmaster" or "venue_scraper".
    pub source_id: String,
    #[serde(default)]
    pub event_url: Option<String>,
    #[serde(default)]
    pub ticket_url: Option<String>,
    #[serde(default)]
    pub external_url: Option<String>,
    #[serde(default)]
    pub price_range: Option<String>,
    /// Provider-asserted quality, 0.0 to 1.0.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// How many raw records were merged into this one (1 = no duplicates).
    #[serde(default = "default_merged_count")]
    pub merged_count: usize,
    /// Source tags that contributed duplicates of this event.
    #[serde(default)]
    pub merged_sources: Vec<String>,
}

fn default_confidence() -> f64 {
    0.5
}

fn default_merged_count() -> usize {
    1
}

impl EventRecord {
    pub fn new(title: impl Into<String>, category: EventCategory, source_id: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            category,
            venue_name: None,
            location_text: None,
            city: None,
            state: None,
            latitude: None,
            longitude: None,
            start_time: None,
            end_time: None,
            source_id: source_id.into(),
            event_url: None,
            ticket_url: None,
            external_url: None,
            price_range: None,
            confidence: default_confidence(),
            merged_count: 1,
            merged_sources: Vec::new(),
        }
    }

    /// Derived completeness: how many of the fixed field list are populated.
    ///
    /// Used as the tie-breaker for canonical selection; never provider-asserted.
    pub fn completeness_score(&self) -> usize {
        let has = |s: &Option<String>| s.as_deref().map_or(false, |v| !v.trim().is_empty());
        let mut score = 0usize;
        if !self.title.trim().is_empty() {
            score += 1;
        }
        if has(&self.venue_name) {
            score += 1;
        }
        if has(&self.location_text) || has(&self.city) {
            score += 1;
        }
        if self.start_time.is_some() {
            score += 1;
        }
        if has(&self.description) {
            score += 1;
        }
        if has(&self.external_url) {
            score += 1;
        }
        if has(&self.ticket_url) {
            score += 1;
        }
        if has(&self.price_range) {
            score += 1;
        }
        if self.latitude.is_some() && self.longitude.is_some() {
            score += 1;
        }
        score
    }

    /// Best URL to show a user, in preference order.
    pub fn primary_url(&self) -> Option<&str> {
        self.event_url
            .as_deref()
            .or(self.ticket_url.as_deref())
            .or(self.external_url.as_deref())
    }
}

/// The outcome of one provider call. A failed provider never blocks others.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResult {
    pub provider: String,
    pub success: bool,
    pub events: Vec<EventRecord>,
    #[serde(default)]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl ProviderResult {
    pub fn ok(provider: impl Into<String>, events: Vec<EventRecord>, elapsed_ms: u64) -> Self {
        Self {
            provider: provider.into(),
            success: true,
            events,
            error: None,
            elapsed_ms,
        }
    }

    pub fn failed(provider: impl Into<String>, error: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            provider: provider.into(),
            success: false,
            events: Vec::new(),
            error: Some(error.into()),
            elapsed_ms,
        }
    }
}

/// Query parameters that affect a feed build. The canonical serialization of
/// these fields is the cache key input, so field order here is fixed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventQuery {
    pub category: EventCategory,
    pub location: String,
    /// Human-readable range spec, e.g. "next 30 days".
    pub date_range: String,
    pub limit: usize,
    /// Enabled provider tags, order-insensitive.
    pub providers: Vec<String>,
}

impl EventQuery {
    pub fn new(category: EventCategory, location: impl Into<String>) -> Self {
        Self {
            category,
            location: location.into(),
            date_range: "next 30 days".to_string(),
            limit: 100,
            providers: Vec::new(),
        }
    }

    /// Deterministic serialization of every parameter that affects the
    /// result. Providers are sorted so enable-order does not change the key.
    pub fn canonical_string(&self) -> String {
        let mut providers = self.providers.clone();
        providers.sort();
        format!(
            "category={}|location={}|range={}|limit={}|providers={}",
            self.category,
            self.location.trim().to_lowercase(),
            self.date_range.trim().to_lowercase(),
            self.limit,
            providers.join(",")
        )
    }
}

/// Aggregate statistics for one provider within a finished feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStats {
    pub count: usize,
    pub processing_time_ms: u64,
    #[serde(default)]
    pub error: Option<String>,
}

/// The finished, deduplicated response payload stored in the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CuratedFeed {
    pub events: Vec<EventRecord>,
    /// Per-provider contribution stats, keyed by provider tag.
    pub source_stats: BTreeMap<String, SourceStats>,
    /// Rejection-reason counts from the filter chain, keyed by reason tag.
    pub rejections: BTreeMap<String, usize>,
    pub duplicates_removed: usize,
    pub generated_at: DateTime<Utc>,
}

impl CuratedFeed {
    pub fn empty() -> Self {
        Self {
            events: Vec::new(),
            source_stats: BTreeMap::new(),
            rejections: BTreeMap::new(),
            duplicates_removed: 0,
            generated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_mapping_handles_vendor_aliases() {
        assert_eq!(EventCategory::from_vendor("performing-arts"), EventCategory::Theatre);
        assert_eq!(EventCategory::from_vendor("Concerts"), EventCategory::Music);
        assert_eq!(EventCategory::from_vendor("mystery-genre"), EventCategory::General);
    }

    #[test]
    fn canonical_string_is_order_insensitive_for_providers() {
        let mut a = EventQuery::new(EventCategory::Music, "San Francisco, CA");
        a.providers = vec!["serpapi".into(), "ticketmaster".into()];
        let mut b = a.clone();
        b.providers = vec!["ticketmaster".into(), "serpapi".into()];
        assert_eq!(a.canonical_string(), b.canonical_string());
    }

    #[test]
    fn completeness_counts_populated_fields_only() {
        let mut record = EventRecord::new("Jazz Night", EventCategory::Music, "ticketmaster");
        let base = record.completeness_score();
        record.venue_name = Some("Blue Note".to_string());
        record.description = Some("An evening of jazz".to_string());
        assert_eq!(record.completeness_score(), base + 2);
        record.venue_name = Some("   ".to_string());
        assert_eq!(record.completeness_score(), base + 1);
    }
}
