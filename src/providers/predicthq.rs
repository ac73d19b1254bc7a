//! PredictHQ events API client. Structured source with its own category
//! taxonomy; known metro targets use a coordinate-radius query, everything
//! else falls back to a text query.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use super::EventProvider;
use crate::common::error::Result;
use crate::domain::{EventCategory, EventQuery, EventRecord};

const BASE_URL: &str = "https://api.predicthq.com/v1/events";

pub struct PredictHqProvider {
    client: reqwest::Client,
    api_key: String,
}

impl PredictHqProvider {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self { client, api_key }
    }

    fn phq_category(category: EventCategory) -> &'static str {
        match category {
            EventCategory::Music => "concerts",
            EventCategory::Theatre | EventCategory::Comedy => "performing-arts",
            EventCategory::Sports => "sports",
            EventCategory::Food => "festivals",
            EventCategory::Art => "expos",
            EventCategory::Lectures | EventCategory::Tech => "conferences",
            _ => "performing-arts",
        }
    }

    /// Coordinate centers for locations we can query by radius instead of
    /// free text, which PredictHQ resolves far more precisely.
    fn known_center(location: &str) -> Option<(f64, f64)> {
        let lower = location.to_lowercase();
        if lower.contains("san francisco") || lower.contains("bay area") {
            Some((37.7749, -122.4194))
        } else if lower.contains("seattle") {
            Some((47.6062, -122.3321))
        } else if lower.contains("new york") {
            Some((40.7128, -74.0060))
        } else {
            None
        }
    }
}

#[derive(Debug, Deserialize)]
struct PhqResponse {
    #[serde(default)]
    results: Vec<PhqEvent>,
}

#[derive(Debug, Deserialize)]
struct PhqEvent {
    title: String,
    description: Option<String>,
    category: Option<String>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    #[serde(default)]
    location: Vec<f64>,
    geo: Option<PhqGeo>,
    #[serde(default)]
    entities: Vec<PhqEntity>,
}

#[derive(Debug, Deserialize)]
struct PhqGeo {
    address: Option<PhqAddress>,
}

#[derive(Debug, Deserialize)]
struct PhqAddress {
    locality: Option<String>,
    region: Option<String>,
    formatted_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PhqEntity {
    name: Option<String>,
    #[serde(rename = "type")]
    entity_type: Option<String>,
}

fn map_event(event: PhqEvent, fallback_category: EventCategory) -> EventRecord {
    let category = event
        .category
        .as_deref()
        .map(EventCategory::from_vendor)
        .filter(|c| *c != EventCategory::General)
        .unwrap_or(fallback_category);

    let mut record = EventRecord::new(event.title, category, "predicthq");
    record.confidence = 0.85;
    record.description = event.description;
    record.start_time = event.start;
    record.end_time = event.end;

    // PredictHQ location is [lng, lat].
    if event.location.len() == 2 {
        record.longitude = Some(event.location[0]);
        record.latitude = Some(event.location[1]);
    }

    if let Some(address) = event.geo.and_then(|g| g.address) {
        record.city = address.locality;
        record.state = address.region.map(abbreviate_state);
        record.location_text = address.formatted_address;
    }

    record.venue_name = event
        .entities
        .into_iter()
        .find(|e| e.entity_type.as_deref() == Some("venue"))
        .and_then(|e| e.name);

    record
}

/// PredictHQ returns full region names; the pipeline compares two-letter
/// codes. Unknown names pass through unchanged.
fn abbreviate_state(region: String) -> String {
    match region.as_str() {
        "California" => "CA".to_string(),
        "Washington" => "WA".to_string(),
        "New York" => "NY".to_string(),
        "Oregon" => "OR".to_string(),
        "Nevada" => "NV".to_string(),
        "Illinois" => "IL".to_string(),
        "New Jersey" => "NJ".to_string(),
        other if other.len() == 2 => other.to_uppercase(),
        _ => region,
    }
}

#[async_trait]
impl EventProvider for PredictHqProvider {
    fn provider_id(&self) -> &'static str {
        "predicthq"
    }

    async fn search(&self, query: &EventQuery) -> Result<Vec<EventRecord>> {
        let mut request = self
            .client
            .get(BASE_URL)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .query(&[
                ("category", Self::phq_category(query.category)),
                ("limit", &query.limit.min(200).to_string()),
                ("sort", "start"),
            ]);

        request = match Self::known_center(&query.location) {
            Some((lat, lng)) => {
                request.query(&[("location.within", format!("10km@{},{}", lat, lng))])
            }
            None => {
                let q = query
                    .location
                    .split(',')
                    .next()
                    .unwrap_or(&query.location)
                    .trim()
                    .to_string();
                request.query(&[("q", q)])
            }
        };

        let response = request.send().await?.error_for_status()?;
        let parsed: PhqResponse = response.json().await?;
        let events: Vec<EventRecord> = parsed
            .results
            .into_iter()
            .map(|e| map_event(e, query.category))
            .collect();

        debug!("predicthq returned {} events", events.len());
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_phq_event_with_geo_and_venue_entity() {
        let json = r#"{
            "title": "Symphony Gala",
            "description": "Season opener",
            "category": "performing-arts",
            "start": "2025-06-07T19:00:00Z",
            "location": [-122.4194, 37.7749],
            "geo": {"address": {"locality": "San Francisco", "region": "California",
                                "formatted_address": "201 Van Ness Ave, San Francisco, CA"}},
            "entities": [{"name": "Davies Symphony Hall", "type": "venue"}]
        }"#;
        let event: PhqEvent = serde_json::from_str(json).unwrap();
        let record = map_event(event, EventCategory::Music);

        assert_eq!(record.category, EventCategory::Theatre);
        assert_eq!(record.venue_name.as_deref(), Some("Davies Symphony Hall"));
        assert_eq!(record.state.as_deref(), Some("CA"));
        assert_eq!(record.latitude, Some(37.7749));
        assert_eq!(record.longitude, Some(-122.4194));
    }

    #[test]
    fn category_mapping_covers_all_variants() {
        assert_eq!(PredictHqProvider::phq_category(EventCategory::Music), "concerts");
        assert_eq!(PredictHqProvider::phq_category(EventCategory::Theatre), "performing-arts");
        assert_eq!(PredictHqProvider::phq_category(EventCategory::Food), "festivals");
        assert_eq!(PredictHqProvider::phq_category(EventCategory::Lectures), "conferences");
    }
}
