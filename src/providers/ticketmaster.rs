//! Ticketmaster Discovery API client. The highest-priority structured
//! source: records arrive with real venue, city/state, and timestamps.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use super::EventProvider;
use crate::common::error::Result;
use crate::domain::{EventCategory, EventQuery, EventRecord};

const BASE_URL: &str = "https://app.ticketmaster.com/discovery/v2/events.json";

pub struct TicketmasterProvider {
    client: reqwest::Client,
    api_key: String,
}

impl TicketmasterProvider {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self { client, api_key }
    }

    fn classification_for(category: EventCategory) -> &'static str {
        match category {
            EventCategory::Music => "Music",
            EventCategory::Theatre | EventCategory::Comedy => "Arts & Theatre",
            EventCategory::Sports => "Sports",
            EventCategory::Movies => "Film",
            _ => "Miscellaneous",
        }
    }
}

#[derive(Debug, Deserialize)]
struct DiscoveryResponse {
    #[serde(rename = "_embedded")]
    embedded: Option<Embedded>,
}

#[derive(Debug, Deserialize)]
struct Embedded {
    #[serde(default)]
    events: Vec<TmEvent>,
}

#[derive(Debug, Deserialize)]
struct TmEvent {
    name: String,
    url: Option<String>,
    dates: Option<TmDates>,
    info: Option<String>,
    #[serde(rename = "priceRanges", default)]
    price_ranges: Vec<TmPriceRange>,
    #[serde(rename = "_embedded")]
    embedded: Option<TmEventEmbedded>,
}

#[derive(Debug, Deserialize)]
struct TmDates {
    start: Option<TmStart>,
}

#[derive(Debug, Deserialize)]
struct TmStart {
    #[serde(rename = "dateTime")]
    date_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct TmPriceRange {
    min: Option<f64>,
    max: Option<f64>,
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmEventEmbedded {
    #[serde(default)]
    venues: Vec<TmVenue>,
}

#[derive(Debug, Deserialize)]
struct TmVenue {
    name: Option<String>,
    city: Option<TmNamed>,
    state: Option<TmState>,
    location: Option<TmLocation>,
    address: Option<TmAddress>,
}

#[derive(Debug, Deserialize)]
struct TmNamed {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmState {
    #[serde(rename = "stateCode")]
    state_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmLocation {
    latitude: Option<String>,
    longitude: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmAddress {
    line1: Option<String>,
}

fn map_event(event: TmEvent, category: EventCategory) -> EventRecord {
    let mut record = EventRecord::new(event.name, category, "ticketmaster");
    record.confidence = 0.95;
    record.description = event.info;
    record.ticket_url = event.url.clone();
    record.event_url = event.url;
    record.start_time = event.dates.and_then(|d| d.start).and_then(|s| s.date_time);

    if let Some(range) = event.price_ranges.first() {
        if let (Some(min), Some(max)) = (range.min, range.max) {
            let currency = range.currency.as_deref().unwrap_or("USD");
            record.price_range = Some(format!("{:.0}-{:.0} {}", min, max, currency));
        }
    }

    if let Some(venue) = event.embedded.and_then(|e| e.venues.into_iter().next()) {
        record.venue_name = venue.name;
        record.city = venue.city.and_then(|c| c.name);
        record.state = venue.state.and_then(|s| s.state_code);
        if let Some(addr) = venue.address.and_then(|a| a.line1) {
            let tail = match (record.city.as_deref(), record.state.as_deref()) {
                (Some(city), Some(state)) => format!("{}, {}, {}", addr, city, state),
                (Some(city), None) => format!("{}, {}", addr, city),
                _ => addr,
            };
            record.location_text = Some(tail);
        }
        if let Some(loc) = venue.location {
            record.latitude = loc.latitude.and_then(|v| v.parse().ok());
            record.longitude = loc.longitude.and_then(|v| v.parse().ok());
        }
    }

    record
}

#[async_trait]
impl EventProvider for TicketmasterProvider {
    fn provider_id(&self) -> &'static str {
        "ticketmaster"
    }

    async fn search(&self, query: &EventQuery) -> Result<Vec<EventRecord>> {
        let city = query
            .location
            .split(',')
            .next()
            .unwrap_or(&query.location)
            .trim();

        let response = self
            .client
            .get(BASE_URL)
            .query(&[
                ("apikey", self.api_key.as_str()),
                ("city", city),
                ("classificationName", Self::classification_for(query.category)),
                ("size", &query.limit.min(200).to_string()),
                ("sort", "date,asc"),
            ])
            .send()
            .await?
            .error_for_status()?;

        let parsed: DiscoveryResponse = response.json().await?;
        let events = parsed
            .embedded
            .map(|e| e.events)
            .unwrap_or_default()
            .into_iter()
            .map(|e| map_event(e, query.category))
            .collect::<Vec<_>>();

        debug!("ticketmaster returned {} events for {}", events.len(), city);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_discovery_event_fields() {
        let json = r#"{
            "name": "Jazz Night",
            "url": "https://www.ticketmaster.com/event/abc",
            "info": "An evening of jazz",
            "dates": {"start": {"dateTime": "2025-06-01T20:00:00Z"}},
            "priceRanges": [{"min": 25.0, "max": 60.0, "currency": "USD"}],
            "_embedded": {"venues": [{
                "name": "Blue Note",
                "city": {"name": "San Francisco"},
                "state": {"stateCode": "CA"},
                "location": {"latitude": "37.7749", "longitude": "-122.4194"},
                "address": {"line1": "123 Main St"}
            }]}
        }"#;
        let event: TmEvent = serde_json::from_str(json).unwrap();
        let record = map_event(event, EventCategory::Music);

        assert_eq!(record.title, "Jazz Night");
        assert_eq!(record.venue_name.as_deref(), Some("Blue Note"));
        assert_eq!(record.city.as_deref(), Some("San Francisco"));
        assert_eq!(record.state.as_deref(), Some("CA"));
        assert_eq!(record.price_range.as_deref(), Some("25-60 USD"));
        assert!(record.start_time.is_some());
        assert_eq!(record.latitude, Some(37.7749));
        assert_eq!(record.source_id, "ticketmaster");
    }
}
