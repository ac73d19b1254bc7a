//! SerpAPI google_events client. A scraped source: dates arrive as fuzzy
//! strings ("Sat, Jun 7, 8:00 PM"), so start times are best-effort and
//! records lean on the pipeline's benefit-of-the-doubt handling.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use tracing::debug;

use super::EventProvider;
use crate::common::error::Result;
use crate::domain::{EventQuery, EventRecord};

const BASE_URL: &str = "https://serpapi.com/search";

pub struct SerpApiProvider {
    client: reqwest::Client,
    api_key: String,
}

impl SerpApiProvider {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

#[derive(Debug, Deserialize)]
struct SerpResponse {
    #[serde(default)]
    events_results: Vec<SerpEvent>,
}

#[derive(Debug, Deserialize)]
struct SerpEvent {
    title: String,
    description: Option<String>,
    link: Option<String>,
    date: Option<SerpDate>,
    #[serde(default)]
    address: Vec<String>,
    venue: Option<SerpVenue>,
    #[serde(default)]
    ticket_info: Vec<SerpTicket>,
}

#[derive(Debug, Deserialize)]
struct SerpDate {
    start_date: Option<String>,
    when: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SerpVenue {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SerpTicket {
    link: Option<String>,
}

/// Google-style start dates are "Jun 7" or "Dec 31"; assume the next
/// occurrence from `now`. Unparsable input is simply no start time.
fn parse_fuzzy_date(raw: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let mut parts = raw.split_whitespace();
    let month = match parts.next()?.to_lowercase().as_str() {
        "jan" => 1, "feb" => 2, "mar" => 3, "apr" => 4, "may" => 5, "jun" => 6,
        "jul" => 7, "aug" => 8, "sep" => 9, "oct" => 10, "nov" => 11, "dec" => 12,
        _ => return None,
    };
    let day: u32 = parts.next()?.trim_end_matches(',').parse().ok()?;

    let this_year = NaiveDate::from_ymd_opt(now.year(), month, day)?;
    let date = if this_year < now.date_naive() {
        NaiveDate::from_ymd_opt(now.year() + 1, month, day)?
    } else {
        this_year
    };
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

fn map_event(event: SerpEvent, now: DateTime<Utc>, category: crate::domain::EventCategory) -> EventRecord {
    let mut record = EventRecord::new(event.title, category, "serpapi");
    record.confidence = 0.6;
    record.event_url = event.link;
    record.ticket_url = event.ticket_info.into_iter().find_map(|t| t.link);
    record.venue_name = event.venue.and_then(|v| v.name);

    if !event.address.is_empty() {
        record.location_text = Some(event.address.join(", "));
    }

    let description = event.description;
    record.start_time = event
        .date
        .as_ref()
        .and_then(|d| d.start_date.as_deref())
        .and_then(|raw| parse_fuzzy_date(raw, now));
    // Keep the human-readable "when" text when we could not parse a date.
    record.description = match (&record.start_time, event.date.and_then(|d| d.when)) {
        (None, Some(when)) => Some(match description {
            Some(desc) => format!("{} ({})", desc, when),
            None => when,
        }),
        _ => description,
    };

    record
}

#[async_trait]
impl EventProvider for SerpApiProvider {
    fn provider_id(&self) -> &'static str {
        "serpapi"
    }

    async fn search(&self, query: &EventQuery) -> Result<Vec<EventRecord>> {
        let q = format!("{} events in {}", query.category, query.location);
        let response = self
            .client
            .get(BASE_URL)
            .query(&[
                ("engine", "google_events"),
                ("q", &q),
                ("hl", "en"),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let parsed: SerpResponse = response.json().await?;
        let now = Utc::now();
        let events: Vec<EventRecord> = parsed
            .events_results
            .into_iter()
            .take(query.limit)
            .map(|e| map_event(e, now, query.category))
            .collect();

        debug!("serpapi returned {} events for '{}'", events.len(), q);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EventCategory;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn fuzzy_date_resolves_to_next_occurrence() {
        let parsed = parse_fuzzy_date("Jun 7", now()).unwrap();
        assert_eq!(parsed.date_naive(), NaiveDate::from_ymd_opt(2025, 6, 7).unwrap());

        // A month already past rolls into next year.
        let rolled = parse_fuzzy_date("Jan 15", now()).unwrap();
        assert_eq!(rolled.date_naive(), NaiveDate::from_ymd_opt(2026, 1, 15).unwrap());
    }

    #[test]
    fn unparsable_date_keeps_when_text_in_description() {
        let json = r#"{
            "title": "Jazz Night",
            "link": "https://venue.example.com/jazz-night",
            "date": {"start_date": "next weekend", "when": "Sat, 8 PM"},
            "address": ["Blue Note", "San Francisco, CA"],
            "venue": {"name": "Blue Note"}
        }"#;
        let event: SerpEvent = serde_json::from_str(json).unwrap();
        let record = map_event(event, now(), EventCategory::Music);

        assert!(record.start_time.is_none());
        assert_eq!(record.description.as_deref(), Some("Sat, 8 PM"));
        assert_eq!(record.location_text.as_deref(), Some("Blue Note, San Francisco, CA"));
    }
}
