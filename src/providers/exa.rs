//! Exa neural search client. A discovery source rather than a listings
//! database: results are web pages about events, so records come back
//! low-confidence and mostly for the validation gate to sort out.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::EventProvider;
use crate::common::error::Result;
use crate::domain::{EventQuery, EventRecord};

const SEARCH_URL: &str = "https://api.exa.ai/search";

pub struct ExaProvider {
    client: reqwest::Client,
    api_key: String,
}

impl ExaProvider {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

#[derive(Debug, Deserialize)]
struct ExaResponse {
    #[serde(default)]
    results: Vec<ExaResult>,
}

#[derive(Debug, Deserialize)]
struct ExaResult {
    title: Option<String>,
    url: String,
    summary: Option<String>,
    #[serde(rename = "publishedDate")]
    published_date: Option<DateTime<Utc>>,
}

fn map_result(result: ExaResult, category: crate::domain::EventCategory) -> Option<EventRecord> {
    let title = result.title.filter(|t| !t.trim().is_empty())?;

    let mut record = EventRecord::new(title, category, "exa");
    record.confidence = 0.4;
    record.external_url = Some(result.url.clone());
    record.event_url = Some(result.url);
    record.description = result.summary;
    // publishedDate is when the page went up, not when the event is; it
    // only gates obviously-stale results and never becomes a start time.
    if let Some(published) = result.published_date {
        if Utc::now() - published > chrono::Duration::days(365) {
            return None;
        }
    }
    Some(record)
}

#[async_trait]
impl EventProvider for ExaProvider {
    fn provider_id(&self) -> &'static str {
        "exa"
    }

    async fn search(&self, query: &EventQuery) -> Result<Vec<EventRecord>> {
        let payload = json!({
            "query": format!("upcoming {} events in {}", query.category, query.location),
            "type": "fast",
            "numResults": query.limit.min(25),
            "contents": {
                "text": { "maxCharacters": 1000 },
                "summary": { "query": "What event is this page about, and when and where is it?" }
            }
        });

        let response = self
            .client
            .post(SEARCH_URL)
            .header("x-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        let parsed: ExaResponse = response.json().await?;
        let events: Vec<EventRecord> = parsed
            .results
            .into_iter()
            .filter_map(|r| map_result(r, query.category))
            .collect();

        debug!("exa returned {} candidate events", events.len());
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EventCategory;

    #[test]
    fn maps_result_and_drops_untitled_pages() {
        let json = r#"{
            "title": "Jazz Night at the Blue Note",
            "url": "https://bluenote.example.com/events/jazz-night",
            "summary": "Weekly jazz showcase"
        }"#;
        let result: ExaResult = serde_json::from_str(json).unwrap();
        let record = map_result(result, EventCategory::Music).unwrap();
        assert_eq!(record.source_id, "exa");
        assert!(record.confidence < 0.5);
        assert_eq!(
            record.external_url.as_deref(),
            Some("https://bluenote.example.com/events/jazz-night")
        );

        let untitled: ExaResult =
            serde_json::from_str(r#"{"url": "https://example.com", "title": "  "}"#).unwrap();
        assert!(map_result(untitled, EventCategory::Music).is_none());
    }

    #[test]
    fn year_old_pages_are_dropped() {
        let stale = ExaResult {
            title: Some("Jazz Night".to_string()),
            url: "https://example.com/old".to_string(),
            summary: None,
            published_date: Some(Utc::now() - chrono::Duration::days(400)),
        };
        assert!(map_result(stale, EventCategory::Music).is_none());
    }
}
