//! Provider clients: thin adapters that translate each vendor's schema into
//! the common [`EventRecord`] shape. Each client owns its own HTTP quirks;
//! the pipeline only ever sees the uniform `ProviderResult` contract.

use async_trait::async_trait;
use std::env;
use std::sync::Arc;
use tracing::warn;

use crate::common::error::Result;
use crate::domain::{EventQuery, EventRecord};

pub mod exa;
pub mod predicthq;
pub mod serpapi;
pub mod ticketmaster;

pub use exa::ExaProvider;
pub use predicthq::PredictHqProvider;
pub use serpapi::SerpApiProvider;
pub use ticketmaster::TicketmasterProvider;

/// One external event-data source.
#[async_trait]
pub trait EventProvider: Send + Sync {
    /// Stable provider tag, used as `EventRecord::source_id`.
    fn provider_id(&self) -> &'static str;

    /// Fetch and map events for a query. Implementations return their own
    /// errors; the Collection Orchestrator turns those into failed
    /// `ProviderResult`s and never lets them cancel sibling providers.
    async fn search(&self, query: &EventQuery) -> Result<Vec<EventRecord>>;
}

/// Builds the enabled provider set from configuration. Providers whose API
/// key is missing are skipped with a warning rather than constructed broken.
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn EventProvider>>,
}

impl ProviderRegistry {
    pub fn from_enabled(enabled: &[String]) -> Self {
        let client = reqwest::Client::new();
        let mut providers: Vec<Arc<dyn EventProvider>> = Vec::new();

        for name in enabled {
            match name.as_str() {
                "ticketmaster" => match env::var("TICKETMASTER_API_KEY") {
                    Ok(key) => providers.push(Arc::new(TicketmasterProvider::new(client.clone(), key))),
                    Err(_) => warn!("Skipping ticketmaster provider: TICKETMASTER_API_KEY not set"),
                },
                "predicthq" => match env::var("PREDICTHQ_API_KEY") {
                    Ok(key) => providers.push(Arc::new(PredictHqProvider::new(client.clone(), key))),
                    Err(_) => warn!("Skipping predicthq provider: PREDICTHQ_API_KEY not set"),
                },
                "serpapi" => match env::var("SERPAPI_API_KEY") {
                    Ok(key) => providers.push(Arc::new(SerpApiProvider::new(client.clone(), key))),
                    Err(_) => warn!("Skipping serpapi provider: SERPAPI_API_KEY not set"),
                },
                "exa" => match env::var("EXA_API_KEY") {
                    Ok(key) => providers.push(Arc::new(ExaProvider::new(client.clone(), key))),
                    Err(_) => warn!("Skipping exa provider: EXA_API_KEY not set"),
                },
                other => warn!("Unknown provider '{}' in configuration, skipping", other),
            }
        }

        Self { providers }
    }

    /// Wrap pre-built providers; tests inject mocks this way.
    pub fn from_providers(providers: Vec<Arc<dyn EventProvider>>) -> Self {
        Self { providers }
    }

    pub fn providers(&self) -> &[Arc<dyn EventProvider>] {
        &self.providers
    }

    pub fn provider_ids(&self) -> Vec<String> {
        self.providers
            .iter()
            .map(|p| p.provider_id().to_string())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
