//! Multi-provider event aggregation: concurrent collection from external
//! event APIs, a fixed-order curation pipeline (validation, rules,
//! geography, dates, deduplication), and a cache-first HTTP API refreshed
//! on a daily schedule.

pub mod cache;
pub mod common;
pub mod config;
pub mod domain;
pub mod lists;
pub mod observability;
pub mod pipeline;
pub mod providers;
pub mod server;

pub use common::error::{PipelineError, Result};
pub use config::AppConfig;
pub use domain::{CuratedFeed, EventCategory, EventQuery, EventRecord, ProviderResult};
