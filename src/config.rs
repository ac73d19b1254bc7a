use chrono::NaiveTime;
use chrono_tz::Tz;
use std::env;
use std::time::Duration;

use crate::common::error::{PipelineError, Result};

/// Runtime configuration, loaded once at startup from environment variables
/// (via dotenv) with code defaults. Everything downstream receives explicit
/// config or handles, never reads the environment itself.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Canonical IANA zone for civil-day anchoring and the daily schedule.
    /// The deployment process and its audience can be in different machine
    /// time zones; this zone wins.
    pub timezone: Tz,
    /// Wall-clock time of the daily refresh in the canonical zone.
    pub daily_refresh_time: NaiveTime,
    /// Age after which a cached response is served with a stale flag.
    pub staleness: Duration,
    /// Independent timeout applied to each provider call.
    pub provider_timeout: Duration,
    /// Interval for re-reading the rules and list documents.
    pub reload_interval: Duration,
    pub cache_db_path: String,
    pub rules_path: String,
    pub lists_path: String,
    pub default_location: String,
    pub enabled_providers: Vec<String>,
    /// Drop records with no location signal instead of keeping them.
    pub strict_location: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8765,
            timezone: chrono_tz::America::Los_Angeles,
            daily_refresh_time: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            staleness: Duration::from_secs(24 * 3600),
            provider_timeout: Duration::from_secs(30),
            reload_interval: Duration::from_secs(300),
            cache_db_path: "data/cache.db".to_string(),
            rules_path: "config/domain_rules.json".to_string(),
            lists_path: "config/curation_lists.json".to_string(),
            default_location: "San Francisco, CA".to_string(),
            enabled_providers: vec![
                "ticketmaster".to_string(),
                "predicthq".to_string(),
                "serpapi".to_string(),
                "exa".to_string(),
            ],
            strict_location: false,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let timezone: Tz = match env::var("CANONICAL_TIMEZONE") {
            Ok(name) => name
                .parse()
                .map_err(|_| PipelineError::Config(format!("unknown time zone: {}", name)))?,
            Err(_) => defaults.timezone,
        };

        let daily_refresh_time = match env::var("DAILY_REFRESH_TIME") {
            Ok(raw) => NaiveTime::parse_from_str(&raw, "%H:%M").map_err(|_| {
                PipelineError::Config(format!("DAILY_REFRESH_TIME must be HH:MM, got {}", raw))
            })?,
            Err(_) => defaults.daily_refresh_time,
        };

        let enabled_providers = match env::var("ENABLED_PROVIDERS") {
            Ok(raw) => raw
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(_) => defaults.enabled_providers,
        };

        Ok(Self {
            port: env_parsed("PORT", defaults.port),
            timezone,
            daily_refresh_time,
            staleness: Duration::from_secs(env_parsed("STALENESS_HOURS", 24u64) * 3600),
            provider_timeout: Duration::from_secs(env_parsed("PROVIDER_TIMEOUT_SECS", 30u64)),
            reload_interval: Duration::from_secs(env_parsed("RULES_RELOAD_SECS", 300u64)),
            cache_db_path: env::var("CACHE_DB_PATH").unwrap_or(defaults.cache_db_path),
            rules_path: env::var("RULES_PATH").unwrap_or(defaults.rules_path),
            lists_path: env::var("LISTS_PATH").unwrap_or(defaults.lists_path),
            default_location: env::var("DEFAULT_LOCATION").unwrap_or(defaults.default_location),
            enabled_providers,
            strict_location: env::var("STRICT_LOCATION")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.strict_location),
        })
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.timezone, chrono_tz::America::Los_Angeles);
        assert_eq!(config.daily_refresh_time, NaiveTime::from_hms_opt(6, 0, 0).unwrap());
        assert!(config.enabled_providers.contains(&"ticketmaster".to_string()));
    }
}
