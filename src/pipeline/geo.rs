//! Geographic Filter: keeps records plausibly located within the target
//! region. City/state extraction is best-effort; records with no location
//! signal at all are kept (benefit of the doubt) unless strict mode is on.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::debug;

use crate::domain::EventRecord;
use crate::observability::metrics;

/// A known multi-city metro area. Any member city is in-scope when the
/// target names the metro or any of its member cities (narrower region name
/// is subsumed by the broader region's accepted set).
struct MetroArea {
    aliases: &'static [&'static str],
    state: &'static str,
    center: (f64, f64),
    members: &'static [&'static str],
}

static METRO_AREAS: Lazy<Vec<MetroArea>> = Lazy::new(|| {
    vec![
        MetroArea {
            aliases: &["san francisco bay area", "bay area", "san francisco", "sf"],
            state: "CA",
            center: (37.7749, -122.4194),
            members: &[
                "san francisco",
                "oakland",
                "berkeley",
                "san jose",
                "palo alto",
                "mountain view",
                "sunnyvale",
                "santa clara",
                "fremont",
                "daly city",
                "sausalito",
                "mill valley",
                "san rafael",
                "walnut creek",
                "hayward",
                "redwood city",
                "san mateo",
                "emeryville",
                "alameda",
            ],
        },
        MetroArea {
            aliases: &["seattle metro", "seattle"],
            state: "WA",
            center: (47.6062, -122.3321),
            members: &[
                "seattle", "bellevue", "redmond", "kirkland", "tacoma", "everett", "renton",
                "shoreline", "bothell",
            ],
        },
        MetroArea {
            aliases: &["new york metro", "new york city", "new york", "nyc"],
            state: "NY",
            center: (40.7128, -74.0060),
            members: &[
                "new york",
                "brooklyn",
                "queens",
                "manhattan",
                "bronx",
                "staten island",
                "jersey city",
                "hoboken",
                "newark",
                "yonkers",
            ],
        },
        MetroArea {
            aliases: &["los angeles metro", "los angeles", "la"],
            state: "CA",
            center: (34.0522, -118.2437),
            members: &[
                "los angeles",
                "santa monica",
                "pasadena",
                "long beach",
                "burbank",
                "glendale",
                "culver city",
                "west hollywood",
                "inglewood",
                "anaheim",
            ],
        },
        MetroArea {
            aliases: &["chicago metro", "chicago"],
            state: "IL",
            center: (41.8781, -87.6298),
            members: &["chicago", "evanston", "oak park", "skokie", "cicero", "naperville"],
        },
    ]
});

/// Adjacent US states (two-letter codes, symmetric). Only states that appear
/// in the metro table and their neighbors need entries; unknown pairs are
/// treated as non-adjacent.
static ADJACENT_STATES: Lazy<HashMap<&'static str, &'static [&'static str]>> = Lazy::new(|| {
    let mut m: HashMap<&'static str, &'static [&'static str]> = HashMap::new();
    m.insert("CA", &["OR", "NV", "AZ"]);
    m.insert("OR", &["CA", "WA", "NV", "ID"]);
    m.insert("WA", &["OR", "ID"]);
    m.insert("NV", &["CA", "OR", "AZ", "ID", "UT"]);
    m.insert("AZ", &["CA", "NV", "UT", "NM"]);
    m.insert("NY", &["NJ", "CT", "PA", "MA", "VT"]);
    m.insert("NJ", &["NY", "PA", "DE"]);
    m.insert("CT", &["NY", "MA", "RI"]);
    m.insert("PA", &["NY", "NJ", "OH", "MD", "DE", "WV"]);
    m.insert("IL", &["WI", "IN", "IA", "MO", "KY"]);
    m.insert("WI", &["IL", "MN", "IA", "MI"]);
    m.insert("IN", &["IL", "MI", "OH", "KY"]);
    m
});

/// "City, ST" with an optional trailing zip, anywhere in a text blob.
static CITY_STATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)([A-Za-z][A-Za-z .'\-]{1,40}?),\s*([A-Z]{2})\b").expect("city/state pattern")
});

#[derive(Debug, Clone)]
pub struct GeoOptions {
    /// Used only when both the target region and the record carry
    /// coordinates.
    pub radius_miles: Option<f64>,
    /// Drop records with no location signal instead of keeping them.
    pub strict_mode: bool,
}

impl Default for GeoOptions {
    fn default() -> Self {
        Self {
            radius_miles: None,
            strict_mode: false,
        }
    }
}

/// Filter configured for one target location.
pub struct GeographicFilter {
    target_city: String,
    target_state: Option<String>,
    /// Accepted member cities when the target is (or belongs to) a metro.
    accepted_cities: Vec<String>,
    center: Option<(f64, f64)>,
    options: GeoOptions,
}

impl GeographicFilter {
    pub fn new(target_location: &str, options: GeoOptions) -> Self {
        let normalized = target_location.trim().to_lowercase();
        let (target_city, target_state) = split_city_state(&normalized);

        // Aliases match the parsed target city exactly; a prefix match would
        // let short aliases ("la") capture unrelated targets ("las vegas").
        let metro = METRO_AREAS.iter().find(|m| {
            m.aliases.contains(&target_city.as_str())
                || m.members.contains(&target_city.as_str())
        });

        let (accepted_cities, center, metro_state) = match metro {
            Some(m) => (
                m.members.iter().map(|c| c.to_string()).collect(),
                Some(m.center),
                Some(m.state.to_string()),
            ),
            None => (vec![target_city.clone()], None, None),
        };

        Self {
            target_city,
            target_state: target_state.or(metro_state),
            accepted_cities,
            center,
            options,
        }
    }

    /// Apply the filter, preserving input order.
    pub fn filter(&self, records: Vec<EventRecord>) -> Vec<EventRecord> {
        records
            .into_iter()
            .filter(|r| {
                let keep = self.is_in_scope(r);
                if keep {
                    metrics::geo::kept();
                } else {
                    metrics::geo::dropped();
                    debug!("Dropped out-of-region record: {}", r.title);
                }
                keep
            })
            .collect()
    }

    /// Decide whether one record is plausibly in the target region.
    pub fn is_in_scope(&self, record: &EventRecord) -> bool {
        // Coordinates are the strongest signal when a radius applies.
        if let (Some(radius), Some(center), Some(lat), Some(lng)) = (
            self.options.radius_miles,
            self.center,
            record.latitude,
            record.longitude,
        ) {
            return distance_miles(center, (lat, lng)) <= radius;
        }

        let extracted = self.extract_city_state(record);
        let (city, state) = match extracted {
            Some(pair) => pair,
            None => {
                metrics::geo::missing_location();
                return !self.options.strict_mode;
            }
        };

        // Cross-state: reject unless the states are adjacent. Metro member
        // cities can span a border (e.g. NYC metro into NJ), so membership
        // is checked first.
        if self.accepted_cities.iter().any(|c| c == &city) {
            return true;
        }

        if let (Some(record_state), Some(target_state)) = (state.as_deref(), self.target_state.as_deref())
        {
            if record_state != target_state {
                return is_adjacent(target_state, record_state);
            }
            // Same state, unknown city: plausible.
            return true;
        }

        // City known but no state to compare: accept only on a city match
        // with the target itself.
        city == self.target_city
    }

    fn extract_city_state(&self, record: &EventRecord) -> Option<(String, Option<String>)> {
        if let Some(city) = record.city.as_deref().filter(|c| !c.trim().is_empty()) {
            let state = record
                .state
                .as_deref()
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty());
            return Some((city.trim().to_lowercase(), state));
        }
        for text in [record.location_text.as_deref(), record.venue_name.as_deref()]
            .into_iter()
            .flatten()
        {
            if let Some(caps) = CITY_STATE.captures(text) {
                let city = caps[1].trim().to_lowercase();
                let state = caps[2].to_uppercase();
                return Some((city, Some(state)));
            }
        }
        None
    }
}

fn split_city_state(location: &str) -> (String, Option<String>) {
    match location.rsplit_once(',') {
        Some((city, state)) if state.trim().len() == 2 => (
            city.trim().to_string(),
            Some(state.trim().to_uppercase()),
        ),
        _ => (location.to_string(), None),
    }
}

fn is_adjacent(a: &str, b: &str) -> bool {
    ADJACENT_STATES
        .get(a)
        .map_or(false, |neighbors| neighbors.contains(&b))
}

/// Flat-earth approximation, fine at metro scale.
fn distance_miles(a: (f64, f64), b: (f64, f64)) -> f64 {
    let lat_km = (a.0 - b.0) * 111.0;
    let lng_km = (a.1 - b.1) * 111.0 * a.0.to_radians().cos();
    (lat_km * lat_km + lng_km * lng_km).sqrt() * 0.621371
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EventCategory;

    fn record_in(city: &str, state: &str) -> EventRecord {
        let mut r = EventRecord::new("Jazz Night", EventCategory::Music, "ticketmaster");
        r.city = Some(city.to_string());
        r.state = Some(state.to_string());
        r
    }

    fn filter_for(target: &str) -> GeographicFilter {
        GeographicFilter::new(target, GeoOptions::default())
    }

    #[test]
    fn metro_member_city_is_in_scope() {
        let f = filter_for("San Francisco, CA");
        assert!(f.is_in_scope(&record_in("Oakland", "CA")));
        assert!(f.is_in_scope(&record_in("Berkeley", "CA")));
    }

    #[test]
    fn metro_alias_subsumes_member_cities() {
        let f = filter_for("Bay Area");
        assert!(f.is_in_scope(&record_in("Palo Alto", "CA")));
    }

    #[test]
    fn short_alias_does_not_capture_prefixed_targets() {
        // "Las Vegas" must not adopt the Los Angeles metro via the "la"
        // alias: its accepted-city set stays its own.
        let f = filter_for("Las Vegas, NV");
        let mut santa_monica = EventRecord::new("Jazz Night", EventCategory::Music, "serpapi");
        santa_monica.city = Some("Santa Monica".to_string());
        assert!(!f.is_in_scope(&santa_monica));

        assert!(f.is_in_scope(&record_in("Las Vegas", "NV")));

        // The exact aliases still resolve their metro.
        let la = filter_for("LA");
        assert!(la.is_in_scope(&record_in("Santa Monica", "CA")));
    }

    #[test]
    fn non_adjacent_state_is_rejected() {
        let f = filter_for("San Francisco, CA");
        assert!(!f.is_in_scope(&record_in("New York", "NY")));
    }

    #[test]
    fn adjacent_state_is_kept() {
        let f = filter_for("San Francisco, CA");
        assert!(f.is_in_scope(&record_in("Reno", "NV")));
    }

    #[test]
    fn metro_members_across_state_line_are_kept() {
        let f = filter_for("New York, NY");
        assert!(f.is_in_scope(&record_in("Jersey City", "NJ")));
    }

    #[test]
    fn missing_location_kept_by_default_dropped_in_strict_mode() {
        let lenient = filter_for("San Francisco, CA");
        let strict = GeographicFilter::new(
            "San Francisco, CA",
            GeoOptions {
                radius_miles: None,
                strict_mode: true,
            },
        );
        let r = EventRecord::new("Jazz Night", EventCategory::Music, "exa");
        assert!(lenient.is_in_scope(&r));
        assert!(!strict.is_in_scope(&r));
    }

    #[test]
    fn city_state_extracted_from_location_text() {
        let f = filter_for("San Francisco, CA");
        let mut r = EventRecord::new("Jazz Night", EventCategory::Music, "serpapi");
        r.location_text = Some("Blue Note, 123 Main St, Oakland, CA 94607".to_string());
        assert!(f.is_in_scope(&r));
    }

    #[test]
    fn radius_check_uses_coordinates_when_available() {
        let f = GeographicFilter::new(
            "San Francisco, CA",
            GeoOptions {
                radius_miles: Some(30.0),
                strict_mode: false,
            },
        );
        let mut near = EventRecord::new("Jazz Night", EventCategory::Music, "predicthq");
        near.latitude = Some(37.8044); // Oakland
        near.longitude = Some(-122.2712);
        let mut far = near.clone();
        far.latitude = Some(34.0522); // Los Angeles
        far.longitude = Some(-118.2437);
        assert!(f.is_in_scope(&near));
        assert!(!f.is_in_scope(&far));
    }
}
