//! Validation Gate: rejects structurally invalid records and listing-page
//! records (aggregate "Upcoming Events" pages masquerading as single events)
//! before the heavier filters run.
//!
//! The gate is a pure function of the record: same input, same verdict.
//! Rules short-circuit on the first failure; the reported reason is for
//! observability, not an ordering contract.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::EventRecord;

/// Why a record was rejected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    MissingTitle,
    ListingPageTitle,
    ListingPageUrl,
    MissingStartTime,
    PlaceholderVenue,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingTitle => "missing_title",
            Self::ListingPageTitle => "listing_page_title",
            Self::ListingPageUrl => "listing_page_url",
            Self::MissingStartTime => "missing_start_time",
            Self::PlaceholderVenue => "placeholder_venue",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gate verdict for one record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    Valid,
    Rejected(RejectReason),
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid)
    }
}

/// Titles that describe a listing page rather than a single event.
static LISTING_TITLE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)^(upcoming|best|top \d*)\s+.*(events|shows|concerts|things to do)",
        r"(?i)(events|shows|concerts|things to do)\s+(in|near|around)\s+\w+",
        r"(?i)\b(this|next)\s+(week|weekend|month)\b.*\b(guide|roundup|picks|listings?)\b",
        r"(?i)^(what'?s (on|happening))\b",
        r"(?i)\bevent\s+(calendar|listings?|guide)\b",
        r"(?i)(upcoming|best)\s+(shows|events)\s+(this|next)\s+(week|weekend|month)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("listing title pattern must compile"))
    .collect()
});

/// URL paths that point at calendars, search results, or listing indexes.
static LISTING_URL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)/(events?|shows?|concerts?)/?(\?|$)",
        r"(?i)/(calendar|listings?|schedule)(/|\?|$)",
        r"(?i)/search(/|\?|$)",
        r"(?i)/(category|categories|tag)/",
        r"(?i)/(whats-on|things-to-do)(/|\?|$)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("listing url pattern must compile"))
    .collect()
});

/// Venue strings that carry no venue information.
const PLACEHOLDER_VENUES: &[&str] = &[
    "tbd",
    "tba",
    "various locations",
    "multiple venues",
    "multiple locations",
    "online",
    "virtual",
    "venue tbd",
    "various",
];

/// Configuration for the gate's optional requirements.
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Reject records without a parseable start time.
    pub require_start_time: bool,
    /// Reject records whose venue is missing or a known placeholder.
    pub require_venue: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            require_start_time: false,
            require_venue: false,
        }
    }
}

/// The Validation Gate. Stateless apart from configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationGate {
    config: ValidationConfig,
}

impl ValidationGate {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate one record. Deterministic; first failing rule wins.
    pub fn validate(&self, record: &EventRecord) -> Verdict {
        let title = record.title.trim();
        if title.is_empty() {
            return Verdict::Rejected(RejectReason::MissingTitle);
        }

        if LISTING_TITLE_PATTERNS.iter().any(|p| p.is_match(title)) {
            return Verdict::Rejected(RejectReason::ListingPageTitle);
        }

        if let Some(url) = record.primary_url() {
            if let Some(path) = url_path(url) {
                if LISTING_URL_PATTERNS.iter().any(|p| p.is_match(path)) {
                    return Verdict::Rejected(RejectReason::ListingPageUrl);
                }
            }
        }

        if self.config.require_start_time && record.start_time.is_none() {
            return Verdict::Rejected(RejectReason::MissingStartTime);
        }

        if self.config.require_venue {
            match record.venue_name.as_deref().map(str::trim) {
                None | Some("") => return Verdict::Rejected(RejectReason::PlaceholderVenue),
                Some(venue) => {
                    let lower = venue.to_lowercase();
                    if PLACEHOLDER_VENUES.contains(&lower.as_str()) {
                        return Verdict::Rejected(RejectReason::PlaceholderVenue);
                    }
                }
            }
        }

        Verdict::Valid
    }
}

/// Extract the path (plus query) portion of a URL without a full URL parser.
fn url_path(url: &str) -> Option<&str> {
    let after_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    after_scheme.find('/').map(|idx| &after_scheme[idx..])
}
