//! Rules/Blacklist Filter: the broad heuristic layer that catches aggregator
//! and junk pages the exact blacklist has not seen yet.
//!
//! Two layers work together: the exact-match lists in [`crate::lists`]
//! short-circuit, then a scored regex ruleset (operator-curated, reloadable
//! on a timer) decides the rest. Scoring is additive; a record is blocked
//! when its net score falls to the threshold or below and no allow rule
//! matched.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use crate::lists::ListStore;
use crate::observability::metrics;

/// Net score at or below which an un-allowed record is blocked.
pub const BLOCK_THRESHOLD: f64 = -3.0;

const GLOBAL_BLOCK_WEIGHT: f64 = -2.0;
const BLOCK_PATH_WEIGHT: f64 = -3.0;
const PENALIZE_WORD_WEIGHT: f64 = -1.0;
const ALLOW_WEIGHT: f64 = 3.0;
const CONTENT_BONUS: f64 = 1.0;
const DATE_DIGEST_PENALTY: f64 = -2.0;

/// The on-disk rule document, keyed by domain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleDocument {
    /// Regexes applied to every URL path regardless of domain.
    #[serde(default)]
    pub global_block_tokens: Vec<String>,
    #[serde(default)]
    pub domains: HashMap<String, DomainRuleDocument>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainRuleDocument {
    /// Path regexes that mark a URL as a real event page; matching one
    /// offsets block signals and vetoes blocking.
    #[serde(default)]
    pub allow: Vec<String>,
    /// Path regexes for known listing/aggregate sections of the domain.
    #[serde(default)]
    pub block_paths: Vec<String>,
    /// Word regexes scored against title + description.
    #[serde(default)]
    pub penalize_words: Vec<String>,
}

/// A rule document with every pattern compiled. Malformed patterns are
/// skipped with a warning at compile time, not at check time.
#[derive(Debug, Default)]
struct CompiledRuleSet {
    global_block_tokens: Vec<Regex>,
    domains: HashMap<String, CompiledDomainRules>,
}

#[derive(Debug, Default)]
struct CompiledDomainRules {
    allow: Vec<Regex>,
    block_paths: Vec<Regex>,
    penalize_words: Vec<Regex>,
}

impl CompiledRuleSet {
    fn compile(doc: &RuleDocument) -> Self {
        let mut compiled = Self {
            global_block_tokens: compile_list("global_block_tokens", &doc.global_block_tokens),
            domains: HashMap::new(),
        };
        for (domain, rules) in &doc.domains {
            compiled.domains.insert(
                domain.trim().to_lowercase(),
                CompiledDomainRules {
                    allow: compile_list(&format!("{domain}.allow"), &rules.allow),
                    block_paths: compile_list(&format!("{domain}.block_paths"), &rules.block_paths),
                    penalize_words: compile_list(
                        &format!("{domain}.penalize_words"),
                        &rules.penalize_words,
                    ),
                },
            );
        }
        compiled
    }
}

fn compile_list(context: &str, patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!("Skipping malformed rule in {}: {} ({})", context, p, e);
                None
            }
        })
        .collect()
}

/// Outcome of checking one URL + text against the rules.
#[derive(Debug, Clone)]
pub struct RuleCheck {
    pub blocked: bool,
    pub score: f64,
    pub reasons: Vec<String>,
}

static DATE_MENTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        \b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{1,2}\b
        | \b\d{1,2}/\d{1,2}(/\d{2,4})?\b
        | \b\d{4}-\d{2}-\d{2}\b",
    )
    .expect("date mention pattern must compile")
});

static TICKET_SIGNAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(tickets?|rsvp)\b").expect("ticket signal pattern must compile"));

/// The rules engine: compiled ruleset behind a lock, reloadable from its
/// backing file, plus the exact-match list store.
pub struct RulesEngine {
    path: PathBuf,
    ruleset: RwLock<Arc<CompiledRuleSet>>,
    lists: Arc<ListStore>,
}

impl RulesEngine {
    /// Load the rule document from `path`. A missing file yields an empty
    /// ruleset (only the exact lists apply).
    pub fn open<P: AsRef<Path>>(path: P, lists: Arc<ListStore>) -> Self {
        let path = path.as_ref().to_path_buf();
        let ruleset = Self::load_file(&path).unwrap_or_else(|e| {
            if path.exists() {
                warn!("Failed to load rule document {}: {}", path.display(), e);
            }
            CompiledRuleSet::default()
        });
        Self {
            path,
            ruleset: RwLock::new(Arc::new(ruleset)),
            lists,
        }
    }

    fn load_file(path: &Path) -> anyhow::Result<CompiledRuleSet> {
        let content = fs::read_to_string(path)?;
        let doc: RuleDocument = serde_json::from_str(&content)?;
        Ok(CompiledRuleSet::compile(&doc))
    }

    /// Recompile from the backing file; failures keep the last-good ruleset.
    pub fn reload(&self) {
        match Self::load_file(&self.path) {
            Ok(fresh) => {
                if let Ok(mut guard) = self.ruleset.write() {
                    *guard = Arc::new(fresh);
                }
                debug!("Rule document reloaded from {}", self.path.display());
            }
            Err(e) => warn!("Rule reload failed, keeping last-good ruleset: {}", e),
        }
    }

    /// Check one URL (with its title and description text) against both
    /// layers. Exact blacklist hits block unconditionally; otherwise the
    /// additive score and allow-veto decide.
    pub fn check_url(&self, url: &str, title: &str, description: &str) -> RuleCheck {
        let domain = url_host(url).unwrap_or_default();
        let path = url_path(url).unwrap_or("/");
        let text = format!("{} {}", title, description);

        // Layer 1: exact lists.
        if self.lists.is_domain_blocked(&domain) {
            metrics::rules::blocked();
            return RuleCheck {
                blocked: true,
                score: f64::NEG_INFINITY,
                reasons: vec![format!("blocked_domain:{}", domain)],
            };
        }
        if self.lists.is_event_blocked(title) {
            metrics::rules::blocked();
            return RuleCheck {
                blocked: true,
                score: f64::NEG_INFINITY,
                reasons: vec!["blocked_event".to_string()],
            };
        }

        // Layer 2: scored heuristics.
        let mut score = 0.0;
        let mut reasons = Vec::new();
        let mut allow_matched = false;

        if self.lists.is_domain_allowed(&domain) {
            score += ALLOW_WEIGHT;
            allow_matched = true;
            reasons.push(format!("allowed_domain:{}", domain));
        }

        let ruleset = self
            .ruleset
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        for token in &ruleset.global_block_tokens {
            if token.is_match(path) {
                score += GLOBAL_BLOCK_WEIGHT;
                reasons.push(format!("global_block:{}", token.as_str()));
            }
        }

        if let Some(rules) = ruleset.domains.get(&domain) {
            for re in &rules.allow {
                if re.is_match(path) {
                    score += ALLOW_WEIGHT;
                    allow_matched = true;
                    reasons.push(format!("allow:{}", re.as_str()));
                }
            }
            for re in &rules.block_paths {
                if re.is_match(path) {
                    score += BLOCK_PATH_WEIGHT;
                    reasons.push(format!("block_path:{}", re.as_str()));
                }
            }
            for re in &rules.penalize_words {
                if re.is_match(&text) {
                    score += PENALIZE_WORD_WEIGHT;
                    reasons.push(format!("penalize:{}", re.as_str()));
                }
            }
        }

        // Weak positive content signals.
        if TICKET_SIGNAL.is_match(&text) {
            score += CONTENT_BONUS;
            reasons.push("has_ticket_signal".to_string());
        }
        let date_mentions = distinct_date_mentions(&text);
        if date_mentions == 1 {
            score += CONTENT_BONUS;
            reasons.push("single_date_mention".to_string());
        } else if date_mentions >= 3 {
            // Many distinct dates on one page reads as a listing digest.
            score += DATE_DIGEST_PENALTY;
            reasons.push(format!("date_digest:{}", date_mentions));
        }

        let blocked = !allow_matched && score <= BLOCK_THRESHOLD;
        metrics::rules::score(score);
        if allow_matched {
            metrics::rules::allow_matched();
        }
        if blocked {
            metrics::rules::blocked();
        }

        RuleCheck {
            blocked,
            score,
            reasons,
        }
    }
}

fn distinct_date_mentions(text: &str) -> usize {
    DATE_MENTION
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect::<HashSet<_>>()
        .len()
}

/// Hostname portion of a URL, lowercased, `www.` stripped.
pub fn url_host(url: &str) -> Option<String> {
    let after_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let host = after_scheme
        .split(['/', '?', '#'])
        .next()?
        .split('@')
        .last()?
        .split(':')
        .next()?
        .trim()
        .to_lowercase();
    if host.is_empty() {
        return None;
    }
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

fn url_path(url: &str) -> Option<&str> {
    let after_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    after_scheme.find('/').map(|idx| &after_scheme[idx..])
}
