//! Operator-curated exact-match lists: blocked domains, blocked event titles,
//! and allowed domains. The narrow exact layer sits in front of the broader
//! regex heuristics in `pipeline::rules` so a known-bad domain can be
//! hard-blocked immediately.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{info, warn};

use crate::common::error::Result;

/// The on-disk document. Sets are kept sorted so the file diff stays readable
/// when operators edit it by hand.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurationLists {
    #[serde(default)]
    pub blocked_domains: BTreeSet<String>,
    /// Lowercased exact titles of known-bad events.
    #[serde(default)]
    pub blocked_events: BTreeSet<String>,
    #[serde(default)]
    pub allowed_domains: BTreeSet<String>,
}

/// File-backed list store with an in-memory copy. Reload failures keep the
/// last-good copy; writes persist then reload.
pub struct ListStore {
    path: PathBuf,
    lists: RwLock<CurationLists>,
}

impl ListStore {
    /// Open the store, loading the document if it exists. A missing file is
    /// an empty list set, not an error.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let lists = match Self::read_file(&path) {
            Ok(lists) => lists,
            Err(e) => {
                if path.exists() {
                    warn!("Failed to load curation lists from {}: {}", path.display(), e);
                }
                CurationLists::default()
            }
        };
        info!(
            "Curation lists loaded: {} blocked domains, {} blocked events, {} allowed domains",
            lists.blocked_domains.len(),
            lists.blocked_events.len(),
            lists.allowed_domains.len()
        );
        Ok(Self {
            path,
            lists: RwLock::new(lists),
        })
    }

    fn read_file(path: &Path) -> anyhow::Result<CurationLists> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Re-read the backing file. On any failure the in-memory copy is left
    /// untouched.
    pub fn reload(&self) {
        match Self::read_file(&self.path) {
            Ok(fresh) => {
                if let Ok(mut guard) = self.lists.write() {
                    *guard = fresh;
                }
            }
            Err(e) => {
                warn!(
                    "Curation list reload failed, keeping last-good copy: {}",
                    e
                );
            }
        }
    }

    pub fn is_domain_blocked(&self, domain: &str) -> bool {
        let needle = domain.trim().to_lowercase();
        self.lists
            .read()
            .map(|l| l.blocked_domains.contains(&needle))
            .unwrap_or(false)
    }

    pub fn is_domain_allowed(&self, domain: &str) -> bool {
        let needle = domain.trim().to_lowercase();
        self.lists
            .read()
            .map(|l| l.allowed_domains.contains(&needle))
            .unwrap_or(false)
    }

    pub fn is_event_blocked(&self, title: &str) -> bool {
        let needle = title.trim().to_lowercase();
        self.lists
            .read()
            .map(|l| l.blocked_events.contains(&needle))
            .unwrap_or(false)
    }

    pub fn block_domain(&self, domain: &str) -> Result<()> {
        self.mutate(|l| {
            l.blocked_domains.insert(domain.trim().to_lowercase());
        })
    }

    pub fn unblock_domain(&self, domain: &str) -> Result<()> {
        self.mutate(|l| {
            l.blocked_domains.remove(&domain.trim().to_lowercase());
        })
    }

    pub fn block_event(&self, title: &str) -> Result<()> {
        self.mutate(|l| {
            l.blocked_events.insert(title.trim().to_lowercase());
        })
    }

    pub fn allow_domain(&self, domain: &str) -> Result<()> {
        self.mutate(|l| {
            l.allowed_domains.insert(domain.trim().to_lowercase());
        })
    }

    /// Apply an edit, persist it, then reload from disk so the in-memory
    /// copy always reflects what was committed.
    fn mutate<F: FnOnce(&mut CurationLists)>(&self, edit: F) -> Result<()> {
        let snapshot = {
            let mut guard = self
                .lists
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            edit(&mut guard);
            guard.clone()
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&snapshot)?;
        fs::write(&self.path, json)?;
        self.reload();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_empty_lists() {
        let dir = tempdir().unwrap();
        let store = ListStore::open(dir.path().join("lists.json")).unwrap();
        assert!(!store.is_domain_blocked("spamcalendar.com"));
    }

    #[test]
    fn block_then_unblock_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lists.json");
        let store = ListStore::open(&path).unwrap();

        store.block_domain("SpamCalendar.com").unwrap();
        assert!(store.is_domain_blocked("spamcalendar.com"));

        // A fresh store sees the persisted edit.
        let reopened = ListStore::open(&path).unwrap();
        assert!(reopened.is_domain_blocked("spamcalendar.com"));

        store.unblock_domain("spamcalendar.com").unwrap();
        assert!(!store.is_domain_blocked("spamcalendar.com"));
    }

    #[test]
    fn event_titles_match_case_insensitively() {
        let dir = tempdir().unwrap();
        let store = ListStore::open(dir.path().join("lists.json")).unwrap();
        store.block_event("Fake Festival 2025").unwrap();
        assert!(store.is_event_blocked("fake festival 2025"));
        assert!(store.is_event_blocked("FAKE FESTIVAL 2025"));
    }

    #[test]
    fn reload_failure_keeps_last_good_copy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lists.json");
        let store = ListStore::open(&path).unwrap();
        store.block_domain("bad.example").unwrap();

        fs::write(&path, "{not valid json").unwrap();
        store.reload();
        assert!(store.is_domain_blocked("bad.example"));
    }
}
