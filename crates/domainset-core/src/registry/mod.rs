//! Per-database registry
//!
//! The registry holds one entry per configured database name: the source
//! spec, the in-memory domain set, and the last-updated timestamp. Entries
//! are created at engine construction and never added or removed afterwards,
//! so the top-level map needs no lock for lookup; each entry guards its own
//! domain set with a reader-writer lock.
//!
//! ## Locking
//!
//! Queries vastly outnumber refreshes, so the set sits behind an `RwLock`
//! and readers only hold it for a single hash probe. Writers build the
//! replacement set off-lock and take the write guard just for the swap, so
//! a reader observes either the fully old or fully new set.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use crate::config::DataSource;

/// State for one configured database.
pub(crate) struct DbEntry {
    source: DataSource,
    domains: RwLock<HashSet<String>>,
    last_updated_unix: AtomicI64,
}

impl DbEntry {
    fn new(source: DataSource) -> Self {
        Self {
            source,
            domains: RwLock::new(HashSet::new()),
            last_updated_unix: AtomicI64::new(0),
        }
    }

    /// The source spec this database is fed from.
    pub(crate) fn source(&self) -> &DataSource {
        &self.source
    }

    /// Probe the set for an already-normalized domain.
    pub(crate) fn contains(&self, domain: &str) -> bool {
        self.domains.read().unwrap().contains(domain)
    }

    /// Swap in a freshly built set, replacing the previous one whole.
    pub(crate) fn replace(&self, domains: HashSet<String>) {
        *self.domains.write().unwrap() = domains;
    }

    /// Number of domains currently loaded.
    pub(crate) fn len(&self) -> usize {
        self.domains.read().unwrap().len()
    }

    /// Drop the set contents, releasing their memory.
    pub(crate) fn clear(&self) {
        let mut guard = self.domains.write().unwrap();
        *guard = HashSet::new();
    }

    /// Unix timestamp of the most recent successful refresh; 0 means never.
    pub(crate) fn last_updated_unix(&self) -> i64 {
        self.last_updated_unix.load(Ordering::Acquire)
    }

    pub(crate) fn set_last_updated_unix(&self, ts: i64) {
        self.last_updated_unix.store(ts, Ordering::Release);
    }
}

/// Immutable-after-construction mapping of database name to entry.
pub(crate) struct DbRegistry {
    entries: HashMap<String, DbEntry>,
}

impl DbRegistry {
    pub(crate) fn from_sources(sources: HashMap<String, DataSource>) -> Self {
        let entries = sources
            .into_iter()
            .map(|(name, source)| (name, DbEntry::new(source)))
            .collect();
        Self { entries }
    }

    pub(crate) fn get(&self, name: &str) -> Option<&DbEntry> {
        self.entries.get(name)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &DbEntry)> {
        self.entries.iter()
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Drop every entry's set contents. Entries themselves stay.
    pub(crate) fn clear_all(&self) {
        for entry in self.entries.values() {
            entry.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn entry() -> DbEntry {
        DbEntry::new(DataSource::from_urls(vec![], Duration::from_secs(60)))
    }

    #[test]
    fn replace_swaps_whole_set() {
        let entry = entry();
        assert!(!entry.contains("a.com"));

        entry.replace(HashSet::from(["a.com".to_string(), "b.com".to_string()]));
        assert!(entry.contains("a.com"));
        assert!(entry.contains("b.com"));
        assert_eq!(entry.len(), 2);

        entry.replace(HashSet::from(["c.com".to_string()]));
        assert!(!entry.contains("a.com"));
        assert!(entry.contains("c.com"));
        assert_eq!(entry.len(), 1);
    }

    #[test]
    fn clear_releases_set() {
        let entry = entry();
        entry.replace(HashSet::from(["a.com".to_string()]));
        entry.clear();
        assert_eq!(entry.len(), 0);
    }

    #[test]
    fn last_updated_defaults_to_never() {
        let entry = entry();
        assert_eq!(entry.last_updated_unix(), 0);
        entry.set_last_updated_unix(1_700_000_000);
        assert_eq!(entry.last_updated_unix(), 1_700_000_000);
    }

    #[test]
    fn registry_lookup_only_knows_configured_names() {
        let registry = DbRegistry::from_sources(HashMap::from([(
            "disposable".to_string(),
            DataSource::from_urls(vec![], Duration::from_secs(60)),
        )]));

        assert!(registry.get("disposable").is_some());
        assert!(registry.get("other").is_none());
        assert_eq!(registry.names().count(), 1);
    }
}
