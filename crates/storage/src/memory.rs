//! In-process store implementing both collaborator seams.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use harvest_core::{
    CloneOutcome, CloneRecord, OutcomeStore, RepoMetrics, SourceError, StoreError, TaskSource,
};
use tracing::debug;

use crate::ranking;

#[derive(Debug, Default)]
struct Tables {
    /// Known links in registration order.
    links: Vec<String>,
    known: HashSet<String>,
    clones: HashMap<String, CloneRecord>,
    /// Latest snapshot per link.
    metrics: HashMap<String, RepoMetrics>,
}

/// Store that keeps links, clone history and metric snapshots in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register links as candidates. Returns how many were new.
    pub fn add_links<I, S>(&self, links: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut t = self.write();
        let mut added = 0;
        for link in links {
            let link = link.into();
            if t.known.insert(link.clone()) {
                t.links.push(link);
                added += 1;
            }
        }
        added
    }

    /// Load one link per line; blank lines and `#` comments are skipped.
    pub fn load_seed_file(&self, path: &Path) -> io::Result<usize> {
        let content = fs::read_to_string(path)?;
        let links = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::to_string);
        let added = self.add_links(links);
        debug!(path = %path.display(), added, "loaded seed links");
        Ok(added)
    }

    pub fn link_count(&self) -> usize {
        self.read().links.len()
    }

    /// Most recent metric snapshot for `link`.
    pub fn latest_metrics(&self, link: &str) -> Option<RepoMetrics> {
        self.read().metrics.get(link).cloned()
    }

    /// Number of links with a metric snapshot.
    pub fn metrics_count(&self) -> usize {
        self.read().metrics.len()
    }

    /// Ranked candidates as of `now`, most urgent first.
    pub fn query_at(&self, limit: usize, now: DateTime<Utc>) -> Vec<String> {
        let t = self.read();
        let clone_only = t.clones.keys().filter(|l| !t.known.contains(*l));
        let mut ranked: Vec<(f64, usize, &String)> = t
            .links
            .iter()
            .chain(clone_only)
            .enumerate()
            .filter_map(|(order, link)| {
                ranking::nice(t.clones.get(link), now).map(|n| (n, order, link))
            })
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        ranked.into_iter().take(limit).map(|(_, _, link)| link.clone()).collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl TaskSource for MemoryStore {
    fn query(&self, limit: usize) -> Result<Vec<String>, SourceError> {
        Ok(self.query_at(limit, Utc::now()))
    }
}

impl OutcomeStore for MemoryStore {
    fn clone_record(&self, link: &str) -> Result<Option<CloneRecord>, StoreError> {
        Ok(self.read().clones.get(link).cloned())
    }

    fn record_clone(&self, outcome: &CloneOutcome) -> Result<(), StoreError> {
        let mut t = self.write();
        let next = CloneRecord::apply(t.clones.get(&outcome.link), outcome);
        t.clones.insert(outcome.link.clone(), next);
        Ok(())
    }

    fn record_metrics(&self, metrics: &RepoMetrics) -> Result<(), StoreError> {
        self.write()
            .metrics
            .insert(metrics.link.clone(), metrics.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn outcome(link: &str, success: bool, at: DateTime<Utc>) -> CloneOutcome {
        CloneOutcome {
            link: link.into(),
            file_path: "p".into(),
            success,
            message: (!success).then(|| "failed".into()),
            update_time: at,
            take_time_ms: 5,
            take_storage: success.then_some(100),
        }
    }

    #[test]
    fn never_attempted_links_come_first_in_insertion_order() {
        let store = MemoryStore::new();
        assert_eq!(store.add_links(["a", "b", "c", "a"]), 3);
        let now = Utc::now();
        store.record_clone(&outcome("a", true, now - Duration::days(40))).unwrap();

        assert_eq!(store.query_at(10, now), vec!["b", "c", "a"]);
        assert_eq!(store.query_at(1, now), vec!["b"]);
    }

    #[test]
    fn failed_links_wait_for_backoff() {
        let store = MemoryStore::new();
        store.add_links(["x"]);
        let now = Utc::now();
        store.record_clone(&outcome("x", false, now)).unwrap();
        store.record_clone(&outcome("x", false, now)).unwrap();
        assert_eq!(store.clone_record("x").unwrap().unwrap().failed_times, 2);

        // Backoff for two failures is four days.
        assert!(store.query_at(10, now + Duration::days(3)).is_empty());
        assert_eq!(store.query_at(10, now + Duration::days(5)), vec!["x"]);
    }

    #[test]
    fn fresh_success_is_not_due() {
        let store = MemoryStore::new();
        store.add_links(["ok"]);
        let now = Utc::now();
        store.record_clone(&outcome("ok", true, now)).unwrap();
        assert!(store.query(10).unwrap().is_empty());
        assert_eq!(store.query_at(10, now + Duration::days(31)), vec!["ok"]);
    }

    #[test]
    fn manual_links_with_history_are_ranked_too() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.record_clone(&outcome("manual", false, now - Duration::days(10))).unwrap();
        assert_eq!(store.query_at(10, now), vec!["manual"]);
    }

    #[test]
    fn latest_metrics_wins() {
        let store = MemoryStore::new();
        let mut m = RepoMetrics {
            link: "l".into(),
            contributor_count: 1,
            commit_frequency: 0.5,
            org_count: 1,
            languages: vec!["Go".into()],
            created_since: Utc::now(),
            updated_since: Utc::now(),
        };
        store.record_metrics(&m).unwrap();
        m.contributor_count = 9;
        store.record_metrics(&m).unwrap();
        assert_eq!(store.metrics_count(), 1);
        assert_eq!(store.latest_metrics("l").unwrap().contributor_count, 9);
        assert!(store.latest_metrics("other").is_none());
    }

    #[test]
    fn seed_file_skips_comments_and_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.txt");
        let seeds = "# seeds\nhttps://example.com/a/b\n\n  https://example.com/c/d  \n";
        fs::write(&path, seeds).unwrap();
        let store = MemoryStore::new();
        assert_eq!(store.load_seed_file(&path).unwrap(), 2);
        assert_eq!(store.link_count(), 2);
    }
}
