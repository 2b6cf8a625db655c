//! The keyed query cache.
//!
//! Maps [`QueryKey`]s to the last known-good value plus a staleness flag.
//! The mutation engine is the *only* writer; views read through the engine
//! and get clones. Every write path funnels through the methods here so the
//! snapshot/rollback protocol cannot be bypassed.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use focal_core::types::DbId;

use crate::keys::{QueryKey, Scope};
use crate::types::{Project, ProjectPage, UpdateProjectInput};

/// A cached query result.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    List(ProjectPage),
    Detail(Project),
}

/// Last known-good value for a query key.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: CachedValue,
    /// Stale entries are still readable but trigger a refetch on the next
    /// read-through.
    pub stale: bool,
}

/// Per-key bookkeeping: the entry itself plus in-flight fetch state.
#[derive(Debug, Default)]
struct KeyState {
    entry: Option<CacheEntry>,
    /// Bumped whenever an in-flight fetch for this key is cancelled or
    /// superseded. A fetch may only write back if the epoch it started
    /// under is still current.
    epoch: u64,
    /// Token handed to the current in-flight fetch, if any.
    inflight: Option<CancellationToken>,
}

/// Snapshot of every entry a mutation touched, restored verbatim on rollback.
pub type Snapshot = Vec<(QueryKey, Option<CacheEntry>)>;

/// The client-resident query cache.
#[derive(Debug, Default)]
pub struct QueryCache {
    keys: HashMap<QueryKey, KeyState>,
    /// Scopes with a mutation between optimistic-apply and settle. Fetch
    /// write-backs into these scopes are refused, preserving the per-key
    /// write order: cancel, apply, commit-or-rollback, settle.
    blocked: HashSet<Scope>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone of the entry for `key`, stale or not.
    pub fn get(&self, key: &QueryKey) -> Option<CacheEntry> {
        self.keys.get(key).and_then(|s| s.entry.clone())
    }

    /// Clone of the value for `key` only if it is present and fresh.
    pub fn fresh(&self, key: &QueryKey) -> Option<CachedValue> {
        self.keys
            .get(key)
            .and_then(|s| s.entry.as_ref())
            .filter(|e| !e.stale)
            .map(|e| e.value.clone())
    }

    // -- Fetch lifecycle ---------------------------------------------------

    /// Register an in-flight fetch for `key`.
    ///
    /// Returns the epoch the fetch runs under and a token that is cancelled
    /// if a mutation touches the key before the fetch completes. Any
    /// previous in-flight fetch for the same key is superseded.
    pub fn begin_fetch(&mut self, key: &QueryKey) -> (u64, CancellationToken) {
        let state = self.keys.entry(key.clone()).or_default();
        if let Some(old) = state.inflight.take() {
            old.cancel();
            state.epoch += 1;
        }
        let token = CancellationToken::new();
        state.inflight = Some(token.clone());
        (state.epoch, token)
    }

    /// Write back a completed fetch.
    ///
    /// Returns `false` (and writes nothing) if the fetch's epoch is no
    /// longer current, i.e. it was cancelled or superseded after it was
    /// issued -- this is what stops a stale response from clobbering an
    /// optimistic value installed after the fetch started.
    pub fn complete_fetch(&mut self, key: &QueryKey, epoch: u64, value: CachedValue) -> bool {
        if self.blocked.iter().any(|s| key.in_scope(*s)) {
            return false;
        }
        let Some(state) = self.keys.get_mut(key) else {
            return false;
        };
        if state.epoch != epoch {
            return false;
        }
        state.inflight = None;
        state.entry = Some(CacheEntry {
            value,
            stale: false,
        });
        true
    }

    /// Cancel every in-flight fetch whose key overlaps `scope` and bump the
    /// affected epochs so late arrivals are discarded. Phase 1 of the
    /// mutation protocol.
    pub fn cancel_scope(&mut self, scope: Scope) {
        for (key, state) in self.keys.iter_mut() {
            if key.in_scope(scope) {
                if let Some(token) = state.inflight.take() {
                    token.cancel();
                }
                state.epoch += 1;
            }
        }
    }

    /// Refuse fetch write-backs into `scope` until [`unblock_scope`] at
    /// settle. A fetch issued *after* the optimistic apply must not land
    /// mid-mutation any more than one cancelled before it.
    ///
    /// [`unblock_scope`]: QueryCache::unblock_scope
    pub fn block_scope(&mut self, scope: Scope) {
        self.blocked.insert(scope);
    }

    pub fn unblock_scope(&mut self, scope: Scope) {
        self.blocked.remove(&scope);
    }

    // -- Snapshot / rollback ----------------------------------------------

    /// Capture the current entries for every key overlapping `scopes`.
    pub fn snapshot(&self, scopes: &[Scope]) -> Snapshot {
        self.keys
            .iter()
            .filter(|(key, _)| scopes.iter().any(|s| key.in_scope(*s)))
            .map(|(key, state)| (key.clone(), state.entry.clone()))
            .collect()
    }

    /// Restore entries verbatim from a snapshot (full replace, not merge).
    pub fn restore(&mut self, snapshot: Snapshot) {
        for (key, entry) in snapshot {
            self.keys.entry(key).or_default().entry = entry;
        }
    }

    /// Mark every entry overlapping `scopes` stale. Terminal settle step:
    /// the next read-through refetches authoritative state.
    pub fn mark_stale(&mut self, scopes: &[Scope]) {
        for (key, state) in self.keys.iter_mut() {
            if scopes.iter().any(|s| key.in_scope(*s)) {
                if let Some(entry) = state.entry.as_mut() {
                    entry.stale = true;
                }
            }
        }
    }

    // -- Optimistic applies ------------------------------------------------

    /// Prepend an optimistic project to every cached list page and bump each
    /// page's reported total.
    pub fn apply_create(&mut self, project: &Project) {
        for (key, state) in self.keys.iter_mut() {
            if !matches!(key, QueryKey::List(_)) {
                continue;
            }
            if let Some(CacheEntry {
                value: CachedValue::List(page),
                ..
            }) = state.entry.as_mut()
            {
                page.projects.insert(0, project.clone());
                page.pagination.total += 1;
            }
        }
    }

    /// Merge a partial update into the cached detail entry and into the
    /// matching item of every cached list page, refreshing `updated_at`.
    pub fn apply_update(&mut self, id: DbId, patch: &UpdateProjectInput) {
        let now = Utc::now();
        let merge = |p: &mut Project| {
            if let Some(name) = &patch.name {
                p.name = name.clone();
            }
            if let Some(description) = &patch.description {
                p.description = Some(description.clone());
            }
            if let Some(status) = patch.status {
                p.status = status;
            }
            p.updated_at = now;
        };

        for state in self.keys.values_mut() {
            match state.entry.as_mut() {
                Some(CacheEntry {
                    value: CachedValue::Detail(p),
                    ..
                }) if p.id == id => merge(p),
                Some(CacheEntry {
                    value: CachedValue::List(page),
                    ..
                }) => {
                    if let Some(p) = page.projects.iter_mut().find(|p| p.id == id) {
                        merge(p);
                    }
                }
                _ => {}
            }
        }
    }

    /// Remove a project from every cached list page and decrement totals.
    /// The detail entry is left in place until settle marks it stale.
    pub fn apply_delete(&mut self, id: DbId) {
        for (key, state) in self.keys.iter_mut() {
            if !matches!(key, QueryKey::List(_)) {
                continue;
            }
            if let Some(CacheEntry {
                value: CachedValue::List(page),
                ..
            }) = state.entry.as_mut()
            {
                let before = page.projects.len();
                page.projects.retain(|p| p.id != id);
                if page.projects.len() < before {
                    page.pagination.total = (page.pagination.total - 1).max(0);
                }
            }
        }
    }

    /// Clone of every current entry, keyed. Used by tests to assert the
    /// rollback guarantee.
    pub fn entries(&self) -> HashMap<QueryKey, CacheEntry> {
        self.keys
            .iter()
            .filter_map(|(k, s)| s.entry.clone().map(|e| (k.clone(), e)))
            .collect()
    }

    /// Clone of every current *value*, ignoring staleness. Settle marks
    /// touched entries stale even after a rollback, so value-level equality
    /// is what the rollback guarantee is checked against.
    pub fn values(&self) -> HashMap<QueryKey, CachedValue> {
        self.keys
            .iter()
            .filter_map(|(k, s)| s.entry.as_ref().map(|e| (k.clone(), e.value.clone())))
            .collect()
    }

    /// Directly install an entry. Test seeding only -- production writes go
    /// through the fetch or mutation paths.
    #[doc(hidden)]
    pub fn seed(&mut self, key: QueryKey, value: CachedValue) {
        self.keys.entry(key).or_default().entry = Some(CacheEntry {
            value,
            stale: false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::ListFilter;
    use crate::types::{Pagination, ProjectStatus};

    fn project(id: DbId, name: &str) -> Project {
        Project {
            id,
            owner_id: 1,
            name: name.into(),
            description: None,
            slug: name.to_ascii_lowercase().replace(' ', "-"),
            status: ProjectStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn page(projects: Vec<Project>) -> ProjectPage {
        let total = projects.len() as i64;
        ProjectPage {
            projects,
            pagination: Pagination {
                page: 1,
                limit: 12,
                total,
                pages: 1,
            },
        }
    }

    fn list_key() -> QueryKey {
        QueryKey::List(ListFilter::default())
    }

    #[test]
    fn apply_create_prepends_and_bumps_total() {
        let mut cache = QueryCache::new();
        cache.seed(list_key(), CachedValue::List(page(vec![project(1, "One")])));

        cache.apply_create(&project(-1, "Optimistic"));

        let Some(CachedValue::List(p)) = cache.fresh(&list_key()) else {
            panic!("list entry missing");
        };
        assert_eq!(p.projects[0].id, -1);
        assert_eq!(p.pagination.total, 2);
    }

    #[test]
    fn apply_delete_only_decrements_when_item_was_cached() {
        let mut cache = QueryCache::new();
        cache.seed(list_key(), CachedValue::List(page(vec![project(1, "One")])));

        cache.apply_delete(42); // not on this page
        let Some(CachedValue::List(p)) = cache.fresh(&list_key()) else {
            panic!("list entry missing");
        };
        assert_eq!(p.pagination.total, 1);

        cache.apply_delete(1);
        let Some(CachedValue::List(p)) = cache.fresh(&list_key()) else {
            panic!("list entry missing");
        };
        assert!(p.projects.is_empty());
        assert_eq!(p.pagination.total, 0);
    }

    #[test]
    fn restore_is_a_full_replace() {
        let mut cache = QueryCache::new();
        cache.seed(list_key(), CachedValue::List(page(vec![project(1, "One")])));

        let snap = cache.snapshot(&[Scope::Lists]);
        cache.apply_create(&project(-1, "Optimistic"));
        cache.apply_update(
            1,
            &UpdateProjectInput {
                name: Some("Renamed".into()),
                ..Default::default()
            },
        );
        cache.restore(snap);

        let Some(CachedValue::List(p)) = cache.fresh(&list_key()) else {
            panic!("list entry missing");
        };
        assert_eq!(p.projects.len(), 1);
        assert_eq!(p.projects[0].name, "One");
        assert_eq!(p.pagination.total, 1);
    }

    #[test]
    fn late_fetch_write_is_discarded_after_cancel() {
        let mut cache = QueryCache::new();
        let key = list_key();
        let (epoch, token) = cache.begin_fetch(&key);

        cache.cancel_scope(Scope::Lists);
        assert!(token.is_cancelled());

        // The "response" arrives after cancellation: write must be refused.
        let wrote = cache.complete_fetch(&key, epoch, CachedValue::List(page(vec![])));
        assert!(!wrote);
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn fetch_write_lands_when_not_cancelled() {
        let mut cache = QueryCache::new();
        let key = list_key();
        let (epoch, _token) = cache.begin_fetch(&key);
        assert!(cache.complete_fetch(&key, epoch, CachedValue::List(page(vec![]))));
        assert!(cache.fresh(&key).is_some());
    }

    #[test]
    fn fetch_write_refused_while_scope_is_blocked() {
        let mut cache = QueryCache::new();
        let key = list_key();
        let (epoch, _token) = cache.begin_fetch(&key);

        cache.block_scope(Scope::Lists);
        assert!(!cache.complete_fetch(&key, epoch, CachedValue::List(page(vec![]))));

        cache.unblock_scope(Scope::Lists);
        assert!(cache.complete_fetch(&key, epoch, CachedValue::List(page(vec![]))));
    }

    #[test]
    fn mark_stale_scopes_only_touched_keys() {
        let mut cache = QueryCache::new();
        cache.seed(list_key(), CachedValue::List(page(vec![])));
        cache.seed(QueryKey::Detail(5), CachedValue::Detail(project(5, "Five")));

        cache.mark_stale(&[Scope::Lists]);

        assert!(cache.fresh(&list_key()).is_none(), "list should be stale");
        assert!(cache.fresh(&QueryKey::Detail(5)).is_some());
    }
}
