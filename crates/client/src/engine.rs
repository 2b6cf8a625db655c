//! The optimistic mutation engine.
//!
//! Every mutation runs the same four-phase protocol against the query cache:
//!
//! 1. **Cancel** -- in-flight fetches overlapping the mutation's scopes are
//!    cancelled and their epochs bumped, so a stale response can never
//!    overwrite the optimistic value.
//! 2. **Snapshot & apply** -- touched entries are snapshotted, then the
//!    optimistic value is installed synchronously. Readers observe it
//!    before the network call returns.
//! 3. **Await outcome** -- the real request, bounded by a timeout. On
//!    failure every snapshot is restored verbatim: the cache holds exactly
//!    its pre-mutation data.
//! 4. **Settle** -- success or failure, touched keys are marked stale so
//!    the next read refetches authoritative state (reconciling temporary
//!    ids and client-side slug guesses with server truth).
//!
//! Mutations over overlapping scopes are serialized by per-scope async
//! locks; disjoint scopes proceed concurrently. The engine is the cache's
//! only writer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::OwnedMutexGuard;

use focal_core::slug::slugify;
use focal_core::types::DbId;

use crate::cache::{CachedValue, QueryCache, Snapshot};
use crate::keys::{ListFilter, QueryKey, Scope};
use crate::transport::{ProjectTransport, TransportError};
use crate::types::{CreateProjectInput, Project, ProjectPage, ProjectStatus, UpdateProjectInput};

/// Maximum accepted project name length, mirrored from the server.
const MAX_NAME_LEN: usize = 100;

/// How long a mutation waits for a server outcome before taking the
/// failure path (rollback + settle). A mutation never leaves its pending
/// context open indefinitely.
pub const DEFAULT_MUTATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Error surfaced to mutation and fetch callers.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// Client-side validation failure. No cache mutation was attempted.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The server rejected the mutation; the cache was rolled back.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// The request never reached a server outcome; rolled back.
    #[error("Network error: {0}")]
    Network(String),

    /// No server response within the mutation timeout; rolled back.
    #[error("Request timed out")]
    Timeout,

    /// This fetch was superseded by a mutation touching the same key. The
    /// only silently-dropped outcome in the protocol.
    #[error("Fetch cancelled")]
    Cancelled,
}

impl From<TransportError> for EngineError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Rejected { status, message } => {
                EngineError::Rejected { status, message }
            }
            TransportError::Network(msg) => EngineError::Network(msg),
        }
    }
}

/// Lifecycle of one pending mutation, for tracing and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MutationPhase {
    Applying,
    Committing,
    RollingBack,
    Settled,
}

/// Transient record of one in-progress mutation: the scopes it locked, the
/// snapshot for rollback, and its current phase. Destroyed at settle.
///
/// Dropping an unsettled context (the caller abandoned the mutation future
/// mid-flight) takes the failure path: restore the snapshot, mark the
/// scopes stale, unblock them. No pending context outlives its mutation.
struct PendingMutation {
    op: &'static str,
    cache: Arc<Mutex<QueryCache>>,
    scopes: Vec<Scope>,
    snapshot: Snapshot,
    phase: MutationPhase,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl PendingMutation {
    fn transition(&mut self, phase: MutationPhase) {
        tracing::debug!(op = self.op, from = ?self.phase, to = ?phase, "mutation phase");
        self.phase = phase;
    }
}

impl Drop for PendingMutation {
    fn drop(&mut self) {
        if self.phase == MutationPhase::Settled {
            return;
        }
        tracing::warn!(op = self.op, "mutation abandoned mid-flight, rolling back");
        let mut cache = self.cache.lock().expect("query cache poisoned");
        cache.restore(std::mem::take(&mut self.snapshot));
        cache.mark_stale(&self.scopes);
        for scope in &self.scopes {
            cache.unblock_scope(*scope);
        }
    }
}

/// Client-side mutation engine over a shared [`QueryCache`].
pub struct MutationEngine {
    cache: Arc<Mutex<QueryCache>>,
    transport: Arc<dyn ProjectTransport>,
    /// One async lock per scope; mutations take their scopes' locks in
    /// sorted order, so overlapping mutations serialize and disjoint ones
    /// run concurrently.
    scope_locks: Mutex<HashMap<Scope, Arc<AsyncMutex<()>>>>,
    timeout: Duration,
    /// Temporary ids for optimistic creates: strictly negative, so they can
    /// never collide with real (positive BIGSERIAL) ids.
    next_temp_id: AtomicI64,
}

impl MutationEngine {
    pub fn new(transport: Arc<dyn ProjectTransport>) -> Self {
        Self::with_timeout(transport, DEFAULT_MUTATION_TIMEOUT)
    }

    pub fn with_timeout(transport: Arc<dyn ProjectTransport>, timeout: Duration) -> Self {
        MutationEngine {
            cache: Arc::new(Mutex::new(QueryCache::new())),
            transport,
            scope_locks: Mutex::new(HashMap::new()),
            timeout,
            next_temp_id: AtomicI64::new(-1),
        }
    }

    // -- Reads -------------------------------------------------------------

    /// Cached value for a key, fresh or stale. Views read through this;
    /// they never hold a reference into the cache.
    pub fn cached(&self, key: &QueryKey) -> Option<CachedValue> {
        self.lock_cache().get(key).map(|e| e.value)
    }

    /// Clone of every cached value, for diagnostics and tests.
    pub fn cache_values(&self) -> HashMap<QueryKey, CachedValue> {
        self.lock_cache().values()
    }

    /// Read-through list fetch: returns the fresh cached page if present,
    /// otherwise fetches and (unless superseded) caches the result.
    pub async fn fetch_list(&self, filter: ListFilter) -> Result<ProjectPage, EngineError> {
        let key = QueryKey::List(filter.clone());

        let (epoch, token) = {
            let mut cache = self.lock_cache();
            if let Some(CachedValue::List(page)) = cache.fresh(&key) {
                return Ok(page);
            }
            cache.begin_fetch(&key)
        };

        let result = tokio::select! {
            () = token.cancelled() => return Err(EngineError::Cancelled),
            r = self.transport.list_projects(&filter) => r?,
        };

        let mut cache = self.lock_cache();
        if !cache.complete_fetch(&key, epoch, CachedValue::List(result.clone())) {
            // Superseded between response arrival and write-back.
            return Err(EngineError::Cancelled);
        }
        Ok(result)
    }

    /// Read-through detail fetch, same discipline as [`fetch_list`].
    ///
    /// [`fetch_list`]: MutationEngine::fetch_list
    pub async fn fetch_detail(&self, id: DbId) -> Result<Project, EngineError> {
        let key = QueryKey::Detail(id);

        let (epoch, token) = {
            let mut cache = self.lock_cache();
            if let Some(CachedValue::Detail(project)) = cache.fresh(&key) {
                return Ok(project);
            }
            cache.begin_fetch(&key)
        };

        let result = tokio::select! {
            () = token.cancelled() => return Err(EngineError::Cancelled),
            r = self.transport.get_project(id) => r?,
        };

        let mut cache = self.lock_cache();
        if !cache.complete_fetch(&key, epoch, CachedValue::Detail(result.clone())) {
            return Err(EngineError::Cancelled);
        }
        Ok(result)
    }

    // -- Mutations ---------------------------------------------------------

    /// Create a project. The optimistic list entry carries a temporary
    /// negative id and a client-side slug guess; both are reconciled with
    /// server truth by the settle refetch.
    pub async fn create_project(&self, input: CreateProjectInput) -> Result<Project, EngineError> {
        validate_name(&input.name)?;

        let scopes = vec![Scope::Lists];
        let mut pending = self.begin("create", scopes).await;

        {
            let mut cache = self.lock_cache();
            pending.snapshot = cache.snapshot(&pending.scopes);
            let optimistic = self.optimistic_project(&input);
            cache.apply_create(&optimistic);
        }

        let outcome = self.await_outcome(self.transport.create_project(&input)).await;
        self.commit_or_rollback(&mut pending, outcome)
    }

    /// Update a project. Optimistically merges the patch into the cached
    /// detail and list items; the server's slug recomputation (iff the name
    /// changed) lands with the settle refetch.
    pub async fn update_project(
        &self,
        id: DbId,
        patch: UpdateProjectInput,
    ) -> Result<Project, EngineError> {
        if let Some(name) = &patch.name {
            validate_name(name)?;
        }

        let scopes = vec![Scope::Lists, Scope::Detail(id)];
        let mut pending = self.begin("update", scopes).await;

        {
            let mut cache = self.lock_cache();
            pending.snapshot = cache.snapshot(&pending.scopes);
            cache.apply_update(id, &patch);
        }

        let outcome = self
            .await_outcome(self.transport.update_project(id, &patch))
            .await;
        self.commit_or_rollback(&mut pending, outcome)
    }

    /// Delete a project. Optimistically removed from cached list pages; the
    /// detail entry is left alone until settle marks it stale.
    pub async fn delete_project(&self, id: DbId) -> Result<(), EngineError> {
        let scopes = vec![Scope::Lists, Scope::Detail(id)];
        let mut pending = self.begin("delete", scopes).await;

        {
            let mut cache = self.lock_cache();
            pending.snapshot = cache.snapshot(&pending.scopes);
            cache.apply_delete(id);
        }

        let outcome = self.await_outcome(self.transport.delete_project(id)).await;
        self.commit_or_rollback(&mut pending, outcome)
    }

    // -- Protocol plumbing --------------------------------------------------

    /// Phase 1: take the scope locks (sorted order, so overlapping
    /// mutations cannot deadlock) and cancel overlapping in-flight fetches.
    async fn begin(&self, op: &'static str, mut scopes: Vec<Scope>) -> PendingMutation {
        scopes.sort();
        let mut guards = Vec::with_capacity(scopes.len());
        for scope in &scopes {
            let lock = {
                let mut locks = self.scope_locks.lock().expect("scope lock map poisoned");
                Arc::clone(locks.entry(*scope).or_default())
            };
            guards.push(lock.lock_owned().await);
        }

        {
            let mut cache = self.lock_cache();
            for scope in &scopes {
                cache.cancel_scope(*scope);
                cache.block_scope(*scope);
            }
        }

        PendingMutation {
            op,
            cache: Arc::clone(&self.cache),
            scopes,
            snapshot: Vec::new(),
            phase: MutationPhase::Applying,
            _guards: guards,
        }
    }

    /// Phase 3: drive the transport future under the mutation timeout.
    async fn await_outcome<T>(
        &self,
        call: impl std::future::Future<Output = Result<T, TransportError>>,
    ) -> Result<T, EngineError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Err(EngineError::Timeout),
        }
    }

    /// Phases 3b + 4: roll back on failure, then settle either way.
    fn commit_or_rollback<T>(
        &self,
        pending: &mut PendingMutation,
        outcome: Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut cache = self.lock_cache();
        match &outcome {
            Ok(_) => {
                pending.transition(MutationPhase::Committing);
                // No explicit cache write: settle invalidates and the next
                // read refetches server truth, including the real id and
                // resolved slug.
            }
            Err(err) => {
                pending.transition(MutationPhase::RollingBack);
                tracing::warn!(op = pending.op, error = %err, "mutation failed, rolling back");
                cache.restore(std::mem::take(&mut pending.snapshot));
            }
        }
        cache.mark_stale(&pending.scopes);
        for scope in &pending.scopes {
            cache.unblock_scope(*scope);
        }
        pending.transition(MutationPhase::Settled);
        outcome
    }

    /// Synthesize the optimistic project installed by phase 2 of a create.
    fn optimistic_project(&self, input: &CreateProjectInput) -> Project {
        let now = Utc::now();
        Project {
            id: self.next_temp_id.fetch_sub(1, Ordering::Relaxed),
            // The caller's real id is unknown until the server responds;
            // never read before the settle refetch replaces it.
            owner_id: 0,
            name: input.name.clone(),
            description: input.description.clone(),
            slug: slugify(&input.name),
            status: ProjectStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, QueryCache> {
        self.cache.lock().expect("query cache poisoned")
    }
}

fn validate_name(name: &str) -> Result<(), EngineError> {
    if name.is_empty() {
        return Err(EngineError::Validation("Name is required".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(EngineError::Validation(format!(
            "Name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}
