//! Optimistic mutation controller
//!
//! Every local edit goes through [`OptimisticController::perform`]: apply
//! the pure transform to the snapshot, persist, and on failure revert.
//! Only this controller installs snapshots into the [`OutlineStore`].

use crate::backend::{with_timeout, PersistenceBackend};
use crate::error::{EditorError, PersistenceError};
use crate::store::OutlineStore;
use proposal_tree::{Outline, ProjectId, RowChange, TreeError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// How to recover local state after a failed write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackPolicy {
    /// Restore the pre-mutation snapshot; refetch if others wrote since
    RestoreSnapshot,
    /// Always refetch from the backend
    Refetch,
}

/// Applies, persists and reverts outline mutations
#[derive(Debug)]
pub struct OptimisticController<B> {
    store: OutlineStore,
    backend: Arc<B>,
    project: ProjectId,
    timeout: Duration,
    refresh_after_success: bool,
}

impl<B: PersistenceBackend> OptimisticController<B> {
    /// New controller over an empty outline
    #[must_use]
    pub fn new(project: ProjectId, backend: Arc<B>, timeout: Duration) -> Self {
        Self {
            store: OutlineStore::default(),
            backend,
            project,
            timeout,
            refresh_after_success: false,
        }
    }

    /// Refetch after every successful write
    #[inline]
    #[must_use]
    pub fn with_refresh_after_success(mut self, refresh: bool) -> Self {
        self.refresh_after_success = refresh;
        self
    }

    /// Current snapshot
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> Arc<Outline> {
        self.store.snapshot()
    }

    /// Current snapshot version
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.store.version()
    }

    /// Replace the snapshot with the backend's rows
    ///
    /// # Errors
    /// Fetch failure or timeout; the snapshot is left as is
    pub async fn refetch(&self) -> Result<Arc<Outline>, PersistenceError> {
        let rows = with_timeout(self.timeout, self.backend.fetch_outline(&self.project)).await?;
        let outline = Arc::new(Outline::from_rows(rows));
        let version = self.store.replace(Arc::clone(&outline));
        debug!(version, sections = outline.sections().len(), "outline refetched");
        Ok(outline)
    }

    /// Merge a change another client made
    pub fn merge_remote(&self, change: RowChange) -> Arc<Outline> {
        self.store.apply(|outline| outline.apply_change(change))
    }

    /// Apply `mutate`, then persist
    ///
    /// # Errors
    /// The transform's rejection (nothing is persisted), or the persistence
    /// failure after local state was recovered per `policy`
    pub async fn perform<M, P>(
        &self,
        op: &'static str,
        policy: RollbackPolicy,
        mutate: M,
        persist: P,
    ) -> Result<Arc<Outline>, EditorError>
    where
        M: FnOnce(&Outline) -> Result<Outline, TreeError>,
        P: Future<Output = Result<(), PersistenceError>>,
    {
        let transform = |outline: &Outline| mutate(outline).map(|next| (next, ()));
        self.perform_with(op, policy, transform, |()| persist).await
    }

    /// Apply `mutate`, then persist what it produced
    ///
    /// `mutate` runs under the store's write lock, so values it derives from
    /// the snapshot (fresh order keys, rows to write) are consistent with it.
    ///
    /// # Errors
    /// See [`OptimisticController::perform`]
    pub async fn perform_with<M, R, F, P>(
        &self,
        op: &'static str,
        policy: RollbackPolicy,
        mutate: M,
        persist: F,
    ) -> Result<Arc<Outline>, EditorError>
    where
        M: FnOnce(&Outline) -> Result<(Outline, R), TreeError>,
        F: FnOnce(R) -> P,
        P: Future<Output = Result<(), PersistenceError>>,
    {
        let applied = self.store.update(mutate)?;
        debug!(op, version = applied.version, "optimistic change applied");

        match with_timeout(self.timeout, persist(applied.output)).await {
            Ok(()) => {
                // a refetch or rollback installed while this write was in
                // flight may predate it
                let stale = self.store.resets() != applied.resets;
                if stale || self.refresh_after_success {
                    if stale {
                        debug!(op, "snapshot replaced during write, refetching");
                    }
                    if let Err(err) = self.refetch().await {
                        warn!(op, %err, "refresh after write failed");
                    }
                }
                Ok(self.store.snapshot())
            }
            Err(err) => {
                warn!(op, %err, ?policy, "write failed, reverting local change");
                self.recover(policy, applied.before, applied.version).await;
                Err(EditorError::PersistenceFailure(err))
            }
        }
    }

    async fn recover(&self, policy: RollbackPolicy, before: Arc<Outline>, applied: u64) {
        if policy == RollbackPolicy::RestoreSnapshot
            && self.store.replace_if(applied, Arc::clone(&before))
        {
            return;
        }
        if let Err(err) = self.refetch().await {
            error!(%err, "refetch after failed write also failed, restoring snapshot");
            self.store.replace(before);
        }
    }

    /// Install `outline` as the current snapshot
    #[cfg(test)]
    pub(crate) fn install(&self, outline: Outline) -> u64 {
        self.store.replace(Arc::new(outline))
    }
}
