//! Shared outline snapshot
//!
//! Holds the one mutable piece of editor state: the current [`Outline`]
//! behind an `Arc`, plus a version bumped on every install. Readers clone
//! the `Arc` and never block writers for longer than a pointer swap. The
//! lock is never held across an `.await`.
//!
//! Wholesale installs ([`OutlineStore::replace`]) also bump a reset count,
//! so a pending write can tell whether the change it applied may have been
//! discarded while it was in flight.

use parking_lot::RwLock;
use proposal_tree::Outline;
use std::sync::Arc;

#[derive(Debug)]
struct Versioned {
    outline: Arc<Outline>,
    version: u64,
    resets: u64,
}

/// Result of [`OutlineStore::update`]
#[derive(Debug)]
pub(crate) struct Applied<R> {
    /// Snapshot the transform saw
    pub(crate) before: Arc<Outline>,
    /// Extra output of the transform
    pub(crate) output: R,
    /// Version after the change
    pub(crate) version: u64,
    /// Reset count when the change was applied
    pub(crate) resets: u64,
}

/// Versioned snapshot cell
#[derive(Debug)]
pub struct OutlineStore {
    inner: RwLock<Versioned>,
}

impl OutlineStore {
    /// Store holding `outline` at version 0
    #[must_use]
    pub fn new(outline: Outline) -> Self {
        Self {
            inner: RwLock::new(Versioned {
                outline: Arc::new(outline),
                version: 0,
                resets: 0,
            }),
        }
    }

    /// Current snapshot
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> Arc<Outline> {
        Arc::clone(&self.inner.read().outline)
    }

    /// Current version
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.read().version
    }

    /// Number of wholesale installs so far
    #[inline]
    #[must_use]
    pub fn resets(&self) -> u64 {
        self.inner.read().resets
    }

    /// Apply a pure transform atomically
    pub(crate) fn update<R, E>(
        &self,
        transform: impl FnOnce(&Outline) -> Result<(Outline, R), E>,
    ) -> Result<Applied<R>, E> {
        let mut guard = self.inner.write();
        let (next, output) = transform(&guard.outline)?;
        let before = std::mem::replace(&mut guard.outline, Arc::new(next));
        guard.version += 1;
        Ok(Applied {
            before,
            output,
            version: guard.version,
            resets: guard.resets,
        })
    }

    /// Apply an infallible transform atomically
    pub(crate) fn apply(&self, transform: impl FnOnce(&Outline) -> Outline) -> Arc<Outline> {
        let mut guard = self.inner.write();
        let next = Arc::new(transform(&guard.outline));
        guard.outline = Arc::clone(&next);
        guard.version += 1;
        next
    }

    /// Install a snapshot unconditionally
    pub(crate) fn replace(&self, outline: Arc<Outline>) -> u64 {
        let mut guard = self.inner.write();
        guard.outline = outline;
        guard.version += 1;
        guard.resets += 1;
        guard.version
    }

    /// Install `outline` only if nothing was installed since `expected`
    pub(crate) fn replace_if(&self, expected: u64, outline: Arc<Outline>) -> bool {
        let mut guard = self.inner.write();
        if guard.version != expected {
            return false;
        }
        guard.outline = outline;
        guard.version += 1;
        guard.resets += 1;
        true
    }
}

impl Default for OutlineStore {
    fn default() -> Self {
        Self::new(Outline::new())
    }
}
