//! Error types for outline transforms

use crate::ids::{NodeId, SectionId};
use crate::order::{OrderError, OrderKey};

/// Errors from [`Outline`](crate::Outline) transforms
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TreeError {
    /// Referenced node is not in the snapshot
    #[error("{0} not found")]
    NotFound(NodeId),

    /// Re-parent would make a section its own ancestor
    #[error("moving section {section} under {new_parent} would create a cycle")]
    CyclicMove {
        /// Section being moved
        section: SectionId,
        /// Requested parent
        new_parent: SectionId,
    },

    /// A sibling already holds this key
    #[error("order key {key} already used by a sibling")]
    OrderCollision {
        /// Colliding key
        key: OrderKey,
    },

    /// Inserted node id already exists
    #[error("{0} already exists")]
    DuplicateId(NodeId),

    /// Key allocation failed
    #[error(transparent)]
    Order(#[from] OrderError),
}

impl TreeError {
    /// Shorthand for a missing section
    #[inline]
    #[must_use]
    pub fn section_not_found(id: &SectionId) -> Self {
        Self::NotFound(NodeId::Section(id.clone()))
    }

    /// Check if error is a stale reference
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
