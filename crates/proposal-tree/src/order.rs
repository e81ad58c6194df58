//! Fractional order keys
//!
//! Provides [`OrderKey`] and the [`OrderingAllocator`] that places a node
//! between two siblings without touching any other sibling's key.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Default distance between neighbouring keys
pub const DEFAULT_SPACING: f64 = 1000.0;

/// Default smallest gap the allocator will still split
pub const DEFAULT_MIN_GAP: f64 = 1e-9;

/// Sibling order key
///
/// A real number compared with a total order, so keys can live in sorted
/// lists and maps. Keys are never NaN when produced by the allocator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderKey(f64);

impl OrderKey {
    /// Key of the first node in a fresh list
    pub const ZERO: Self = Self(0.0);

    /// Wrap a raw value
    #[inline]
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self(value)
    }

    /// Raw value
    #[inline]
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl PartialEq for OrderKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OrderKey {}

impl PartialOrd for OrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl From<f64> for OrderKey {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors from key allocation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrderError {
    /// No representable key remains between the neighbours
    #[error("order keys exhausted between {prev} and {next}")]
    Exhausted { prev: OrderKey, next: OrderKey },

    /// Neighbours are not in ascending order
    #[error("neighbour keys out of order: {prev} >= {next}")]
    Unordered { prev: OrderKey, next: OrderKey },

    /// Arithmetic left the finite range
    #[error("order key overflow next to {0}")]
    Overflow(OrderKey),
}

/// Midpoint allocator for sibling keys
///
/// # Contract
/// - Empty list: [`OrderKey::ZERO`]
/// - Only a predecessor: `prev + spacing`
/// - Only a successor: `next - spacing`
/// - Both: the midpoint, strictly between them
///
/// Repeated inserts at one boundary halve the gap each time. Once the gap
/// drops below `min_gap` the allocator reports [`OrderError::Exhausted`]
/// and the caller renumbers the list with [`OrderingAllocator::renumber`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderingAllocator {
    spacing: f64,
    min_gap: f64,
}

impl OrderingAllocator {
    /// Allocator with default spacing
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            spacing: DEFAULT_SPACING,
            min_gap: DEFAULT_MIN_GAP,
        }
    }

    /// With custom spacing (non-positive values fall back to the default)
    #[inline]
    #[must_use]
    pub fn with_spacing(mut self, spacing: f64) -> Self {
        self.spacing = if spacing.is_finite() && spacing > 0.0 {
            spacing
        } else {
            DEFAULT_SPACING
        };
        self
    }

    /// With custom minimum gap
    #[inline]
    #[must_use]
    pub fn with_min_gap(mut self, min_gap: f64) -> Self {
        self.min_gap = min_gap.max(0.0);
        self
    }

    /// Spacing between neighbouring keys
    #[inline]
    #[must_use]
    pub fn spacing(&self) -> f64 {
        self.spacing
    }

    /// Key strictly between `prev` and `next`
    ///
    /// # Errors
    /// - [`OrderError::Unordered`] if `prev >= next`
    /// - [`OrderError::Exhausted`] if the gap can no longer be split
    /// - [`OrderError::Overflow`] if a one-sided step leaves the finite range
    pub fn between(
        &self,
        prev: Option<OrderKey>,
        next: Option<OrderKey>,
    ) -> Result<OrderKey, OrderError> {
        match (prev, next) {
            (None, None) => Ok(OrderKey::ZERO),
            (Some(prev), None) => {
                let key = prev.0 + self.spacing;
                if key.is_finite() && key > prev.0 {
                    Ok(OrderKey(key))
                } else {
                    Err(OrderError::Overflow(prev))
                }
            }
            (None, Some(next)) => {
                let key = next.0 - self.spacing;
                if key.is_finite() && key < next.0 {
                    Ok(OrderKey(key))
                } else {
                    Err(OrderError::Overflow(next))
                }
            }
            (Some(prev), Some(next)) => {
                if prev >= next {
                    return Err(OrderError::Unordered { prev, next });
                }
                let gap = next.0 - prev.0;
                let mid = prev.0 + gap / 2.0;
                if gap < self.min_gap || !(prev.0 < mid && mid < next.0) {
                    return Err(OrderError::Exhausted { prev, next });
                }
                Ok(OrderKey(mid))
            }
        }
    }

    /// Key after the last element of an ascending list
    ///
    /// # Errors
    /// See [`OrderingAllocator::between`]
    pub fn after_last(&self, keys: &[OrderKey]) -> Result<OrderKey, OrderError> {
        self.between(keys.last().copied(), None)
    }

    /// Fresh evenly spaced keys for `count` nodes: `0, spacing, 2 * spacing, ...`
    #[must_use]
    pub fn renumber(&self, count: usize) -> Vec<OrderKey> {
        (0..count)
            .map(|i| OrderKey(i as f64 * self.spacing))
            .collect()
    }
}

impl Default for OrderingAllocator {
    fn default() -> Self {
        Self::new()
    }
}
