//! Proposal outline model (proposal-tree)
//!
//! Pure data layer for the proposal editor:
//! - [`Outline`] snapshots of sections and tasks with pure transforms
//! - [`OrderingAllocator`] fractional sibling keys
//! - Backend rows and merge-by-id for refetch and realtime changes
//! - Chinese numeral ordinals for sorting generated chapters
//!
//! # Example
//!
//! ```rust
//! use proposal_tree::prelude::*;
//!
//! let alloc = OrderingAllocator::new();
//! let intro = Section::new("Introduction", None, alloc.between(None, None)?);
//! let intro_id = intro.id.clone();
//! let outline = Outline::new().insert_section(None, intro)?;
//!
//! let task = Task::new(intro_id.clone(), "Summarise the problem", OrderKey::ZERO);
//! let outline = outline.insert_task(task)?;
//! assert_eq!(outline.find_section(&intro_id).map(|s| s.tasks.len()), Some(1));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod ids;
pub mod merge;
pub mod node;
pub mod order;
pub mod ordinal;
pub mod outline;
pub mod rows;

pub use error::TreeError;
pub use ids::{NodeId, ProjectId, SectionId, TaskId};
pub use merge::RowChange;
pub use node::{GeneratedContent, ImageRef, NodeRef, Section, Task, TaskStatus};
pub use order::{OrderError, OrderKey, OrderingAllocator, DEFAULT_MIN_GAP, DEFAULT_SPACING};
pub use outline::{Outline, TaskLocation};
pub use rows::{
    OutlineRows, SectionPatch, SectionRow, TaskContentRow, TaskImageRow, TaskPatch, TaskRow,
};

/// Common imports
pub mod prelude {
    pub use crate::error::TreeError;
    pub use crate::ids::{NodeId, ProjectId, SectionId, TaskId};
    pub use crate::merge::RowChange;
    pub use crate::node::{Section, Task, TaskStatus};
    pub use crate::order::{OrderKey, OrderingAllocator};
    pub use crate::outline::Outline;
    pub use crate::rows::{OutlineRows, SectionPatch, TaskPatch};
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
