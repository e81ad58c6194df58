//! Proposal structure editor (proposal-core)
//!
//! Keeps a proposal outline (sections, subsections, tasks) in sync between
//! the local snapshot, a persistence backend and a generation service:
//! - Optimistic edits with rollback on failed writes
//! - Drag-and-drop reordering with fractional order keys
//! - Conflict-aware generation (append, replace or cancel)
//! - Section integration, task images and citation evidence
//!
//! # Example
//!
//! ```rust,ignore
//! use proposal_core::prelude::*;
//!
//! # async fn example<B: PersistenceBackend, T: GenerationTransport>(
//! #     backend: std::sync::Arc<B>,
//! #     transport: T,
//! # ) -> Result<(), EditorError> {
//! let config = EditorConfig::new();
//! let editor = ProposalEditor::load(ProjectId::from("p1"), backend, transport, config).await?;
//! let intro = editor.add_section(None, "一、项目背景").await?;
//! editor.add_task(&intro, "Summarise the tender scope").await?;
//!
//! let status = editor.generate_tasks(&intro, GenerationParams::new()).await?;
//! if let GenerationStatus::AwaitingChoice(_) = status {
//!     let target = GenerationTarget::SectionTasks(intro);
//!     editor.resolve_conflict(&target, Resolution::Append).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod conflict;
pub mod drag;
pub mod editor;
pub mod error;
pub mod generation;
pub mod optimistic;
pub mod store;

pub use backend::{with_timeout, PersistenceBackend};
pub use config::{EditorConfig, GenerationEndpoints};
pub use conflict::{
    allowed_transitions, validate_transition, ConflictContext, ConflictRegistry, GenerationParams,
    GenerationTarget, Resolution, WorkflowState, WorkflowStep,
};
pub use drag::{
    DragEvent, DragReorderCoordinator, DragResolution, DragSource, DropTarget, NoopReason,
    RenumberScope,
};
pub use editor::{
    AnalysisEvidence, GenerationOutput, GenerationStatus, ImageOptions, ProposalEditor,
};
pub use error::{ConfigError, ConflictError, EditorError, GenerationError, PersistenceError};
pub use generation::{
    ContentOutcome, ContentRequest, GenerationClient, GenerationMode, GenerationReport,
    GenerationTransport, ImageRequest, ImageType, IntegrateRequest, IntegrationPiece,
    OutlineRequest, SubsectionsRequest, TaskWorkflow, TasksOutcome, TasksRequest, TransportResponse,
};
pub use optimistic::{OptimisticController, RollbackPolicy};
pub use store::OutlineStore;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving the editor
    pub use crate::{
        DragEvent, DropTarget, EditorConfig, EditorError, GenerationParams, GenerationStatus,
        GenerationTarget, GenerationTransport, PersistenceBackend, ProposalEditor, Resolution,
        TaskWorkflow,
    };
    pub use proposal_tree::prelude::*;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
