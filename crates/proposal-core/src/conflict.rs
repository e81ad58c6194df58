//! Generation conflict workflow
//!
//! A generation request against a target that already holds content does
//! not run until the user picks append, replace or cancel. Each target has
//! at most one workflow in flight; the registry keys them by
//! [`GenerationTarget`].
//!
//! ```text
//! Idle -> Requested -> Executing -> Done -> Idle
//!             |                        ^
//!             v                        |
//!      ConflictDetected -> AwaitingUserChoice
//!                               | cancel -> Idle
//! ```

use crate::error::ConflictError;
use crate::generation::{GenerationMode, TaskWorkflow};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use proposal_tree::{Outline, SectionId, TaskId, TreeError};
use std::fmt;
use tracing::debug;

/// Workflow state of one generation target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowState {
    /// Nothing in flight
    Idle,
    /// Request received, conflict not yet checked
    Requested,
    /// Target holds content
    ConflictDetected,
    /// Waiting on [`Resolution`]
    AwaitingUserChoice,
    /// Generation call in flight
    Executing,
    /// Generation finished
    Done,
}

/// Validates a workflow transition
///
/// # Errors
/// [`ConflictError::IllegalTransition`] when `to` is not reachable from `from`
pub fn validate_transition(from: WorkflowState, to: WorkflowState) -> Result<(), ConflictError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(ConflictError::IllegalTransition { from, to })
    }
}

/// States reachable in one step
#[must_use]
pub fn allowed_transitions(from: WorkflowState) -> Vec<WorkflowState> {
    use WorkflowState::{AwaitingUserChoice, ConflictDetected, Done, Executing, Idle, Requested};
    match from {
        Idle => vec![Requested],
        Requested => vec![ConflictDetected, Executing],
        ConflictDetected => vec![AwaitingUserChoice],
        AwaitingUserChoice => vec![Executing, Idle],
        Executing => vec![Done, Idle],
        Done => vec![Idle],
    }
}

/// User's answer to a conflict prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Keep existing content and add to it
    Append,
    /// Delete existing content first
    Replace,
    /// Abandon the request
    Cancel,
}

impl Resolution {
    /// Generation mode for a non-cancel resolution
    #[must_use]
    pub fn mode(self) -> Option<GenerationMode> {
        match self {
            Self::Append => Some(GenerationMode::Append),
            Self::Replace => Some(GenerationMode::Replace),
            Self::Cancel => None,
        }
    }
}

/// What a generation request writes into
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GenerationTarget {
    /// Whole project outline
    Outline,
    /// Tasks of one section
    SectionTasks(SectionId),
    /// Child sections of one section
    SectionSubsections(SectionId),
    /// Generated content of one task
    TaskContent(TaskId),
}

impl fmt::Display for GenerationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outline => f.write_str("outline"),
            Self::SectionTasks(id) => write!(f, "tasks of section {id}"),
            Self::SectionSubsections(id) => write!(f, "subsections of section {id}"),
            Self::TaskContent(id) => write!(f, "content of task {id}"),
        }
    }
}

impl GenerationTarget {
    /// Whether the target already holds content in `outline`
    ///
    /// # Errors
    /// `NotFound` if the targeted section or task is missing
    pub fn has_conflict(&self, outline: &Outline) -> Result<bool, TreeError> {
        Ok(self.existing(outline)? > 0)
    }

    /// Number of existing items the target holds
    ///
    /// # Errors
    /// `NotFound` if the targeted section or task is missing
    pub fn existing(&self, outline: &Outline) -> Result<usize, TreeError> {
        match self {
            Self::Outline => Ok(outline.roots.len()),
            Self::SectionTasks(id) => outline
                .find_section(id)
                .map(|s| s.tasks.len())
                .ok_or_else(|| TreeError::section_not_found(id)),
            Self::SectionSubsections(id) => outline
                .find_section(id)
                .map(|s| s.children.len())
                .ok_or_else(|| TreeError::section_not_found(id)),
            Self::TaskContent(id) => outline
                .find_task(id)
                .map(|t| usize::from(t.has_content()))
                .ok_or_else(|| TreeError::NotFound(id.clone().into())),
        }
    }
}

/// Caller inputs of a generation request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationParams {
    /// Reference sources to ground the generation on
    pub source_ids: Vec<String>,
    /// Free-form user guidance
    pub user_description: String,
    /// Task workflow (task targets only)
    pub workflow: TaskWorkflow,
}

impl GenerationParams {
    /// Empty parameters
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With source ids
    #[inline]
    #[must_use]
    pub fn with_sources<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.source_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    /// With user description
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.user_description = description.into();
        self
    }

    /// With task workflow
    #[inline]
    #[must_use]
    pub fn with_workflow(mut self, workflow: TaskWorkflow) -> Self {
        self.workflow = workflow;
        self
    }
}

/// Pending conflict shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictContext {
    /// Target of the request
    pub target: GenerationTarget,
    /// Parameters to run with once resolved
    pub params: GenerationParams,
    /// Items already present
    pub existing: usize,
}

/// Next step after a request or resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowStep {
    /// Ask the user
    AwaitChoice(ConflictContext),
    /// Run the generation
    Execute {
        /// Parameters to run with
        params: GenerationParams,
        /// Append or replace
        mode: GenerationMode,
    },
}

#[derive(Debug)]
struct Workflow {
    state: WorkflowState,
    context: Option<ConflictContext>,
}

impl Workflow {
    fn step(&mut self, to: WorkflowState) -> Result<(), ConflictError> {
        validate_transition(self.state, to)?;
        self.state = to;
        Ok(())
    }
}

/// In-flight workflows, one per target
#[derive(Debug, Default)]
pub struct ConflictRegistry {
    workflows: DashMap<GenerationTarget, Workflow>,
}

impl ConflictRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of a target
    #[must_use]
    pub fn state(&self, target: &GenerationTarget) -> WorkflowState {
        self.workflows
            .get(target)
            .map_or(WorkflowState::Idle, |w| w.state)
    }

    /// Pending conflict of a target, if it awaits a choice
    #[must_use]
    pub fn pending(&self, target: &GenerationTarget) -> Option<ConflictContext> {
        self.workflows.get(target).and_then(|w| w.context.clone())
    }

    /// Start a workflow
    ///
    /// `existing > 0` parks it at [`WorkflowState::AwaitingUserChoice`];
    /// otherwise it goes straight to execution in append mode.
    ///
    /// # Errors
    /// [`ConflictError::Busy`] if the target already has a workflow
    pub fn begin(
        &self,
        target: GenerationTarget,
        params: GenerationParams,
        existing: usize,
    ) -> Result<WorkflowStep, ConflictError> {
        let entry = match self.workflows.entry(target.clone()) {
            Entry::Occupied(_) => return Err(ConflictError::Busy(target)),
            Entry::Vacant(entry) => entry,
        };
        let mut workflow = Workflow {
            state: WorkflowState::Idle,
            context: None,
        };
        workflow.step(WorkflowState::Requested)?;

        let step = if existing > 0 {
            workflow.step(WorkflowState::ConflictDetected)?;
            workflow.step(WorkflowState::AwaitingUserChoice)?;
            let context = ConflictContext {
                target: target.clone(),
                params,
                existing,
            };
            workflow.context = Some(context.clone());
            debug!(%target, existing, "generation conflict awaiting choice");
            WorkflowStep::AwaitChoice(context)
        } else {
            workflow.step(WorkflowState::Executing)?;
            WorkflowStep::Execute {
                params,
                mode: GenerationMode::Append,
            }
        };
        entry.insert(workflow);
        Ok(step)
    }

    /// Apply the user's choice
    ///
    /// Cancel closes the workflow and returns `None`.
    ///
    /// # Errors
    /// [`ConflictError::NoPendingConflict`] unless the target awaits a choice
    pub fn resolve(
        &self,
        target: &GenerationTarget,
        resolution: Resolution,
    ) -> Result<Option<WorkflowStep>, ConflictError> {
        let Some(mut workflow) = self
            .workflows
            .get_mut(target)
            .filter(|w| w.state == WorkflowState::AwaitingUserChoice)
        else {
            return Err(ConflictError::NoPendingConflict(target.clone()));
        };

        let Some(mode) = resolution.mode() else {
            workflow.step(WorkflowState::Idle)?;
            drop(workflow);
            self.workflows.remove(target);
            debug!(%target, "generation cancelled");
            return Ok(None);
        };

        workflow.step(WorkflowState::Executing)?;
        let params = workflow
            .context
            .take()
            .map(|c| c.params)
            .unwrap_or_default();
        Ok(Some(WorkflowStep::Execute { params, mode }))
    }

    /// Close an executing workflow
    pub fn finish(&self, target: &GenerationTarget, succeeded: bool) {
        if let Some(mut workflow) = self.workflows.get_mut(target) {
            let to = if succeeded {
                WorkflowState::Done
            } else {
                WorkflowState::Idle
            };
            if workflow.step(to).is_err() {
                debug!(%target, state = ?workflow.state, "finish on non-executing workflow");
            }
        }
        self.workflows.remove(target);
    }
}
