//! Proposal structure editor
//!
//! The facade callers drive. Owns the snapshot (through the optimistic
//! controller), the drag coordinator, the generation client and the
//! per-target conflict workflows.

use crate::backend::PersistenceBackend;
use crate::config::EditorConfig;
use crate::conflict::{
    ConflictContext, ConflictRegistry, GenerationParams, GenerationTarget, Resolution,
    WorkflowState, WorkflowStep,
};
use crate::drag::{DragEvent, DragReorderCoordinator, DragResolution, RenumberScope};
use crate::error::{EditorError, PersistenceError};
use crate::generation::{
    ContentOutcome, ContentRequest, GenerationClient, GenerationMode, GenerationReport,
    GenerationTransport, ImageRequest, ImageType, IntegrateRequest, IntegrationPiece,
    OutlineRequest, SubsectionsRequest, TasksOutcome, TasksRequest,
};
use crate::optimistic::{OptimisticController, RollbackPolicy};
use chrono::Utc;
use futures::future::try_join_all;
use proposal_evidence::EvidenceMap;
use proposal_tree::{
    OrderKey, Outline, ProjectId, RowChange, Section, SectionId, SectionPatch, SectionRow, Task,
    TaskId, TaskImageRow, TaskPatch, TaskRow, TaskStatus, TreeError,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Answer to a generation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationStatus {
    /// Target holds content; call [`ProposalEditor::resolve_conflict`]
    AwaitingChoice(ConflictContext),
    /// Generation ran and the snapshot was refreshed
    Completed(GenerationOutput),
}

/// What a finished generation reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutput {
    /// Outline or subsections were written by the service
    Structure(GenerationReport),
    /// Task generation result
    Tasks(TasksOutcome),
    /// Task content result
    Content(ContentOutcome),
}

/// Image generation options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageOptions {
    /// Style
    pub image_type: ImageType,
    /// Prompt for [`ImageType::Custom`]
    pub custom_prompt: Option<String>,
    /// URL of an image to base the result on
    pub reference_image: Option<String>,
}

/// Analysis document with citation ids assigned
#[derive(Debug, Clone)]
pub struct AnalysisEvidence {
    /// Document with `citationIds` written into every citing object
    pub document: Value,
    /// Deduplicated evidence by id
    pub evidence: EvidenceMap,
}

fn sibling_keys(
    outline: &Outline,
    parent: Option<&SectionId>,
    moving: Option<&SectionId>,
) -> Result<Vec<OrderKey>, TreeError> {
    let siblings = match parent {
        None => outline.roots.as_slice(),
        Some(id) => outline
            .find_section(id)
            .map(|s| s.children.as_slice())
            .ok_or_else(|| TreeError::section_not_found(id))?,
    };
    Ok(siblings
        .iter()
        .filter(|s| Some(&s.id) != moving)
        .map(|s| s.order_key)
        .collect())
}

fn titles<'a>(sections: impl IntoIterator<Item = &'a Section>) -> Vec<String> {
    sections.into_iter().map(|s| s.title.clone()).collect()
}

/// Editor over one project's outline
#[derive(Debug)]
pub struct ProposalEditor<B, T> {
    project: ProjectId,
    config: EditorConfig,
    backend: Arc<B>,
    controller: OptimisticController<B>,
    drag: DragReorderCoordinator,
    client: GenerationClient<T>,
    workflows: ConflictRegistry,
}

impl<B, T> ProposalEditor<B, T>
where
    B: PersistenceBackend,
    T: GenerationTransport,
{
    /// Editor with an empty snapshot; call [`ProposalEditor::refresh`] to load
    #[must_use]
    pub fn new(project: ProjectId, backend: Arc<B>, transport: T, config: EditorConfig) -> Self {
        let controller = OptimisticController::new(
            project.clone(),
            Arc::clone(&backend),
            config.persistence_timeout(),
        )
        .with_refresh_after_success(config.refresh_after_success);
        let client = GenerationClient::new(
            transport,
            config.endpoints.clone(),
            config.generation_timeout(),
        );
        Self {
            drag: DragReorderCoordinator::new(config.allocator()),
            project,
            config,
            backend,
            controller,
            client,
            workflows: ConflictRegistry::new(),
        }
    }

    /// Editor with the project's outline loaded
    ///
    /// # Errors
    /// Initial fetch failure
    pub async fn load(
        project: ProjectId,
        backend: Arc<B>,
        transport: T,
        config: EditorConfig,
    ) -> Result<Self, EditorError> {
        let editor = Self::new(project, backend, transport, config);
        editor.refresh().await?;
        Ok(editor)
    }

    /// Project being edited
    #[inline]
    #[must_use]
    pub fn project(&self) -> &ProjectId {
        &self.project
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Current snapshot
    #[inline]
    #[must_use]
    pub fn outline(&self) -> Arc<Outline> {
        self.controller.snapshot()
    }

    /// Snapshot version; bumps on every install
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.controller.version()
    }

    /// Replace the snapshot with the backend's rows
    ///
    /// # Errors
    /// Fetch failure or timeout; the snapshot is left as is
    #[instrument(skip_all, fields(project = %self.project))]
    pub async fn refresh(&self) -> Result<Arc<Outline>, EditorError> {
        let outline = self.controller.refetch().await?;
        info!(sections = outline.sections().len(), tasks = outline.tasks().len(), "outline loaded");
        Ok(outline)
    }

    /// Merge a change notification from another client
    pub fn apply_remote_change(&self, change: RowChange) -> Arc<Outline> {
        debug!(?change, "remote change");
        self.controller.merge_remote(change)
    }

    // ---- sections ------------------------------------------------------

    /// Append a section under `parent` (root level when `None`)
    ///
    /// # Errors
    /// `NotFound` for a missing parent, or the persistence failure
    #[instrument(skip_all, fields(parent = ?parent))]
    pub async fn add_section(
        &self,
        parent: Option<&SectionId>,
        title: impl Into<String>,
    ) -> Result<SectionId, EditorError> {
        let id = SectionId::generate();
        let title = title.into();
        let alloc = self.config.allocator();
        self.controller
            .perform_with(
                "add_section",
                RollbackPolicy::RestoreSnapshot,
                |outline| {
                    let key = alloc.after_last(&sibling_keys(outline, parent, None)?)?;
                    let section = Section::with_id(id.clone(), title, parent.cloned(), key);
                    let row = SectionRow::from_section(&self.project, &section);
                    Ok((outline.insert_section(parent, section)?, row))
                },
                |row| self.backend.insert_section(row),
            )
            .await?;
        info!(section = %id, "section added");
        Ok(id)
    }

    /// Rename a section
    ///
    /// # Errors
    /// `NotFound`, or the persistence failure
    #[instrument(skip_all, fields(section = %id))]
    pub async fn edit_section(
        &self,
        id: &SectionId,
        title: impl Into<String>,
    ) -> Result<(), EditorError> {
        let title = title.into();
        self.controller
            .perform(
                "edit_section",
                RollbackPolicy::RestoreSnapshot,
                |outline| outline.rename_section(id, title.clone()),
                self.backend.update_section(id, SectionPatch::new().with_title(title.clone())),
            )
            .await?;
        Ok(())
    }

    /// Delete a section with its subtree and every task under it
    ///
    /// # Errors
    /// `NotFound` (nothing is persisted), or the persistence failure
    #[instrument(skip_all, fields(section = %id))]
    pub async fn delete_section(&self, id: &SectionId) -> Result<(), EditorError> {
        let removed_tasks = self.outline().subtree_task_ids(id).len();
        self.controller
            .perform(
                "delete_section",
                RollbackPolicy::RestoreSnapshot,
                |outline| outline.remove_section(id),
                self.backend.delete_section(id),
            )
            .await?;
        info!(removed_tasks, "section deleted");
        Ok(())
    }

    /// Move a section to the end of `new_parent`'s children
    ///
    /// # Errors
    /// `NotFound`, `CyclicMove` (nothing is persisted), or the persistence
    /// failure
    #[instrument(skip_all, fields(section = %id, new_parent = ?new_parent))]
    pub async fn reparent_section(
        &self,
        id: &SectionId,
        new_parent: Option<&SectionId>,
    ) -> Result<(), EditorError> {
        let alloc = self.config.allocator();
        self.controller
            .perform_with(
                "reparent_section",
                RollbackPolicy::RestoreSnapshot,
                |outline| {
                    let key = alloc.after_last(&sibling_keys(outline, new_parent, Some(id))?)?;
                    Ok((outline.reparent_section(id, new_parent, key)?, key))
                },
                |key| {
                    let patch = SectionPatch::new()
                        .with_parent(new_parent.cloned())
                        .with_order_key(key);
                    self.backend.update_section(id, patch)
                },
            )
            .await?;
        Ok(())
    }

    // ---- tasks ---------------------------------------------------------

    /// Append a task to a section
    ///
    /// # Errors
    /// `NotFound`, or the persistence failure
    #[instrument(skip_all, fields(section = %section))]
    pub async fn add_task(
        &self,
        section: &SectionId,
        text: impl Into<String>,
    ) -> Result<TaskId, EditorError> {
        let id = TaskId::generate();
        let text = text.into();
        let alloc = self.config.allocator();
        self.controller
            .perform_with(
                "add_task",
                RollbackPolicy::RestoreSnapshot,
                |outline| {
                    let keys = outline
                        .find_section(section)
                        .map(Section::task_keys)
                        .ok_or_else(|| TreeError::section_not_found(section))?;
                    let key = alloc.after_last(&keys)?;
                    let task = Task::with_id(id.clone(), section.clone(), text, key);
                    let row = TaskRow::from(&task);
                    Ok((outline.insert_task(task)?, row))
                },
                |row| self.backend.insert_task(row),
            )
            .await?;
        debug!(task = %id, "task added");
        Ok(id)
    }

    /// Change a task's text
    ///
    /// # Errors
    /// `NotFound`, or the persistence failure
    #[instrument(skip_all, fields(task = %id))]
    pub async fn edit_task(&self, id: &TaskId, text: impl Into<String>) -> Result<(), EditorError> {
        let text = text.into();
        self.controller
            .perform(
                "edit_task",
                RollbackPolicy::RestoreSnapshot,
                |outline| outline.rename_task(id, text.clone()),
                self.backend.update_task(id, TaskPatch::new().with_text(text.clone())),
            )
            .await?;
        Ok(())
    }

    /// Change a task's status
    ///
    /// # Errors
    /// `NotFound`, or the persistence failure
    #[instrument(skip_all, fields(task = %id))]
    pub async fn set_task_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
    ) -> Result<(), EditorError> {
        self.controller
            .perform(
                "set_task_status",
                RollbackPolicy::RestoreSnapshot,
                |outline| outline.set_task_status(id, status),
                self.backend.update_task(id, TaskPatch::new().with_status(status)),
            )
            .await?;
        Ok(())
    }

    /// Delete a task; a task already gone is not an error
    ///
    /// # Errors
    /// The persistence failure
    #[instrument(skip_all, fields(task = %id))]
    pub async fn delete_task(&self, id: &TaskId) -> Result<(), EditorError> {
        if self.outline().find_task(id).is_none() {
            debug!("task already absent");
            return Ok(());
        }
        self.controller
            .perform(
                "delete_task",
                RollbackPolicy::RestoreSnapshot,
                |outline| Ok(outline.remove_task(id)),
                self.backend.delete_task(id),
            )
            .await?;
        Ok(())
    }

    // ---- ordering ------------------------------------------------------

    /// Apply a drag-end event
    ///
    /// Returns the resolution that was applied. A no-op touches neither the
    /// snapshot nor the backend.
    ///
    /// # Errors
    /// The persistence failure; the snapshot is refetched first
    #[instrument(skip(self))]
    pub async fn handle_drag_end(&self, event: DragEvent) -> Result<DragResolution, EditorError> {
        let mut resolution = self.drag.resolve(&event, &self.outline());
        if let DragResolution::NeedsRenumber(scope) = &resolution {
            info!(?scope, "order keys exhausted, renumbering");
            self.renumber(scope).await?;
            resolution = self.drag.resolve(&event, &self.outline());
        }

        match &resolution {
            DragResolution::MoveTask {
                task,
                section,
                key,
                cross_section,
            } => {
                let patch = if *cross_section {
                    TaskPatch::new().with_placement(section.clone(), *key)
                } else {
                    TaskPatch::new().with_order_key(*key)
                };
                self.controller
                    .perform(
                        "move_task",
                        RollbackPolicy::Refetch,
                        |outline| outline.move_task(task, section, *key),
                        self.backend.update_task(task, patch),
                    )
                    .await?;
            }
            DragResolution::ReorderSection { section, key } => {
                self.controller
                    .perform(
                        "reorder_section",
                        RollbackPolicy::Refetch,
                        |outline| outline.reorder_section(section, *key),
                        self.backend
                            .update_section(section, SectionPatch::new().with_order_key(*key)),
                    )
                    .await?;
            }
            DragResolution::NeedsRenumber(scope) => {
                return Err(EditorError::InvalidState(format!(
                    "order keys still exhausted after renumbering {scope:?}"
                )));
            }
            DragResolution::Noop(reason) => debug!(?reason, "drop ignored"),
        }
        Ok(resolution)
    }

    /// Evenly re-space a section's task keys, persisted as one batch
    ///
    /// # Errors
    /// `NotFound`, or the first failed write; the snapshot is refetched
    #[instrument(skip_all, fields(section = %section))]
    pub async fn renumber_tasks(&self, section: &SectionId) -> Result<(), EditorError> {
        let alloc = self.config.allocator();
        self.controller
            .perform_with(
                "renumber_tasks",
                RollbackPolicy::Refetch,
                |outline| outline.renumber_tasks(section, &alloc),
                |changes| self.persist_task_keys(changes),
            )
            .await?;
        Ok(())
    }

    /// Evenly re-space the sections under `parent`
    ///
    /// # Errors
    /// `NotFound`, or the first failed write; the snapshot is refetched
    #[instrument(skip_all, fields(parent = ?parent))]
    pub async fn renumber_sections(&self, parent: Option<&SectionId>) -> Result<(), EditorError> {
        let alloc = self.config.allocator();
        self.controller
            .perform_with(
                "renumber_sections",
                RollbackPolicy::Refetch,
                |outline| outline.renumber_children(parent, &alloc),
                |changes| self.persist_section_keys(changes),
            )
            .await?;
        Ok(())
    }

    async fn renumber(&self, scope: &RenumberScope) -> Result<(), EditorError> {
        match scope {
            RenumberScope::Tasks(section) => self.renumber_tasks(section).await,
            RenumberScope::Sections(parent) => self.renumber_sections(parent.as_ref()).await,
        }
    }

    async fn persist_task_keys(
        &self,
        changes: Vec<(TaskId, OrderKey)>,
    ) -> Result<(), PersistenceError> {
        let writes = changes
            .iter()
            .map(|(id, key)| self.backend.update_task(id, TaskPatch::new().with_order_key(*key)));
        try_join_all(writes).await.map(|_| ())
    }

    async fn persist_section_keys(
        &self,
        changes: Vec<(SectionId, OrderKey)>,
    ) -> Result<(), PersistenceError> {
        let writes = changes
            .iter()
            .map(|(id, key)| {
                self.backend.update_section(id, SectionPatch::new().with_order_key(*key))
            });
        try_join_all(writes).await.map(|_| ())
    }

    // ---- generation ----------------------------------------------------

    /// Generate the project outline
    ///
    /// # Errors
    /// See [`ProposalEditor::resolve_conflict`]
    pub async fn generate_outline(
        &self,
        params: GenerationParams,
    ) -> Result<GenerationStatus, EditorError> {
        self.request(GenerationTarget::Outline, params).await
    }

    /// Generate tasks for a section
    ///
    /// # Errors
    /// See [`ProposalEditor::resolve_conflict`]
    pub async fn generate_tasks(
        &self,
        section: &SectionId,
        params: GenerationParams,
    ) -> Result<GenerationStatus, EditorError> {
        self.request(GenerationTarget::SectionTasks(section.clone()), params).await
    }

    /// Generate subsections for a section, then sort them by ordinal
    ///
    /// # Errors
    /// See [`ProposalEditor::resolve_conflict`]
    pub async fn generate_subsections(
        &self,
        section: &SectionId,
        params: GenerationParams,
    ) -> Result<GenerationStatus, EditorError> {
        self.request(GenerationTarget::SectionSubsections(section.clone()), params)
            .await
    }

    /// Generate content for a task
    ///
    /// # Errors
    /// See [`ProposalEditor::resolve_conflict`]
    pub async fn generate_task_content(
        &self,
        task: &TaskId,
        params: GenerationParams,
    ) -> Result<GenerationStatus, EditorError> {
        self.request(GenerationTarget::TaskContent(task.clone()), params).await
    }

    /// Answer a pending conflict
    ///
    /// # Errors
    /// - [`EditorError::UserCancelled`] for [`Resolution::Cancel`]
    /// - [`EditorError::Workflow`] if nothing awaits a choice
    /// - the persistence failure while clearing for replace
    /// - [`EditorError::GenerationFailure`]; the tree is untouched
    #[instrument(skip_all, fields(target = %target))]
    pub async fn resolve_conflict(
        &self,
        target: &GenerationTarget,
        resolution: Resolution,
    ) -> Result<GenerationStatus, EditorError> {
        match self.workflows.resolve(target, resolution)? {
            None => Err(EditorError::UserCancelled),
            Some(WorkflowStep::AwaitChoice(context)) => {
                Ok(GenerationStatus::AwaitingChoice(context))
            }
            Some(WorkflowStep::Execute { params, mode }) => self
                .execute(target, params, mode)
                .await
                .map(GenerationStatus::Completed),
        }
    }

    /// Workflow state of a generation target
    #[must_use]
    pub fn conflict_state(&self, target: &GenerationTarget) -> WorkflowState {
        self.workflows.state(target)
    }

    /// Pending conflict of a target
    #[must_use]
    pub fn pending_conflict(&self, target: &GenerationTarget) -> Option<ConflictContext> {
        self.workflows.pending(target)
    }

    #[instrument(skip_all, fields(target = %target))]
    async fn request(
        &self,
        target: GenerationTarget,
        params: GenerationParams,
    ) -> Result<GenerationStatus, EditorError> {
        let existing = target.existing(&self.outline())?;
        match self.workflows.begin(target.clone(), params, existing)? {
            WorkflowStep::AwaitChoice(context) => {
                info!(existing, "target holds content, awaiting choice");
                Ok(GenerationStatus::AwaitingChoice(context))
            }
            WorkflowStep::Execute { params, mode } => self
                .execute(&target, params, mode)
                .await
                .map(GenerationStatus::Completed),
        }
    }

    async fn execute(
        &self,
        target: &GenerationTarget,
        params: GenerationParams,
        mode: GenerationMode,
    ) -> Result<GenerationOutput, EditorError> {
        let result = self.run_generation(target, params, mode).await;
        if let Err(err) = &result {
            warn!(%target, %err, "generation failed");
        }
        self.workflows.finish(target, result.is_ok());
        result
    }

    async fn run_generation(
        &self,
        target: &GenerationTarget,
        params: GenerationParams,
        mode: GenerationMode,
    ) -> Result<GenerationOutput, EditorError> {
        if mode == GenerationMode::Replace {
            self.clear_target(target).await?;
        }
        let outline = self.outline();
        let output = match target {
            GenerationTarget::Outline => {
                let request = OutlineRequest {
                    project_id: self.project.clone(),
                    action: mode,
                    source_ids: params.source_ids,
                };
                GenerationOutput::Structure(self.client.generate_outline(&request).await?)
            }
            GenerationTarget::SectionTasks(id) => {
                let section = outline
                    .find_section(id)
                    .ok_or_else(|| TreeError::section_not_found(id))?;
                let request = TasksRequest {
                    project_id: self.project.clone(),
                    section_id: id.clone(),
                    section_title: section.title.clone(),
                    source_ids: params.source_ids,
                    user_description: params.user_description,
                    mode,
                    all_sections: titles(outline.sections()),
                };
                let outcome = self.client.generate_tasks(params.workflow, &request).await?;
                GenerationOutput::Tasks(outcome)
            }
            GenerationTarget::SectionSubsections(id) => {
                let section = outline
                    .find_section(id)
                    .ok_or_else(|| TreeError::section_not_found(id))?;
                let request = SubsectionsRequest {
                    project_id: self.project.clone(),
                    section_id: id.clone(),
                    section_title: section.title.clone(),
                    source_ids: params.source_ids,
                    user_description: params.user_description,
                    all_parent_sections: titles(&outline.roots),
                };
                GenerationOutput::Structure(self.client.generate_subsections(&request).await?)
            }
            GenerationTarget::TaskContent(id) => {
                let task = outline
                    .find_task(id)
                    .ok_or_else(|| TreeError::NotFound(id.clone().into()))?;
                let request = ContentRequest {
                    mode: "task",
                    project_id: self.project.clone(),
                    section_id: task.section_id.clone(),
                    section_title: outline
                        .find_section(&task.section_id)
                        .map(|s| s.title.clone())
                        .unwrap_or_default(),
                    task_id: id.clone(),
                    task_text: task.text.clone(),
                    selected_source_ids: params.source_ids,
                    all_sections: titles(outline.sections()),
                };
                GenerationOutput::Content(self.client.generate_content(&request).await?)
            }
        };

        if let Err(err) = self.controller.refetch().await {
            warn!(%target, %err, "refetch after generation failed");
        }
        if let GenerationTarget::SectionSubsections(id) = target {
            self.sort_subsections(id).await;
        }
        info!(%target, ?mode, "generation completed");
        Ok(output)
    }

    /// Delete what a replace overwrites
    async fn clear_target(&self, target: &GenerationTarget) -> Result<(), EditorError> {
        match target {
            GenerationTarget::Outline => {
                self.controller
                    .perform(
                        "clear_outline",
                        RollbackPolicy::RestoreSnapshot,
                        |outline| Ok(outline.clear_sections()),
                        self.backend.delete_project_sections(&self.project),
                    )
                    .await?
            }
            GenerationTarget::SectionTasks(id) => {
                self.controller
                    .perform(
                        "clear_tasks",
                        RollbackPolicy::RestoreSnapshot,
                        |outline| outline.clear_tasks(id),
                        self.backend.delete_section_tasks(id),
                    )
                    .await?
            }
            GenerationTarget::SectionSubsections(id) => {
                self.controller
                    .perform(
                        "clear_subsections",
                        RollbackPolicy::RestoreSnapshot,
                        |outline| outline.clear_children(id),
                        self.backend.delete_child_sections(id),
                    )
                    .await?
            }
            GenerationTarget::TaskContent(id) => {
                self.controller
                    .perform(
                        "clear_content",
                        RollbackPolicy::RestoreSnapshot,
                        |outline| outline.set_task_content(id, None),
                        self.backend.delete_task_contents(id),
                    )
                    .await?
            }
        };
        debug!(%target, "cleared for replace");
        Ok(())
    }

    /// Re-key generated subsections by their leading numeral
    async fn sort_subsections(&self, id: &SectionId) {
        if self.outline().find_section(id).is_none() {
            return;
        }
        let alloc = self.config.allocator();
        let sorted = self
            .controller
            .perform_with(
                "sort_subsections",
                RollbackPolicy::Refetch,
                |outline| outline.sort_children_by_ordinal(id, &alloc),
                |changes| self.persist_section_keys(changes),
            )
            .await;
        if let Err(err) = sorted {
            warn!(section = %id, %err, "subsection ordering not persisted");
        }
    }

    // ---- integration, images, evidence ----------------------------------

    /// Merge a section's generated task content into section prose
    ///
    /// No conflict workflow: the previous prose is overwritten.
    ///
    /// # Errors
    /// - `NotFound`
    /// - [`EditorError::NothingToIntegrate`] when no task has content; the
    ///   service is not called
    /// - the generation or persistence failure
    #[instrument(skip_all, fields(section = %id))]
    pub async fn integrate_section(&self, id: &SectionId) -> Result<String, EditorError> {
        let outline = self.outline();
        let section = outline
            .find_section(id)
            .ok_or_else(|| EditorError::NotFound(id.clone().into()))?;
        let pieces: Vec<IntegrationPiece> = section
            .tasks
            .iter()
            .filter_map(|task| {
                let content = task.generated_content.as_ref().filter(|c| !c.is_empty())?;
                Some(IntegrationPiece {
                    task_id: task.id.clone(),
                    task_text: task.text.clone(),
                    content: content.text.clone(),
                })
            })
            .collect();
        if pieces.is_empty() {
            return Err(EditorError::NothingToIntegrate(id.clone()));
        }

        let request = IntegrateRequest {
            project_id: self.project.clone(),
            section_id: id.clone(),
            section_title: section.title.clone(),
            tasks: pieces,
        };
        let text = self.client.integrate(&request).await?;
        let now = Utc::now();
        self.controller
            .perform(
                "integrate_section",
                RollbackPolicy::RestoreSnapshot,
                |outline| outline.set_section_content(id, Some(text.clone()), Some(now)),
                self.backend
                    .update_section(id, SectionPatch::new().with_content(text.clone(), now)),
            )
            .await?;
        info!(chars = text.chars().count(), "section integrated");
        Ok(text)
    }

    /// Generate an image for a task, returning its URL
    ///
    /// The service stores the image row; the editor merges it locally.
    ///
    /// # Errors
    /// `NotFound`, or the generation failure
    #[instrument(skip_all, fields(task = %id))]
    pub async fn generate_image(
        &self,
        id: &TaskId,
        options: ImageOptions,
    ) -> Result<String, EditorError> {
        let task = self
            .outline()
            .find_task(id)
            .cloned()
            .ok_or_else(|| EditorError::NotFound(id.clone().into()))?;
        let task_content = task
            .generated_content
            .filter(|c| !c.is_empty())
            .map_or(task.text, |c| c.text);
        let request = ImageRequest {
            task_id: id.clone(),
            project_id: self.project.clone(),
            task_content,
            image_type: options.image_type,
            custom_prompt: options.custom_prompt,
            reference_image: options.reference_image,
        };
        let url = self.client.generate_image(&request).await?;
        self.controller.merge_remote(RowChange::ImageAdded(TaskImageRow {
            task_id: id.clone(),
            image_url: url.clone(),
            created_at: Utc::now(),
        }));
        Ok(url)
    }

    /// Fetch the analysis document and assign citation ids
    ///
    /// # Errors
    /// The generation failure
    #[instrument(skip_all, fields(project = %self.project))]
    pub async fn analysis_evidence(&self) -> Result<AnalysisEvidence, EditorError> {
        let mut document = self.client.fetch_analysis(&self.project).await?;
        let evidence = proposal_evidence::extract(&mut document);
        debug!(citations = evidence.len(), "analysis evidence extracted");
        Ok(AnalysisEvidence { document, evidence })
    }
}
