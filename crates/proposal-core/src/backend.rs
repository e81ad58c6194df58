//! Persistence collaborator
//!
//! Row-oriented CRUD over the `sections` and `tasks` collections. Deletes
//! cascade the way the relational backend does: removing a section removes
//! its subtree and every task under it.

use crate::error::PersistenceError;
use proposal_tree::{
    OutlineRows, ProjectId, SectionId, SectionPatch, SectionRow, TaskId, TaskPatch, TaskRow,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Backend the editor persists to
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// All rows of a project
    async fn fetch_outline(&self, project: &ProjectId) -> Result<OutlineRows, PersistenceError>;

    /// Insert a section row
    async fn insert_section(&self, row: SectionRow) -> Result<(), PersistenceError>;

    /// Field-level section update
    async fn update_section(
        &self,
        id: &SectionId,
        patch: SectionPatch,
    ) -> Result<(), PersistenceError>;

    /// Delete a section (cascades)
    async fn delete_section(&self, id: &SectionId) -> Result<(), PersistenceError>;

    /// Delete every child section of `parent` (cascades)
    async fn delete_child_sections(&self, parent: &SectionId) -> Result<(), PersistenceError>;

    /// Delete every section of a project (cascades)
    async fn delete_project_sections(&self, project: &ProjectId) -> Result<(), PersistenceError>;

    /// Insert a task row
    async fn insert_task(&self, row: TaskRow) -> Result<(), PersistenceError>;

    /// Field-level task update
    async fn update_task(&self, id: &TaskId, patch: TaskPatch) -> Result<(), PersistenceError>;

    /// Delete a task
    async fn delete_task(&self, id: &TaskId) -> Result<(), PersistenceError>;

    /// Delete the tasks owned directly by a section
    async fn delete_section_tasks(&self, section: &SectionId) -> Result<(), PersistenceError>;

    /// Delete a task's content history
    async fn delete_task_contents(&self, task: &TaskId) -> Result<(), PersistenceError>;
}

#[async_trait::async_trait]
impl<B: PersistenceBackend + ?Sized> PersistenceBackend for Arc<B> {
    async fn fetch_outline(&self, project: &ProjectId) -> Result<OutlineRows, PersistenceError> {
        (**self).fetch_outline(project).await
    }

    async fn insert_section(&self, row: SectionRow) -> Result<(), PersistenceError> {
        (**self).insert_section(row).await
    }

    async fn update_section(
        &self,
        id: &SectionId,
        patch: SectionPatch,
    ) -> Result<(), PersistenceError> {
        (**self).update_section(id, patch).await
    }

    async fn delete_section(&self, id: &SectionId) -> Result<(), PersistenceError> {
        (**self).delete_section(id).await
    }

    async fn delete_child_sections(&self, parent: &SectionId) -> Result<(), PersistenceError> {
        (**self).delete_child_sections(parent).await
    }

    async fn delete_project_sections(&self, project: &ProjectId) -> Result<(), PersistenceError> {
        (**self).delete_project_sections(project).await
    }

    async fn insert_task(&self, row: TaskRow) -> Result<(), PersistenceError> {
        (**self).insert_task(row).await
    }

    async fn update_task(&self, id: &TaskId, patch: TaskPatch) -> Result<(), PersistenceError> {
        (**self).update_task(id, patch).await
    }

    async fn delete_task(&self, id: &TaskId) -> Result<(), PersistenceError> {
        (**self).delete_task(id).await
    }

    async fn delete_section_tasks(&self, section: &SectionId) -> Result<(), PersistenceError> {
        (**self).delete_section_tasks(section).await
    }

    async fn delete_task_contents(&self, task: &TaskId) -> Result<(), PersistenceError> {
        (**self).delete_task_contents(task).await
    }
}

/// Run a backend call under a timeout; elapsed time becomes a failure
///
/// # Errors
/// The call's own error, or [`PersistenceError::Timeout`]
pub async fn with_timeout<F, T>(limit: Duration, call: F) -> Result<T, PersistenceError>
where
    F: Future<Output = Result<T, PersistenceError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(PersistenceError::Timeout {
            secs: limit.as_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn slow_calls_time_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, PersistenceError>(())
        };
        let err = with_timeout(Duration::from_secs(5), slow).await.unwrap_err();
        assert_eq!(err, PersistenceError::Timeout { secs: 5 });
    }

    #[tokio::test]
    async fn fast_calls_pass_through() {
        let fast = async { Err::<(), _>(PersistenceError::rejected("no")) };
        let err = with_timeout(Duration::from_secs(5), fast).await.unwrap_err();
        assert_eq!(err, PersistenceError::rejected("no"));
    }
}
