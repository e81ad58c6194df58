//! Backend row shapes
//!
//! Flat records as the persistence service stores them. Snapshots are built
//! from rows with [`Outline::from_rows`](crate::Outline::from_rows) and
//! locally created nodes are turned back into rows for insertion.

use crate::ids::{ProjectId, SectionId, TaskId};
use crate::node::{Section, Task, TaskStatus};
use crate::order::OrderKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Row of the `sections` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionRow {
    pub id: SectionId,
    pub project_id: ProjectId,
    pub title: String,
    #[serde(default)]
    pub parent_id: Option<SectionId>,
    #[serde(alias = "order_index")]
    pub order_key: OrderKey,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub last_integrated_at: Option<DateTime<Utc>>,
}

impl SectionRow {
    /// Row for a locally built section (children and tasks are not included)
    #[must_use]
    pub fn from_section(project_id: &ProjectId, section: &Section) -> Self {
        Self {
            id: section.id.clone(),
            project_id: project_id.clone(),
            title: section.title.clone(),
            parent_id: section.parent_id.clone(),
            order_key: section.order_key,
            content: section.content.clone(),
            last_integrated_at: section.last_integrated_at,
        }
    }

    pub(crate) fn into_section(self) -> Section {
        let mut section = Section::with_id(self.id, self.title, self.parent_id, self.order_key);
        section.content = self.content;
        section.last_integrated_at = self.last_integrated_at;
        section
    }
}

/// Row of the `tasks` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRow {
    pub id: TaskId,
    pub section_id: SectionId,
    #[serde(alias = "title")]
    pub text: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(alias = "order_index")]
    pub order_key: OrderKey,
}

impl From<&Task> for TaskRow {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            section_id: task.section_id.clone(),
            text: task.text.clone(),
            status: task.status,
            order_key: task.order_key,
        }
    }
}

impl TaskRow {
    pub(crate) fn into_task(self) -> Task {
        let mut task = Task::with_id(self.id, self.section_id, self.text, self.order_key);
        task.status = self.status;
        task
    }
}

/// One version in a task's content history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskContentRow {
    pub task_id: TaskId,
    pub content: String,
    #[serde(default)]
    pub word_count: u32,
    pub created_at: DateTime<Utc>,
}

/// Image attached to a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskImageRow {
    pub task_id: TaskId,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
}

/// Everything the backend returns for one project
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutlineRows {
    #[serde(default)]
    pub sections: Vec<SectionRow>,
    #[serde(default)]
    pub tasks: Vec<TaskRow>,
    #[serde(default)]
    pub contents: Vec<TaskContentRow>,
    #[serde(default)]
    pub images: Vec<TaskImageRow>,
}

/// Field-level section update; `None` leaves a field alone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// `Some(None)` moves the section to root level
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Option<SectionId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_key: Option<OrderKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_integrated_at: Option<DateTime<Utc>>,
}

impl SectionPatch {
    /// Empty patch
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With new title
    #[inline]
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// With new parent
    #[inline]
    #[must_use]
    pub fn with_parent(mut self, parent: Option<SectionId>) -> Self {
        self.parent_id = Some(parent);
        self
    }

    /// With new order key
    #[inline]
    #[must_use]
    pub fn with_order_key(mut self, key: OrderKey) -> Self {
        self.order_key = Some(key);
        self
    }

    /// With integrated content
    #[inline]
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>, at: DateTime<Utc>) -> Self {
        self.content = Some(content.into());
        self.last_integrated_at = Some(at);
        self
    }

    /// Whether the patch changes nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Field-level task update; `None` leaves a field alone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_id: Option<SectionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_key: Option<OrderKey>,
}

impl TaskPatch {
    /// Empty patch
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With new text
    #[inline]
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// With new status
    #[inline]
    #[must_use]
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// With new placement
    #[inline]
    #[must_use]
    pub fn with_placement(mut self, section: SectionId, key: OrderKey) -> Self {
        self.section_id = Some(section);
        self.order_key = Some(key);
        self
    }

    /// With new order key only
    #[inline]
    #[must_use]
    pub fn with_order_key(mut self, key: OrderKey) -> Self {
        self.order_key = Some(key);
        self
    }

    /// Whether the patch changes nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_accept_backend_column_names() {
        let row: TaskRow = serde_json::from_str(
            r#"{"id":"t1","section_id":"s1","title":"Draft budget","order_index":3000}"#,
        )
        .unwrap();
        assert_eq!(row.text, "Draft budget");
        assert_eq!(row.status, TaskStatus::Pending);
        assert_eq!(row.order_key, OrderKey::new(3000.0));

        let row: SectionRow = serde_json::from_str(
            r#"{"id":"s1","project_id":"p","title":"Intro","parent_id":null,"order_index":0}"#,
        )
        .unwrap();
        assert!(row.parent_id.is_none());
        assert!(row.content.is_none());
    }

    #[test]
    fn patches_serialize_only_set_fields() {
        let patch = TaskPatch::new().with_placement(SectionId::from("s2"), OrderKey::new(500.0));
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json, serde_json::json!({"section_id": "s2", "order_key": 500.0}));
        assert!(TaskPatch::new().is_empty());
    }

    #[test]
    fn reparent_to_root_is_explicit() {
        let patch = SectionPatch::new().with_parent(None);
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json, serde_json::json!({"parent_id": null}));
        assert!(!patch.is_empty());
    }
}
