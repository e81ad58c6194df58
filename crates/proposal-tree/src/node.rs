//! Outline node types
//!
//! A [`Section`] owns its child sections and its tasks. A [`Task`] keeps a
//! back-reference to its section but never owns anything.

use crate::ids::{SectionId, TaskId};
use crate::order::OrderKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started (default)
    #[default]
    Pending,
    /// Work underway
    InProgress,
    /// Finished
    Completed,
    /// Any status string this crate does not know
    #[serde(other)]
    Unknown,
}

/// Current generated content of a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub text: String,
    pub word_count: u32,
    pub generated_at: DateTime<Utc>,
}

impl GeneratedContent {
    /// Whether there is any text
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Reference to a generated or uploaded image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// Leaf work item owned by exactly one section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Owning section (back-reference)
    pub section_id: SectionId,
    pub text: String,
    pub status: TaskStatus,
    pub order_key: OrderKey,
    pub generated_content: Option<GeneratedContent>,
    pub images: Vec<ImageRef>,
}

impl Task {
    /// New pending task with a fresh id
    #[must_use]
    pub fn new(section_id: SectionId, text: impl Into<String>, order_key: OrderKey) -> Self {
        Self::with_id(TaskId::generate(), section_id, text, order_key)
    }

    /// New pending task with a known id
    #[must_use]
    pub fn with_id(
        id: TaskId,
        section_id: SectionId,
        text: impl Into<String>,
        order_key: OrderKey,
    ) -> Self {
        Self {
            id,
            section_id,
            text: text.into(),
            status: TaskStatus::Pending,
            order_key,
            generated_content: None,
            images: Vec::new(),
        }
    }

    /// Whether the task has non-empty generated content
    #[inline]
    #[must_use]
    pub fn has_content(&self) -> bool {
        self.generated_content
            .as_ref()
            .is_some_and(|c| !c.is_empty())
    }
}

/// Node of the proposal outline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: SectionId,
    pub title: String,
    pub order_key: OrderKey,
    pub parent_id: Option<SectionId>,
    /// Child sections, ascending by order key
    pub children: Vec<Section>,
    /// Owned tasks, ascending by order key
    pub tasks: Vec<Task>,
    /// Integrated prose
    pub content: Option<String>,
    pub last_integrated_at: Option<DateTime<Utc>>,
}

impl Section {
    /// New empty section with a fresh id
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        parent_id: Option<SectionId>,
        order_key: OrderKey,
    ) -> Self {
        Self::with_id(SectionId::generate(), title, parent_id, order_key)
    }

    /// New empty section with a known id
    #[must_use]
    pub fn with_id(
        id: SectionId,
        title: impl Into<String>,
        parent_id: Option<SectionId>,
        order_key: OrderKey,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            order_key,
            parent_id,
            children: Vec::new(),
            tasks: Vec::new(),
            content: None,
            last_integrated_at: None,
        }
    }

    /// Builder: add a child (kept sorted)
    #[must_use]
    pub fn with_child(mut self, mut child: Section) -> Self {
        child.parent_id = Some(self.id.clone());
        crate::outline::insert_sorted(&mut self.children, child, |s| s.order_key);
        self
    }

    /// Builder: add a task (kept sorted)
    #[must_use]
    pub fn with_task(mut self, mut task: Task) -> Self {
        task.section_id = self.id.clone();
        crate::outline::insert_sorted(&mut self.tasks, task, |t| t.order_key);
        self
    }

    /// Whether the section already holds children or tasks
    #[inline]
    #[must_use]
    pub fn has_structure(&self) -> bool {
        !self.children.is_empty() || !self.tasks.is_empty()
    }

    /// Order keys of the tasks, ascending
    #[must_use]
    pub fn task_keys(&self) -> Vec<OrderKey> {
        self.tasks.iter().map(|t| t.order_key).collect()
    }

    /// Order keys of the children, ascending
    #[must_use]
    pub fn child_keys(&self) -> Vec<OrderKey> {
        self.children.iter().map(|s| s.order_key).collect()
    }

    /// Whether `id` names this section or any section below it
    #[must_use]
    pub fn contains_section(&self, id: &SectionId) -> bool {
        self.id == *id || self.children.iter().any(|c| c.contains_section(id))
    }
}

/// Borrowed view of any outline node
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeRef<'a> {
    Section(&'a Section),
    Task(&'a Task),
}

impl<'a> NodeRef<'a> {
    /// The section, if this node is one
    #[inline]
    #[must_use]
    pub fn as_section(&self) -> Option<&'a Section> {
        match self {
            Self::Section(s) => Some(s),
            Self::Task(_) => None,
        }
    }

    /// The task, if this node is one
    #[inline]
    #[must_use]
    pub fn as_task(&self) -> Option<&'a Task> {
        match self {
            Self::Task(t) => Some(t),
            Self::Section(_) => None,
        }
    }
}
