//! Merge-by-id of backend rows into a snapshot
//!
//! Realtime notifications and full refetches both go through
//! [`Outline::apply_change`]; [`Outline::from_rows`] is just a fold of it.
//! Remote state wins: merges never reject ties between sibling keys.

use crate::ids::{SectionId, TaskId};
use crate::node::{GeneratedContent, ImageRef, Section};
use crate::outline::{insert_sorted, Outline};
use crate::rows::{OutlineRows, SectionRow, TaskContentRow, TaskImageRow, TaskRow};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One change notification from the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "row", rename_all = "snake_case")]
pub enum RowChange {
    /// Section inserted or updated
    SectionUpserted(SectionRow),
    /// Section deleted (cascades)
    SectionDeleted(SectionId),
    /// Task inserted or updated
    TaskUpserted(TaskRow),
    /// Task deleted
    TaskDeleted(TaskId),
    /// New version in a task's content history
    ContentAdded(TaskContentRow),
    /// Image attached to a task
    ImageAdded(TaskImageRow),
}

impl Outline {
    /// Build a snapshot from backend rows
    ///
    /// Rows may arrive in any order: tasks and sections whose parent is not
    /// yet known are parked and adopted once it appears.
    #[must_use]
    pub fn from_rows(rows: OutlineRows) -> Self {
        let OutlineRows {
            sections,
            tasks,
            contents,
            images,
        } = rows;
        let mut outline = Self::new();
        let changes = sections
            .into_iter()
            .map(RowChange::SectionUpserted)
            .chain(tasks.into_iter().map(RowChange::TaskUpserted))
            .chain(contents.into_iter().map(RowChange::ContentAdded))
            .chain(images.into_iter().map(RowChange::ImageAdded));
        for change in changes {
            outline.merge(change);
        }
        outline
    }

    /// Snapshot with one remote change merged in
    #[must_use]
    pub fn apply_change(&self, change: RowChange) -> Self {
        let mut next = self.clone();
        next.merge(change);
        next
    }

    fn merge(&mut self, change: RowChange) {
        match change {
            RowChange::SectionUpserted(row) => self.upsert_section(row),
            RowChange::SectionDeleted(id) => {
                if self.take_section(&id).is_none() {
                    debug!(section = %id, "delete for unknown section ignored");
                }
            }
            RowChange::TaskUpserted(row) => self.upsert_task(row),
            RowChange::TaskDeleted(id) => {
                if self.take_task(&id).is_none() {
                    debug!(task = %id, "delete for unknown task ignored");
                }
            }
            RowChange::ContentAdded(row) => self.merge_content(row),
            RowChange::ImageAdded(row) => self.merge_image(row),
        }
    }

    fn upsert_section(&mut self, row: SectionRow) {
        let id = row.id.clone();
        let Some(existing) = self.find_section(&id) else {
            self.insert_remote_section(row);
            return;
        };

        // Parent as placed in this snapshot: unknown parents mean root level
        let current_parent = existing
            .parent_id
            .clone()
            .filter(|p| self.find_section(p).is_some());
        let wanted_parent = row.parent_id.clone().filter(|p| self.find_section(p).is_some());
        let moved = current_parent != wanted_parent || existing.order_key != row.order_key;

        if let Some(section) = self.find_section_mut(&id) {
            section.title = row.title;
            section.content = row.content;
            section.last_integrated_at = row.last_integrated_at;
        }
        if !moved {
            if let Some(section) = self.find_section_mut(&id) {
                section.parent_id = row.parent_id;
            }
            return;
        }
        if let Some(parent) = &wanted_parent {
            if self.is_descendant(parent, &id) {
                warn!(
                    section = %id,
                    parent = %parent,
                    "remote re-parent would create a cycle, ignored"
                );
                return;
            }
        }

        if let Some(mut section) = self.take_section(&id) {
            section.parent_id = row.parent_id;
            section.order_key = row.order_key;
            self.place_section(wanted_parent.as_ref(), section);
        }
    }

    fn insert_remote_section(&mut self, row: SectionRow) {
        let section = row.into_section();
        let id = section.id.clone();
        let parent = section.parent_id.clone().filter(|p| self.find_section(p).is_some());
        self.place_section(parent.as_ref(), section);
        self.adopt_orphans(&id);
    }

    fn place_section(&mut self, parent: Option<&SectionId>, section: Section) {
        match parent.and_then(|p| self.find_section_mut(p)) {
            Some(parent) => insert_sorted(&mut parent.children, section, |s| s.order_key),
            None => insert_sorted(&mut self.roots, section, |s| s.order_key),
        }
    }

    fn adopt_orphans(&mut self, id: &SectionId) {
        let (orphans, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut self.roots)
            .into_iter()
            .partition(|s| s.parent_id.as_ref() == Some(id) && !s.contains_section(id));
        self.roots = keep;
        if let Some(parent) = self.find_section_mut(id) {
            for orphan in orphans {
                debug!(section = %orphan.id, parent = %id, "adopted orphan section");
                insert_sorted(&mut parent.children, orphan, |s| s.order_key);
            }
        } else {
            // Section not reachable after placement; keep orphans at root
            for orphan in orphans {
                insert_sorted(&mut self.roots, orphan, |s| s.order_key);
            }
        }

        let (tasks, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut self.unassigned)
            .into_iter()
            .partition(|t| t.section_id == *id);
        self.unassigned = keep;
        if let Some(section) = self.find_section_mut(id) {
            for task in tasks {
                insert_sorted(&mut section.tasks, task, |t| t.order_key);
            }
        }
    }

    fn upsert_task(&mut self, row: TaskRow) {
        let (content, images) = match self.take_task(&row.id) {
            Some(old) => (old.generated_content, old.images),
            None => (None, Vec::new()),
        };
        let mut task = row.into_task();
        task.generated_content = content;
        task.images = images;
        let section_id = task.section_id.clone();
        match self.find_section_mut(&section_id) {
            Some(section) => insert_sorted(&mut section.tasks, task, |t| t.order_key),
            None => {
                debug!(task = %task.id, section = %section_id, "task parked as unassigned");
                insert_sorted(&mut self.unassigned, task, |t| t.order_key);
            }
        }
    }

    fn merge_content(&mut self, row: TaskContentRow) {
        let Some(task) = self.find_task_mut(&row.task_id) else {
            debug!(task = %row.task_id, "content for unknown task ignored");
            return;
        };
        let newer = task
            .generated_content
            .as_ref()
            .map_or(true, |current| row.created_at >= current.generated_at);
        if newer {
            task.generated_content = Some(GeneratedContent {
                text: row.content,
                word_count: row.word_count,
                generated_at: row.created_at,
            });
        }
    }

    fn merge_image(&mut self, row: TaskImageRow) {
        let Some(task) = self.find_task_mut(&row.task_id) else {
            debug!(task = %row.task_id, "image for unknown task ignored");
            return;
        };
        if task.images.iter().any(|i| i.url == row.image_url) {
            return;
        }
        let at = task.images.partition_point(|i| i.created_at <= row.created_at);
        task.images.insert(
            at,
            ImageRef {
                url: row.image_url,
                created_at: row.created_at,
            },
        );
    }
}
