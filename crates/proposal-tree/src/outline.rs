//! Outline snapshot and its pure transforms
//!
//! Every public transform takes `&self` and returns a new [`Outline`]; the
//! receiver is never modified. Sibling lists stay sorted by order key.
//! Local inserts and moves refuse a key already held by a sibling.

use crate::error::TreeError;
use crate::ids::{NodeId, SectionId, TaskId};
use crate::node::{GeneratedContent, NodeRef, Section, Task, TaskStatus};
use crate::order::{OrderKey, OrderingAllocator};
use crate::ordinal::compare_titles;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Insert keeping ascending key order; equal keys go after existing ones
pub(crate) fn insert_sorted<T>(list: &mut Vec<T>, item: T, key: impl Fn(&T) -> OrderKey) {
    let k = key(&item);
    let at = list.partition_point(|x| key(x) <= k);
    list.insert(at, item);
}

fn holds_task(section: &Section, id: &TaskId) -> bool {
    section.tasks.iter().any(|t| t.id == *id) || section.children.iter().any(|c| holds_task(c, id))
}

fn find_in<'a>(list: &'a [Section], id: &SectionId) -> Option<&'a Section> {
    list.iter().find_map(|s| {
        if s.id == *id {
            Some(s)
        } else {
            find_in(&s.children, id)
        }
    })
}

fn find_in_mut<'a>(list: &'a mut [Section], id: &SectionId) -> Option<&'a mut Section> {
    let pos = list.iter().position(|s| s.contains_section(id))?;
    let section = &mut list[pos];
    if section.id == *id {
        Some(section)
    } else {
        find_in_mut(&mut section.children, id)
    }
}

fn find_task_in<'a>(list: &'a [Section], id: &TaskId) -> Option<&'a Task> {
    list.iter().find_map(|s| {
        s.tasks
            .iter()
            .find(|t| t.id == *id)
            .or_else(|| find_task_in(&s.children, id))
    })
}

fn find_task_mut_in<'a>(list: &'a mut [Section], id: &TaskId) -> Option<&'a mut Task> {
    let pos = list.iter().position(|s| holds_task(s, id))?;
    let section = &mut list[pos];
    match section.tasks.iter().position(|t| t.id == *id) {
        Some(i) => Some(&mut section.tasks[i]),
        None => find_task_mut_in(&mut section.children, id),
    }
}

fn take_task_in(list: &mut [Section], id: &TaskId) -> Option<Task> {
    let pos = list.iter().position(|s| holds_task(s, id))?;
    let section = &mut list[pos];
    match section.tasks.iter().position(|t| t.id == *id) {
        Some(i) => Some(section.tasks.remove(i)),
        None => take_task_in(&mut section.children, id),
    }
}

fn take_section_in(list: &mut Vec<Section>, id: &SectionId) -> Option<Section> {
    if let Some(i) = list.iter().position(|s| s.id == *id) {
        return Some(list.remove(i));
    }
    let pos = list.iter().position(|s| s.contains_section(id))?;
    take_section_in(&mut list[pos].children, id)
}

fn walk<'a>(list: &'a [Section], out: &mut Vec<&'a Section>) {
    for section in list {
        out.push(section);
        walk(&section.children, out);
    }
}

fn reject_collision(
    existing: impl IntoIterator<Item = OrderKey>,
    key: OrderKey,
) -> Result<(), TreeError> {
    if existing.into_iter().any(|k| k == key) {
        return Err(TreeError::OrderCollision { key });
    }
    Ok(())
}

fn renumber_sections(
    list: &mut [Section],
    alloc: &OrderingAllocator,
) -> Vec<(SectionId, OrderKey)> {
    let keys = alloc.renumber(list.len());
    list.iter_mut()
        .zip(keys)
        .map(|(section, key)| {
            section.order_key = key;
            (section.id.clone(), key)
        })
        .collect()
}

/// Where a task currently lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskLocation {
    /// Owned by a section in the tree
    Section(SectionId),
    /// Parked in the unassigned bucket
    Unassigned,
}

/// Immutable snapshot of a project's outline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Outline {
    /// Root sections, ascending by order key
    pub roots: Vec<Section>,
    /// Tasks whose section is not (yet) in the tree
    pub unassigned: Vec<Task>,
}

impl Outline {
    /// Empty outline
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Outline from already built root sections (sorted on the way in)
    #[must_use]
    pub fn from_roots(roots: Vec<Section>) -> Self {
        let mut outline = Self::new();
        for mut root in roots {
            root.parent_id = None;
            insert_sorted(&mut outline.roots, root, |s| s.order_key);
        }
        outline
    }

    /// Whether there are no sections and no unassigned tasks
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty() && self.unassigned.is_empty()
    }

    /// All sections, depth-first pre-order
    #[must_use]
    pub fn sections(&self) -> Vec<&Section> {
        let mut out = Vec::new();
        walk(&self.roots, &mut out);
        out
    }

    /// All tasks: section tasks depth-first, then unassigned ones
    #[must_use]
    pub fn tasks(&self) -> Vec<&Task> {
        self.sections()
            .into_iter()
            .flat_map(|s| s.tasks.iter())
            .chain(self.unassigned.iter())
            .collect()
    }

    /// Find a section at any depth
    #[must_use]
    pub fn find_section(&self, id: &SectionId) -> Option<&Section> {
        find_in(&self.roots, id)
    }

    pub(crate) fn find_section_mut(&mut self, id: &SectionId) -> Option<&mut Section> {
        find_in_mut(&mut self.roots, id)
    }

    /// Find a task at any depth, including the unassigned bucket
    #[must_use]
    pub fn find_task(&self, id: &TaskId) -> Option<&Task> {
        find_task_in(&self.roots, id).or_else(|| self.unassigned.iter().find(|t| t.id == *id))
    }

    pub(crate) fn find_task_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        if let Some(i) = self.unassigned.iter().position(|t| t.id == *id) {
            return Some(&mut self.unassigned[i]);
        }
        find_task_mut_in(&mut self.roots, id)
    }

    /// Where a task lives, if anywhere
    #[must_use]
    pub fn task_location(&self, id: &TaskId) -> Option<TaskLocation> {
        if self.unassigned.iter().any(|t| t.id == *id) {
            return Some(TaskLocation::Unassigned);
        }
        self.sections()
            .into_iter()
            .find(|s| s.tasks.iter().any(|t| t.id == *id))
            .map(|s| TaskLocation::Section(s.id.clone()))
    }

    /// Depth-first lookup of any node
    #[must_use]
    pub fn find_node(&self, id: &NodeId) -> Option<NodeRef<'_>> {
        match id {
            NodeId::Section(id) => self.find_section(id).map(NodeRef::Section),
            NodeId::Task(id) => self.find_task(id).map(NodeRef::Task),
        }
    }

    /// Sibling list under `parent` (roots when `None`)
    #[must_use]
    pub fn children_of(&self, parent: Option<&SectionId>) -> Option<&[Section]> {
        match parent {
            None => Some(&self.roots),
            Some(id) => self.find_section(id).map(|s| s.children.as_slice()),
        }
    }

    pub(crate) fn siblings_mut(
        &mut self,
        parent: Option<&SectionId>,
    ) -> Result<&mut Vec<Section>, TreeError> {
        match parent {
            None => Ok(&mut self.roots),
            Some(id) => self
                .find_section_mut(id)
                .map(|s| &mut s.children)
                .ok_or_else(|| TreeError::section_not_found(id)),
        }
    }

    /// Whether `candidate` is `ancestor` or lies anywhere below it
    #[must_use]
    pub fn is_descendant(&self, candidate: &SectionId, ancestor: &SectionId) -> bool {
        self.find_section(ancestor)
            .is_some_and(|a| a.contains_section(candidate))
    }

    /// Ids of every task in a section's subtree
    #[must_use]
    pub fn subtree_task_ids(&self, id: &SectionId) -> Vec<TaskId> {
        let mut out = Vec::new();
        if let Some(section) = self.find_section(id) {
            let mut sections = Vec::new();
            walk(std::slice::from_ref(section), &mut sections);
            out.extend(sections.iter().flat_map(|s| s.tasks.iter().map(|t| t.id.clone())));
        }
        out
    }

    // ---- transforms ----------------------------------------------------

    /// Add a section under `parent` (or at root level)
    ///
    /// # Errors
    /// - `NotFound` if `parent` does not resolve
    /// - `DuplicateId` if the section id is already present
    /// - `OrderCollision` if a sibling holds the same key
    pub fn insert_section(
        &self,
        parent: Option<&SectionId>,
        section: Section,
    ) -> Result<Self, TreeError> {
        let mut next = self.clone();
        next.insert_section_mut(parent, section)?;
        Ok(next)
    }

    pub(crate) fn insert_section_mut(
        &mut self,
        parent: Option<&SectionId>,
        mut section: Section,
    ) -> Result<(), TreeError> {
        if self.find_section(&section.id).is_some() {
            return Err(TreeError::DuplicateId(section.id.into()));
        }
        let siblings = self.siblings_mut(parent)?;
        reject_collision(siblings.iter().map(|s| s.order_key), section.order_key)?;
        section.parent_id = parent.cloned();
        insert_sorted(siblings, section, |s| s.order_key);
        Ok(())
    }

    /// Remove a section and everything below it
    ///
    /// # Errors
    /// `NotFound` if the section is not present
    pub fn remove_section(&self, id: &SectionId) -> Result<Self, TreeError> {
        let mut next = self.clone();
        next.take_section(id).ok_or_else(|| TreeError::section_not_found(id))?;
        Ok(next)
    }

    /// Add a task to the section named by `task.section_id`
    ///
    /// # Errors
    /// - `NotFound` if the section does not resolve
    /// - `DuplicateId` if the task id is already present
    /// - `OrderCollision` if a sibling task holds the same key
    pub fn insert_task(&self, task: Task) -> Result<Self, TreeError> {
        if self.find_task(&task.id).is_some() {
            return Err(TreeError::DuplicateId(task.id.into()));
        }
        let mut next = self.clone();
        let section_id = task.section_id.clone();
        let section = next
            .find_section_mut(&section_id)
            .ok_or_else(|| TreeError::section_not_found(&section_id))?;
        reject_collision(section.task_keys(), task.order_key)?;
        insert_sorted(&mut section.tasks, task, |t| t.order_key);
        Ok(next)
    }

    /// Remove a task wherever it lives; missing tasks are a no-op
    #[must_use]
    pub fn remove_task(&self, id: &TaskId) -> Self {
        let mut next = self.clone();
        next.take_task(id);
        next
    }

    pub(crate) fn take_section(&mut self, id: &SectionId) -> Option<Section> {
        take_section_in(&mut self.roots, id)
    }

    pub(crate) fn take_task(&mut self, id: &TaskId) -> Option<Task> {
        if let Some(i) = self.unassigned.iter().position(|t| t.id == *id) {
            return Some(self.unassigned.remove(i));
        }
        take_task_in(&mut self.roots, id)
    }

    /// Move a task into `target` at `key`
    ///
    /// # Errors
    /// - `NotFound` if the task or the target section is missing
    /// - `OrderCollision` if another task in the target holds `key`
    pub fn move_task(
        &self,
        id: &TaskId,
        target: &SectionId,
        key: OrderKey,
    ) -> Result<Self, TreeError> {
        if self.find_section(target).is_none() {
            return Err(TreeError::section_not_found(target));
        }
        let mut next = self.clone();
        let mut task = next
            .take_task(id)
            .ok_or_else(|| TreeError::NotFound(id.clone().into()))?;
        let section = next
            .find_section_mut(target)
            .ok_or_else(|| TreeError::section_not_found(target))?;
        reject_collision(section.task_keys(), key)?;
        task.section_id = target.clone();
        task.order_key = key;
        insert_sorted(&mut section.tasks, task, |t| t.order_key);
        Ok(next)
    }

    /// Move a section under `new_parent` (root level when `None`) at `key`
    ///
    /// # Errors
    /// - `NotFound` if either section is missing
    /// - `CyclicMove` if `new_parent` is the section or one of its descendants
    /// - `OrderCollision` if a new sibling holds `key`
    pub fn reparent_section(
        &self,
        id: &SectionId,
        new_parent: Option<&SectionId>,
        key: OrderKey,
    ) -> Result<Self, TreeError> {
        let mut next = self.clone();
        next.reparent_section_mut(id, new_parent, key)?;
        Ok(next)
    }

    pub(crate) fn reparent_section_mut(
        &mut self,
        id: &SectionId,
        new_parent: Option<&SectionId>,
        key: OrderKey,
    ) -> Result<(), TreeError> {
        if self.find_section(id).is_none() {
            return Err(TreeError::section_not_found(id));
        }
        if let Some(parent) = new_parent {
            if self.find_section(parent).is_none() {
                return Err(TreeError::section_not_found(parent));
            }
            if self.is_descendant(parent, id) {
                return Err(TreeError::CyclicMove {
                    section: id.clone(),
                    new_parent: parent.clone(),
                });
            }
        }
        let siblings = self.children_of(new_parent).unwrap_or_default();
        reject_collision(siblings.iter().filter(|s| s.id != *id).map(|s| s.order_key), key)?;

        let mut section = self.take_section(id).ok_or_else(|| TreeError::section_not_found(id))?;
        section.parent_id = new_parent.cloned();
        section.order_key = key;
        let siblings = self.siblings_mut(new_parent)?;
        insert_sorted(siblings, section, |s| s.order_key);
        Ok(())
    }

    /// Give a section a new key within its current sibling list
    ///
    /// # Errors
    /// `NotFound` or `OrderCollision`
    pub fn reorder_section(&self, id: &SectionId, key: OrderKey) -> Result<Self, TreeError> {
        let parent = self
            .find_section(id)
            .ok_or_else(|| TreeError::section_not_found(id))?
            .parent_id
            .clone();
        // Orphans sit at root level even though their parent id is set
        let parent = parent.filter(|p| self.find_section(p).is_some());
        let mut next = self.clone();
        let siblings = next.siblings_mut(parent.as_ref())?;
        let pos = siblings
            .iter()
            .position(|s| s.id == *id)
            .ok_or_else(|| TreeError::section_not_found(id))?;
        reject_collision(siblings.iter().filter(|s| s.id != *id).map(|s| s.order_key), key)?;
        let mut section = siblings.remove(pos);
        section.order_key = key;
        insert_sorted(siblings, section, |s| s.order_key);
        Ok(next)
    }

    /// Change a section title
    ///
    /// # Errors
    /// `NotFound` if the section is missing
    pub fn rename_section(
        &self,
        id: &SectionId,
        title: impl Into<String>,
    ) -> Result<Self, TreeError> {
        let title = title.into();
        self.with_section(id, |s| s.title = title)
    }

    /// Set integrated prose and its timestamp
    ///
    /// # Errors
    /// `NotFound` if the section is missing
    pub fn set_section_content(
        &self,
        id: &SectionId,
        content: Option<String>,
        integrated_at: Option<DateTime<Utc>>,
    ) -> Result<Self, TreeError> {
        self.with_section(id, |s| {
            s.content = content;
            s.last_integrated_at = integrated_at;
        })
    }

    /// Drop every task of a section (children keep theirs)
    ///
    /// # Errors
    /// `NotFound` if the section is missing
    pub fn clear_tasks(&self, id: &SectionId) -> Result<Self, TreeError> {
        self.with_section(id, |s| s.tasks.clear())
    }

    /// Drop every child section (and their subtrees)
    ///
    /// # Errors
    /// `NotFound` if the section is missing
    pub fn clear_children(&self, id: &SectionId) -> Result<Self, TreeError> {
        self.with_section(id, |s| s.children.clear())
    }

    /// Drop every section; unassigned tasks stay
    #[must_use]
    pub fn clear_sections(&self) -> Self {
        Self {
            roots: Vec::new(),
            unassigned: self.unassigned.clone(),
        }
    }

    /// Change a task's text
    ///
    /// # Errors
    /// `NotFound` if the task is missing
    pub fn rename_task(&self, id: &TaskId, text: impl Into<String>) -> Result<Self, TreeError> {
        let text = text.into();
        self.with_task(id, |t| t.text = text)
    }

    /// Change a task's status
    ///
    /// # Errors
    /// `NotFound` if the task is missing
    pub fn set_task_status(&self, id: &TaskId, status: TaskStatus) -> Result<Self, TreeError> {
        self.with_task(id, |t| t.status = status)
    }

    /// Replace (or clear) a task's current generated content
    ///
    /// # Errors
    /// `NotFound` if the task is missing
    pub fn set_task_content(
        &self,
        id: &TaskId,
        content: Option<GeneratedContent>,
    ) -> Result<Self, TreeError> {
        self.with_task(id, |t| t.generated_content = content)
    }

    /// Evenly re-space a section's task keys in current order
    ///
    /// Returns the new snapshot with the `(task, key)` pairs to persist.
    ///
    /// # Errors
    /// `NotFound` if the section is missing
    pub fn renumber_tasks(
        &self,
        id: &SectionId,
        alloc: &OrderingAllocator,
    ) -> Result<(Self, Vec<(TaskId, OrderKey)>), TreeError> {
        let mut next = self.clone();
        let section = next
            .find_section_mut(id)
            .ok_or_else(|| TreeError::section_not_found(id))?;
        let keys = alloc.renumber(section.tasks.len());
        let changes = section
            .tasks
            .iter_mut()
            .zip(keys)
            .map(|(task, key)| {
                task.order_key = key;
                (task.id.clone(), key)
            })
            .collect();
        Ok((next, changes))
    }

    /// Evenly re-space the sections under `parent` in current order
    ///
    /// # Errors
    /// `NotFound` if `parent` is missing
    pub fn renumber_children(
        &self,
        parent: Option<&SectionId>,
        alloc: &OrderingAllocator,
    ) -> Result<(Self, Vec<(SectionId, OrderKey)>), TreeError> {
        let mut next = self.clone();
        let siblings = next.siblings_mut(parent)?;
        let changes = renumber_sections(siblings, alloc);
        Ok((next, changes))
    }

    /// Sort a section's children by leading Chinese numeral, then re-space
    ///
    /// Unnumbered children keep their relative order after numbered ones.
    ///
    /// # Errors
    /// `NotFound` if the section is missing
    pub fn sort_children_by_ordinal(
        &self,
        id: &SectionId,
        alloc: &OrderingAllocator,
    ) -> Result<(Self, Vec<(SectionId, OrderKey)>), TreeError> {
        let mut next = self.clone();
        let section = next
            .find_section_mut(id)
            .ok_or_else(|| TreeError::section_not_found(id))?;
        section.children.sort_by(|a, b| compare_titles(&a.title, &b.title));
        let changes = renumber_sections(&mut section.children, alloc);
        Ok((next, changes))
    }

    fn with_section(
        &self,
        id: &SectionId,
        f: impl FnOnce(&mut Section),
    ) -> Result<Self, TreeError> {
        let mut next = self.clone();
        let section = next
            .find_section_mut(id)
            .ok_or_else(|| TreeError::section_not_found(id))?;
        f(section);
        Ok(next)
    }

    fn with_task(&self, id: &TaskId, f: impl FnOnce(&mut Task)) -> Result<Self, TreeError> {
        let mut next = self.clone();
        let task = next
            .find_task_mut(id)
            .ok_or_else(|| TreeError::NotFound(id.clone().into()))?;
        f(task);
        Ok(next)
    }
}
