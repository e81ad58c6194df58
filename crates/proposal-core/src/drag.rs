//! Drag-and-drop resolution
//!
//! Turns a drop event into one concrete change against the current
//! snapshot. Resolution is pure; the editor applies the result.
//!
//! Placement rules for a task dropped on another task:
//! - same section, moving down: after the target
//! - same section, moving up: before the target
//! - different section: before the target
//!
//! Dropping on a section header or an empty-section placeholder appends.
//! Sections only reorder among siblings.

use proposal_tree::{
    OrderError, OrderKey, OrderingAllocator, Outline, Section, SectionId, Task, TaskId,
    TaskLocation,
};
use tracing::trace;

/// What is being dragged
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragSource {
    /// A task row
    Task(TaskId),
    /// A section header
    Section(SectionId),
}

/// What it was dropped on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropTarget {
    /// Another task row
    Task(TaskId),
    /// A section header
    Section(SectionId),
    /// Placeholder shown inside a section with no tasks
    EmptySection(SectionId),
}

/// Drag-end event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragEvent {
    /// Dragged node
    pub source: DragSource,
    /// Drop target; `None` when released outside any target
    pub target: Option<DropTarget>,
}

impl DragEvent {
    /// Task dropped on `target`
    #[must_use]
    pub fn task(id: TaskId, target: DropTarget) -> Self {
        Self {
            source: DragSource::Task(id),
            target: Some(target),
        }
    }

    /// Section dropped on another section
    #[must_use]
    pub fn section(id: SectionId, target: SectionId) -> Self {
        Self {
            source: DragSource::Section(id),
            target: Some(DropTarget::Section(target)),
        }
    }
}

/// Why a drop changes nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoopReason {
    /// Released outside any target
    NoTarget,
    /// Dropped on itself
    DroppedOnSelf,
    /// Dragged node is no longer in the snapshot
    SourceMissing,
    /// Target is no longer in the snapshot
    TargetMissing,
    /// Section dropped on a section with a different parent
    CrossParentSection,
    /// Section dropped on a task row
    UnsupportedTarget,
    /// Resulting position equals the current one
    AlreadyInPlace,
}

/// Sibling list whose keys must be re-spaced before a drop can land
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenumberScope {
    /// Tasks of a section
    Tasks(SectionId),
    /// Sections under a parent (roots when `None`)
    Sections(Option<SectionId>),
}

/// Outcome of resolving a drop
#[derive(Debug, Clone, PartialEq)]
pub enum DragResolution {
    /// Place a task in `section` at `key`
    MoveTask {
        /// Dragged task
        task: TaskId,
        /// Destination section
        section: SectionId,
        /// New order key
        key: OrderKey,
        /// Whether the task leaves its current section
        cross_section: bool,
    },
    /// Give a section a new key among its siblings
    ReorderSection {
        /// Dragged section
        section: SectionId,
        /// New order key
        key: OrderKey,
    },
    /// Key space exhausted; renumber and resolve again
    NeedsRenumber(RenumberScope),
    /// Nothing to do
    Noop(NoopReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Before,
    After,
}

type Slot = (Option<OrderKey>, Option<OrderKey>);

/// Neighbour keys at the end of the list, with the dragged node left out
fn slot_at_end<T>(
    items: &[T],
    is_source: impl Fn(&T) -> bool,
    key: impl Fn(&T) -> OrderKey,
) -> Slot {
    (items.iter().filter(|item| !is_source(item)).last().map(key), None)
}

/// Neighbour keys beside the target, with the dragged node left out
fn slot_beside<T>(
    items: &[T],
    is_source: impl Fn(&T) -> bool,
    is_target: impl Fn(&T) -> bool,
    side: Side,
    key: impl Fn(&T) -> OrderKey,
) -> Option<Slot> {
    let rest: Vec<&T> = items.iter().filter(|item| !is_source(item)).collect();
    let at = rest.iter().position(|item| is_target(item))?;
    Some(match side {
        Side::Before => (at.checked_sub(1).map(|i| key(rest[i])), Some(key(rest[at]))),
        Side::After => (Some(key(rest[at])), rest.get(at + 1).map(|item| key(item))),
    })
}

fn already_between(current: OrderKey, prev: Option<OrderKey>, next: Option<OrderKey>) -> bool {
    prev.map_or(true, |p| p < current) && next.map_or(true, |n| current < n)
}

/// Resolves drops against a snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct DragReorderCoordinator {
    alloc: OrderingAllocator,
}

impl DragReorderCoordinator {
    /// Coordinator allocating keys with `alloc`
    #[must_use]
    pub fn new(alloc: OrderingAllocator) -> Self {
        Self { alloc }
    }

    /// Resolve a drag-end event
    #[must_use]
    pub fn resolve(&self, event: &DragEvent, outline: &Outline) -> DragResolution {
        let Some(target) = &event.target else {
            return DragResolution::Noop(NoopReason::NoTarget);
        };
        let resolution = match &event.source {
            DragSource::Task(task) => self.resolve_task(task, target, outline),
            DragSource::Section(section) => match target {
                DropTarget::Section(other) => self.resolve_section(section, other, outline),
                DropTarget::Task(_) | DropTarget::EmptySection(_) => {
                    DragResolution::Noop(NoopReason::UnsupportedTarget)
                }
            },
        };
        trace!(?event, ?resolution, "drop resolved");
        resolution
    }

    fn resolve_task(&self, id: &TaskId, target: &DropTarget, outline: &Outline) -> DragResolution {
        let (Some(task), Some(location)) = (outline.find_task(id), outline.task_location(id)) else {
            return DragResolution::Noop(NoopReason::SourceMissing);
        };
        let from = match location {
            TaskLocation::Section(section) => Some(section),
            TaskLocation::Unassigned => None,
        };

        let (section_id, target_task) = match target {
            DropTarget::Task(other) if other == id => {
                return DragResolution::Noop(NoopReason::DroppedOnSelf)
            }
            DropTarget::Task(other) => match outline.task_location(other) {
                Some(TaskLocation::Section(section)) => (section, Some(other)),
                _ => return DragResolution::Noop(NoopReason::TargetMissing),
            },
            DropTarget::Section(section) | DropTarget::EmptySection(section) => {
                (section.clone(), None)
            }
        };
        let Some(section) = outline.find_section(&section_id) else {
            return DragResolution::Noop(NoopReason::TargetMissing);
        };
        let same_section = from.as_ref() == Some(&section_id);

        let side = match target_task {
            Some(other) if same_section => {
                let index = |tid: &TaskId| section.tasks.iter().position(|t| t.id == *tid);
                if index(id) < index(other) {
                    Side::After
                } else {
                    Side::Before
                }
            }
            _ => Side::Before,
        };
        let is_source = |t: &Task| t.id == *id;
        let slot = match target_task {
            Some(other) => slot_beside(
                &section.tasks,
                is_source,
                |t| t.id == *other,
                side,
                |t| t.order_key,
            ),
            None => Some(slot_at_end(&section.tasks, is_source, |t| t.order_key)),
        };
        let Some((prev, next)) = slot else {
            return DragResolution::Noop(NoopReason::TargetMissing);
        };

        if same_section && already_between(task.order_key, prev, next) {
            return DragResolution::Noop(NoopReason::AlreadyInPlace);
        }
        match self.alloc.between(prev, next) {
            Ok(key) => DragResolution::MoveTask {
                task: id.clone(),
                section: section_id,
                key,
                cross_section: !same_section,
            },
            Err(err) => self.exhausted(err, RenumberScope::Tasks(section_id)),
        }
    }

    fn resolve_section(
        &self,
        id: &SectionId,
        target: &SectionId,
        outline: &Outline,
    ) -> DragResolution {
        if id == target {
            return DragResolution::Noop(NoopReason::DroppedOnSelf);
        }
        let Some(source) = outline.find_section(id) else {
            return DragResolution::Noop(NoopReason::SourceMissing);
        };
        let Some(other) = outline.find_section(target) else {
            return DragResolution::Noop(NoopReason::TargetMissing);
        };
        let parent = effective_parent(outline, source);
        if parent != effective_parent(outline, other) {
            return DragResolution::Noop(NoopReason::CrossParentSection);
        }
        let siblings = outline.children_of(parent.as_ref()).unwrap_or_default();
        let index = |sid: &SectionId| siblings.iter().position(|s| s.id == *sid);
        let side = if index(id) < index(target) {
            Side::After
        } else {
            Side::Before
        };
        let Some((prev, next)) = slot_beside(
            siblings,
            |s| s.id == *id,
            |s| s.id == *target,
            side,
            |s| s.order_key,
        ) else {
            return DragResolution::Noop(NoopReason::TargetMissing);
        };
        if already_between(source.order_key, prev, next) {
            return DragResolution::Noop(NoopReason::AlreadyInPlace);
        }
        match self.alloc.between(prev, next) {
            Ok(key) => DragResolution::ReorderSection {
                section: id.clone(),
                key,
            },
            Err(err) => self.exhausted(err, RenumberScope::Sections(parent)),
        }
    }

    fn exhausted(&self, err: OrderError, scope: RenumberScope) -> DragResolution {
        trace!(%err, spacing = self.alloc.spacing(), "key space exhausted");
        DragResolution::NeedsRenumber(scope)
    }
}

/// Parent whose child list actually holds `section` (orphans sit at root)
fn effective_parent(outline: &Outline, section: &Section) -> Option<SectionId> {
    section
        .parent_id
        .clone()
        .filter(|p| outline.find_section(p).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(v: f64) -> OrderKey {
        OrderKey::new(v)
    }

    fn section(id: &str, tasks: &[(&str, f64)]) -> Section {
        tasks.iter().fold(
            Section::with_id(SectionId::from(id), id, None, OrderKey::ZERO),
            |s, (tid, k)| {
                s.with_task(Task::with_id(TaskId::from(*tid), SectionId::from(id), *tid, key(*k)))
            },
        )
    }

    fn outline() -> Outline {
        let mut a = section("A", &[("t1", 0.0), ("t2", 1000.0), ("t3", 2000.0)]);
        a.order_key = key(0.0);
        let mut b = section("B", &[("u1", 0.0), ("u2", 1000.0)]);
        b.order_key = key(1000.0);
        let mut c = section("C", &[]);
        c.order_key = key(2000.0);
        Outline::from_roots(vec![a, b, c])
    }

    fn coordinator() -> DragReorderCoordinator {
        DragReorderCoordinator::default()
    }

    #[test]
    fn moving_down_lands_after_target() {
        let event = DragEvent::task(TaskId::from("t1"), DropTarget::Task(TaskId::from("t2")));
        assert_eq!(
            coordinator().resolve(&event, &outline()),
            DragResolution::MoveTask {
                task: TaskId::from("t1"),
                section: SectionId::from("A"),
                key: key(1500.0),
                cross_section: false,
            }
        );
    }

    #[test]
    fn moving_down_past_last_appends() {
        let two = Outline::from_roots(vec![section("A", &[("t1", 0.0), ("t2", 1000.0)])]);
        let event = DragEvent::task(TaskId::from("t1"), DropTarget::Task(TaskId::from("t2")));
        let DragResolution::MoveTask { key: k, .. } = coordinator().resolve(&event, &two) else {
            panic!("expected a move");
        };
        assert_eq!(k, key(2000.0));
    }

    #[test]
    fn moving_up_lands_before_target() {
        let event = DragEvent::task(TaskId::from("t3"), DropTarget::Task(TaskId::from("t1")));
        let DragResolution::MoveTask { key: k, .. } = coordinator().resolve(&event, &outline())
        else {
            panic!("expected a move");
        };
        assert_eq!(k, key(-1000.0));
    }

    #[test]
    fn cross_section_lands_before_target() {
        let event = DragEvent::task(TaskId::from("t2"), DropTarget::Task(TaskId::from("u2")));
        assert_eq!(
            coordinator().resolve(&event, &outline()),
            DragResolution::MoveTask {
                task: TaskId::from("t2"),
                section: SectionId::from("B"),
                key: key(500.0),
                cross_section: true,
            }
        );
    }

    #[test]
    fn empty_section_placeholder_starts_at_zero() {
        let event =
            DragEvent::task(TaskId::from("t2"), DropTarget::EmptySection(SectionId::from("C")));
        let DragResolution::MoveTask {
            key: k,
            cross_section,
            ..
        } = coordinator().resolve(&event, &outline())
        else {
            panic!("expected a move");
        };
        assert_eq!(k, OrderKey::ZERO);
        assert!(cross_section);
    }

    #[test]
    fn noops() {
        let o = outline();
        let c = coordinator();
        let none = DragEvent {
            source: DragSource::Task(TaskId::from("t1")),
            target: None,
        };
        assert_eq!(c.resolve(&none, &o), DragResolution::Noop(NoopReason::NoTarget));
        let on_self = DragEvent::task(TaskId::from("t1"), DropTarget::Task(TaskId::from("t1")));
        assert_eq!(c.resolve(&on_self, &o), DragResolution::Noop(NoopReason::DroppedOnSelf));
        let gone = DragEvent::task(TaskId::from("zz"), DropTarget::Task(TaskId::from("t1")));
        assert_eq!(c.resolve(&gone, &o), DragResolution::Noop(NoopReason::SourceMissing));
        let last_on_header =
            DragEvent::task(TaskId::from("t3"), DropTarget::Section(SectionId::from("A")));
        assert_eq!(
            c.resolve(&last_on_header, &o),
            DragResolution::Noop(NoopReason::AlreadyInPlace)
        );
    }

    #[test]
    fn tight_gap_needs_renumber() {
        let tight = Outline::from_roots(vec![section(
            "A",
            &[("t1", 0.0), ("t2", 1e-12), ("t3", 2e-12)],
        )]);
        let event = DragEvent::task(TaskId::from("t3"), DropTarget::Task(TaskId::from("t2")));
        assert_eq!(
            coordinator().resolve(&event, &tight),
            DragResolution::NeedsRenumber(RenumberScope::Tasks(SectionId::from("A")))
        );
    }

    #[test]
    fn sections_reorder_among_siblings_only() {
        let o = outline();
        let down = DragEvent::section(SectionId::from("A"), SectionId::from("B"));
        assert_eq!(
            coordinator().resolve(&down, &o),
            DragResolution::ReorderSection {
                section: SectionId::from("A"),
                key: key(1500.0),
            }
        );

        let child = Section::with_id(SectionId::from("A1"), "A1", None, OrderKey::ZERO);
        let nested = o
            .insert_section(Some(&SectionId::from("A")), child)
            .unwrap();
        let across = DragEvent::section(SectionId::from("A1"), SectionId::from("B"));
        assert_eq!(
            coordinator().resolve(&across, &nested),
            DragResolution::Noop(NoopReason::CrossParentSection)
        );
    }
}
