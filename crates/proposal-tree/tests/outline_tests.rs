use pretty_assertions::assert_eq;
use proposal_tree::prelude::*;
use proposal_tree::{OrderError, SectionRow, TaskRow};
use proptest::prelude::*;

fn key(v: f64) -> OrderKey {
    OrderKey::new(v)
}

/// Chain of `depth` nested sections `s0 > s1 > ...`, each with one task,
/// plus a sibling root `side` with one task.
fn chain(depth: usize) -> Outline {
    let mut inner: Option<Section> = None;
    for level in (0..depth).rev() {
        let id = SectionId::from(format!("s{level}"));
        let mut section = Section::with_id(id.clone(), format!("Level {level}"), None, key(0.0))
            .with_task(Task::with_id(TaskId::from(format!("t{level}")), id, "task", key(0.0)));
        if let Some(child) = inner.take() {
            section = section.with_child(child);
        }
        inner = Some(section);
    }
    let side = Section::with_id(SectionId::from("side"), "Side", None, key(1000.0))
        .with_task(Task::with_id(
            TaskId::from("side-task"),
            SectionId::from("side"),
            "x",
            key(0.0),
        ));
    Outline::from_roots(inner.into_iter().chain(std::iter::once(side)).collect())
}

#[test]
fn deleting_grandchild_task_leaves_siblings_untouched() {
    let a = SectionId::from("a");
    let a1 = SectionId::from("a1");
    let a2 = SectionId::from("a2");
    let g = SectionId::from("g");
    let grandchild = Section::with_id(g.clone(), "Grandchild", None, key(0.0))
        .with_task(Task::with_id(TaskId::from("gt1"), g.clone(), "target", key(0.0)))
        .with_task(Task::with_id(TaskId::from("gt2"), g.clone(), "keep", key(1000.0)));
    let outline = Outline::from_roots(vec![Section::with_id(a.clone(), "A", None, key(0.0))
        .with_child(
            Section::with_id(a1.clone(), "A1", None, key(0.0))
                .with_task(Task::with_id(TaskId::from("a1t"), a1.clone(), "a1 task", key(0.0)))
                .with_child(grandchild),
        )
        .with_child(
            Section::with_id(a2.clone(), "A2", None, key(1000.0))
                .with_task(Task::with_id(TaskId::from("a2t"), a2.clone(), "a2 task", key(0.0))),
        )]);

    let next = outline.remove_task(&TaskId::from("gt1"));

    let remaining: Vec<_> =
        next.find_section(&g).unwrap().tasks.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(remaining, vec!["gt2"]);
    assert_eq!(next.find_section(&a1).unwrap().tasks, outline.find_section(&a1).unwrap().tasks);
    assert_eq!(next.find_section(&a2), outline.find_section(&a2));
}

#[test]
fn realtime_merge_and_refetch_agree() {
    let rows = OutlineRows {
        sections: vec![
            SectionRow {
                id: SectionId::from("intro"),
                project_id: ProjectId::from("p"),
                title: "Intro".to_string(),
                parent_id: None,
                order_key: key(0.0),
                content: None,
                last_integrated_at: None,
            },
            SectionRow {
                id: SectionId::from("scope"),
                project_id: ProjectId::from("p"),
                title: "Scope".to_string(),
                parent_id: Some(SectionId::from("intro")),
                order_key: key(0.0),
                content: None,
                last_integrated_at: None,
            },
        ],
        tasks: vec![TaskRow {
            id: TaskId::from("t"),
            section_id: SectionId::from("scope"),
            text: "Define scope".to_string(),
            status: TaskStatus::Pending,
            order_key: key(0.0),
        }],
        ..OutlineRows::default()
    };

    let fetched = Outline::from_rows(rows.clone());
    let pushed = rows
        .tasks
        .iter()
        .cloned()
        .map(RowChange::TaskUpserted)
        .chain(rows.sections.iter().cloned().map(RowChange::SectionUpserted))
        .fold(Outline::new(), |outline, change| outline.apply_change(change));

    assert_eq!(fetched, pushed);
}

proptest! {
    #[test]
    fn prop_reparent_under_descendant_is_rejected(depth in 2usize..8, pick in 0usize..64) {
        let outline = chain(depth);
        let ancestor = pick % depth;
        let descendant = ancestor + (pick / depth) % (depth - ancestor);
        let result = outline.reparent_section(
            &SectionId::from(format!("s{ancestor}")),
            Some(&SectionId::from(format!("s{descendant}"))),
            key(12345.0),
        );
        let is_cyclic = matches!(result, Err(TreeError::CyclicMove { .. }));
        prop_assert!(is_cyclic);
    }

    #[test]
    fn prop_moves_keep_sibling_keys_strictly_ordered(
        moves in proptest::collection::vec((0usize..6, 0usize..3, 0usize..8), 1..40)
    ) {
        let alloc = OrderingAllocator::new();
        let ids = ["a", "b", "c"];
        let mut outline = Outline::new();
        for (i, id) in ids.iter().enumerate() {
            let section = Section::with_id(SectionId::from(*id), *id, None, key(i as f64 * 1000.0));
            outline = outline.insert_section(None, section).unwrap();
        }
        for n in 0..6 {
            let section = SectionId::from(ids[n % 3]);
            let last = outline.find_section(&section).unwrap().task_keys();
            let next_key = alloc.after_last(&last).unwrap();
            let task = Task::with_id(TaskId::from(format!("t{n}")), section, "t", next_key);
            outline = outline.insert_task(task).unwrap();
        }

        for (task, target, slot) in moves {
            let task = TaskId::from(format!("t{task}"));
            let target = SectionId::from(ids[target]);
            let keys: Vec<OrderKey> = outline
                .find_section(&target)
                .unwrap()
                .tasks
                .iter()
                .filter(|t| t.id != task)
                .map(|t| t.order_key)
                .collect();
            let at = slot % (keys.len() + 1);
            let prev = at.checked_sub(1).map(|i| keys[i]);
            let next = keys.get(at).copied();
            let new_key = match alloc.between(prev, next) {
                Ok(k) => k,
                Err(OrderError::Exhausted { .. }) => {
                    let (renumbered, _) = outline.renumber_tasks(&target, &alloc).unwrap();
                    outline = renumbered;
                    continue;
                }
                Err(other) => panic!("unexpected error: {other}"),
            };
            outline = outline.move_task(&task, &target, new_key).unwrap();
            for section in outline.sections() {
                prop_assert!(section.task_keys().windows(2).all(|w| w[0] < w[1]));
                prop_assert!(section.tasks.iter().all(|t| t.section_id == section.id));
            }
        }
    }
}
