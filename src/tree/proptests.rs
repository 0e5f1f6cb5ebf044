//! Property-based tests for the lesson tree
//!
//! - At most one lesson is ever selected
//! - A reload with identical topology keeps selection and collapse state
//! - Status patches never change topology

use super::*;
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

fn arb_status() -> impl Strategy<Value = LessonStatus> {
    prop_oneof![
        Just(LessonStatus::Locked),
        Just(LessonStatus::NotStarted),
        Just(LessonStatus::PrepareLearning),
        Just(LessonStatus::Learning),
        Just(LessonStatus::Completed),
    ]
}

/// Chapters `C0..Cn`, lessons `C{i}-L{j}` so ids are unique
fn arb_tree_data() -> impl Strategy<Value = TreeData> {
    proptest::collection::vec(
        (arb_status(), proptest::collection::vec(arb_status(), 0..4)),
        0..5,
    )
    .prop_map(|chapters| TreeData {
        chapters: chapters
            .into_iter()
            .enumerate()
            .map(|(i, (status_value, lessons))| ChapterData {
                id: format!("C{i}"),
                name: format!("Chapter {i}"),
                status: status_value.as_str().to_string(),
                status_value,
                lessons: lessons
                    .into_iter()
                    .enumerate()
                    .map(|(j, status_value)| LessonData {
                        id: format!("C{i}-L{j}"),
                        name: format!("Lesson {j}"),
                        status: status_value.as_str().to_string(),
                        status_value,
                    })
                    .collect(),
            })
            .collect(),
    })
}

#[derive(Debug, Clone)]
enum TreeOp {
    Select(String),
    Toggle(String),
    LessonUpdate(String, LessonStatus),
    ChapterUpdate(String, LessonStatus),
    Reload,
    ClearSelection,
}

fn arb_lesson_id() -> impl Strategy<Value = String> {
    (0usize..6, 0usize..5).prop_map(|(i, j)| format!("C{i}-L{j}"))
}

fn arb_chapter_id() -> impl Strategy<Value = String> {
    (0usize..6).prop_map(|i| format!("C{i}"))
}

fn arb_op() -> impl Strategy<Value = TreeOp> {
    prop_oneof![
        arb_lesson_id().prop_map(TreeOp::Select),
        arb_chapter_id().prop_map(TreeOp::Toggle),
        (arb_lesson_id(), arb_status()).prop_map(|(id, s)| TreeOp::LessonUpdate(id, s)),
        (arb_chapter_id(), arb_status()).prop_map(|(id, s)| TreeOp::ChapterUpdate(id, s)),
        Just(TreeOp::Reload),
        Just(TreeOp::ClearSelection),
    ]
}

fn selected_count(tree: &LessonTree) -> usize {
    tree.lessons().filter(|l| l.selected).count()
}

fn topology(tree: &LessonTree) -> Vec<(String, Vec<String>)> {
    tree.chapters()
        .iter()
        .map(|c| (c.id.clone(), c.lessons.iter().map(|l| l.id.clone()).collect()))
        .collect()
}

fn status_update(id: String, status_value: LessonStatus) -> StatusUpdate {
    StatusUpdate {
        id,
        status: status_value.as_str().to_string(),
        status_value,
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn prop_selection_is_unique(
        data in arb_tree_data(),
        reload_data in arb_tree_data(),
        ops in proptest::collection::vec(arb_op(), 0..30)
    ) {
        let mut tree = LessonTree::from_data(data);
        prop_assert!(selected_count(&tree) <= 1);

        for op in ops {
            match op {
                TreeOp::Select(id) => { let _ = tree.select(&id); }
                TreeOp::Toggle(id) => { let _ = tree.toggle_collapsed(&id); }
                TreeOp::LessonUpdate(id, s) => { let _ = tree.apply_lesson_update(&status_update(id, s)); }
                TreeOp::ChapterUpdate(id, s) => { let _ = tree.apply_chapter_update(&status_update(id, s)); }
                TreeOp::Reload => tree.reload(reload_data.clone()),
                TreeOp::ClearSelection => tree.clear_selection(),
            }
            prop_assert!(selected_count(&tree) <= 1, "multiple selections after {:?}", tree);
        }
    }

    #[test]
    fn prop_reload_same_topology_preserves_ui_state(
        data in arb_tree_data(),
        select in arb_lesson_id(),
        collapse in proptest::collection::vec(arb_chapter_id(), 0..4)
    ) {
        let mut tree = LessonTree::from_data(data.clone());
        let _ = tree.select(&select);
        for id in &collapse {
            let _ = tree.toggle_collapsed(id);
        }
        let selected_before = tree.selected_id().map(str::to_string);
        let collapsed_before: Vec<bool> = tree.chapters().iter().map(|c| c.collapsed).collect();

        tree.reload(data);

        prop_assert_eq!(tree.selected_id().map(str::to_string), selected_before);
        let collapsed_after: Vec<bool> = tree.chapters().iter().map(|c| c.collapsed).collect();
        prop_assert_eq!(collapsed_after, collapsed_before);
    }

    #[test]
    fn prop_status_patches_keep_topology(
        data in arb_tree_data(),
        updates in proptest::collection::vec((arb_lesson_id(), arb_status(), any::<bool>()), 0..20)
    ) {
        let mut tree = LessonTree::from_data(data);
        let before = topology(&tree);
        for (id, status, is_chapter) in updates {
            if is_chapter {
                let chapter_id = id.split('-').next().unwrap_or_default().to_string();
                let _ = tree.apply_chapter_update(&status_update(chapter_id, status));
            } else {
                let _ = tree.apply_lesson_update(&status_update(id, status));
            }
        }
        prop_assert_eq!(topology(&tree), before);
    }

    #[test]
    fn prop_can_learn_matches_status(data in arb_tree_data()) {
        let tree = LessonTree::from_data(data);
        for lesson in tree.lessons() {
            let expected = matches!(
                lesson.status_value,
                LessonStatus::Learning | LessonStatus::Completed | LessonStatus::PrepareLearning
            );
            prop_assert_eq!(lesson.can_learn(), expected);
        }
    }
}
