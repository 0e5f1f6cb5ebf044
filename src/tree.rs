//! Lesson tree state machine
//!
//! A two-level catalog (chapters → lessons). Topology only changes through a
//! full reload; live events may patch status fields and nothing else.
//! Exactly zero or one lesson across the whole tree is selected.

#[cfg(test)]
mod proptests;

use crate::protocol::StatusUpdate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Progress state of a lesson or chapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "&'static str")]
pub enum LessonStatus {
    #[default]
    Locked,
    NotStarted,
    PrepareLearning,
    Learning,
    Completed,
}

impl LessonStatus {
    /// Accepts `prepare_learning`, `prepare-learning`, `PREPARE_LEARNING`, ...
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "locked" => Some(LessonStatus::Locked),
            "not_started" => Some(LessonStatus::NotStarted),
            "prepare_learning" => Some(LessonStatus::PrepareLearning),
            "learning" => Some(LessonStatus::Learning),
            "completed" => Some(LessonStatus::Completed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LessonStatus::Locked => "locked",
            LessonStatus::NotStarted => "not_started",
            LessonStatus::PrepareLearning => "prepare_learning",
            LessonStatus::Learning => "learning",
            LessonStatus::Completed => "completed",
        }
    }

    pub fn can_learn(self) -> bool {
        matches!(
            self,
            LessonStatus::Learning | LessonStatus::Completed | LessonStatus::PrepareLearning
        )
    }
}

impl fmt::Display for LessonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog decoding is lenient: an unknown status locks the node instead of
/// failing the whole tree
impl From<String> for LessonStatus {
    fn from(value: String) -> Self {
        LessonStatus::parse(&value).unwrap_or_else(|| {
            tracing::warn!(status = %value, "Unknown lesson status, treating as locked");
            LessonStatus::Locked
        })
    }
}

impl From<LessonStatus> for &'static str {
    fn from(status: LessonStatus) -> Self {
        status.as_str()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("Unknown lesson: {0}")]
    UnknownLesson(String),
    #[error("Unknown chapter: {0}")]
    UnknownChapter(String),
}

// ============================================================================
// Wire shape returned by the catalog
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TreeData {
    #[serde(default, alias = "catalogs")]
    pub chapters: Vec<ChapterData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterData {
    #[serde(alias = "chapter_id", alias = "lesson_id")]
    pub id: String,
    #[serde(default, alias = "lesson_name")]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub status_value: LessonStatus,
    #[serde(default)]
    pub lessons: Vec<LessonData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonData {
    #[serde(alias = "lesson_id")]
    pub id: String,
    #[serde(default, alias = "lesson_name")]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub status_value: LessonStatus,
}

// ============================================================================
// Tree
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lesson {
    pub id: String,
    pub name: String,
    pub status: String,
    pub status_value: LessonStatus,
    pub selected: bool,
}

impl Lesson {
    pub fn can_learn(&self) -> bool {
        self.status_value.can_learn()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub id: String,
    pub name: String,
    pub status: String,
    pub status_value: LessonStatus,
    pub collapsed: bool,
    pub lessons: Vec<Lesson>,
}

impl Chapter {
    pub fn can_learn(&self) -> bool {
        self.status_value.can_learn()
    }

    pub fn lesson(&self, lesson_id: &str) -> Option<&Lesson> {
        self.lessons.iter().find(|l| l.id == lesson_id)
    }
}

/// The whole course catalog
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LessonTree {
    chapters: Vec<Chapter>,
}

impl LessonTree {
    /// Build a fresh tree and apply the initial-selection rule
    pub fn from_data(data: TreeData) -> Self {
        let chapters = data
            .chapters
            .into_iter()
            .map(|chapter| Chapter {
                id: chapter.id,
                name: chapter.name,
                status: chapter.status,
                status_value: chapter.status_value,
                collapsed: false,
                lessons: chapter
                    .lessons
                    .into_iter()
                    .map(|lesson| Lesson {
                        id: lesson.id,
                        name: lesson.name,
                        status: lesson.status,
                        status_value: lesson.status_value,
                        selected: false,
                    })
                    .collect(),
            })
            .collect();

        let mut tree = Self { chapters };
        if let Some(id) = tree.initial_selection() {
            tree.mark_selected(&id);
        }
        tree
    }

    /// Replace topology while carrying over selection and collapse state
    pub fn reload(&mut self, data: TreeData) {
        let previous_selection = self.selected_id().map(str::to_string);
        let collapsed: HashSet<String> = self
            .chapters
            .iter()
            .filter(|c| c.collapsed)
            .map(|c| c.id.clone())
            .collect();

        let mut next = Self::from_data(data);
        for chapter in &mut next.chapters {
            chapter.collapsed = collapsed.contains(&chapter.id);
        }

        if let Some(id) = previous_selection {
            if next.lesson(&id).is_some() {
                next.mark_selected(&id);
            }
        }

        tracing::debug!(
            chapters = next.chapter_count(),
            lessons = next.lesson_count(),
            selected = ?next.selected_id(),
            "Lesson tree reloaded"
        );
        *self = next;
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    pub fn chapter_count(&self) -> usize {
        self.chapters.len()
    }

    pub fn lesson_count(&self) -> usize {
        self.chapters.iter().map(|c| c.lessons.len()).sum()
    }

    pub fn chapter(&self, chapter_id: &str) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.id == chapter_id)
    }

    pub fn lesson(&self, lesson_id: &str) -> Option<&Lesson> {
        self.lessons().find(|l| l.id == lesson_id)
    }

    pub fn lessons(&self) -> impl Iterator<Item = &Lesson> {
        self.chapters.iter().flat_map(|c| c.lessons.iter())
    }

    /// Chapter that contains the given lesson
    pub fn chapter_of(&self, lesson_id: &str) -> Option<&Chapter> {
        self.chapters
            .iter()
            .find(|c| c.lessons.iter().any(|l| l.id == lesson_id))
    }

    pub fn selected(&self) -> Option<&Lesson> {
        self.lessons().find(|l| l.selected)
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected().map(|l| l.id.as_str())
    }

    /// User click: moves the selection, never touches status
    pub fn select(&mut self, lesson_id: &str) -> Result<(), TreeError> {
        if self.lesson(lesson_id).is_none() {
            return Err(TreeError::UnknownLesson(lesson_id.to_string()));
        }
        self.mark_selected(lesson_id);
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        for lesson in self.chapters.iter_mut().flat_map(|c| c.lessons.iter_mut()) {
            lesson.selected = false;
        }
    }

    pub fn toggle_collapsed(&mut self, chapter_id: &str) -> Result<bool, TreeError> {
        let chapter = self
            .chapters
            .iter_mut()
            .find(|c| c.id == chapter_id)
            .ok_or_else(|| TreeError::UnknownChapter(chapter_id.to_string()))?;
        chapter.collapsed = !chapter.collapsed;
        Ok(chapter.collapsed)
    }

    pub fn apply_lesson_update(&mut self, update: &StatusUpdate) -> Result<(), TreeError> {
        let lesson = self
            .chapters
            .iter_mut()
            .flat_map(|c| c.lessons.iter_mut())
            .find(|l| l.id == update.id)
            .ok_or_else(|| TreeError::UnknownLesson(update.id.clone()))?;
        lesson.status.clone_from(&update.status);
        lesson.status_value = update.status_value;
        Ok(())
    }

    pub fn apply_chapter_update(&mut self, update: &StatusUpdate) -> Result<(), TreeError> {
        let chapter = self
            .chapters
            .iter_mut()
            .find(|c| c.id == update.id)
            .ok_or_else(|| TreeError::UnknownChapter(update.id.clone()))?;
        chapter.status.clone_from(&update.status);
        chapter.status_value = update.status_value;
        Ok(())
    }

    /// Learning chapter first, then prepare-learning; within the chapter the
    /// first lesson that is learning or prepare-learning
    pub fn initial_selection(&self) -> Option<String> {
        [LessonStatus::Learning, LessonStatus::PrepareLearning]
            .into_iter()
            .find_map(|wanted| {
                self.chapters
                    .iter()
                    .filter(|c| c.status_value == wanted)
                    .find_map(|c| {
                        c.lessons
                            .iter()
                            .find(|l| {
                                matches!(
                                    l.status_value,
                                    LessonStatus::Learning | LessonStatus::PrepareLearning
                                )
                            })
                            .map(|l| l.id.clone())
                    })
            })
    }

    /// Lesson to open when (re)starting a chapter
    pub fn entry_lesson(&self, chapter_id: &str) -> Option<String> {
        let chapter = self.chapter(chapter_id)?;
        if let Some(selected) = chapter.lessons.iter().find(|l| l.selected) {
            return Some(selected.id.clone());
        }
        chapter
            .lessons
            .iter()
            .find(|l| {
                matches!(
                    l.status_value,
                    LessonStatus::Learning | LessonStatus::PrepareLearning
                )
            })
            .or_else(|| chapter.lessons.iter().find(|l| l.can_learn()))
            .or_else(|| chapter.lessons.first())
            .map(|l| l.id.clone())
    }

    fn mark_selected(&mut self, lesson_id: &str) {
        for lesson in self.chapters.iter_mut().flat_map(|c| c.lessons.iter_mut()) {
            lesson.selected = lesson.id == lesson_id;
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn lesson(id: &str, status_value: LessonStatus) -> LessonData {
        LessonData {
            id: id.to_string(),
            name: format!("Lesson {id}"),
            status: status_value.as_str().to_string(),
            status_value,
        }
    }

    pub fn chapter(id: &str, status_value: LessonStatus, lessons: Vec<LessonData>) -> ChapterData {
        ChapterData {
            id: id.to_string(),
            name: format!("Chapter {id}"),
            status: status_value.as_str().to_string(),
            status_value,
            lessons,
        }
    }

    /// C1 completed (L1, L2), C2 learning (L3 completed, L4 learning), C3 locked (L5)
    pub fn course() -> TreeData {
        TreeData {
            chapters: vec![
                chapter(
                    "C1",
                    LessonStatus::Completed,
                    vec![
                        lesson("L1", LessonStatus::Completed),
                        lesson("L2", LessonStatus::Completed),
                    ],
                ),
                chapter(
                    "C2",
                    LessonStatus::Learning,
                    vec![
                        lesson("L3", LessonStatus::Completed),
                        lesson("L4", LessonStatus::Learning),
                    ],
                ),
                chapter("C3", LessonStatus::Locked, vec![lesson("L5", LessonStatus::Locked)]),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use serde_json::json;

    fn update(id: &str, status_value: LessonStatus) -> StatusUpdate {
        StatusUpdate {
            id: id.to_string(),
            status: status_value.as_str().to_string(),
            status_value,
        }
    }

    #[test]
    fn test_counts() {
        let tree = LessonTree::from_data(course());
        assert_eq!(tree.chapter_count(), 3);
        assert_eq!(tree.lesson_count(), 5);
    }

    #[test]
    fn test_initial_selection_prefers_learning_chapter() {
        let tree = LessonTree::from_data(course());
        assert_eq!(tree.selected_id(), Some("L4"));
    }

    #[test]
    fn test_initial_selection_falls_back_to_prepare_learning() {
        let data = TreeData {
            chapters: vec![
                chapter("C1", LessonStatus::Completed, vec![lesson("L1", LessonStatus::Completed)]),
                chapter(
                    "C2",
                    LessonStatus::PrepareLearning,
                    vec![
                        lesson("L2", LessonStatus::NotStarted),
                        lesson("L3", LessonStatus::PrepareLearning),
                    ],
                ),
            ],
        };
        let tree = LessonTree::from_data(data);
        assert_eq!(tree.selected_id(), Some("L3"));
    }

    #[test]
    fn test_initial_selection_can_be_empty() {
        let data = TreeData {
            chapters: vec![chapter(
                "C1",
                LessonStatus::Completed,
                vec![lesson("L1", LessonStatus::Completed)],
            )],
        };
        assert_eq!(LessonTree::from_data(data).selected_id(), None);
    }

    #[test]
    fn test_select_moves_selection_without_touching_status() {
        let mut tree = LessonTree::from_data(course());
        tree.select("L1").unwrap();
        assert_eq!(tree.selected_id(), Some("L1"));
        assert_eq!(tree.lessons().filter(|l| l.selected).count(), 1);
        assert_eq!(tree.lesson("L4").unwrap().status_value, LessonStatus::Learning);
    }

    #[test]
    fn test_select_unknown_lesson_is_rejected() {
        let mut tree = LessonTree::from_data(course());
        assert_eq!(
            tree.select("nope"),
            Err(TreeError::UnknownLesson("nope".to_string()))
        );
        assert_eq!(tree.selected_id(), Some("L4"));
    }

    #[test]
    fn test_can_learn_is_derived_from_status() {
        let mut tree = LessonTree::from_data(course());
        assert!(!tree.lesson("L5").unwrap().can_learn());
        tree.apply_lesson_update(&update("L5", LessonStatus::PrepareLearning))
            .unwrap();
        assert!(tree.lesson("L5").unwrap().can_learn());
    }

    #[test]
    fn test_unknown_updates_do_not_mutate() {
        let mut tree = LessonTree::from_data(course());
        let before = tree.clone();
        assert!(tree
            .apply_lesson_update(&update("ghost", LessonStatus::Completed))
            .is_err());
        assert!(tree
            .apply_chapter_update(&update("ghost", LessonStatus::Completed))
            .is_err());
        assert_eq!(tree, before);
    }

    #[test]
    fn test_reload_preserves_selection_and_collapse() {
        let mut tree = LessonTree::from_data(course());
        tree.select("L2").unwrap();
        assert!(tree.toggle_collapsed("C1").unwrap());

        tree.reload(course());
        assert_eq!(tree.selected_id(), Some("L2"));
        assert!(tree.chapter("C1").unwrap().collapsed);
        assert!(!tree.chapter("C2").unwrap().collapsed);
    }

    #[test]
    fn test_reload_falls_back_when_selection_disappears() {
        let mut tree = LessonTree::from_data(course());
        tree.select("L5").unwrap();
        let mut data = course();
        data.chapters.pop();
        tree.reload(data);
        assert_eq!(tree.selected_id(), Some("L4"));
    }

    #[test]
    fn test_entry_lesson() {
        let tree = LessonTree::from_data(course());
        assert_eq!(tree.entry_lesson("C2").as_deref(), Some("L4"));
        assert_eq!(tree.entry_lesson("C1").as_deref(), Some("L1"));
        assert_eq!(tree.entry_lesson("C3").as_deref(), Some("L5"));
        assert_eq!(tree.entry_lesson("C9"), None);
    }

    #[test]
    fn test_tree_data_accepts_catalog_aliases() {
        let data: TreeData = serde_json::from_value(json!({
            "catalogs": [{
                "chapter_id": "C1",
                "lesson_name": "Intro",
                "status_value": "LEARNING",
                "lessons": [{"lesson_id": "L1", "status_value": "prepare-learning"}]
            }]
        }))
        .unwrap();
        let tree = LessonTree::from_data(data);
        assert_eq!(tree.chapter("C1").unwrap().name, "Intro");
        assert_eq!(
            tree.lesson("L1").unwrap().status_value,
            LessonStatus::PrepareLearning
        );
        assert_eq!(tree.selected_id(), Some("L1"));
    }

    #[test]
    fn test_unknown_catalog_status_locks_node() {
        let data: TreeData = serde_json::from_value(json!({
            "catalogs": [{
                "chapter_id": "C1",
                "status_value": "archived",
                "lessons": [
                    {"lesson_id": "L1", "status_value": "learning"},
                    {"lesson_id": "L2", "status_value": "paywalled"}
                ]
            }]
        }))
        .unwrap();
        let tree = LessonTree::from_data(data);
        assert_eq!(tree.chapter("C1").unwrap().status_value, LessonStatus::Locked);
        assert_eq!(tree.lesson("L1").unwrap().status_value, LessonStatus::Learning);
        assert_eq!(tree.lesson("L2").unwrap().status_value, LessonStatus::Locked);
        assert!(!tree.lesson("L2").unwrap().can_learn());
    }
}
