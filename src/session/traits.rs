//! Collaborator abstractions
//!
//! Everything the controller talks to besides the turn stream goes through
//! these traits so scenarios can run against in-memory mocks.

use crate::error::BackendError;
use crate::protocol::{AskQuota, EventRecord};
use crate::timeline::Role;
use crate::tree::TreeData;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Persisted conversation for one chapter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    #[serde(default)]
    pub records: Vec<TranscriptRecord>,
    /// Pending input at the point the transcript stops, as an event record
    #[serde(default)]
    pub ui: Option<EventRecord>,
    #[serde(default, alias = "teacherAvatarUrl")]
    pub teacher_avatar_url: Option<String>,
    #[serde(default, alias = "askUi")]
    pub ask_ui: Option<AskQuota>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub id: String,
    #[serde(alias = "lessonId")]
    pub lesson_id: String,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, alias = "interactionType")]
    pub interaction_type: Option<String>,
    #[serde(default, alias = "logId")]
    pub log_id: Option<String>,
}

/// Like / dislike on a completed teacher message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    Like,
    Dislike,
}

impl Feedback {
    /// Interaction type code understood by the feedback endpoint
    pub fn interaction_type(self) -> u8 {
        match self {
            Feedback::Like => 1,
            Feedback::Dislike => 2,
        }
    }
}

/// Transcript storage
#[async_trait]
pub trait HistoryClient: Send + Sync {
    async fn load_transcript(
        &self,
        chapter_id: &str,
        preview_mode: bool,
    ) -> Result<Transcript, BackendError>;

    /// Server-side progress reset for a chapter
    async fn reset_chapter(&self, chapter_id: &str) -> Result<(), BackendError>;
}

/// Course catalog
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Load the chapter/lesson tree, optionally scoped to one chapter
    async fn load_tree(
        &self,
        course_id: &str,
        chapter_id: Option<&str>,
    ) -> Result<TreeData, BackendError>;
}

#[async_trait]
pub trait FeedbackClient: Send + Sync {
    async fn annotate(&self, log_id: &str, feedback: Feedback) -> Result<(), BackendError>;
}

/// Session/auth and profile side of the account
#[async_trait]
pub trait AccountSink: Send + Sync {
    /// Persist a non-interactive login token
    async fn soft_login(&self, token: &str) -> Result<(), BackendError>;

    async fn update_profile(&self, key: &str, value: &Value) -> Result<(), BackendError>;
}

/// Combined collaborator trait for convenience
pub trait Backend: HistoryClient + CatalogClient + FeedbackClient + AccountSink {}
impl<T: HistoryClient + CatalogClient + FeedbackClient + AccountSink> Backend for T {}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: HistoryClient + ?Sized> HistoryClient for Arc<T> {
    async fn load_transcript(
        &self,
        chapter_id: &str,
        preview_mode: bool,
    ) -> Result<Transcript, BackendError> {
        (**self).load_transcript(chapter_id, preview_mode).await
    }

    async fn reset_chapter(&self, chapter_id: &str) -> Result<(), BackendError> {
        (**self).reset_chapter(chapter_id).await
    }
}

#[async_trait]
impl<T: CatalogClient + ?Sized> CatalogClient for Arc<T> {
    async fn load_tree(
        &self,
        course_id: &str,
        chapter_id: Option<&str>,
    ) -> Result<TreeData, BackendError> {
        (**self).load_tree(course_id, chapter_id).await
    }
}

#[async_trait]
impl<T: FeedbackClient + ?Sized> FeedbackClient for Arc<T> {
    async fn annotate(&self, log_id: &str, feedback: Feedback) -> Result<(), BackendError> {
        (**self).annotate(log_id, feedback).await
    }
}

#[async_trait]
impl<T: AccountSink + ?Sized> AccountSink for Arc<T> {
    async fn soft_login(&self, token: &str) -> Result<(), BackendError> {
        (**self).soft_login(token).await
    }

    async fn update_profile(&self, key: &str, value: &Value) -> Result<(), BackendError> {
        (**self).update_profile(key, value).await
    }
}
