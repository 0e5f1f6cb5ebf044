//! Effects produced by the interpreter

use super::state::PendingInput;
use crate::protocol::{AskQuota, StatusUpdate};
use crate::timeline::MessageId;
use serde_json::Value;

/// Side effects to apply after interpreting one event
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Append a new open teacher message
    OpenMessage { id: MessageId, fragment: String },

    /// Extend the open message in place
    AppendFragment { id: MessageId, fragment: String },

    /// Close a streamed message
    CompleteMessage {
        id: MessageId,
        log_id: Option<String>,
    },

    /// Replace the pending input descriptor
    SetPendingInput(PendingInput),

    EnableInput,

    StopTyping,

    /// Patch lesson status in the tree
    UpdateLesson(StatusUpdate),

    /// Patch chapter status in the tree
    UpdateChapter(StatusUpdate),

    SelectLesson { lesson_id: String },

    /// Boundary marker, deduplicated by the timeline
    InsertLessonBoundary { lesson_id: String },

    /// Open a "start" turn for the lesson without user action
    AutoAdvance { lesson_id: String },

    /// Persist a non-interactive login token
    SoftLogin { token: String },

    UpdateProfile { key: String, value: Value },

    UpdateAskQuota(AskQuota),

    /// Side-channel payload for the most recently completed message
    AttachExtension { payload: Value },

    SetTeacherAvatar { url: String },
}

impl Effect {
    /// Whether this effect mutates the timeline or the pending input
    pub fn touches_conversation(&self) -> bool {
        matches!(
            self,
            Effect::OpenMessage { .. }
                | Effect::AppendFragment { .. }
                | Effect::CompleteMessage { .. }
                | Effect::SetPendingInput(_)
                | Effect::InsertLessonBoundary { .. }
                | Effect::AttachExtension { .. }
        )
    }
}
