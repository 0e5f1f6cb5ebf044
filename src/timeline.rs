//! Message timeline
//!
//! Append-only log with a single mutable tail. The message currently open
//! for streaming is tracked by a dedicated reference held beside the list,
//! so appending a token never has to scan the log.

use crate::markdown;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Client-generated id for a message streamed by a live turn
    pub fn live(turn: u64, seq: u32) -> Self {
        Self(format!("turn-{turn}-{seq}"))
    }

    /// Optimistic student echo
    pub fn local(seq: u64) -> Self {
        Self(format!("local-{seq}"))
    }

    pub fn boundary(lesson_id: &str) -> Self {
        Self(format!("lesson-{lesson_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[serde(alias = "assistant")]
    Teacher,
    #[serde(alias = "user")]
    Student,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    LessonBoundary,
    Control,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    /// Markdown
    Text(String),
    LessonBoundary { lesson_id: String },
    Control(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub body: MessageBody,
    pub is_complete: bool,
    /// Server log reference for feedback; set when the turn closes
    pub log_id: Option<String>,
    pub extensions: Option<Value>,
    pub lesson_id: Option<String>,
}

impl Message {
    /// Open teacher message that will accumulate streamed fragments
    pub fn streaming(id: MessageId, fragment: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::Teacher,
            body: MessageBody::Text(fragment.into()),
            is_complete: false,
            log_id: None,
            extensions: None,
            lesson_id: None,
        }
    }

    pub fn text(id: MessageId, role: Role, text: impl Into<String>) -> Self {
        Self {
            id,
            role,
            body: MessageBody::Text(text.into()),
            is_complete: true,
            log_id: None,
            extensions: None,
            lesson_id: None,
        }
    }

    pub fn boundary(lesson_id: &str) -> Self {
        Self {
            id: MessageId::boundary(lesson_id),
            role: Role::Teacher,
            body: MessageBody::LessonBoundary {
                lesson_id: lesson_id.to_string(),
            },
            is_complete: true,
            log_id: None,
            extensions: None,
            lesson_id: Some(lesson_id.to_string()),
        }
    }

    pub fn control(id: MessageId, role: Role, payload: Value) -> Self {
        Self {
            id,
            role,
            body: MessageBody::Control(payload),
            is_complete: true,
            log_id: None,
            extensions: None,
            lesson_id: None,
        }
    }

    #[must_use]
    pub fn with_log_id(mut self, log_id: Option<String>) -> Self {
        self.log_id = log_id;
        self
    }

    #[must_use]
    pub fn with_lesson_id(mut self, lesson_id: Option<String>) -> Self {
        self.lesson_id = lesson_id;
        self
    }

    pub fn kind(&self) -> MessageKind {
        match self.body {
            MessageBody::Text(_) => MessageKind::Text,
            MessageBody::LessonBoundary { .. } => MessageKind::LessonBoundary,
            MessageBody::Control(_) => MessageKind::Control,
        }
    }

    pub fn text_content(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Markdown safe to render right now
    pub fn rendered(&self) -> Cow<'_, str> {
        match &self.body {
            MessageBody::Text(text) if !self.is_complete => markdown::close_open_spans(text),
            MessageBody::Text(text) => Cow::Borrowed(text),
            MessageBody::LessonBoundary { lesson_id } => Cow::Owned(format!("— {lesson_id} —")),
            MessageBody::Control(payload) => Cow::Owned(payload.to_string()),
        }
    }
}

/// Ordered message log for one chat surface
#[derive(Debug, Default)]
pub struct Timeline {
    messages: Vec<Message>,
    open: Option<MessageId>,
    last_completed: Option<MessageId>,
    seen_lessons: HashSet<String>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().rev().find(|m| &m.id == id)
    }

    pub fn open_message(&self) -> Option<&Message> {
        self.open.as_ref().and_then(|id| self.get(id))
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.get(id).is_some()
    }

    /// Append a message. Re-inserting an id already present is a no-op.
    /// Any message still open is sealed first so only the tail can be open.
    pub fn push(&mut self, message: Message) -> bool {
        if self.contains(&message.id) {
            return false;
        }
        self.seal_open();
        if !message.is_complete {
            self.open = Some(message.id.clone());
        }
        if let Some(lesson_id) = &message.lesson_id {
            self.seen_lessons.insert(lesson_id.clone());
        }
        self.messages.push(message);
        true
    }

    /// Append a fragment to the open message
    pub fn append_fragment(&mut self, id: &MessageId, fragment: &str) -> bool {
        if self.open.as_ref() != Some(id) {
            return false;
        }
        let Some(message) = self.messages.last_mut().filter(|m| &m.id == id) else {
            return false;
        };
        match &mut message.body {
            MessageBody::Text(text) => {
                let joined = markdown::join_fragment(text, fragment);
                text.push_str(&joined);
                true
            }
            _ => false,
        }
    }

    /// Close a streamed message. Completion is idempotent; a late log id is
    /// still recorded on a message that was already sealed.
    pub fn complete(&mut self, id: &MessageId, log_id: Option<String>) -> bool {
        let Some(message) = self.messages.iter_mut().rev().find(|m| &m.id == id) else {
            return false;
        };
        message.is_complete = true;
        if log_id.is_some() {
            message.log_id = log_id;
        }
        if self.open.as_ref() == Some(id) {
            self.open = None;
        }
        self.last_completed = Some(id.clone());
        true
    }

    /// Attach side-channel data to the most recently completed message
    pub fn attach_extension(&mut self, payload: Value) -> bool {
        let Some(target) = self.last_completed.clone() else {
            return false;
        };
        match self.messages.iter_mut().rev().find(|m| m.id == target) {
            Some(message) => {
                message.extensions = Some(payload);
                true
            }
            None => false,
        }
    }

    /// Insert a lesson-boundary marker unless this lesson was already seen
    /// in the current load
    pub fn insert_boundary(&mut self, lesson_id: &str) -> bool {
        if self.seen_lessons.contains(lesson_id) {
            return false;
        }
        self.push(Message::boundary(lesson_id))
    }

    /// Record a lesson as seen without inserting a marker
    pub fn mark_lesson_seen(&mut self, lesson_id: &str) {
        self.seen_lessons.insert(lesson_id.to_string());
    }

    pub fn has_seen_lesson(&self, lesson_id: &str) -> bool {
        self.seen_lessons.contains(lesson_id)
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.open = None;
        self.last_completed = None;
        self.seen_lessons.clear();
    }

    fn seal_open(&mut self) {
        if let Some(id) = self.open.take() {
            if let Some(message) = self.messages.iter_mut().rev().find(|m| m.id == id) {
                message.is_complete = true;
            }
        }
    }
}
