//! Outbound turn request

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of user action carried by a turn
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum InputKind {
    /// Open a lesson with no user input
    Start,
    Continue,
    /// Free-text answer
    Text,
    Button,
    Phone,
    Checkcode,
    Order,
    NonblockOrder,
    RequireLogin,
    NextChapter,
    /// Free question outside the script
    Ask,
    /// Action control registered by a plugin
    Custom(String),
}

impl InputKind {
    pub fn as_str(&self) -> &str {
        match self {
            InputKind::Start => "start",
            InputKind::Continue => "continue",
            InputKind::Text => "input",
            InputKind::Button => "button",
            InputKind::Phone => "phone",
            InputKind::Checkcode => "checkcode",
            InputKind::Order => "order",
            InputKind::NonblockOrder => "nonblock_order",
            InputKind::RequireLogin => "require_login",
            InputKind::NextChapter => "next_chapter",
            InputKind::Ask => "ask",
            InputKind::Custom(kind) => kind,
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "start" => InputKind::Start,
            "continue" => InputKind::Continue,
            "input" | "text" => InputKind::Text,
            "button" | "buttons" => InputKind::Button,
            "phone" => InputKind::Phone,
            "checkcode" => InputKind::Checkcode,
            "order" => InputKind::Order,
            "nonblock_order" => InputKind::NonblockOrder,
            "require_login" => InputKind::RequireLogin,
            "next_chapter" => InputKind::NextChapter,
            "ask" => InputKind::Ask,
            _ => InputKind::Custom(value.to_string()),
        }
    }

    /// Kinds whose value is echoed into the timeline as a student message
    pub fn is_user_text(&self) -> bool {
        matches!(
            self,
            InputKind::Text
                | InputKind::Button
                | InputKind::Phone
                | InputKind::Checkcode
                | InputKind::Ask
        )
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<InputKind> for String {
    fn from(kind: InputKind) -> Self {
        kind.as_str().to_string()
    }
}

impl From<String> for InputKind {
    fn from(value: String) -> Self {
        InputKind::parse(&value)
    }
}

/// JSON body of one study turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRequest {
    pub course_id: String,
    pub lesson_id: String,
    pub input: String,
    pub input_type: InputKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reload_script_id: Option<String>,
    pub preview_mode: bool,
}

impl TurnRequest {
    pub fn new(
        course_id: impl Into<String>,
        lesson_id: impl Into<String>,
        input_type: InputKind,
        input: impl Into<String>,
    ) -> Self {
        Self {
            course_id: course_id.into(),
            lesson_id: lesson_id.into(),
            input: input.into(),
            input_type,
            script_id: None,
            reload_script_id: None,
            preview_mode: false,
        }
    }

    #[must_use]
    pub fn with_script_id(mut self, script_id: Option<String>) -> Self {
        self.script_id = script_id;
        self
    }

    #[must_use]
    pub fn with_reload_script_id(mut self, reload_script_id: Option<String>) -> Self {
        self.reload_script_id = reload_script_id;
        self
    }

    #[must_use]
    pub fn with_preview_mode(mut self, preview_mode: bool) -> Self {
        self.preview_mode = preview_mode;
        self
    }
}
