//! Inbound study events
//!
//! The server sends loosely-shaped `{type, content, script_id?, log_id?}`
//! records. Decoding turns them into typed [`ServerEvent`]s; anything that
//! does not fit is reported as a [`DecodeError`] and dropped by the caller.

use crate::tree::LessonStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Raw event record as it appears in an SSE `data:` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_id: Option<String>,
}

impl EventRecord {
    pub fn new(event_type: impl Into<String>, content: Value) -> Self {
        Self {
            event_type: event_type.into(),
            content,
            script_id: None,
            log_id: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Invalid event JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unknown event type: {0}")]
    UnknownType(String),
    #[error("Invalid {event_type} content: {reason}")]
    InvalidContent {
        event_type: &'static str,
        reason: String,
    },
}

/// Which free-text prompt the server asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextInputKind {
    FreeText,
    Phone,
    VerificationCode,
}

/// Which option-bearing prompt the server asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionsKind {
    Buttons,
    Order,
    NonblockOrder,
    RequireLogin,
}

/// One selectable option of a button-style prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonOption {
    pub label: String,
    pub value: String,
}

impl ButtonOption {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Status patch for one lesson or chapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub id: String,
    /// Display label
    pub status: String,
    pub status_value: LessonStatus,
}

/// Ask-mode quota consumed by the input area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AskQuota {
    pub enabled: bool,
    pub used: u32,
    pub total: u32,
}

impl AskQuota {
    pub fn remaining(&self) -> u32 {
        self.total.saturating_sub(self.used)
    }
}

/// Typed study event
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Text {
        fragment: String,
    },
    TextEnd {
        log_id: Option<String>,
    },
    Input {
        kind: TextInputKind,
        placeholder: Option<String>,
        script_id: Option<String>,
    },
    Options {
        kind: OptionsKind,
        options: Vec<ButtonOption>,
        script_id: Option<String>,
    },
    LessonUpdate(StatusUpdate),
    ChapterUpdate(StatusUpdate),
    UserLogin {
        token: String,
    },
    ProfileUpdate {
        key: String,
        value: Value,
    },
    AskMode(AskQuota),
    Active {
        payload: Value,
    },
    TeacherAvatar {
        url: String,
    },
}

impl ServerEvent {
    /// Decode one SSE `data:` payload
    pub fn parse(data: &str) -> Result<Self, DecodeError> {
        let record: EventRecord = serde_json::from_str(data)?;
        Self::from_record(record)
    }

    pub fn from_record(record: EventRecord) -> Result<Self, DecodeError> {
        let EventRecord {
            event_type,
            content,
            script_id,
            log_id,
        } = record;

        match event_type.trim().to_ascii_lowercase().as_str() {
            "text" => match content {
                Value::String(fragment) => Ok(ServerEvent::Text { fragment }),
                other => Err(invalid("text", format!("expected string, got {other}"))),
            },
            "text_end" => Ok(ServerEvent::TextEnd {
                log_id: log_id.or_else(|| string_field(&content, &["log_id"])),
            }),
            "input" => Ok(text_input(TextInputKind::FreeText, &content, script_id)),
            "phone" => Ok(text_input(TextInputKind::Phone, &content, script_id)),
            "checkcode" => Ok(text_input(TextInputKind::VerificationCode, &content, script_id)),
            "buttons" => options(OptionsKind::Buttons, "buttons", &content, script_id),
            "order" => options(OptionsKind::Order, "order", &content, script_id),
            "nonblock_order" => {
                options(OptionsKind::NonblockOrder, "nonblock_order", &content, script_id)
            }
            "require_login" => {
                options(OptionsKind::RequireLogin, "require_login", &content, script_id)
            }
            "lesson_update" => {
                status_update("lesson_update", &content, &["lesson_id", "id"])
                    .map(ServerEvent::LessonUpdate)
            }
            "chapter_update" => status_update(
                "chapter_update",
                &content,
                &["chapter_id", "lesson_id", "id"],
            )
            .map(ServerEvent::ChapterUpdate),
            "user_login" => scalar_or_field(&content, &["token"])
                .filter(|t| !t.is_empty())
                .map(|token| ServerEvent::UserLogin { token })
                .ok_or_else(|| invalid("user_login", "missing token")),
            "profile_update" => {
                let key = string_field(&content, &["key"])
                    .ok_or_else(|| invalid("profile_update", "missing key"))?;
                let value = content.get("value").cloned().unwrap_or(Value::Null);
                Ok(ServerEvent::ProfileUpdate { key, value })
            }
            "ask_mode" => ask_quota(&content).map(ServerEvent::AskMode),
            "active" => {
                if content.is_null() {
                    Err(invalid("active", "empty payload"))
                } else {
                    Ok(ServerEvent::Active { payload: content })
                }
            }
            "teacher_avatar" => scalar_or_field(&content, &["avatar", "url"])
                .map(|url| ServerEvent::TeacherAvatar { url })
                .ok_or_else(|| invalid("teacher_avatar", "missing url")),
            _ => Err(DecodeError::UnknownType(event_type)),
        }
    }

    /// Wire name, for logging
    pub fn type_name(&self) -> &'static str {
        match self {
            ServerEvent::Text { .. } => "text",
            ServerEvent::TextEnd { .. } => "text_end",
            ServerEvent::Input { kind, .. } => match kind {
                TextInputKind::FreeText => "input",
                TextInputKind::Phone => "phone",
                TextInputKind::VerificationCode => "checkcode",
            },
            ServerEvent::Options { kind, .. } => match kind {
                OptionsKind::Buttons => "buttons",
                OptionsKind::Order => "order",
                OptionsKind::NonblockOrder => "nonblock_order",
                OptionsKind::RequireLogin => "require_login",
            },
            ServerEvent::LessonUpdate(_) => "lesson_update",
            ServerEvent::ChapterUpdate(_) => "chapter_update",
            ServerEvent::UserLogin { .. } => "user_login",
            ServerEvent::ProfileUpdate { .. } => "profile_update",
            ServerEvent::AskMode(_) => "ask_mode",
            ServerEvent::Active { .. } => "active",
            ServerEvent::TeacherAvatar { .. } => "teacher_avatar",
        }
    }
}

fn invalid(event_type: &'static str, reason: impl Into<String>) -> DecodeError {
    DecodeError::InvalidContent {
        event_type,
        reason: reason.into(),
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn string_field(content: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| content.get(*key).and_then(value_to_string))
}

fn scalar_or_field(content: &Value, keys: &[&str]) -> Option<String> {
    value_to_string(content).or_else(|| string_field(content, keys))
}

fn text_input(kind: TextInputKind, content: &Value, script_id: Option<String>) -> ServerEvent {
    let placeholder = scalar_or_field(content, &["placeholder", "content"]).filter(|p| !p.is_empty());
    ServerEvent::Input {
        kind,
        placeholder,
        script_id,
    }
}

fn parse_option(value: &Value) -> Option<ButtonOption> {
    match value {
        Value::String(s) => Some(ButtonOption::new(s.clone(), s.clone())),
        Value::Object(_) => {
            let label = string_field(value, &["label", "title", "name"]);
            let option_value = string_field(value, &["value", "id", "order_id"]);
            match (label, option_value) {
                (Some(label), Some(value)) => Some(ButtonOption::new(label, value)),
                (Some(label), None) => Some(ButtonOption::new(label.clone(), label)),
                (None, Some(value)) => Some(ButtonOption::new(value.clone(), value)),
                (None, None) => None,
            }
        }
        _ => None,
    }
}

fn options(
    kind: OptionsKind,
    event_type: &'static str,
    content: &Value,
    script_id: Option<String>,
) -> Result<ServerEvent, DecodeError> {
    let list = match content {
        Value::Array(items) => Some(items),
        Value::Object(_) => content.get("buttons").and_then(Value::as_array),
        _ => None,
    };

    let options: Vec<ButtonOption> = match list {
        Some(items) => items.iter().filter_map(parse_option).collect(),
        None => parse_option(content).into_iter().collect(),
    };

    if options.is_empty() {
        return Err(invalid(event_type, "no options"));
    }

    Ok(ServerEvent::Options {
        kind,
        options,
        script_id,
    })
}

fn status_update(
    event_type: &'static str,
    content: &Value,
    id_keys: &[&str],
) -> Result<StatusUpdate, DecodeError> {
    let id = string_field(content, id_keys).ok_or_else(|| invalid(event_type, "missing id"))?;
    let raw_value = string_field(content, &["status_value"])
        .ok_or_else(|| invalid(event_type, "missing status_value"))?;
    let status_value = LessonStatus::parse(&raw_value)
        .ok_or_else(|| invalid(event_type, format!("unknown status_value {raw_value}")))?;
    let status = string_field(content, &["status"]).unwrap_or_else(|| raw_value.clone());
    Ok(StatusUpdate {
        id,
        status,
        status_value,
    })
}

fn ask_quota(content: &Value) -> Result<AskQuota, DecodeError> {
    if !content.is_object() {
        return Err(invalid("ask_mode", "expected object"));
    }
    let enabled = ["enabled", "ask_mode"]
        .iter()
        .find_map(|key| content.get(*key).and_then(Value::as_bool))
        .unwrap_or(false);
    let count = |keys: &[&str]| {
        keys.iter()
            .find_map(|key| content.get(*key).and_then(Value::as_u64))
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0)
    };
    Ok(AskQuota {
        enabled,
        used: count(&["used", "ask_used_count"]),
        total: count(&["total", "ask_limit_count"]),
    })
}
