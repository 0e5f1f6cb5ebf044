//! Turn-local reducer state and the pending-input descriptor

use crate::protocol::{ButtonOption, InputKind, OptionsKind, ServerEvent, TextInputKind};
use crate::timeline::MessageId;

/// Reducer state threaded through the events of one turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnState {
    pub turn_id: u64,
    /// Lesson the turn was opened for
    pub lesson_id: String,
    /// Message this turn is currently streaming into
    pub streaming: Option<MessageId>,
    /// A newer turn (or a reset) owns the timeline now
    pub superseded: bool,
    /// The chapter completed during this turn
    pub ended: bool,
    /// Next sequence number for client-generated message ids
    pub next_seq: u32,
    /// Last lesson this turn auto-advanced into
    pub advanced_to: Option<String>,
}

impl TurnState {
    pub fn new(turn_id: u64, lesson_id: impl Into<String>) -> Self {
        Self {
            turn_id,
            lesson_id: lesson_id.into(),
            streaming: None,
            superseded: false,
            ended: false,
            next_seq: 0,
            advanced_to: None,
        }
    }

    /// Text, prompts, and extensions from this turn are dropped
    pub fn is_suppressed(&self) -> bool {
        self.superseded || self.ended
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingInputKind {
    FreeText,
    Phone,
    VerificationCode,
    ButtonSet,
    PurchaseButton,
    NonBlockingPurchase,
    RequireLogin,
    NextChapter,
}

impl PendingInputKind {
    /// Input kind to send back when the prompt is answered
    pub fn input_kind(self) -> InputKind {
        match self {
            PendingInputKind::FreeText => InputKind::Text,
            PendingInputKind::Phone => InputKind::Phone,
            PendingInputKind::VerificationCode => InputKind::Checkcode,
            PendingInputKind::ButtonSet => InputKind::Button,
            PendingInputKind::PurchaseButton => InputKind::Order,
            PendingInputKind::NonBlockingPurchase => InputKind::NonblockOrder,
            PendingInputKind::RequireLogin => InputKind::RequireLogin,
            PendingInputKind::NextChapter => InputKind::NextChapter,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputPrompt {
    Text { placeholder: Option<String> },
    Buttons(Vec<ButtonOption>),
    /// A set of exactly one option, shown as a lone button
    Button(ButtonOption),
}

/// The single outstanding request for user action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInput {
    pub kind: PendingInputKind,
    pub prompt: InputPrompt,
    pub script_id: Option<String>,
}

impl PendingInput {
    pub fn free_text(placeholder: Option<String>) -> Self {
        Self {
            kind: PendingInputKind::FreeText,
            prompt: InputPrompt::Text { placeholder },
            script_id: None,
        }
    }

    pub fn next_chapter(chapter_id: &str, label: &str) -> Self {
        Self {
            kind: PendingInputKind::NextChapter,
            prompt: InputPrompt::Button(ButtonOption::new(label, chapter_id)),
            script_id: None,
        }
    }

    /// Descriptor for a prompt-bearing event; `None` for every other event
    pub fn from_event(event: &ServerEvent) -> Option<Self> {
        match event {
            ServerEvent::Input {
                kind,
                placeholder,
                script_id,
            } => Some(Self {
                kind: match kind {
                    TextInputKind::FreeText => PendingInputKind::FreeText,
                    TextInputKind::Phone => PendingInputKind::Phone,
                    TextInputKind::VerificationCode => PendingInputKind::VerificationCode,
                },
                prompt: InputPrompt::Text {
                    placeholder: placeholder.clone(),
                },
                script_id: script_id.clone(),
            }),
            ServerEvent::Options {
                kind,
                options,
                script_id,
            } => {
                let prompt = match options.as_slice() {
                    [only] => InputPrompt::Button(only.clone()),
                    _ => InputPrompt::Buttons(options.clone()),
                };
                Some(Self {
                    kind: match kind {
                        OptionsKind::Buttons => PendingInputKind::ButtonSet,
                        OptionsKind::Order => PendingInputKind::PurchaseButton,
                        OptionsKind::NonblockOrder => PendingInputKind::NonBlockingPurchase,
                        OptionsKind::RequireLogin => PendingInputKind::RequireLogin,
                    },
                    prompt,
                    script_id: script_id.clone(),
                })
            }
            _ => None,
        }
    }

    pub fn options(&self) -> Vec<&ButtonOption> {
        match &self.prompt {
            InputPrompt::Buttons(options) => options.iter().collect(),
            InputPrompt::Button(option) => vec![option],
            InputPrompt::Text { .. } => Vec::new(),
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self.prompt, InputPrompt::Text { .. })
    }
}
