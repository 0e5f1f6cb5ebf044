//! Session orchestration
//!
//! The controller owns the timeline, the lesson tree, and the pending input
//! for one chat surface, and drives turns through a [`TurnTransport`].
//!
//! [`TurnTransport`]: crate::transport::TurnTransport

mod controller;
pub mod controls;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use controller::SessionController;
pub use controls::{ControlHandler, ControlRegistry, ControlRequest};
pub use traits::*;

use crate::interpreter::PendingInput;
use crate::protocol::{ButtonOption, InputKind};

/// One user action, in the single shape every turn request is built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAction {
    pub kind: InputKind,
    /// Echo the value into the timeline as a student message
    pub display: bool,
    pub value: String,
    pub script_id: Option<String>,
    pub reload_script_id: Option<String>,
}

impl UserAction {
    pub fn new(kind: InputKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            display: false,
            value: value.into(),
            script_id: None,
            reload_script_id: None,
        }
    }

    /// Free-text answer, echoed
    pub fn text(value: impl Into<String>) -> Self {
        Self::new(InputKind::Text, value).with_display(true)
    }

    /// Answer to a pending prompt, using the kind and script it expects
    pub fn answer(pending: &PendingInput, value: impl Into<String>) -> Self {
        Self::new(pending.kind.input_kind(), value)
            .with_display(true)
            .with_script_id(pending.script_id.clone())
    }

    /// Click on one option of a pending prompt
    pub fn choose(pending: &PendingInput, option: &ButtonOption) -> Self {
        Self::answer(pending, option.value.clone())
    }

    #[must_use]
    pub fn with_display(mut self, display: bool) -> Self {
        self.display = display;
        self
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

    /// Whether this action appends an optimistic student message
    pub fn echoes(&self) -> bool {
        self.display && self.kind.is_user_text() && !self.value.trim().is_empty()
    }
}
