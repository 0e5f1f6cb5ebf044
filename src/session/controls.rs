//! Side-channel control plugins
//!
//! Purchase, login, and arbitrary action controls are owned by handlers
//! outside the session core. The controller hands a control over, waits,
//! and resumes when the handler reports completion.

use super::UserAction;
use crate::protocol::InputKind;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// What the controller hands to a control handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlRequest {
    pub kind: InputKind,
    pub value: String,
    pub script_id: Option<String>,
}

pub trait ControlHandler: Send + Sync {
    /// Take over the flow for one control
    fn activate(&self, request: &ControlRequest);

    /// Finish the control. Returning an action re-enters the normal send path;
    /// `None` gives control back without opening a turn.
    fn complete(&self, request: &ControlRequest, value: &str) -> Option<UserAction>;
}

/// Handlers resolved by input kind at call time
#[derive(Default, Clone)]
pub struct ControlRegistry {
    handlers: HashMap<String, Arc<dyn ControlHandler>>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for the same kind
    pub fn register(&mut self, kind: &InputKind, handler: Arc<dyn ControlHandler>) {
        self.handlers.insert(kind.as_str().to_string(), handler);
    }

    pub fn unregister(&mut self, kind: &InputKind) -> bool {
        self.handlers.remove(kind.as_str()).is_some()
    }

    pub fn get(&self, kind: &InputKind) -> Option<Arc<dyn ControlHandler>> {
        self.handlers.get(kind.as_str()).cloned()
    }

    pub fn contains(&self, kind: &InputKind) -> bool {
        self.handlers.contains_key(kind.as_str())
    }
}

impl fmt::Debug for ControlRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.handlers.keys().collect();
        kinds.sort();
        f.debug_struct("ControlRegistry").field("kinds", &kinds).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl ControlHandler for Noop {
        fn activate(&self, _request: &ControlRequest) {}

        fn complete(&self, _request: &ControlRequest, _value: &str) -> Option<UserAction> {
            None
        }
    }

    #[test]
    fn test_registry_resolves_open_kinds() {
        let mut registry = ControlRegistry::new();
        registry.register(&InputKind::Order, Arc::new(Noop));
        registry.register(&InputKind::Custom("quiz_card".to_string()), Arc::new(Noop));

        assert!(registry.contains(&InputKind::Order));
        assert!(registry.contains(&InputKind::parse("quiz_card")));
        assert!(!registry.contains(&InputKind::Text));

        assert!(registry.unregister(&InputKind::Order));
        assert!(!registry.contains(&InputKind::Order));
        assert_eq!(format!("{registry:?}"), r#"ControlRegistry { kinds: ["quiz_card"] }"#);
    }
}
