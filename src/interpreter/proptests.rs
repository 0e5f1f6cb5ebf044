//! Property-based tests for the event interpreter
//!
//! Driven through a real `Timeline` so the effects are checked by what they
//! do to the conversation, not only by their shape.

use super::*;
use crate::protocol::{AskQuota, ButtonOption, OptionsKind, ServerEvent, StatusUpdate, TextInputKind};
use crate::timeline::{MessageBody, Timeline};
use crate::tree::LessonStatus;
use proptest::prelude::*;
use serde_json::json;

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

fn arb_update() -> impl Strategy<Value = StatusUpdate> {
    ("L[0-3]", arb_status()).prop_map(|(id, status_value)| StatusUpdate {
        id,
        status: status_value.as_str().to_string(),
        status_value,
    })
}

fn arb_event() -> impl Strategy<Value = ServerEvent> {
    prop_oneof![
        4 => "[a-z ]{1,8}".prop_map(|fragment| ServerEvent::Text { fragment }),
        2 => proptest::option::of("log-[0-9]{1,3}").prop_map(|log_id| ServerEvent::TextEnd { log_id }),
        1 => Just(ServerEvent::Input {
            kind: TextInputKind::FreeText,
            placeholder: None,
            script_id: None,
        }),
        1 => proptest::collection::vec("[A-Z]{1,3}", 1..4).prop_map(|labels| ServerEvent::Options {
            kind: OptionsKind::Buttons,
            options: labels.iter().map(|l| ButtonOption::new(l.clone(), l.clone())).collect(),
            script_id: None,
        }),
        1 => arb_update().prop_map(ServerEvent::LessonUpdate),
        1 => arb_update().prop_map(ServerEvent::ChapterUpdate),
        1 => Just(ServerEvent::AskMode(AskQuota { enabled: true, used: 0, total: 3 })),
        1 => Just(ServerEvent::Active { payload: json!({"kind": "card"}) }),
    ]
}

fn apply(timeline: &mut Timeline, effects: &[Effect]) {
    for effect in effects {
        match effect {
            Effect::OpenMessage { id, fragment } => {
                timeline.push(crate::timeline::Message::streaming(id.clone(), fragment.clone()));
            }
            Effect::AppendFragment { id, fragment } => {
                timeline.append_fragment(id, fragment);
            }
            Effect::CompleteMessage { id, log_id } => {
                timeline.complete(id, log_id.clone());
            }
            Effect::InsertLessonBoundary { lesson_id } => {
                timeline.insert_boundary(lesson_id);
            }
            Effect::AttachExtension { payload } => {
                timeline.attach_extension(payload.clone());
            }
            _ => {}
        }
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// One event never produces two competing prompts
    #[test]
    fn at_most_one_pending_input_per_event(events in proptest::collection::vec(arb_event(), 0..40)) {
        let mut state = TurnState::new(1, "L0");
        for event in events {
            let result = interpret(&state, event);
            let prompts = result
                .effects
                .iter()
                .filter(|e| matches!(e, Effect::SetPendingInput(_)))
                .count();
            prop_assert!(prompts <= 1);
            state = result.new_state;
        }
    }

    /// Fragments only ever extend the tail, and only one message is open
    #[test]
    fn streaming_targets_only_the_open_tail(events in proptest::collection::vec(arb_event(), 0..60)) {
        let mut state = TurnState::new(3, "L0");
        let mut timeline = Timeline::new();
        for event in events {
            let result = interpret(&state, event);
            for effect in &result.effects {
                if let Effect::AppendFragment { id, .. } = effect {
                    prop_assert_eq!(timeline.open_message().map(|m| &m.id), Some(id));
                }
            }
            apply(&mut timeline, &result.effects);
            state = result.new_state;

            let open = timeline.messages().iter().filter(|m| !m.is_complete).count();
            prop_assert!(open <= 1);
            if let Some(open) = timeline.open_message() {
                prop_assert_eq!(timeline.last().map(|m| &m.id), Some(&open.id));
            }
        }
    }

    /// Concatenated fragments equal the streamed message body
    #[test]
    fn fragments_concatenate_in_order(fragments in proptest::collection::vec("[a-z]{1,5}", 1..20)) {
        let mut state = TurnState::new(9, "L0");
        let mut timeline = Timeline::new();
        for fragment in &fragments {
            let result = interpret(&state, ServerEvent::Text { fragment: fragment.clone() });
            apply(&mut timeline, &result.effects);
            state = result.new_state;
        }
        prop_assert_eq!(timeline.len(), 1);
        let body = match &timeline.messages()[0].body {
            MessageBody::Text(text) => text.clone(),
            other => return Err(TestCaseError::fail(format!("unexpected body {other:?}"))),
        };
        prop_assert_eq!(body, fragments.concat());
    }

    /// A superseded turn never touches the conversation except to close
    /// its own message
    #[test]
    fn superseded_turn_is_silent(events in proptest::collection::vec(arb_event(), 0..40)) {
        let mut state = TurnState::new(2, "L0");
        state.superseded = true;
        for event in events {
            let result = interpret(&state, event);
            for effect in &result.effects {
                let allowed = !effect.touches_conversation()
                    || matches!(effect, Effect::CompleteMessage { .. });
                prop_assert!(allowed, "superseded turn produced {:?}", effect);
            }
            state = result.new_state;
        }
    }

    /// Auto-advance fires at most once per lesson within a turn
    #[test]
    fn auto_advance_once_per_lesson(events in proptest::collection::vec(arb_event(), 0..60)) {
        let mut state = TurnState::new(4, "L0");
        let mut last_target: Option<String> = None;
        for event in events {
            let result = interpret(&state, event);
            for effect in &result.effects {
                if let Effect::AutoAdvance { lesson_id } = effect {
                    prop_assert_ne!(last_target.as_deref(), Some(lesson_id.as_str()));
                    last_target = Some(lesson_id.clone());
                }
            }
            state = result.new_state;
        }
    }
}
