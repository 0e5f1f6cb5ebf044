//! Pure reducer
//!
//! Suppression rules: once a turn is superseded by a newer one, or its
//! chapter has completed, its text, prompts, and extensions no longer reach
//! the conversation. Tree status patches always go through since status is
//! global. A `text_end` always closes the turn's own message so nothing is
//! left dangling.

use super::{Effect, PendingInput, TurnState};
use crate::protocol::ServerEvent;
use crate::timeline::MessageId;
use crate::tree::LessonStatus;

const NEXT_CHAPTER_LABEL: &str = "Next chapter";

/// Result of interpreting one event
#[derive(Debug)]
pub struct Interpretation {
    pub new_state: TurnState,
    pub effects: Vec<Effect>,
}

impl Interpretation {
    pub fn new(state: TurnState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Interpret one event against the turn state
pub fn interpret(state: &TurnState, event: ServerEvent) -> Interpretation {
    let mut next = state.clone();

    match event {
        ServerEvent::Text { fragment } => {
            if state.is_suppressed() {
                return Interpretation::new(next);
            }
            if let Some(id) = &state.streaming {
                return Interpretation::new(next).with_effect(Effect::AppendFragment {
                    id: id.clone(),
                    fragment,
                });
            }
            let id = MessageId::live(state.turn_id, state.next_seq);
            next.next_seq += 1;
            next.streaming = Some(id.clone());
            Interpretation::new(next).with_effect(Effect::OpenMessage { id, fragment })
        }

        ServerEvent::TextEnd { log_id } => match next.streaming.take() {
            Some(id) => Interpretation::new(next).with_effect(Effect::CompleteMessage { id, log_id }),
            None => Interpretation::new(next),
        },

        ServerEvent::Input { .. } | ServerEvent::Options { .. } => {
            if state.is_suppressed() {
                return Interpretation::new(next);
            }
            match PendingInput::from_event(&event) {
                Some(pending) => Interpretation::new(next)
                    .with_effect(Effect::SetPendingInput(pending))
                    .with_effect(Effect::EnableInput),
                None => Interpretation::new(next),
            }
        }

        ServerEvent::LessonUpdate(update) => {
            let lesson_id = update.id.clone();
            let status_value = update.status_value;
            let mut result = Interpretation::new(next).with_effect(Effect::UpdateLesson(update));
            if state.is_suppressed() {
                return result;
            }
            match status_value {
                LessonStatus::PrepareLearning
                    if result.new_state.advanced_to.as_deref() != Some(lesson_id.as_str()) =>
                {
                    result.new_state.advanced_to = Some(lesson_id.clone());
                    // The marker goes after the streamed message, which is
                    // closed here rather than left open above it
                    if let Some(id) = result.new_state.streaming.take() {
                        result.effects.push(Effect::CompleteMessage { id, log_id: None });
                    }
                    result.with_effects([
                        Effect::InsertLessonBoundary {
                            lesson_id: lesson_id.clone(),
                        },
                        Effect::AutoAdvance { lesson_id },
                    ])
                }
                LessonStatus::Learning => {
                    result.effects.push(Effect::SelectLesson { lesson_id });
                    result
                }
                _ => result,
            }
        }

        ServerEvent::ChapterUpdate(update) => {
            let chapter_id = update.id.clone();
            let status_value = update.status_value;
            let mut result = Interpretation::new(next).with_effect(Effect::UpdateChapter(update));
            match status_value {
                LessonStatus::Completed => {
                    result.new_state.ended = true;
                    result.with_effect(Effect::StopTyping)
                }
                LessonStatus::PrepareLearning if !state.superseded => result.with_effects([
                    Effect::SetPendingInput(PendingInput::next_chapter(
                        &chapter_id,
                        NEXT_CHAPTER_LABEL,
                    )),
                    Effect::EnableInput,
                ]),
                _ => result,
            }
        }

        ServerEvent::UserLogin { token } => {
            Interpretation::new(next).with_effect(Effect::SoftLogin { token })
        }

        ServerEvent::ProfileUpdate { key, value } => {
            Interpretation::new(next).with_effect(Effect::UpdateProfile { key, value })
        }

        ServerEvent::AskMode(quota) => {
            Interpretation::new(next).with_effect(Effect::UpdateAskQuota(quota))
        }

        ServerEvent::Active { payload } => {
            if state.is_suppressed() {
                Interpretation::new(next)
            } else {
                Interpretation::new(next).with_effect(Effect::AttachExtension { payload })
            }
        }

        ServerEvent::TeacherAvatar { url } => {
            Interpretation::new(next).with_effect(Effect::SetTeacherAvatar { url })
        }
    }
}
