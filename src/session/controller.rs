//! Session controller

use super::controls::{ControlHandler, ControlRegistry, ControlRequest};
use super::traits::{Backend, Feedback, Transcript};
use super::UserAction;
use crate::config::SessionConfig;
use crate::error::{SessionError, TransportError};
use crate::interpreter::{interpret, Effect, PendingInput, TurnState};
use crate::protocol::{AskQuota, InputKind, ServerEvent, TurnRequest};
use crate::timeline::{Message, MessageId, Role, Timeline};
use crate::transport::{turn_channel, TurnHandle, TurnId, TurnSignal, TurnSink, TurnStream, TurnTransport};
use crate::tree::LessonTree;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Reducer state plus connection handle for one open turn
struct TurnSlot {
    state: TurnState,
    handle: TurnHandle,
}

/// A control handler currently holding the flow
struct Suspension {
    request: ControlRequest,
    handler: Arc<dyn ControlHandler>,
}

/// Orchestrates turns for one chat surface
///
/// All mutation happens on the task that owns the controller. Turn streams
/// run in the background and report through a channel drained by
/// [`SessionController::next_signal`], [`SessionController::run_until_idle`],
/// or [`SessionController::process_ready`].
pub struct SessionController<T, B>
where
    T: TurnTransport + 'static,
    B: Backend + 'static,
{
    config: SessionConfig,
    transport: Arc<T>,
    backend: Arc<B>,

    timeline: Timeline,
    tree: LessonTree,
    pending_input: Option<PendingInput>,
    /// Pending input cleared by the turn in flight, restored if that turn
    /// ends without installing a new one
    last_pending: Option<PendingInput>,
    input_enabled: bool,
    typing: bool,
    ask_quota: AskQuota,
    teacher_avatar: Option<String>,

    chapter_id: Option<String>,
    lesson_id: Option<String>,

    turns: HashMap<TurnId, TurnSlot>,
    /// The only turn allowed to touch the conversation
    active_turn: Option<TurnId>,
    next_turn_id: TurnId,
    sink: TurnSink,
    signals: TurnStream,

    last_send: Option<UserAction>,
    last_failure: Option<TransportError>,
    auto_advance_budget: u32,
    controls: ControlRegistry,
    suspended: Option<Suspension>,
    next_local_id: u64,
}

impl<T, B> SessionController<T, B>
where
    T: TurnTransport + 'static,
    B: Backend + 'static,
{
    pub fn new(config: SessionConfig, transport: T, backend: B) -> Self {
        let (sink, signals) = turn_channel();
        let auto_advance_budget = config.max_auto_advance;
        Self {
            config,
            transport: Arc::new(transport),
            backend: Arc::new(backend),
            timeline: Timeline::new(),
            tree: LessonTree::default(),
            pending_input: None,
            last_pending: None,
            input_enabled: false,
            typing: false,
            ask_quota: AskQuota::default(),
            teacher_avatar: None,
            chapter_id: None,
            lesson_id: None,
            turns: HashMap::new(),
            active_turn: None,
            next_turn_id: 1,
            sink,
            signals,
            last_send: None,
            last_failure: None,
            auto_advance_budget,
            controls: ControlRegistry::new(),
            suspended: None,
            next_local_id: 0,
        }
    }

    #[must_use]
    pub fn with_controls(mut self, controls: ControlRegistry) -> Self {
        self.controls = controls;
        self
    }

    // ========================================================================
    // View
    // ========================================================================

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn tree(&self) -> &LessonTree {
        &self.tree
    }

    pub fn pending_input(&self) -> Option<&PendingInput> {
        self.pending_input.as_ref()
    }

    pub fn input_enabled(&self) -> bool {
        self.input_enabled && self.suspended.is_none()
    }

    pub fn is_typing(&self) -> bool {
        self.typing
    }

    pub fn ask_quota(&self) -> AskQuota {
        self.ask_quota
    }

    pub fn teacher_avatar(&self) -> Option<&str> {
        self.teacher_avatar.as_deref()
    }

    pub fn chapter_id(&self) -> Option<&str> {
        self.chapter_id.as_deref()
    }

    pub fn lesson_id(&self) -> Option<&str> {
        self.lesson_id.as_deref()
    }

    pub fn active_turn(&self) -> Option<TurnId> {
        self.active_turn
    }

    /// Turns whose stream has not reported a terminal signal yet
    pub fn open_turns(&self) -> usize {
        self.turns.len()
    }

    /// Most recent connection failure of an active turn
    pub fn last_failure(&self) -> Option<&TransportError> {
        self.last_failure.as_ref()
    }

    pub fn controls_mut(&mut self) -> &mut ControlRegistry {
        &mut self.controls
    }

    /// Kind of the control currently holding the flow
    pub fn suspended_control(&self) -> Option<&InputKind> {
        self.suspended.as_ref().map(|s| &s.request.kind)
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Open a chapter at a lesson: replay its transcript, or start it fresh
    /// when there is none
    pub async fn start(&mut self, chapter_id: &str, lesson_id: &str) -> Result<(), SessionError> {
        if self.tree.is_empty() {
            self.load_tree().await?;
        }
        if !self.tree.is_empty() {
            if self.tree.chapter(chapter_id).is_none() {
                return Err(SessionError::UnknownChapter(chapter_id.to_string()));
            }
            if self.tree.lesson(lesson_id).is_none() {
                return Err(SessionError::UnknownLesson(lesson_id.to_string()));
            }
        }

        tracing::info!(chapter_id, lesson_id, "Starting chapter");
        self.discard_conversation();
        self.chapter_id = Some(chapter_id.to_string());
        self.lesson_id = Some(lesson_id.to_string());
        self.auto_advance_budget = self.config.max_auto_advance;

        let transcript = self
            .backend
            .load_transcript(chapter_id, self.config.preview_mode)
            .await
            .map_err(SessionError::History)?;
        let resumed = !transcript.records.is_empty();
        self.replay(transcript);
        self.timeline.mark_lesson_seen(lesson_id);

        if let Err(e) = self.tree.select(lesson_id) {
            tracing::debug!(error = %e, "Started lesson is not in the tree");
        }

        if resumed {
            self.input_enabled = true;
        } else {
            self.open_turn(&UserAction::new(InputKind::Start, ""), lesson_id);
        }
        Ok(())
    }

    /// Send one user action as a new turn
    pub fn send(&mut self, action: UserAction) -> Result<(), SessionError> {
        if let Some(suspension) = &self.suspended {
            return Err(SessionError::Busy(suspension.request.kind.to_string()));
        }
        let lesson_id = self.lesson_id.clone().ok_or(SessionError::NotStarted)?;

        if let Some(handler) = self.controls.get(&action.kind) {
            let request = ControlRequest {
                kind: action.kind.clone(),
                value: action.value.clone(),
                script_id: action.script_id.clone(),
            };
            tracing::info!(kind = %request.kind, "Handing off to control handler");
            handler.activate(&request);
            self.suspended = Some(Suspension { request, handler });
            return Ok(());
        }

        self.dispatch(action, &lesson_id);
        Ok(())
    }

    /// Replay the last `send()` verbatim
    pub fn resend(&mut self) -> Result<(), SessionError> {
        let original = self.last_send.clone().ok_or(SessionError::NothingToResend)?;
        let mut action = original.clone();
        // The optimistic echo from the first attempt is already there
        if action.echoes() && self.last_is_student_echo(&action.value) {
            action.display = false;
        }
        tracing::info!(kind = %action.kind, "Resending last action");
        self.send(action)?;
        self.last_send = Some(original);
        Ok(())
    }

    /// Clear the conversation, reset progress server-side, reload the tree,
    /// and start the chapter again
    pub async fn reset_chapter(&mut self, chapter_id: &str) -> Result<(), SessionError> {
        if !self.tree.is_empty() && self.tree.chapter(chapter_id).is_none() {
            return Err(SessionError::UnknownChapter(chapter_id.to_string()));
        }

        tracing::info!(chapter_id, "Resetting chapter");
        self.discard_conversation();

        self.backend
            .reset_chapter(chapter_id)
            .await
            .map_err(SessionError::History)?;
        let data = self
            .backend
            .load_tree(&self.config.course_id, Some(chapter_id))
            .await
            .map_err(SessionError::Catalog)?;
        self.tree.reload(data);

        let lesson_id = self
            .tree
            .entry_lesson(chapter_id)
            .ok_or_else(|| SessionError::UnknownChapter(chapter_id.to_string()))?;
        self.start(chapter_id, &lesson_id).await
    }

    /// Fetch the tree and apply it with the reload policy
    pub async fn load_tree(&mut self) -> Result<(), SessionError> {
        let data = self
            .backend
            .load_tree(&self.config.course_id, None)
            .await
            .map_err(SessionError::Catalog)?;
        if self.tree.is_empty() {
            self.tree = LessonTree::from_data(data);
        } else {
            self.tree.reload(data);
        }
        Ok(())
    }

    /// User click on a lesson; moves the selection only
    pub fn select_lesson(&mut self, lesson_id: &str) -> Result<(), SessionError> {
        self.tree
            .select(lesson_id)
            .map_err(|_| SessionError::UnknownLesson(lesson_id.to_string()))
    }

    /// Collapse or expand a chapter; returns the new collapsed flag
    pub fn toggle_chapter(&mut self, chapter_id: &str) -> Result<bool, SessionError> {
        self.tree
            .toggle_collapsed(chapter_id)
            .map_err(|_| SessionError::UnknownChapter(chapter_id.to_string()))
    }

    /// Like or dislike a completed message. The call itself is fire-and-forget.
    pub fn annotate(&mut self, message_id: &MessageId, feedback: Feedback) -> Result<(), SessionError> {
        let log_id = self
            .timeline
            .get(message_id)
            .filter(|m| m.is_complete)
            .and_then(|m| m.log_id.clone())
            .ok_or_else(|| SessionError::UnknownMessage(message_id.to_string()))?;

        let backend = Arc::clone(&self.backend);
        tokio::spawn(async move {
            if let Err(e) = backend.annotate(&log_id, feedback).await {
                tracing::warn!(log_id = %log_id, error = %e, "Feedback annotation failed");
            }
        });
        Ok(())
    }

    /// Completion callback of the control handler holding the flow
    pub fn complete_control(&mut self, kind: &InputKind, value: &str) -> Result<(), SessionError> {
        // A stray completion must leave the active suspension in place
        let is_active = self
            .suspended
            .as_ref()
            .is_some_and(|s| &s.request.kind == kind);
        if !is_active {
            tracing::warn!(kind = %kind, "Completion for a control that is not active");
            return Ok(());
        }
        let Some(suspension) = self.suspended.take() else {
            return Ok(());
        };

        tracing::info!(kind = %kind, "Control completed");
        match suspension.handler.complete(&suspension.request, value) {
            Some(action) => {
                let lesson_id = self.lesson_id.clone().ok_or(SessionError::NotStarted)?;
                self.dispatch(action, &lesson_id);
                Ok(())
            }
            None => {
                self.input_enabled = true;
                Ok(())
            }
        }
    }

    /// Cancel every open stream
    pub fn shutdown(&mut self) {
        for slot in self.turns.values() {
            slot.handle.cancel();
        }
        self.active_turn = None;
        self.typing = false;
        tracing::info!(open_turns = self.turns.len(), "Session shut down");
    }

    // ========================================================================
    // Turn signals
    // ========================================================================

    /// Wait for one signal and apply it. Returns false when no turn is open.
    pub async fn next_signal(&mut self) -> bool {
        if self.turns.is_empty() {
            return false;
        }
        match self.signals.recv().await {
            Some((id, signal)) => {
                self.handle_signal(id, signal);
                true
            }
            None => false,
        }
    }

    /// Process signals until every open turn has ended
    pub async fn run_until_idle(&mut self) {
        while self.next_signal().await {}
    }

    /// Apply every signal already delivered, without waiting
    pub fn process_ready(&mut self) -> usize {
        let mut processed = 0;
        while let Ok((id, signal)) = self.signals.try_recv() {
            self.handle_signal(id, signal);
            processed += 1;
        }
        processed
    }

    pub fn handle_signal(&mut self, turn_id: TurnId, signal: TurnSignal) {
        match signal {
            TurnSignal::Event(event) => self.handle_event(turn_id, event),
            TurnSignal::Failed(error) => {
                tracing::error!(turn_id, error = %error, "Turn failed");
                if self.active_turn == Some(turn_id) {
                    self.last_failure = Some(error);
                }
                self.finish_turn(turn_id);
            }
            TurnSignal::Closed => self.finish_turn(turn_id),
        }
    }

    fn handle_event(&mut self, turn_id: TurnId, event: ServerEvent) {
        let active = self.active_turn;
        let Some(slot) = self.turns.get_mut(&turn_id) else {
            tracing::debug!(turn_id, event_type = event.type_name(), "Event for a finished turn");
            return;
        };

        // Ownership is decided when the event arrives, not when the turn opened
        slot.state.superseded |= active != Some(turn_id);
        tracing::trace!(turn_id, event_type = event.type_name(), superseded = slot.state.superseded, "Event");

        let result = interpret(&slot.state, event);
        slot.state = result.new_state;
        let lesson_id = slot.state.lesson_id.clone();

        for effect in result.effects {
            self.apply_effect(turn_id, &lesson_id, effect);
        }
    }

    fn apply_effect(&mut self, turn_id: TurnId, lesson_id: &str, effect: Effect) {
        match effect {
            Effect::OpenMessage { id, fragment } => {
                let message = Message::streaming(id, fragment).with_lesson_id(Some(lesson_id.to_string()));
                self.timeline.push(message);
            }
            Effect::AppendFragment { id, fragment } => {
                if !self.timeline.append_fragment(&id, &fragment) {
                    tracing::debug!(turn_id, message_id = %id, "Fragment for a message that is no longer open");
                }
            }
            Effect::CompleteMessage { id, log_id } => {
                self.timeline.complete(&id, log_id);
            }
            Effect::SetPendingInput(pending) => {
                self.pending_input = Some(pending);
            }
            Effect::EnableInput => {
                self.input_enabled = true;
            }
            Effect::StopTyping => {
                self.typing = false;
            }
            Effect::UpdateLesson(update) => {
                if let Err(e) = self.tree.apply_lesson_update(&update) {
                    tracing::warn!(turn_id, lesson_id = %update.id, error = %e, "Ignoring lesson update");
                }
            }
            Effect::UpdateChapter(update) => {
                if let Err(e) = self.tree.apply_chapter_update(&update) {
                    tracing::warn!(turn_id, chapter_id = %update.id, error = %e, "Ignoring chapter update");
                }
            }
            Effect::SelectLesson { lesson_id } => match self.tree.select(&lesson_id) {
                Ok(()) => self.lesson_id = Some(lesson_id),
                Err(e) => tracing::warn!(turn_id, error = %e, "Ignoring lesson selection"),
            },
            Effect::InsertLessonBoundary { lesson_id } => {
                self.timeline.insert_boundary(&lesson_id);
            }
            Effect::AutoAdvance { lesson_id } => self.auto_advance(turn_id, lesson_id),
            Effect::SoftLogin { token } => {
                let backend = Arc::clone(&self.backend);
                tokio::spawn(async move {
                    if let Err(e) = backend.soft_login(&token).await {
                        tracing::warn!(error = %e, "Soft login failed");
                    }
                });
            }
            Effect::UpdateProfile { key, value } => {
                let backend = Arc::clone(&self.backend);
                tokio::spawn(async move {
                    if let Err(e) = backend.update_profile(&key, &value).await {
                        tracing::warn!(key = %key, error = %e, "Profile update failed");
                    }
                });
            }
            Effect::UpdateAskQuota(quota) => {
                self.ask_quota = quota;
            }
            Effect::AttachExtension { payload } => {
                if !self.timeline.attach_extension(payload) {
                    tracing::debug!(turn_id, "No completed message to attach extension to");
                }
            }
            Effect::SetTeacherAvatar { url } => {
                self.teacher_avatar = Some(url);
            }
        }
    }

    fn auto_advance(&mut self, from_turn: TurnId, lesson_id: String) {
        if self.auto_advance_budget == 0 {
            tracing::warn!(
                turn_id = from_turn,
                lesson_id = %lesson_id,
                limit = self.config.max_auto_advance,
                "Auto-advance limit reached"
            );
            self.input_enabled = true;
            return;
        }
        self.auto_advance_budget -= 1;

        if let Some(chapter) = self.tree.chapter_of(&lesson_id) {
            self.chapter_id = Some(chapter.id.clone());
        }
        if let Err(e) = self.tree.select(&lesson_id) {
            tracing::warn!(error = %e, "Auto-advancing into a lesson missing from the tree");
        }
        self.lesson_id = Some(lesson_id.clone());
        tracing::info!(turn_id = from_turn, lesson_id = %lesson_id, "Auto-advancing");
        self.open_turn(&UserAction::new(InputKind::Start, ""), &lesson_id);
    }

    fn finish_turn(&mut self, turn_id: TurnId) {
        if self.turns.remove(&turn_id).is_none() {
            return;
        }
        tracing::info!(turn_id, "Turn closed");
        if self.active_turn != Some(turn_id) {
            return;
        }
        self.active_turn = None;
        self.typing = false;
        self.input_enabled = true;
        if self.pending_input.is_none() {
            self.pending_input = self.last_pending.take();
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Echo, clear the prompt, and open the turn
    fn dispatch(&mut self, action: UserAction, lesson_id: &str) {
        if action.echoes() {
            self.next_local_id += 1;
            let message = Message::text(
                MessageId::local(self.next_local_id),
                Role::Student,
                action.value.clone(),
            )
            .with_lesson_id(Some(lesson_id.to_string()));
            self.timeline.push(message);
        }

        if let Some(pending) = self.pending_input.take() {
            self.last_pending = Some(pending);
        }
        self.auto_advance_budget = self.config.max_auto_advance;
        self.open_turn(&action, lesson_id);
        self.last_send = Some(action);
    }

    fn open_turn(&mut self, action: &UserAction, lesson_id: &str) -> TurnId {
        let id = self.next_turn_id;
        self.next_turn_id += 1;

        let request = TurnRequest::new(
            self.config.course_id.clone(),
            lesson_id,
            action.kind.clone(),
            action.value.clone(),
        )
        .with_script_id(action.script_id.clone())
        .with_reload_script_id(action.reload_script_id.clone())
        .with_preview_mode(self.config.preview_mode);

        let handle = self.transport.open_turn(id, &request, self.sink.clone());
        self.turns.insert(
            id,
            TurnSlot {
                state: TurnState::new(id, lesson_id),
                handle,
            },
        );
        self.active_turn = Some(id);
        self.last_failure = None;
        self.input_enabled = false;
        self.typing = true;
        id
    }

    /// Supersede every open turn and forget the conversation
    fn discard_conversation(&mut self) {
        self.active_turn = None;
        self.timeline.clear();
        self.pending_input = None;
        self.last_pending = None;
        self.typing = false;
        self.input_enabled = false;
        self.suspended = None;
    }

    fn replay(&mut self, transcript: Transcript) {
        let Transcript {
            records,
            ui,
            teacher_avatar_url,
            ask_ui,
        } = transcript;

        let mut previous_lesson: Option<String> = None;
        for record in records {
            if previous_lesson.as_deref().is_some_and(|prev| prev != record.lesson_id) {
                self.timeline.insert_boundary(&record.lesson_id);
            }
            previous_lesson = Some(record.lesson_id.clone());

            let id = MessageId::new(record.id);
            let message = match record.interaction_type.as_deref() {
                Some("active" | "control") => {
                    match serde_json::from_str::<Value>(&record.content) {
                        Ok(payload) => Message::control(id, record.role, payload),
                        Err(_) => Message::text(id, record.role, record.content),
                    }
                }
                _ => Message::text(id, record.role, record.content),
            };
            self.timeline.push(
                message
                    .with_log_id(record.log_id)
                    .with_lesson_id(Some(record.lesson_id)),
            );
        }

        if let Some(record) = ui {
            match ServerEvent::from_record(record) {
                Ok(event) => {
                    self.pending_input = PendingInput::from_event(&event);
                    self.input_enabled = self.pending_input.is_some();
                }
                Err(e) => tracing::debug!(error = %e, "Dropping unreadable pending input"),
            }
        }
        if let Some(url) = teacher_avatar_url {
            self.teacher_avatar = Some(url);
        }
        if let Some(quota) = ask_ui {
            self.ask_quota = quota;
        }
        tracing::debug!(messages = self.timeline.len(), "Transcript replayed");
    }

    fn last_is_student_echo(&self, value: &str) -> bool {
        self.timeline.last().is_some_and(|m| {
            m.role == Role::Student && m.text_content() == Some(value)
        })
    }
}

impl<T, B> Drop for SessionController<T, B>
where
    T: TurnTransport + 'static,
    B: Backend + 'static,
{
    fn drop(&mut self) {
        for slot in self.turns.values() {
            slot.handle.cancel();
        }
    }
}
