//! Mock implementations for testing
//!
//! These mocks let controller scenarios run without a server.

use super::traits::*;
use crate::error::{BackendError, TransportError};
use crate::protocol::{ServerEvent, TurnRequest};
use crate::transport::{TurnHandle, TurnId, TurnSignal, TurnSink, TurnTransport};
use crate::tree::TreeData;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Mock Transport
// ============================================================================

/// Records every opened turn. A queued script is played into the turn as
/// soon as it opens; turns without a script stay open until signals are
/// pushed by hand.
#[derive(Default)]
pub struct MockTransport {
    scripts: Mutex<VecDeque<Vec<TurnSignal>>>,
    sinks: Mutex<HashMap<TurnId, TurnSink>>,
    handles: Mutex<Vec<TurnHandle>>,
    /// Record of all requests made
    pub requests: Mutex<Vec<(TurnId, TurnRequest)>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue the signals for the next turn that opens
    pub fn queue_turn(&self, signals: Vec<TurnSignal>) {
        self.scripts.lock().unwrap().push_back(signals);
    }

    /// Queue a turn that plays `events` and then closes
    pub fn queue_events(&self, events: Vec<ServerEvent>) {
        let mut signals: Vec<TurnSignal> = events.into_iter().map(TurnSignal::Event).collect();
        signals.push(TurnSignal::Closed);
        self.queue_turn(signals);
    }

    /// Deliver a signal to a turn opened without a script
    pub fn push(&self, id: TurnId, signal: TurnSignal) {
        let sinks = self.sinks.lock().unwrap();
        let sink = sinks.get(&id).expect("turn was opened without a script");
        sink.send((id, signal)).unwrap();
    }

    pub fn push_event(&self, id: TurnId, event: ServerEvent) {
        self.push(id, TurnSignal::Event(event));
    }

    pub fn close(&self, id: TurnId) {
        self.push(id, TurnSignal::Closed);
    }

    pub fn fail(&self, id: TurnId, error: TransportError) {
        self.push(id, TurnSignal::Failed(error));
    }

    pub fn recorded_requests(&self) -> Vec<TurnRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, request)| request.clone())
            .collect()
    }

    pub fn last_turn_id(&self) -> Option<TurnId> {
        self.requests.lock().unwrap().last().map(|(id, _)| *id)
    }

    pub fn cancelled(&self) -> Vec<TurnId> {
        self.handles
            .lock()
            .unwrap()
            .iter()
            .filter(|h| h.is_cancelled())
            .map(|h| h.id)
            .collect()
    }
}

impl TurnTransport for MockTransport {
    fn open_turn(&self, id: TurnId, request: &TurnRequest, sink: TurnSink) -> TurnHandle {
        self.requests.lock().unwrap().push((id, request.clone()));
        let handle = TurnHandle::new(id, CancellationToken::new());
        self.handles.lock().unwrap().push(handle.clone());

        match self.scripts.lock().unwrap().pop_front() {
            Some(signals) => {
                for signal in signals {
                    sink.send((id, signal)).unwrap();
                }
            }
            None => {
                self.sinks.lock().unwrap().insert(id, sink);
            }
        }
        handle
    }
}

// ============================================================================
// Mock Backend
// ============================================================================

/// In-memory history, catalog, feedback, and account collaborators
#[derive(Default)]
pub struct MockBackend {
    transcripts: Mutex<HashMap<String, VecDeque<Transcript>>>,
    trees: Mutex<VecDeque<TreeData>>,
    tree: Mutex<TreeData>,
    history_error: Mutex<Option<BackendError>>,
    /// Record of chapter resets
    pub resets: Mutex<Vec<String>>,
    /// Record of tree loads as `(course_id, chapter scope)`
    pub tree_loads: Mutex<Vec<(String, Option<String>)>>,
    pub feedback: Mutex<Vec<(String, Feedback)>>,
    pub logins: Mutex<Vec<String>>,
    pub profile: Mutex<Vec<(String, Value)>>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_tree(tree: TreeData) -> Arc<Self> {
        let backend = Self::default();
        *backend.tree.lock().unwrap() = tree;
        Arc::new(backend)
    }

    /// Queue a transcript for the next load of `chapter_id`
    pub fn queue_transcript(&self, chapter_id: &str, transcript: Transcript) {
        self.transcripts
            .lock()
            .unwrap()
            .entry(chapter_id.to_string())
            .or_default()
            .push_back(transcript);
    }

    /// Queue the tree returned by the next load; later loads fall back to
    /// the default tree
    pub fn queue_tree(&self, tree: TreeData) {
        self.trees.lock().unwrap().push_back(tree);
    }

    pub fn fail_next_history(&self, error: BackendError) {
        *self.history_error.lock().unwrap() = Some(error);
    }

    pub fn recorded_feedback(&self) -> Vec<(String, Feedback)> {
        self.feedback.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistoryClient for MockBackend {
    async fn load_transcript(
        &self,
        chapter_id: &str,
        _preview_mode: bool,
    ) -> Result<Transcript, BackendError> {
        if let Some(error) = self.history_error.lock().unwrap().take() {
            return Err(error);
        }
        Ok(self
            .transcripts
            .lock()
            .unwrap()
            .get_mut(chapter_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default())
    }

    async fn reset_chapter(&self, chapter_id: &str) -> Result<(), BackendError> {
        self.resets.lock().unwrap().push(chapter_id.to_string());
        Ok(())
    }
}

#[async_trait]
impl CatalogClient for MockBackend {
    async fn load_tree(
        &self,
        course_id: &str,
        chapter_id: Option<&str>,
    ) -> Result<TreeData, BackendError> {
        self.tree_loads
            .lock()
            .unwrap()
            .push((course_id.to_string(), chapter_id.map(str::to_string)));
        let queued = self.trees.lock().unwrap().pop_front();
        Ok(queued.unwrap_or_else(|| self.tree.lock().unwrap().clone()))
    }
}

#[async_trait]
impl FeedbackClient for MockBackend {
    async fn annotate(&self, log_id: &str, feedback: Feedback) -> Result<(), BackendError> {
        self.feedback
            .lock()
            .unwrap()
            .push((log_id.to_string(), feedback));
        Ok(())
    }
}

#[async_trait]
impl AccountSink for MockBackend {
    async fn soft_login(&self, token: &str) -> Result<(), BackendError> {
        self.logins.lock().unwrap().push(token.to_string());
        Ok(())
    }

    async fn update_profile(&self, key: &str, value: &Value) -> Result<(), BackendError> {
        self.profile
            .lock()
            .unwrap()
            .push((key.to_string(), value.clone()));
        Ok(())
    }
}
