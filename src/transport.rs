//! Transport client
//!
//! One streaming connection per turn. Every signal a turn produces is tagged
//! with its [`TurnId`] and pushed into a single channel owned by the session
//! controller, so events from several overlapping turns can arrive
//! interleaved and are told apart at arrival time.

pub mod http;

pub use http::{HttpBackend, HttpTransport};

use crate::error::TransportError;
use crate::protocol::{ServerEvent, TurnRequest};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

pub type TurnId = u64;

/// What a turn reports back to the controller
#[derive(Debug, Clone, PartialEq)]
pub enum TurnSignal {
    Event(ServerEvent),
    /// Connection-level failure; terminal
    Failed(TransportError),
    /// Stream ended normally or was cancelled; terminal
    Closed,
}

/// Channel every turn of one session writes into
pub type TurnSink = mpsc::UnboundedSender<(TurnId, TurnSignal)>;
pub type TurnStream = mpsc::UnboundedReceiver<(TurnId, TurnSignal)>;

pub fn turn_channel() -> (TurnSink, TurnStream) {
    mpsc::unbounded_channel()
}

/// Handle to an open turn
#[derive(Debug, Clone)]
pub struct TurnHandle {
    pub id: TurnId,
    cancel: CancellationToken,
}

impl TurnHandle {
    pub fn new(id: TurnId, cancel: CancellationToken) -> Self {
        Self { id, cancel }
    }

    /// Stop reading the stream; the turn still reports `Closed`
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Opens streaming turns
pub trait TurnTransport: Send + Sync {
    /// Start a turn. Must not block: the stream is read in the background
    /// and every signal for `id` is delivered through `sink`.
    fn open_turn(&self, id: TurnId, request: &TurnRequest, sink: TurnSink) -> TurnHandle;
}

impl<T: TurnTransport + ?Sized> TurnTransport for Arc<T> {
    fn open_turn(&self, id: TurnId, request: &TurnRequest, sink: TurnSink) -> TurnHandle {
        (**self).open_turn(id, request, sink)
    }
}

/// Session token shared by every request of a session. A soft login replaces
/// it and the next request picks it up.
#[derive(Debug, Clone, Default)]
pub struct SessionToken(Arc<RwLock<Option<String>>>);

impl SessionToken {
    pub fn new(token: Option<String>) -> Self {
        Self(Arc::new(RwLock::new(token)))
    }

    pub async fn get(&self) -> Option<String> {
        self.0.read().await.clone()
    }

    pub async fn set(&self, token: impl Into<String>) {
        *self.0.write().await = Some(token.into());
    }
}
