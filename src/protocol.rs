//! Wire protocol for study turns
//!
//! Outbound turn requests, inbound typed events, and the SSE frame decoder
//! that sits between the byte stream and the event parser.

pub mod event;
pub mod request;
pub mod sse;

pub use event::{
    AskQuota, ButtonOption, DecodeError, EventRecord, OptionsKind, ServerEvent, StatusUpdate,
    TextInputKind,
};
pub use request::{InputKind, TurnRequest};
pub use sse::SseDecoder;
