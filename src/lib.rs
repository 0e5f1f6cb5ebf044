//! Tutor session engine
//!
//! Client-side driver for turn-based tutoring conversations streamed over
//! server-sent events: event decoding, a pure event interpreter, the message
//! timeline, the lesson tree state machine, and the session controller that
//! ties them together.

pub mod config;
pub mod error;
pub mod interpreter;
pub mod markdown;
pub mod protocol;
pub mod session;
pub mod timeline;
pub mod transport;
pub mod tree;

pub use config::SessionConfig;
pub use error::{BackendError, SessionError, TransportError, TransportErrorKind};
pub use session::{SessionController, UserAction};
