//! Event interpreter
//!
//! Pure reducer over study events, in the Elm style: given the turn-local
//! state and one event it returns the next state plus the effects the
//! session controller must apply. No I/O happens here.

mod effect;
mod reduce;
mod state;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use reduce::{interpret, Interpretation};
pub use state::{InputPrompt, PendingInput, PendingInputKind, TurnState};
