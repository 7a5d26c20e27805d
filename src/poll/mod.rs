//! Poll entity and state machine.
//!
//! A [`Poll`] is a pure value object: one question, 2–6 options, a vote tally
//! and an `Active → Completed` lifecycle. It knows nothing about connections;
//! the coordinator owns it and drives every transition.

mod state;
mod types;

pub use state::Poll;
pub use types::{CloseReason, OptionSnapshot, PollSnapshot, PollStatus};
