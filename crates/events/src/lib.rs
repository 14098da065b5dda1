//! Event bus and event types for flowsheet sessions.
//!
//! Every dispatched operation, phase transition, fallback invocation and
//! degradation is published here; the server streams them over SSE.

mod bus;
mod types;

pub use bus::EventBus;
pub use types::*;
