//! Relay controller: session lifecycle plus per-message relay.

mod controller;
mod handler;
mod policy;

pub use controller::{RelayController, RunOutcome};
pub use handler::{FilterReason, RelayHandler, RelayOutcome, filter_message};
pub use policy::{ConnectionState, ReconnectPolicy, ReplyDelay};
