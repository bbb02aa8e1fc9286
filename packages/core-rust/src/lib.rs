//! Tether Core: the data model shared by both endpoints and its wire codec.

pub mod codec;
pub mod envelope;
pub mod hook;
pub mod types;

pub use envelope::{CallId, Endpoint, Envelope, EnvelopeKind, Fault};
pub use hook::{HookList, HookScope, Phase, Side};
pub use types::{Payload, Value};
