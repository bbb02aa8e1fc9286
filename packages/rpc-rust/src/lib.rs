//! Tether RPC: promise-style calls with a phase-scoped hook pipeline over a
//! pair of one-way channels.

pub mod channel;
pub mod config;
pub mod correlation;
pub mod error;
pub mod hooks;
pub mod registry;
pub mod remote;
pub mod traits;

#[cfg(test)]
pub(crate) mod testkit;

pub use config::RemoteConfig;
pub use correlation::{CorrelationTable, Outcome, PendingCall};
pub use error::{ChannelError, RemoteError};
pub use hooks::{HookCall, HookEntry, HookPipeline};
pub use registry::RemoteRegistry;
pub use remote::{LifecycleState, RemoteObject, RequestHandler};
pub use traits::{ChannelAdapter, FrameHandler};

pub use tether_core::{
    payload, CallId, Endpoint, Envelope, EnvelopeKind, Fault, HookList, HookScope, Payload, Phase,
    Side, Value,
};
