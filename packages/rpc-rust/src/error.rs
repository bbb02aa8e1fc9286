use tether_core::{CallId, Endpoint, Fault, HookList, Phase};

/// Error returned when handing a frame to the channel fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The receiving side has gone away.
    #[error("channel closed")]
    Closed,
    /// The frame was addressed to an endpoint this channel does not reach.
    #[error("no route to {to}")]
    Misrouted { to: Endpoint },
}

/// Errors observed through a failed call, or returned by the setup API.
///
/// `Clone` so a single teardown error can fail every pending call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    #[error("call id {id} is already pending on remote {remote}")]
    DuplicateId { remote: String, id: CallId },
    #[error("hook failed during {phase}: {message}")]
    HookFailure { phase: Phase, message: String },
    #[error("request callback failed: {message}")]
    CallbackFailure { message: String },
    #[error("remote {remote} was torn down while the call was pending")]
    Cancelled { remote: String },
    #[error("call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("no pending call with id {id}")]
    UnmatchedResponse { id: CallId },
    #[error("remote {remote} is already accepting traffic")]
    AlreadyStarted { remote: String },
    #[error("{phase} hooks cannot be registered on the {list} list")]
    PhaseMismatch { phase: Phase, list: HookList },
    #[error("unknown remote: {name}")]
    UnknownRemote { name: String },
    #[error("remote already registered: {name}")]
    DuplicateRemote { name: String },
    #[error("remote {remote} has {limit} calls pending, try again later")]
    Overloaded { remote: String, limit: usize },
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
    #[error("codec error: {message}")]
    Codec { message: String },
}

impl RemoteError {
    /// Converts a callee-side failure into the fault sent back to the caller.
    pub(crate) fn into_fault(self) -> Fault {
        match self {
            Self::HookFailure { phase, message } => Fault::Hook { phase, message },
            Self::UnknownRemote { name } => Fault::UnknownRemote { name },
            Self::CallbackFailure { message } => Fault::Callback { message },
            other => Fault::Callback {
                message: other.to_string(),
            },
        }
    }

    pub(crate) fn codec(err: &anyhow::Error) -> Self {
        Self::Codec {
            message: format!("{err:#}"),
        }
    }
}

impl From<Fault> for RemoteError {
    fn from(fault: Fault) -> Self {
        match fault {
            Fault::Hook { phase, message } => Self::HookFailure { phase, message },
            Fault::Callback { message } => Self::CallbackFailure { message },
            Fault::UnknownRemote { name } => Self::UnknownRemote { name },
        }
    }
}
