//! Hook classification shared by both endpoints: phases, lists, scopes, sides.
//!
//! These are plain data so that faults reported over the wire can name the
//! phase in which a remote hook failed.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which side of a single call the local engine is acting as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Side {
    /// The endpoint that issued the call and awaits the response.
    Caller,
    /// The endpoint that received the request and runs the callback.
    Callee,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Caller => "caller",
            Self::Callee => "callee",
        })
    }
}

/// The two ordered hook lists an RPC object owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HookList {
    Inbound,
    Outbound,
}

impl fmt::Display for HookList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        })
    }
}

/// Firing point of a hook within one invocation.
///
/// Order of a full round trip:
/// 1. `OutboundPostDispatch` (caller, arguments supplied)
/// 2. `OutboundPreSend` (caller, request about to be sent)
/// 3. `InboundPreDispatch` (callee, before the callback)
/// 4. `OutboundPostDispatch` (callee, callback produced a result)
/// 5. `OutboundPreSend` (callee, response about to be sent)
/// 6. `InboundPreResponse` (caller, before the pending call resolves)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    InboundPreDispatch,
    InboundPreResponse,
    OutboundPostDispatch,
    OutboundPreSend,
}

impl Phase {
    /// The hook list entries of this phase are registered on.
    #[must_use]
    pub const fn list(self) -> HookList {
        match self {
            Self::InboundPreDispatch | Self::InboundPreResponse => HookList::Inbound,
            Self::OutboundPostDispatch | Self::OutboundPreSend => HookList::Outbound,
        }
    }

    /// Whether this phase ever occurs on the given side of a call.
    ///
    /// Inbound phases are side-specific; outbound phases occur on both.
    #[must_use]
    pub const fn occurs_on(self, side: Side) -> bool {
        match self {
            Self::InboundPreDispatch => matches!(side, Side::Callee),
            Self::InboundPreResponse => matches!(side, Side::Caller),
            Self::OutboundPostDispatch | Self::OutboundPreSend => true,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InboundPreDispatch => "inbound-pre-dispatch",
            Self::InboundPreResponse => "inbound-pre-response",
            Self::OutboundPostDispatch => "outbound-post-dispatch",
            Self::OutboundPreSend => "outbound-pre-send",
        })
    }
}

/// Context a hook is registered for: on which side(s) of a call it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HookScope {
    /// Runs on both sides.
    #[default]
    Shared,
    /// Runs only while this endpoint is the caller.
    Caller,
    /// Runs only while this endpoint is the callee.
    Callee,
}

impl HookScope {
    #[must_use]
    pub const fn applies_to(self, side: Side) -> bool {
        match self {
            Self::Shared => true,
            Self::Caller => matches!(side, Side::Caller),
            Self::Callee => matches!(side, Side::Callee),
        }
    }
}
