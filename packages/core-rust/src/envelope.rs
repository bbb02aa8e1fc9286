//! Invocation envelope: the single message unit exchanged between endpoints.
//!
//! All structs use `#[serde(rename_all = "camelCase")]` and are encoded with
//! `rmp_serde::to_vec_named()` so the wire form is a self-describing map.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hook::Phase;
use crate::types::Payload;

/// Identifier correlating a request with its response.
///
/// Unique among the calls currently pending on one RPC object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(pub u64);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One of the two asymmetric endpoints joined by the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Endpoint {
    Initiator,
    Responder,
}

impl Endpoint {
    /// The endpoint on the other end of the channel.
    #[must_use]
    pub const fn counterpart(self) -> Self {
        match self {
            Self::Initiator => Self::Responder,
            Self::Responder => Self::Initiator,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Initiator => "initiator",
            Self::Responder => "responder",
        })
    }
}

/// Direction and reply expectation of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnvelopeKind {
    /// Caller to callee; the caller awaits a `Response` with the same id.
    Request,
    /// Caller to callee; fire-and-forget, never answered.
    Notify,
    /// Callee to caller; answers the `Request` with the same id.
    Response,
}

impl EnvelopeKind {
    /// Whether the envelope travels from caller to callee.
    #[must_use]
    pub const fn is_inbound_call(self) -> bool {
        matches!(self, Self::Request | Self::Notify)
    }
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Request => "request",
            Self::Notify => "notify",
            Self::Response => "response",
        })
    }
}

/// Failure reported by the callee in place of a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Fault {
    /// A callee-side hook failed while the callee's warn flag was off.
    Hook { phase: Phase, message: String },
    /// The callee's request callback failed.
    Callback { message: String },
    /// No RPC object with the addressed name exists on the callee.
    UnknownRemote { name: String },
}

/// One message unit: call identifier, direction tag and payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Name of the RPC object the envelope is addressed to.
    pub remote: String,
    pub id: CallId,
    pub kind: EnvelopeKind,
    pub payload: Payload,
    /// Set only on responses that report a callee-side failure.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fault: Option<Fault>,
}

impl Envelope {
    #[must_use]
    pub fn request(remote: impl Into<String>, id: CallId, payload: Payload) -> Self {
        Self::new(remote, id, EnvelopeKind::Request, payload)
    }

    #[must_use]
    pub fn notify(remote: impl Into<String>, id: CallId, payload: Payload) -> Self {
        Self::new(remote, id, EnvelopeKind::Notify, payload)
    }

    #[must_use]
    pub fn response(remote: impl Into<String>, id: CallId, payload: Payload) -> Self {
        Self::new(remote, id, EnvelopeKind::Response, payload)
    }

    /// A response carrying a fault and an empty payload.
    #[must_use]
    pub fn fault(remote: impl Into<String>, id: CallId, fault: Fault) -> Self {
        Self {
            fault: Some(fault),
            ..Self::new(remote, id, EnvelopeKind::Response, Payload::empty())
        }
    }

    fn new(remote: impl Into<String>, id: CallId, kind: EnvelopeKind, payload: Payload) -> Self {
        Self {
            remote: remote.into(),
            id,
            kind,
            payload,
            fault: None,
        }
    }
}
