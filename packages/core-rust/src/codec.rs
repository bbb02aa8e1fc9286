//! Wire codec for [`Envelope`]s.
//!
//! Envelopes are encoded as named `MsgPack` maps via `rmp_serde::to_vec_named()`.
//! Framing is the channel adapter's concern; one encoded envelope is one frame.

use anyhow::Context;

use crate::envelope::Envelope;

/// Encodes an envelope into a single frame.
///
/// # Errors
///
/// Returns an error if a payload value cannot be represented in `MsgPack`.
pub fn encode(envelope: &Envelope) -> anyhow::Result<Vec<u8>> {
    rmp_serde::to_vec_named(envelope)
        .with_context(|| format!("failed to encode {} envelope {}", envelope.kind, envelope.id))
}

/// Decodes a frame produced by [`encode`].
///
/// # Errors
///
/// Returns an error if the frame is truncated or is not an envelope map.
pub fn decode(frame: &[u8]) -> anyhow::Result<Envelope> {
    rmp_serde::from_slice(frame).with_context(|| format!("malformed envelope ({} bytes)", frame.len()))
}
