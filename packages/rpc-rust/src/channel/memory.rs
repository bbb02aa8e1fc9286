//! In-process channel pair backed by bounded tokio mpsc queues.
//!
//! Each direction gets its own queue, so frames from one endpoint reach the
//! other in send order while the two directions stay independent.

use async_trait::async_trait;
use bytes::Bytes;
use tether_core::Endpoint;
use tokio::sync::mpsc;

use crate::error::ChannelError;
use crate::traits::ChannelAdapter;

/// One frame in flight, tagged with the endpoint that sent it.
#[derive(Debug, Clone)]
pub struct Frame {
    pub from: Endpoint,
    pub bytes: Bytes,
}

/// Sending half owned by one endpoint.
///
/// Only the counterpart endpoint is reachable through it.
#[derive(Debug, Clone)]
pub struct MemoryChannel {
    local: Endpoint,
    tx: mpsc::Sender<Frame>,
}

/// Both ends of one endpoint's view: its sender and the queue it drains.
pub type EndpointHalf = (MemoryChannel, mpsc::Receiver<Frame>);

impl MemoryChannel {
    /// Creates a connected pair: `(initiator, responder)`.
    ///
    /// Each half holds the sender towards the other endpoint and the receiver
    /// for frames addressed to itself.
    #[must_use]
    pub fn pair(capacity: usize) -> (EndpointHalf, EndpointHalf) {
        let (to_responder, responder_rx) = mpsc::channel(capacity.max(1));
        let (to_initiator, initiator_rx) = mpsc::channel(capacity.max(1));
        (
            (
                Self {
                    local: Endpoint::Initiator,
                    tx: to_responder,
                },
                initiator_rx,
            ),
            (
                Self {
                    local: Endpoint::Responder,
                    tx: to_initiator,
                },
                responder_rx,
            ),
        )
    }

    fn frame_for(&self, to: Endpoint, bytes: Bytes) -> Result<Frame, ChannelError> {
        if to != self.local.counterpart() {
            return Err(ChannelError::Misrouted { to });
        }
        Ok(Frame {
            from: self.local,
            bytes,
        })
    }
}

#[async_trait]
impl ChannelAdapter for MemoryChannel {
    async fn send(&self, to: Endpoint, frame: Bytes) -> Result<(), ChannelError> {
        let frame = self.frame_for(to, frame)?;
        self.tx.send(frame).await.map_err(|_| ChannelError::Closed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
