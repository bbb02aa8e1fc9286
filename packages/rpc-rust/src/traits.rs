use async_trait::async_trait;
use bytes::Bytes;
use tether_core::Endpoint;

use crate::error::ChannelError;

/// Outbound half of the one-way channel pair between two endpoints.
/// Implementations: in-memory `MemoryChannel` (tests, loopback demo).
///
/// Frames sent in one direction arrive in send order. Nothing is guaranteed
/// across restarts and nothing is acknowledged.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Hand one encoded envelope to the channel, addressed to `to`.
    async fn send(&self, to: Endpoint, frame: Bytes) -> Result<(), ChannelError>;
}

/// Inbound half: invoked once per frame delivered to this endpoint.
///
/// Must not block; long-running work is spawned by the implementor.
pub trait FrameHandler: Send + Sync {
    fn on_receive(&self, from: Endpoint, frame: Bytes);
}
