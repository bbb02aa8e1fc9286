//! Test fixtures: a live two-endpoint loopback and a capturing channel for
//! tests that control delivery order themselves.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tether_core::Endpoint;
use tokio::sync::{mpsc, Mutex};

use crate::channel::{MemoryChannel, ReceiveLoop};
use crate::config::RemoteConfig;
use crate::error::ChannelError;
use crate::registry::RemoteRegistry;
use crate::remote::RemoteObject;
use crate::traits::{ChannelAdapter, FrameHandler};

/// Two registries joined by a `MemoryChannel`, each with a running receive loop.
pub(crate) struct Loopback {
    pub initiator: Arc<RemoteRegistry>,
    pub responder: Arc<RemoteRegistry>,
    _loops: Vec<ReceiveLoop>,
}

impl Loopback {
    pub fn new(config: RemoteConfig) -> Self {
        let ((initiator_chan, initiator_rx), (responder_chan, responder_rx)) =
            MemoryChannel::pair(config.channel_capacity);
        let config = Arc::new(config);
        let initiator = Arc::new(RemoteRegistry::new(
            Endpoint::Initiator,
            Arc::new(initiator_chan),
            Arc::clone(&config),
        ));
        let responder = Arc::new(RemoteRegistry::new(
            Endpoint::Responder,
            Arc::new(responder_chan),
            config,
        ));
        let loops = vec![
            ReceiveLoop::start(initiator_rx, Arc::clone(&initiator) as Arc<dyn FrameHandler>),
            ReceiveLoop::start(responder_rx, Arc::clone(&responder) as Arc<dyn FrameHandler>),
        ];
        Self {
            initiator,
            responder,
            _loops: loops,
        }
    }

    /// Creates `name` on both endpoints: `(initiator side, responder side)`.
    pub fn remote(&self, name: &str) -> (Arc<RemoteObject>, Arc<RemoteObject>) {
        (
            self.initiator.create(name).expect("initiator remote"),
            self.responder.create(name).expect("responder remote"),
        )
    }
}

/// Channel that records every frame instead of delivering it.
#[derive(Clone)]
pub(crate) struct CapturingChannel {
    tx: mpsc::UnboundedSender<Bytes>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Bytes>>>,
    config: Arc<RemoteConfig>,
}

impl CapturingChannel {
    pub fn new() -> Self {
        Self::with_config(RemoteConfig::default())
    }

    pub fn with_config(config: RemoteConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            config: Arc::new(config),
        }
    }

    /// A registry whose outbound frames land in this channel.
    pub fn registry(&self, role: Endpoint) -> Arc<RemoteRegistry> {
        Arc::new(RemoteRegistry::new(
            role,
            Arc::new(self.clone()),
            Arc::clone(&self.config),
        ))
    }

    /// Waits for the next `n` captured frames.
    pub async fn take(&self, n: usize) -> Vec<Bytes> {
        let mut rx = self.rx.lock().await;
        let mut frames = Vec::with_capacity(n);
        while frames.len() < n {
            frames.push(rx.recv().await.expect("capture sender is held by self"));
        }
        frames
    }

    /// The next captured frame, if one is already queued.
    pub fn try_take(&self) -> Option<Bytes> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }
}

#[async_trait]
impl ChannelAdapter for CapturingChannel {
    async fn send(&self, _to: Endpoint, frame: Bytes) -> Result<(), ChannelError> {
        self.tx.send(frame).map_err(|_| ChannelError::Closed)
    }
}

/// Hands a frame to a registry as if its counterpart had sent it.
pub(crate) trait Deliver {
    fn deliver(&self, frame: Bytes);
}

impl Deliver for RemoteRegistry {
    fn deliver(&self, frame: Bytes) {
        self.on_receive(self.role().counterpart(), frame);
    }
}
