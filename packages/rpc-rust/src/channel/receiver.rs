//! Delivery loop feeding received frames into a [`FrameHandler`].

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use super::memory::Frame;
use crate::traits::FrameHandler;

/// Background task draining one endpoint's inbound queue.
///
/// The loop exits when the queue closes or `stop()` is called. Frames are
/// handed to the handler one at a time, in arrival order.
/// Dropping the handle also ends the loop, after the queued frames.
pub struct ReceiveLoop {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<u64>>,
}

impl ReceiveLoop {
    /// Spawns the loop on the current tokio runtime.
    pub fn start(mut rx: mpsc::Receiver<Frame>, handler: Arc<dyn FrameHandler>) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut delivered = 0u64;
            loop {
                // Queued frames are delivered before a pending shutdown is honoured.
                tokio::select! {
                    biased;
                    frame = rx.recv() => {
                        match frame {
                            Some(frame) => {
                                handler.on_receive(frame.from, frame.bytes);
                                delivered += 1;
                            }
                            None => break,
                        }
                    }
                    _ = &mut shutdown_rx => {
                        break;
                    }
                }
            }
            debug!(delivered, "receive loop exited");
            delivered
        });

        Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Stops the loop and returns the number of frames it delivered.
    pub async fn stop(&mut self) -> u64 {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        match self.handle.take() {
            Some(handle) => handle.await.unwrap_or(0),
            None => 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
