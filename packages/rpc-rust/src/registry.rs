//! Name-to-remote registry for one endpoint, and the routing of inbound frames.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use tether_core::{codec, CallId, Endpoint, Envelope, EnvelopeKind, Fault, Payload};
use tracing::{debug, info, warn};

use crate::config::RemoteConfig;
use crate::correlation::PendingCall;
use crate::error::RemoteError;
use crate::remote::RemoteObject;
use crate::traits::{ChannelAdapter, FrameHandler};

/// All remotes living on one endpoint, sharing one channel.
///
/// Remotes are started in creation order and torn down in reverse order.
pub struct RemoteRegistry {
    role: Endpoint,
    adapter: Arc<dyn ChannelAdapter>,
    config: Arc<RemoteConfig>,
    remotes: DashMap<Arc<str>, Arc<RemoteObject>>,
    /// Creation order for deterministic start/teardown sequencing.
    order: RwLock<Vec<Arc<str>>>,
}

impl RemoteRegistry {
    #[must_use]
    pub fn new(role: Endpoint, adapter: Arc<dyn ChannelAdapter>, config: Arc<RemoteConfig>) -> Self {
        Self {
            role,
            adapter,
            config,
            remotes: DashMap::new(),
            order: RwLock::new(Vec::new()),
        }
    }

    /// Creates a remote in its setup state.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::DuplicateRemote` if `name` is taken.
    pub fn create(&self, name: &str) -> Result<Arc<RemoteObject>, RemoteError> {
        let key: Arc<str> = Arc::from(name);
        match self.remotes.entry(key.clone()) {
            Entry::Occupied(_) => Err(RemoteError::DuplicateRemote {
                name: name.to_string(),
            }),
            Entry::Vacant(slot) => {
                let remote = Arc::new(RemoteObject::new(
                    key.clone(),
                    self.role,
                    Arc::clone(&self.adapter),
                    Arc::clone(&self.config),
                ));
                slot.insert(Arc::clone(&remote));
                self.order.write().push(key);
                debug!(remote = name, role = %self.role, "remote created");
                Ok(remote)
            }
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<RemoteObject>> {
        self.remotes.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Names in creation order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.order.read().iter().map(ToString::to_string).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.remotes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remotes.is_empty()
    }

    #[must_use]
    pub fn role(&self) -> Endpoint {
        self.role
    }

    /// Ends setup on every remote.
    pub fn start(&self) {
        for name in self.order.read().iter() {
            if let Some(remote) = self.get(name) {
                remote.start();
            }
        }
        info!(role = %self.role, remotes = self.len(), "registry started");
    }

    /// Calls `target` with `args`.
    ///
    /// An unknown target yields a future already failed with
    /// `RemoteError::UnknownRemote`.
    pub fn invoke(&self, target: &str, args: Payload) -> PendingCall {
        match self.get(target) {
            Some(remote) => remote.invoke(args),
            None => PendingCall::failed(
                CallId(0),
                Arc::from(target),
                RemoteError::UnknownRemote {
                    name: target.to_string(),
                },
            ),
        }
    }

    /// Fire-and-forget call to `target`.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::UnknownRemote` if no remote is named `target`.
    pub fn notify(&self, target: &str, args: Payload) -> Result<CallId, RemoteError> {
        self.get(target)
            .map(|remote| remote.notify(args))
            .ok_or_else(|| RemoteError::UnknownRemote {
                name: target.to_string(),
            })
    }

    /// Tears every remote down in reverse creation order and returns the
    /// total number of pending calls cancelled.
    pub fn teardown(&self) -> usize {
        let order: Vec<Arc<str>> = self.order.read().iter().rev().cloned().collect();
        let cancelled: usize = order
            .iter()
            .filter_map(|name| self.get(name))
            .map(|remote| remote.teardown())
            .sum();
        info!(role = %self.role, cancelled, "registry torn down");
        cancelled
    }

    fn reply_unknown(&self, envelope: &Envelope) {
        let fault = Envelope::fault(
            envelope.remote.clone(),
            envelope.id,
            Fault::UnknownRemote {
                name: envelope.remote.clone(),
            },
        );
        let frame = match codec::encode(&fault) {
            Ok(frame) => Bytes::from(frame),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "fault response not encoded");
                return;
            }
        };
        let adapter = Arc::clone(&self.adapter);
        let to = self.role.counterpart();
        tokio::spawn(async move {
            if let Err(err) = adapter.send(to, frame).await {
                warn!(error = %err, "fault response not sent");
            }
        });
    }
}

impl FrameHandler for RemoteRegistry {
    fn on_receive(&self, from: Endpoint, frame: Bytes) {
        if from != self.role.counterpart() {
            warn!(role = %self.role, %from, "frame from unexpected endpoint dropped");
            return;
        }
        let envelope = match codec::decode(&frame) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(role = %self.role, error = %format!("{err:#}"), "malformed frame dropped");
                return;
            }
        };

        match self.get(&envelope.remote) {
            Some(remote) => remote.receive(envelope),
            None if envelope.kind == EnvelopeKind::Request => {
                debug!(remote = %envelope.remote, id = envelope.id.0, "request for unknown remote");
                self.reply_unknown(&envelope);
            }
            None => {
                debug!(
                    remote = %envelope.remote,
                    id = envelope.id.0,
                    kind = %envelope.kind,
                    "envelope for unknown remote dropped"
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
