//! Caller-side bookkeeping for in-flight calls.
//!
//! The table maps a [`CallId`] to a oneshot resolver. Each record is removed
//! from the map before its resolver fires, so a record settles exactly once
//! even when a response, a deadline and a teardown race for it.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tether_core::{CallId, Payload};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use crate::error::RemoteError;

/// Final result of a call as observed by its caller.
pub type Outcome = Result<Payload, RemoteError>;

// ---------------------------------------------------------------------------
// PendingInvocation
// ---------------------------------------------------------------------------

struct PendingInvocation {
    resolver: oneshot::Sender<Outcome>,
    registered_at: Instant,
    deadline: Option<AbortHandle>,
}

impl PendingInvocation {
    fn settle(self, outcome: Outcome) -> Duration {
        if let Some(deadline) = self.deadline {
            deadline.abort();
        }
        // The caller may have dropped its future; nothing to deliver then.
        let _ = self.resolver.send(outcome);
        self.registered_at.elapsed()
    }
}

#[derive(Default)]
struct TableState {
    pending: HashMap<CallId, PendingInvocation>,
    /// Set once by `cancel_all`; later registrations fail with this error.
    closed: Option<RemoteError>,
}

// ---------------------------------------------------------------------------
// CorrelationTable
// ---------------------------------------------------------------------------

/// Per-remote map of pending invocations. The only mutator of its records.
pub struct CorrelationTable {
    remote: Arc<str>,
    max_pending: usize,
    state: Mutex<TableState>,
}

impl CorrelationTable {
    #[must_use]
    pub fn new(remote: Arc<str>, max_pending: usize) -> Self {
        Self {
            remote,
            max_pending,
            state: Mutex::new(TableState::default()),
        }
    }

    /// Adds a waiting record for `id` and returns the future it resolves.
    ///
    /// # Errors
    ///
    /// - the error passed to `cancel_all` once the table has been closed
    /// - `RemoteError::DuplicateId` if `id` is already pending
    /// - `RemoteError::Overloaded` if `max_pending` records are outstanding
    pub fn register(&self, id: CallId) -> Result<PendingCall, RemoteError> {
        let mut state = self.state.lock();
        if let Some(err) = &state.closed {
            return Err(err.clone());
        }
        if state.pending.contains_key(&id) {
            return Err(RemoteError::DuplicateId {
                remote: self.remote.to_string(),
                id,
            });
        }
        let pending_len = state.pending.len();
        if pending_len >= self.max_pending {
            tracing::warn!(
                remote = %self.remote,
                pending_len,
                max_pending = self.max_pending,
                "too many pending calls; refusing new call"
            );
            return Err(RemoteError::Overloaded {
                remote: self.remote.to_string(),
                limit: self.max_pending,
            });
        }

        let (tx, rx) = oneshot::channel();
        state.pending.insert(
            id,
            PendingInvocation {
                resolver: tx,
                registered_at: Instant::now(),
                deadline: None,
            },
        );
        tracing::debug!(
            remote = %self.remote,
            id = id.0,
            pending_len = pending_len + 1,
            "registered pending call"
        );
        Ok(PendingCall::waiting(id, self.remote.clone(), rx))
    }

    /// Attaches the deadline task of `id` so settling the record cancels it.
    ///
    /// Aborts the task right away if `id` is no longer pending.
    pub fn attach_deadline(&self, id: CallId, deadline: AbortHandle) {
        let mut state = self.state.lock();
        match state.pending.get_mut(&id) {
            Some(record) => record.deadline = Some(deadline),
            None => deadline.abort(),
        }
    }

    /// Resolves the record for `id` with a result payload.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::UnmatchedResponse` if no record is pending for `id`.
    pub fn resolve(&self, id: CallId, payload: Payload) -> Result<(), RemoteError> {
        self.settle(id, Ok(payload))
    }

    /// Fails the record for `id`.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::UnmatchedResponse` if no record is pending for `id`.
    pub fn fail(&self, id: CallId, error: RemoteError) -> Result<(), RemoteError> {
        self.settle(id, Err(error))
    }

    fn settle(&self, id: CallId, outcome: Outcome) -> Result<(), RemoteError> {
        let record = self.state.lock().pending.remove(&id);
        let Some(record) = record else {
            return Err(RemoteError::UnmatchedResponse { id });
        };
        let ok = outcome.is_ok();
        let elapsed = record.settle(outcome);
        tracing::debug!(
            remote = %self.remote,
            id = id.0,
            ok,
            elapsed_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
            "settled pending call"
        );
        Ok(())
    }

    /// Fails every pending record with `error`, empties the table and closes
    /// it to new registrations. Returns the number of records failed.
    ///
    /// Only the first call has any effect.
    pub fn cancel_all(&self, error: &RemoteError) -> usize {
        let drained: Vec<PendingInvocation> = {
            let mut state = self.state.lock();
            if state.closed.is_some() {
                return 0;
            }
            state.closed = Some(error.clone());
            state.pending.drain().map(|(_, record)| record).collect()
        };
        let count = drained.len();
        for record in drained {
            record.settle(Err(error.clone()));
        }
        if count > 0 {
            tracing::debug!(remote = %self.remote, count, "cancelled pending calls");
        }
        count
    }

    #[must_use]
    pub fn contains(&self, id: CallId) -> bool {
        self.state.lock().pending.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed.is_some()
    }

    /// Ids currently pending, ascending.
    #[must_use]
    pub fn pending_ids(&self) -> Vec<CallId> {
        let mut ids: Vec<CallId> = self.state.lock().pending.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

// ---------------------------------------------------------------------------
// PendingCall
// ---------------------------------------------------------------------------

enum CallState {
    Waiting(oneshot::Receiver<Outcome>),
    Settled(Option<Outcome>),
}

/// Future returned by `invoke`; resolves once with the call's outcome.
///
/// Dropping it abandons the result but leaves the record in place until the
/// response, the deadline or teardown settles it.
#[must_use = "a pending call does nothing unless awaited"]
pub struct PendingCall {
    id: CallId,
    remote: Arc<str>,
    state: CallState,
}

impl PendingCall {
    fn waiting(id: CallId, remote: Arc<str>, rx: oneshot::Receiver<Outcome>) -> Self {
        Self {
            id,
            remote,
            state: CallState::Waiting(rx),
        }
    }

    /// A call that failed before a record could be registered.
    pub(crate) fn failed(id: CallId, remote: Arc<str>, error: RemoteError) -> Self {
        Self {
            id,
            remote,
            state: CallState::Settled(Some(Err(error))),
        }
    }

    #[must_use]
    pub fn id(&self) -> CallId {
        self.id
    }

    #[must_use]
    pub fn remote(&self) -> &str {
        &self.remote
    }
}

impl std::fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCall")
            .field("id", &self.id)
            .field("remote", &self.remote)
            .finish_non_exhaustive()
    }
}

impl Future for PendingCall {
    type Output = Outcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            CallState::Waiting(rx) => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
                // Resolver dropped without settling: the table went away.
                Poll::Ready(Err(_)) => Poll::Ready(Err(RemoteError::Cancelled {
                    remote: this.remote.to_string(),
                })),
                Poll::Pending => Poll::Pending,
            },
            CallState::Settled(outcome) => Poll::Ready(outcome.take().unwrap_or_else(|| {
                Err(RemoteError::Cancelled {
                    remote: this.remote.to_string(),
                })
            })),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
