//! Invocation engine: drives both halves of every call through the hook
//! pipeline and the channel.
//!
//! Caller: `invoke` -> outbound hooks -> send -> (response) -> inbound hooks -> resolve.
//! Callee: receive -> inbound hooks -> callback -> outbound hooks -> send response.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tether_core::{codec, CallId, Envelope, EnvelopeKind, Payload, Phase, Side};
use tracing::{debug, info_span, trace, warn, Instrument};

use super::RemoteObject;
use crate::correlation::PendingCall;
use crate::error::RemoteError;
use crate::hooks::Stage;

impl RemoteObject {
    // -- caller side ------------------------------------------------------

    /// Issues a call and returns its future without waiting for anything.
    ///
    /// Outbound hooks and the send run on a spawned task, so this must be
    /// called from within a tokio runtime. The configured default timeout, if
    /// any, applies.
    pub fn invoke(self: &Arc<Self>, args: Payload) -> PendingCall {
        self.issue(args, self.config.default_call_timeout())
    }

    /// Like [`invoke`](Self::invoke) with an explicit deadline. When it passes
    /// the call fails with `RemoteError::Timeout` and its record is removed.
    pub fn invoke_with_timeout(self: &Arc<Self>, args: Payload, timeout: Duration) -> PendingCall {
        self.issue(args, Some(timeout))
    }

    /// Sends a call that is never answered. No pending record is created and
    /// failures are only logged.
    pub fn notify(self: &Arc<Self>, args: Payload) -> CallId {
        self.start();
        let id = self.next_call_id();
        if self.lifecycle.is_torn_down() {
            debug!(remote = %self.name, id = id.0, "notify after teardown dropped");
            return id;
        }
        let this = Arc::clone(self);
        let span = info_span!("notify", remote = %self.name, id = id.0);
        tokio::spawn(
            async move {
                if let Err(err) = this
                    .send_outbound(id, Side::Caller, EnvelopeKind::Notify, args)
                    .await
                {
                    warn!(error = %err, "notify failed");
                }
            }
            .instrument(span),
        );
        id
    }

    fn issue(self: &Arc<Self>, args: Payload, timeout: Option<Duration>) -> PendingCall {
        self.start();
        let id = self.next_call_id();
        let call = match self.table.register(id) {
            Ok(call) => call,
            Err(err) => return PendingCall::failed(id, self.name.clone(), err),
        };
        if let Some(timeout) = timeout {
            self.arm_deadline(id, timeout);
        }

        let this = Arc::clone(self);
        let span = info_span!("invoke", remote = %self.name, id = id.0);
        tokio::spawn(
            async move {
                if let Err(err) = this
                    .send_outbound(id, Side::Caller, EnvelopeKind::Request, args)
                    .await
                {
                    debug!(error = %err, "request not sent");
                    let _ = this.table.fail(id, err);
                }
            }
            .instrument(span),
        );
        call
    }

    fn next_call_id(&self) -> CallId {
        CallId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn arm_deadline(self: &Arc<Self>, id: CallId, timeout: Duration) {
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let remote = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(remote) = remote.upgrade() {
                if remote.table.fail(id, RemoteError::Timeout { timeout_ms }).is_ok() {
                    debug!(remote = %remote.name, id = id.0, timeout_ms, "call timed out");
                }
            }
        });
        self.table.attach_deadline(id, task.abort_handle());
    }

    // -- shared -----------------------------------------------------------

    fn stage(&self, id: CallId, side: Side, phase: Phase) -> Stage {
        Stage {
            remote: self.name.clone(),
            id,
            side,
            phase,
        }
    }

    /// Runs the outbound phases for `side` and hands the envelope to the channel.
    async fn send_outbound(
        &self,
        id: CallId,
        side: Side,
        kind: EnvelopeKind,
        payload: Payload,
    ) -> Result<(), RemoteError> {
        let settings = self.settings.load_full();
        let warn = settings.warn_on_hook_error;
        let payload = settings
            .hooks
            .run(&self.stage(id, side, Phase::OutboundPostDispatch), payload, warn)
            .await?;
        let payload = settings
            .hooks
            .run(&self.stage(id, side, Phase::OutboundPreSend), payload, warn)
            .await?;
        self.transmit(Envelope {
            remote: self.name.to_string(),
            id,
            kind,
            payload,
            fault: None,
        })
        .await
    }

    async fn transmit(&self, envelope: Envelope) -> Result<(), RemoteError> {
        let frame = codec::encode(&envelope).map_err(|err| RemoteError::codec(&err))?;
        let len = frame.len();
        self.adapter
            .send(self.role.counterpart(), Bytes::from(frame))
            .await?;
        trace!(
            remote = %self.name,
            id = envelope.id.0,
            kind = %envelope.kind,
            len,
            "envelope sent"
        );
        Ok(())
    }

    // -- receiving --------------------------------------------------------

    /// Accepts an envelope routed to this remote. Work is spawned; this
    /// returns immediately.
    pub(crate) fn receive(self: &Arc<Self>, envelope: Envelope) {
        self.start();
        if self.lifecycle.is_torn_down() {
            debug!(
                remote = %self.name,
                id = envelope.id.0,
                kind = %envelope.kind,
                "envelope for torn down remote dropped"
            );
            return;
        }
        let this = Arc::clone(self);
        let span = info_span!(
            "receive",
            remote = %self.name,
            id = envelope.id.0,
            kind = %envelope.kind,
        );
        if envelope.kind.is_inbound_call() {
            tokio::spawn(async move { this.serve(envelope).await }.instrument(span));
        } else {
            tokio::spawn(async move { this.complete_call(envelope).await }.instrument(span));
        }
    }

    // -- callee side ------------------------------------------------------

    async fn serve(&self, envelope: Envelope) {
        let Envelope { id, kind, payload, .. } = envelope;
        let expects_reply = kind == EnvelopeKind::Request;
        match self.dispatch(id, payload, expects_reply).await {
            Ok(()) => {}
            Err(err @ (RemoteError::Channel(_) | RemoteError::Codec { .. })) => {
                warn!(error = %err, "response not sent");
            }
            Err(err) if expects_reply => {
                debug!(error = %err, "replying with fault");
                let fault = Envelope::fault(self.name.to_string(), id, err.into_fault());
                if let Err(err) = self.transmit(fault).await {
                    warn!(error = %err, "fault response not sent");
                }
            }
            Err(err) => {
                warn!(error = %err, "notify handling failed");
            }
        }
    }

    async fn dispatch(
        &self,
        id: CallId,
        args: Payload,
        expects_reply: bool,
    ) -> Result<(), RemoteError> {
        let settings = self.settings.load_full();
        let args = settings
            .hooks
            .run(
                &self.stage(id, Side::Callee, Phase::InboundPreDispatch),
                args,
                settings.warn_on_hook_error,
            )
            .await?;

        let result = match &settings.handler {
            Some(handler) => handler.dispatch(args).await?,
            None => {
                debug!("no request callback registered; replying with empty payload");
                Payload::empty()
            }
        };

        if !expects_reply {
            return Ok(());
        }
        self.send_outbound(id, Side::Callee, EnvelopeKind::Response, result)
            .await
    }

    // -- caller side, response --------------------------------------------

    async fn complete_call(&self, envelope: Envelope) {
        let Envelope {
            id, payload, fault, ..
        } = envelope;
        if !self.table.contains(id) {
            debug!("response has no pending call; dropped");
            return;
        }

        let outcome = match fault {
            Some(fault) => Err(RemoteError::from(fault)),
            None => {
                let settings = self.settings.load_full();
                settings
                    .hooks
                    .run(
                        &self.stage(id, Side::Caller, Phase::InboundPreResponse),
                        payload,
                        settings.warn_on_hook_error,
                    )
                    .await
            }
        };

        let settled = match outcome {
            Ok(result) => self.table.resolve(id, result),
            Err(err) => self.table.fail(id, err),
        };
        if let Err(err) = settled {
            debug!(error = %err, "call settled before its response was processed");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures_util::future::join_all;
    use futures_util::FutureExt;
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use tether_core::{payload, HookScope, Value};

    use super::*;
    use crate::config::RemoteConfig;
    use crate::hooks::HookEntry;
    use crate::testkit::{CapturingChannel, Deliver, Loopback};

    fn increment(phase: Phase, scope: HookScope) -> HookEntry {
        HookEntry::new(phase, scope, |call| async move {
            let n = call.payload.first().and_then(Value::as_int).unwrap_or(0);
            Ok(payload![n + 1])
        })
    }

    fn failing(phase: Phase, scope: HookScope) -> HookEntry {
        HookEntry::new(phase, scope, |_| async { Err(anyhow::anyhow!("hook refused")) })
    }

    fn panicking(phase: Phase, scope: HookScope) -> HookEntry {
        HookEntry::new(phase, scope, |call| async move {
            assert!(call.payload.is_empty(), "hook boom");
            Ok(call.payload)
        })
    }

    fn first_int(payload: &Payload) -> Option<i64> {
        payload.first().and_then(Value::as_int)
    }

    #[tokio::test]
    async fn inbound_hook_mutation_reaches_callback_and_caller() {
        let net = Loopback::new(RemoteConfig::default());
        let (caller, callee) = net.remote("counter");
        let seen = Arc::new(Mutex::new(None));

        callee
            .register_inbound_hook(increment(Phase::InboundPreDispatch, HookScope::Shared))
            .unwrap();
        let seen_by_callback = seen.clone();
        callee
            .on_invoke(move |args: Payload| {
                let seen = seen_by_callback.clone();
                async move {
                    *seen.lock() = first_int(&args);
                    Ok(args)
                }
            })
            .unwrap();

        let result = caller.invoke(payload![5]).await.unwrap();
        assert_eq!(*seen.lock(), Some(6));
        assert_eq!(first_int(&result), Some(6));
        assert_eq!(caller.pending_calls(), 0);
    }

    #[tokio::test]
    async fn concurrent_calls_resolve_with_their_own_results() {
        let net = Loopback::new(RemoteConfig::default());
        let (caller, callee) = net.remote("square");
        callee
            .on_invoke(|args: Payload| async move {
                let n = first_int(&args).unwrap_or(0);
                // Later calls answer sooner.
                tokio::time::sleep(Duration::from_millis(u64::try_from(50 - n).unwrap_or(0))).await;
                Ok(payload![n * n])
            })
            .unwrap();

        let calls: Vec<_> = (0..50i64).map(|n| caller.invoke(payload![n])).collect();
        let results = join_all(calls).await;
        for (n, result) in (0..50i64).zip(results) {
            assert_eq!(first_int(&result.unwrap()), Some(n * n));
        }
    }

    #[tokio::test]
    async fn responses_are_matched_by_id_not_arrival_order() {
        let caller_net = CapturingChannel::new();
        let callee_net = CapturingChannel::new();
        let caller_side = caller_net.registry(tether_core::Endpoint::Initiator);
        let callee_side = callee_net.registry(tether_core::Endpoint::Responder);
        let caller = caller_side.create("echo").unwrap();
        callee_side
            .create("echo")
            .unwrap()
            .on_invoke(|args: Payload| async move { Ok(args) })
            .unwrap();

        let a = caller.invoke(payload!["a"]);
        let mut b = caller.invoke(payload!["b"]);
        let requests = caller_net.take(2).await;
        for frame in requests {
            callee_side.deliver(frame);
        }
        let mut responses = callee_net.take(2).await;
        responses.sort_by_key(|frame| codec::decode(frame).map(|env| env.id).ok());

        // B's response first.
        caller_side.deliver(responses.pop().unwrap());
        let b_result = (&mut b).await.unwrap();
        assert_eq!(b_result.first(), Some(&Value::from("b")));
        assert_eq!(caller.pending_ids(), vec![a.id()]);

        caller_side.deliver(responses.pop().unwrap());
        assert_eq!(a.await.unwrap().first(), Some(&Value::from("a")));
    }

    #[tokio::test]
    async fn teardown_fails_pending_call_immediately() {
        let capture = CapturingChannel::new();
        let registry = capture.registry(tether_core::Endpoint::Initiator);
        let remote = registry.create("slow").unwrap();

        let call = remote.invoke(payload![1]);
        assert_eq!(remote.pending_calls(), 1);
        assert_eq!(remote.teardown(), 1);
        assert_eq!(remote.teardown(), 0);

        let outcome = call.now_or_never().expect("failed within teardown");
        assert!(matches!(outcome, Err(RemoteError::Cancelled { ref remote }) if remote == "slow"));

        let late = remote.invoke(payload![2]).await;
        assert!(matches!(late, Err(RemoteError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn scoped_hooks_fire_only_on_their_side() {
        let net = Loopback::new(RemoteConfig::default());
        let (caller, callee) = net.remote("scoped");
        let log = Arc::new(Mutex::new(Vec::new()));

        for remote in [&caller, &callee] {
            for scope in [HookScope::Caller, HookScope::Callee, HookScope::Shared] {
                let log = log.clone();
                remote
                    .register_outbound_hook(HookEntry::new(
                        Phase::OutboundPreSend,
                        scope,
                        move |call| {
                            let log = log.clone();
                            async move {
                                log.lock().push((call.side, scope));
                                Ok(call.payload)
                            }
                        },
                    ))
                    .unwrap();
            }
        }
        callee.on_invoke(|args: Payload| async move { Ok(args) }).unwrap();

        caller.invoke(payload![1]).await.unwrap();
        let log = log.lock();
        assert_eq!(
            *log,
            vec![
                (Side::Caller, HookScope::Caller),
                (Side::Caller, HookScope::Shared),
                (Side::Callee, HookScope::Callee),
                (Side::Callee, HookScope::Shared),
            ]
        );
    }

    #[tokio::test]
    async fn full_round_trip_fires_every_phase_in_order() {
        let net = Loopback::new(RemoteConfig::default());
        let (caller, callee) = net.remote("trace");
        let log = Arc::new(Mutex::new(Vec::new()));

        let phases = [
            Phase::OutboundPostDispatch,
            Phase::OutboundPreSend,
            Phase::InboundPreDispatch,
            Phase::InboundPreResponse,
        ];
        for remote in [&caller, &callee] {
            for phase in phases {
                let log = log.clone();
                remote
                    .register_hook(HookEntry::new(phase, HookScope::Shared, move |call| {
                        let log = log.clone();
                        async move {
                            log.lock().push((call.side, call.phase));
                            Ok(call.payload)
                        }
                    }))
                    .unwrap();
            }
        }

        caller.invoke(payload![]).await.unwrap();
        assert_eq!(
            *log.lock(),
            vec![
                (Side::Caller, Phase::OutboundPostDispatch),
                (Side::Caller, Phase::OutboundPreSend),
                (Side::Callee, Phase::InboundPreDispatch),
                (Side::Callee, Phase::OutboundPostDispatch),
                (Side::Callee, Phase::OutboundPreSend),
                (Side::Caller, Phase::InboundPreResponse),
            ]
        );
    }

    #[tokio::test]
    async fn callee_hook_failure_fails_the_call_when_warn_is_off() {
        let net = Loopback::new(RemoteConfig::default());
        let (caller, callee) = net.remote("guarded");
        let callback_runs = Arc::new(AtomicUsize::new(0));
        callee
            .register_inbound_hook(failing(Phase::InboundPreDispatch, HookScope::Callee))
            .unwrap();
        let runs = callback_runs.clone();
        callee
            .on_invoke(move |args: Payload| {
                runs.fetch_add(1, Ordering::SeqCst);
                async move { Ok(args) }
            })
            .unwrap();

        let err = caller.invoke(payload![1]).await.unwrap_err();
        assert!(matches!(
            err,
            RemoteError::HookFailure { phase: Phase::InboundPreDispatch, ref message } if message == "hook refused"
        ));
        assert_eq!(callback_runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn hook_failure_is_skipped_when_warn_is_on() {
        let net = Loopback::new(RemoteConfig::default());
        let (caller, callee) = net.remote("lenient");
        callee.set_warn_on_error(true).unwrap();
        callee
            .register_inbound_hook(failing(Phase::InboundPreDispatch, HookScope::Shared))
            .unwrap();
        callee.on_invoke(|args: Payload| async move { Ok(args) }).unwrap();
        caller.set_warn_on_error(true).unwrap();
        caller
            .register_outbound_hook(failing(Phase::OutboundPreSend, HookScope::Caller))
            .unwrap();

        let result = caller.invoke(payload![7]).await.unwrap();
        assert_eq!(first_int(&result), Some(7));
    }

    #[tokio::test]
    async fn caller_response_hook_failure_fails_the_call_when_warn_is_off() {
        let net = Loopback::new(RemoteConfig::default());
        let (caller, callee) = net.remote("audited");
        callee.on_invoke(|args: Payload| async move { Ok(args) }).unwrap();
        caller
            .register_inbound_hook(failing(Phase::InboundPreResponse, HookScope::Caller))
            .unwrap();

        let err = caller.invoke(payload![3]).await.unwrap_err();
        assert!(matches!(
            err,
            RemoteError::HookFailure { phase: Phase::InboundPreResponse, ref message } if message == "hook refused"
        ));
        assert_eq!(caller.pending_calls(), 0);
    }

    #[tokio::test]
    async fn callee_outbound_failure_after_callback_reports_its_phase() {
        for phase in [Phase::OutboundPostDispatch, Phase::OutboundPreSend] {
            let net = Loopback::new(RemoteConfig::default());
            let (caller, callee) = net.remote("sealed");
            let callback_runs = Arc::new(AtomicUsize::new(0));
            callee
                .register_outbound_hook(failing(phase, HookScope::Callee))
                .unwrap();
            let runs = callback_runs.clone();
            callee
                .on_invoke(move |args: Payload| {
                    runs.fetch_add(1, Ordering::SeqCst);
                    async move { Ok(args) }
                })
                .unwrap();

            let err = caller.invoke(payload![1]).await.unwrap_err();
            assert!(
                matches!(
                    err,
                    RemoteError::HookFailure { phase: failed, ref message }
                        if failed == phase && message == "hook refused"
                ),
                "unexpected error for {phase}: {err:?}"
            );
            assert_eq!(callback_runs.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn callee_hook_panic_fails_the_call_instead_of_hanging() {
        let net = Loopback::new(RemoteConfig::default());
        let (caller, callee) = net.remote("fragile");
        callee
            .register_inbound_hook(panicking(Phase::InboundPreDispatch, HookScope::Callee))
            .unwrap();
        callee.on_invoke(|args: Payload| async move { Ok(args) }).unwrap();

        let err = caller.invoke(payload![1]).await.unwrap_err();
        assert!(matches!(
            err,
            RemoteError::HookFailure { phase: Phase::InboundPreDispatch, ref message }
                if message.contains("hook boom")
        ));
        assert_eq!(caller.pending_calls(), 0);

        // The callee keeps serving after the panic.
        let again = caller.invoke(payload![2]).await.unwrap_err();
        assert!(matches!(again, RemoteError::HookFailure { .. }));
    }

    #[tokio::test]
    async fn caller_hook_panic_fails_the_call_and_sends_nothing() {
        let capture = CapturingChannel::new();
        let registry = capture.registry(tether_core::Endpoint::Initiator);
        let remote = registry.create("fragile").unwrap();
        remote
            .register_outbound_hook(panicking(Phase::OutboundPreSend, HookScope::Caller))
            .unwrap();

        let err = remote.invoke(payload![1]).await.unwrap_err();
        assert!(matches!(
            err,
            RemoteError::HookFailure { phase: Phase::OutboundPreSend, ref message }
                if message.contains("hook boom")
        ));
        assert_eq!(remote.pending_calls(), 0);
        assert!(capture.try_take().is_none());
    }

    #[tokio::test]
    async fn hook_panic_is_skipped_when_warn_is_on() {
        let net = Loopback::new(RemoteConfig::default());
        let (caller, callee) = net.remote("fragile");
        callee.set_warn_on_error(true).unwrap();
        callee
            .register_inbound_hook(panicking(Phase::InboundPreDispatch, HookScope::Callee))
            .unwrap();
        callee
            .register_inbound_hook(increment(Phase::InboundPreDispatch, HookScope::Callee))
            .unwrap();
        callee.on_invoke(|args: Payload| async move { Ok(args) }).unwrap();

        let result = caller.invoke(payload![4]).await.unwrap();
        assert_eq!(first_int(&result), Some(5));
    }

    #[tokio::test]
    async fn callback_failure_propagates_even_when_warn_is_on() {
        let net = Loopback::new(RemoteConfig::default());
        let (caller, callee) = net.remote("broken");
        callee.set_warn_on_error(true).unwrap();
        callee
            .on_invoke(|_: Payload| async { Err(anyhow::anyhow!("database unavailable")) })
            .unwrap();

        let err = caller.invoke(payload![]).await.unwrap_err();
        assert!(matches!(
            err,
            RemoteError::CallbackFailure { ref message } if message == "database unavailable"
        ));
    }

    #[tokio::test]
    async fn caller_outbound_failure_sends_nothing() {
        let capture = CapturingChannel::new();
        let registry = capture.registry(tether_core::Endpoint::Initiator);
        let remote = registry.create("gated").unwrap();
        remote
            .register_outbound_hook(failing(Phase::OutboundPostDispatch, HookScope::Caller))
            .unwrap();

        let err = remote.invoke(payload![1]).await.unwrap_err();
        assert!(matches!(
            err,
            RemoteError::HookFailure { phase: Phase::OutboundPostDispatch, .. }
        ));
        assert_eq!(remote.pending_calls(), 0);
        assert!(capture.try_take().is_none());
    }

    #[tokio::test]
    async fn inbound_pre_response_hook_rewrites_result() {
        let net = Loopback::new(RemoteConfig::default());
        let (caller, callee) = net.remote("price");
        callee.on_invoke(|_: Payload| async { Ok(payload![100]) }).unwrap();
        caller
            .register_inbound_hook(increment(Phase::InboundPreResponse, HookScope::Caller))
            .unwrap();

        let result = caller.invoke(payload![]).await.unwrap();
        assert_eq!(first_int(&result), Some(101));
    }

    #[tokio::test]
    async fn missing_callback_replies_with_empty_payload() {
        let net = Loopback::new(RemoteConfig::default());
        let (caller, callee) = net.remote("void");
        assert!(!callee.has_request_callback());
        let result = caller.invoke(payload![1, 2, 3]).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn notify_runs_callback_without_reply() {
        let net = Loopback::new(RemoteConfig::default());
        let (caller, callee) = net.remote("events");
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        callee
            .on_invoke(move |args: Payload| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(args);
                    Ok(payload!["ignored"])
                }
            })
            .unwrap();

        caller.notify(payload!["hello"]);
        let received = rx.recv().await.unwrap();
        assert_eq!(received.first(), Some(&Value::from("hello")));
        assert_eq!(caller.pending_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_fails_and_removes_the_record() {
        let capture = CapturingChannel::new();
        let registry = capture.registry(tether_core::Endpoint::Initiator);
        let remote = registry.create("silent").unwrap();

        let call = remote.invoke_with_timeout(payload![], Duration::from_millis(250));
        let err = call.await.unwrap_err();
        assert!(matches!(err, RemoteError::Timeout { timeout_ms: 250 }));
        assert_eq!(remote.pending_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn default_timeout_comes_from_config() {
        let capture = CapturingChannel::with_config(RemoteConfig {
            default_call_timeout_ms: Some(40),
            ..RemoteConfig::default()
        });
        let registry = capture.registry(tether_core::Endpoint::Initiator);
        let remote = registry.create("silent").unwrap();
        let err = remote.invoke(payload![]).await.unwrap_err();
        assert!(matches!(err, RemoteError::Timeout { timeout_ms: 40 }));
    }

    #[tokio::test]
    async fn unmatched_and_repeated_responses_are_ignored() {
        let capture = CapturingChannel::new();
        let registry = capture.registry(tether_core::Endpoint::Initiator);
        let caller = registry.create("late").unwrap();

        let call = caller.invoke(payload![]);
        let id = call.id();
        let unknown = codec::encode(&Envelope::response("late", CallId(999), payload![0])).unwrap();
        registry.deliver(Bytes::from(unknown));
        tokio::task::yield_now().await;
        assert_eq!(caller.pending_ids(), vec![id]);

        let answer = Bytes::from(codec::encode(&Envelope::response("late", id, payload![1])).unwrap());
        registry.deliver(answer.clone());
        assert_eq!(first_int(&call.await.unwrap()), Some(1));

        registry.deliver(answer);
        tokio::task::yield_now().await;
        assert_eq!(caller.pending_calls(), 0);
    }

    #[tokio::test]
    async fn setup_closes_on_first_call() {
        let capture = CapturingChannel::new();
        let registry = capture.registry(tether_core::Endpoint::Initiator);
        let remote = registry.create("frozen").unwrap();
        remote
            .set_warn_on_error(true)
            .unwrap()
            .register_hook(increment(Phase::OutboundPreSend, HookScope::Shared))
            .unwrap();

        let _call = remote.invoke(payload![]);
        assert!(matches!(
            remote.set_warn_on_error(false),
            Err(RemoteError::AlreadyStarted { .. })
        ));
        assert!(matches!(
            remote.register_inbound_hook(increment(Phase::InboundPreResponse, HookScope::Shared)),
            Err(RemoteError::AlreadyStarted { .. })
        ));
        assert!(remote.warn_on_hook_error());
    }

    #[test]
    fn wrong_list_is_rejected_during_setup() {
        let capture = CapturingChannel::new();
        let registry = capture.registry(tether_core::Endpoint::Initiator);
        let remote = registry.create("strict").unwrap();
        let err = remote
            .register_inbound_hook(increment(Phase::OutboundPreSend, HookScope::Shared))
            .unwrap_err();
        assert!(matches!(err, RemoteError::PhaseMismatch { .. }));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn concurrent_calls_never_cross_talk(args in prop::collection::vec(-1000i64..1000, 1..24)) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let results = runtime.block_on(async {
                let net = Loopback::new(RemoteConfig::default());
                let (caller, callee) = net.remote("double");
                callee
                    .register_inbound_hook(increment(Phase::InboundPreDispatch, HookScope::Callee))
                    .unwrap();
                callee
                    .on_invoke(|args: Payload| async move {
                        tokio::task::yield_now().await;
                        Ok(payload![first_int(&args).unwrap_or(0) * 2])
                    })
                    .unwrap();
                let calls: Vec<_> = args.iter().map(|n| caller.invoke(payload![*n])).collect();
                join_all(calls).await
            });
            for (n, result) in args.iter().zip(results) {
                prop_assert_eq!(first_int(&result.unwrap()), Some((n + 1) * 2));
            }
        }
    }
}
