//! Ordered inbound and outbound hook lists and the sequential runner.
//!
//! Every firing walks the list for the phase's list in insertion order. Hooks
//! whose phase or scope does not match are skipped in place, never reordered.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tether_core::{CallId, HookList, Payload, Phase, Side};
use tracing::{trace, warn};

use super::entry::{HookCall, HookEntry};
use crate::error::RemoteError;

/// Where in a call the pipeline is being run.
#[derive(Debug, Clone)]
pub struct Stage {
    pub remote: Arc<str>,
    pub id: CallId,
    pub side: Side,
    pub phase: Phase,
}

/// The two hook lists owned by one remote.
#[derive(Debug, Clone, Default)]
pub struct HookPipeline {
    inbound: Vec<HookEntry>,
    outbound: Vec<HookEntry>,
}

impl HookPipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `entry` to the end of `list`.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::PhaseMismatch` if the entry's phase belongs to the
    /// other list.
    pub fn register(&mut self, list: HookList, entry: HookEntry) -> Result<(), RemoteError> {
        if entry.phase().list() != list {
            return Err(RemoteError::PhaseMismatch {
                phase: entry.phase(),
                list,
            });
        }
        match list {
            HookList::Inbound => self.inbound.push(entry),
            HookList::Outbound => self.outbound.push(entry),
        }
        Ok(())
    }

    #[must_use]
    pub fn hooks(&self, list: HookList) -> &[HookEntry] {
        match list {
            HookList::Inbound => &self.inbound,
            HookList::Outbound => &self.outbound,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inbound.is_empty() && self.outbound.is_empty()
    }

    /// Runs every hook that fires at `stage`, feeding each the previous
    /// hook's output, and returns the final payload.
    ///
    /// With `warn_on_error` set, a failing hook is logged and its input is
    /// passed on unchanged. Otherwise the first failure stops the phase.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::HookFailure` carrying the hook's error chain when a
    /// hook fails and `warn_on_error` is off.
    pub async fn run(
        &self,
        stage: &Stage,
        mut payload: Payload,
        warn_on_error: bool,
    ) -> Result<Payload, RemoteError> {
        let hooks = self
            .hooks(stage.phase.list())
            .iter()
            .filter(|hook| hook.fires(stage.phase, stage.side));

        for (index, hook) in hooks.enumerate() {
            let fallback = warn_on_error.then(|| payload.clone());
            let call = HookCall {
                remote: stage.remote.clone(),
                id: stage.id,
                side: stage.side,
                phase: stage.phase,
                payload,
                config: hook.config().cloned(),
            };
            let outcome = match AssertUnwindSafe(async { hook.call(call).await })
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(panic) => Err(anyhow::anyhow!(panic_message(panic.as_ref()))),
            };
            match outcome {
                Ok(next) => {
                    trace!(
                        remote = %stage.remote,
                        id = stage.id.0,
                        phase = %stage.phase,
                        index,
                        "hook completed"
                    );
                    payload = next;
                }
                Err(err) => match fallback {
                    Some(unchanged) => {
                        warn!(
                            remote = %stage.remote,
                            id = stage.id.0,
                            side = %stage.side,
                            phase = %stage.phase,
                            hook = hook.name().unwrap_or("<unnamed>"),
                            error = %format!("{err:#}"),
                            "hook failed; continuing with unchanged payload"
                        );
                        payload = unchanged;
                    }
                    None => {
                        return Err(RemoteError::HookFailure {
                            phase: stage.phase,
                            message: format!("{err:#}"),
                        });
                    }
                },
            }
        }
        Ok(payload)
    }
}

/// A panicking hook counts as a failing one.
fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("hook panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("hook panicked: {s}")
    } else {
        "hook panicked".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
