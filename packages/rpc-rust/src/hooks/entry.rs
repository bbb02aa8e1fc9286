use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tether_core::{CallId, HookScope, Payload, Phase, Side, Value};

/// Everything a hook sees when it fires.
#[derive(Debug, Clone)]
pub struct HookCall {
    /// Name of the remote the call is addressed to.
    pub remote: Arc<str>,
    pub id: CallId,
    pub side: Side,
    pub phase: Phase,
    /// The in-flight payload; the hook returns its replacement.
    pub payload: Payload,
    /// The static config registered with the hook, unchanged on every firing.
    pub config: Option<Value>,
}

pub type HookFn = Arc<dyn Fn(HookCall) -> BoxFuture<'static, anyhow::Result<Payload>> + Send + Sync>;

/// A registered middleware function, scoped to a phase and a side.
#[derive(Clone)]
pub struct HookEntry {
    phase: Phase,
    scope: HookScope,
    config: Option<Value>,
    name: Option<String>,
    callback: HookFn,
}

impl HookEntry {
    /// Wraps an async transform of the payload.
    ///
    /// ```
    /// use tether_core::{HookScope, Phase, Value};
    /// use tether_rpc::hooks::HookEntry;
    ///
    /// let hook = HookEntry::new(Phase::InboundPreDispatch, HookScope::Callee, |call| async move {
    ///     let mut payload = call.payload;
    ///     payload.push(Value::Bool(true));
    ///     Ok(payload)
    /// });
    /// assert_eq!(hook.phase(), Phase::InboundPreDispatch);
    /// ```
    pub fn new<F, Fut>(phase: Phase, scope: HookScope, f: F) -> Self
    where
        F: Fn(HookCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Payload>> + Send + 'static,
    {
        Self {
            phase,
            scope,
            config: None,
            name: None,
            callback: Arc::new(move |call| Box::pin(f(call))),
        }
    }

    /// Attaches a static config value passed to every firing.
    #[must_use]
    pub fn with_config(mut self, config: impl Into<Value>) -> Self {
        self.config = Some(config.into());
        self
    }

    /// Names the hook for log output.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn scope(&self) -> HookScope {
        self.scope
    }

    #[must_use]
    pub fn config(&self) -> Option<&Value> {
        self.config.as_ref()
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Whether this hook runs at `phase` on `side`.
    #[must_use]
    pub fn fires(&self, phase: Phase, side: Side) -> bool {
        self.phase == phase && self.scope.applies_to(side)
    }

    pub(crate) fn call(&self, call: HookCall) -> BoxFuture<'static, anyhow::Result<Payload>> {
        (self.callback)(call)
    }
}

impl fmt::Debug for HookEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookEntry")
            .field("phase", &self.phase)
            .field("scope", &self.scope)
            .field("config", &self.config)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
