//! The addressable RPC object: one correlation table, one hook pipeline, one
//! warn flag and one request callback, behind a setup-then-live lifecycle.

mod callback;
mod engine;
mod lifecycle;

use std::future::Future;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tether_core::{CallId, Endpoint, HookList, Payload};
use tracing::info;

pub use callback::{RequestCallback, RequestHandler};
pub use lifecycle::LifecycleState;

use crate::config::RemoteConfig;
use crate::correlation::CorrelationTable;
use crate::error::RemoteError;
use crate::hooks::{HookEntry, HookPipeline};
use crate::traits::ChannelAdapter;
use lifecycle::Lifecycle;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Everything frozen when the remote goes live.
#[derive(Debug, Clone, Default)]
struct Settings {
    hooks: HookPipeline,
    warn_on_hook_error: bool,
    handler: Option<RequestHandler>,
}

// ---------------------------------------------------------------------------
// RemoteObject
// ---------------------------------------------------------------------------

/// A named remote on one endpoint.
///
/// Configured through the setup methods, which chain:
///
/// ```ignore
/// remote
///     .register_inbound_hook(audit)?
///     .set_warn_on_error(true)?
///     .on_invoke(|args| async move { Ok(args) })?;
/// ```
///
/// The first call, notify or delivered envelope ends setup. After that every
/// setup method fails with `RemoteError::AlreadyStarted`.
pub struct RemoteObject {
    name: Arc<str>,
    role: Endpoint,
    adapter: Arc<dyn ChannelAdapter>,
    config: Arc<RemoteConfig>,
    table: CorrelationTable,
    settings: ArcSwap<Settings>,
    lifecycle: Lifecycle,
    next_id: AtomicU64,
}

impl RemoteObject {
    pub(crate) fn new(
        name: Arc<str>,
        role: Endpoint,
        adapter: Arc<dyn ChannelAdapter>,
        config: Arc<RemoteConfig>,
    ) -> Self {
        let settings = Settings {
            warn_on_hook_error: config.warn_on_hook_error,
            ..Settings::default()
        };
        Self {
            table: CorrelationTable::new(name.clone(), config.max_pending_calls),
            next_id: AtomicU64::new(config.first_call_id),
            settings: ArcSwap::from_pointee(settings),
            lifecycle: Lifecycle::new(),
            name,
            role,
            adapter,
            config,
        }
    }

    // -- setup ------------------------------------------------------------

    /// Appends a hook to the inbound list.
    ///
    /// # Errors
    ///
    /// `RemoteError::AlreadyStarted` once live, `RemoteError::PhaseMismatch`
    /// for an outbound phase.
    pub fn register_inbound_hook(&self, entry: HookEntry) -> Result<&Self, RemoteError> {
        self.update(|settings| settings.hooks.register(HookList::Inbound, entry))
    }

    /// Appends a hook to the outbound list.
    ///
    /// # Errors
    ///
    /// `RemoteError::AlreadyStarted` once live, `RemoteError::PhaseMismatch`
    /// for an inbound phase.
    pub fn register_outbound_hook(&self, entry: HookEntry) -> Result<&Self, RemoteError> {
        self.update(|settings| settings.hooks.register(HookList::Outbound, entry))
    }

    /// Appends a hook to whichever list its phase belongs to.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::AlreadyStarted` once live.
    pub fn register_hook(&self, entry: HookEntry) -> Result<&Self, RemoteError> {
        let list = entry.phase().list();
        self.update(|settings| settings.hooks.register(list, entry))
    }

    /// Sets whether hook failures are logged and skipped instead of failing the call.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::AlreadyStarted` once live.
    pub fn set_warn_on_error(&self, warn: bool) -> Result<&Self, RemoteError> {
        self.update(|settings| {
            settings.warn_on_hook_error = warn;
            Ok(())
        })
    }

    /// Registers the callback run for inbound requests, replacing any earlier one.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::AlreadyStarted` once live.
    pub fn set_request_callback(&self, handler: RequestHandler) -> Result<&Self, RemoteError> {
        self.update(|settings| {
            settings.handler = Some(handler);
            Ok(())
        })
    }

    /// Shorthand for `set_request_callback(RequestHandler::from_fn(f))`.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::AlreadyStarted` once live.
    pub fn on_invoke<F, Fut>(&self, f: F) -> Result<&Self, RemoteError>
    where
        F: Fn(Payload) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = anyhow::Result<Payload>> + Send + 'static,
    {
        self.set_request_callback(RequestHandler::from_fn(f))
    }

    fn update(
        &self,
        f: impl FnOnce(&mut Settings) -> Result<(), RemoteError>,
    ) -> Result<&Self, RemoteError> {
        self.lifecycle.while_setup(&self.name, || {
            let mut next = Settings::clone(&self.settings.load());
            f(&mut next)?;
            self.settings.store(Arc::new(next));
            Ok(())
        })?;
        Ok(self)
    }

    // -- lifecycle --------------------------------------------------------

    /// Ends setup explicitly. Traffic ends it implicitly.
    pub fn start(&self) {
        if self.lifecycle.go_live() {
            let settings = self.settings.load();
            info!(
                remote = %self.name,
                role = %self.role,
                inbound_hooks = settings.hooks.hooks(HookList::Inbound).len(),
                outbound_hooks = settings.hooks.hooks(HookList::Outbound).len(),
                warn_on_hook_error = settings.warn_on_hook_error,
                has_callback = settings.handler.is_some(),
                "remote is live"
            );
        }
    }

    /// Cancels every pending call and stops serving traffic.
    ///
    /// Pending futures fail with `RemoteError::Cancelled` before this returns.
    /// Returns the number of calls cancelled; repeated calls return 0.
    pub fn teardown(&self) -> usize {
        if !self.lifecycle.tear_down() {
            return 0;
        }
        let cancelled = self.table.cancel_all(&RemoteError::Cancelled {
            remote: self.name.to_string(),
        });
        info!(remote = %self.name, cancelled, "remote torn down");
        cancelled
    }

    // -- introspection ----------------------------------------------------

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn role(&self) -> Endpoint {
        self.role
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    #[must_use]
    pub fn warn_on_hook_error(&self) -> bool {
        self.settings.load().warn_on_hook_error
    }

    #[must_use]
    pub fn has_request_callback(&self) -> bool {
        self.settings.load().handler.is_some()
    }

    /// Number of calls awaiting a response.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.table.len()
    }

    #[must_use]
    pub fn pending_ids(&self) -> Vec<CallId> {
        self.table.pending_ids()
    }
}

impl std::fmt::Debug for RemoteObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteObject")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("state", &self.state())
            .field("pending", &self.table.len())
            .finish_non_exhaustive()
    }
}
