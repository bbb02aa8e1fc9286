//! The request callback a remote runs for inbound calls.
//!
//! Any `tower::Service<Payload, Response = Payload>` can serve as the callback,
//! so tower middleware can be layered around it before registration.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use parking_lot::Mutex;
use tether_core::Payload;
use tower::util::BoxCloneService;
use tower::{Service, ServiceExt};

use crate::error::RemoteError;

/// Type-erased request callback.
pub type RequestCallback = BoxCloneService<Payload, Payload, anyhow::Error>;

/// Shareable handle to a registered callback.
///
/// `BoxCloneService` is not `Sync`; each dispatch clones the service under the
/// lock and drives the clone to completion outside it.
#[derive(Clone)]
pub struct RequestHandler {
    service: Arc<Mutex<RequestCallback>>,
}

impl RequestHandler {
    pub fn new<S>(service: S) -> Self
    where
        S: Service<Payload, Response = Payload> + Clone + Send + 'static,
        S::Error: Into<anyhow::Error>,
        S::Future: Send + 'static,
    {
        let service = BoxCloneService::new(service.map_err(Into::<anyhow::Error>::into));
        Self {
            service: Arc::new(Mutex::new(service)),
        }
    }

    /// Wraps an async function of the call's arguments.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Payload) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = anyhow::Result<Payload>> + Send + 'static,
    {
        Self::new(tower::service_fn(f))
    }

    /// Runs the callback on `args`.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::CallbackFailure` if the callback returns an error
    /// or panics.
    pub async fn dispatch(&self, args: Payload) -> Result<Payload, RemoteError> {
        let service = self.service.lock().clone();
        match AssertUnwindSafe(service.oneshot(args)).catch_unwind().await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(err)) => Err(RemoteError::CallbackFailure {
                message: format!("{err:#}"),
            }),
            Err(panic) => Err(RemoteError::CallbackFailure {
                message: panic_message(panic.as_ref()),
            }),
        }
    }
}

impl std::fmt::Debug for RequestHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandler").finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic in request callback: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic in request callback: {s}")
    } else {
        "panic in request callback".to_string()
    }
}
