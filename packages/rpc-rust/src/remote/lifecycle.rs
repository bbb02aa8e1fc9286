use parking_lot::Mutex;

use crate::error::RemoteError;

/// Lifecycle of a remote.
///
/// State machine: Setup -> Live -> `TornDown`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Hooks, callback and warn flag may still be changed.
    Setup,
    /// Accepting traffic; configuration is frozen.
    Live,
    /// Torn down; pending calls were cancelled and traffic is dropped.
    TornDown,
}

#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: Mutex<LifecycleState>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(LifecycleState::Setup),
        }
    }

    pub(crate) fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// Runs `f` while holding the lifecycle lock, provided setup is still open.
    ///
    /// Going live waits for `f` to finish, so a registration is either fully
    /// applied before the first call or rejected.
    pub(crate) fn while_setup<T>(
        &self,
        remote: &str,
        f: impl FnOnce() -> Result<T, RemoteError>,
    ) -> Result<T, RemoteError> {
        let state = self.state.lock();
        if *state != LifecycleState::Setup {
            return Err(RemoteError::AlreadyStarted {
                remote: remote.to_string(),
            });
        }
        f()
    }

    /// Closes setup. Returns `true` on the transition out of `Setup`.
    pub(crate) fn go_live(&self) -> bool {
        let mut state = self.state.lock();
        if *state == LifecycleState::Setup {
            *state = LifecycleState::Live;
            true
        } else {
            false
        }
    }

    /// Returns `true` only for the first call.
    pub(crate) fn tear_down(&self) -> bool {
        let mut state = self.state.lock();
        if *state == LifecycleState::TornDown {
            false
        } else {
            *state = LifecycleState::TornDown;
            true
        }
    }

    pub(crate) fn is_torn_down(&self) -> bool {
        self.state() == LifecycleState::TornDown
    }
}
