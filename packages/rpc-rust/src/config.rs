use std::time::Duration;

/// Endpoint-level configuration shared by every remote in a registry.
///
/// Controls call deadlines, the initial hook error policy and resource limits.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Deadline applied by `invoke` in milliseconds. `None` waits until the
    /// response arrives or the remote is torn down.
    pub default_call_timeout_ms: Option<u64>,
    /// Initial warn flag for newly created remotes.
    pub warn_on_hook_error: bool,
    /// Maximum number of calls pending on one remote before new calls are refused.
    pub max_pending_calls: usize,
    /// First call id handed out by each remote's id counter.
    pub first_call_id: u64,
    /// Bounded capacity of each direction of an in-memory channel.
    pub channel_capacity: usize,
}

impl RemoteConfig {
    #[must_use]
    pub fn default_call_timeout(&self) -> Option<Duration> {
        self.default_call_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            default_call_timeout_ms: None,
            warn_on_hook_error: false,
            max_pending_calls: 8192,
            first_call_id: 1,
            channel_capacity: 256,
        }
    }
}
