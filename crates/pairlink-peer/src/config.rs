use std::time::Duration;

/// Default pause between failed accept attempts.
pub const DEFAULT_ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Default prefix for the manager's thread names.
pub const DEFAULT_THREAD_NAME_PREFIX: &str = "pairlink";

/// Configuration for a connection manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Write timeout applied to every channel stream. `None` blocks
    /// indefinitely.
    pub write_timeout: Option<Duration>,
    /// Pause before listening again after an accept failure.
    pub accept_retry_delay: Duration,
    /// Prefix for the `-connect`, `-reader` and `-dispatch` thread names.
    pub thread_name_prefix: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            write_timeout: None,
            accept_retry_delay: DEFAULT_ACCEPT_RETRY_DELAY,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
        }
    }
}

impl ManagerConfig {
    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_accept_retry_delay(mut self, delay: Duration) -> Self {
        self.accept_retry_delay = delay;
        self
    }

    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub(crate) fn thread_name(&self, role: &str) -> String {
        format!("{}-{role}", self.thread_name_prefix)
    }
}
