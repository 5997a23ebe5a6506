//! Configuration for the script runtime.

use std::time::Duration;

use scriptbridge_fetch::FetcherConfig;

/// Configuration for a [`ScriptRuntime`](crate::ScriptRuntime).
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Deadline used by [`ScriptRuntime::run`](crate::ScriptRuntime::run).
    pub default_timeout: Duration,

    /// Interpreter heap limit in bytes. `None` leaves QuickJS unbounded.
    pub memory_limit: Option<usize>,

    /// Interpreter stack limit in bytes.
    pub max_stack_size: Option<usize>,

    /// Transport settings for `fetch`.
    pub fetch: FetcherConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(15),
            memory_limit: None,
            max_stack_size: Some(1024 * 1024),
            fetch: FetcherConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    pub fn with_inline_body_limit(mut self, bytes: u64) -> Self {
        self.fetch.inline_body_limit = bytes;
        self
    }
}
