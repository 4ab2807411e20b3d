// ── Runtime configuration ──
//
// Tuning knobs for the core. The core never reads files itself;
// `cornea-config` builds a `CoreConfig` from profiles and env vars.

use std::time::Duration;

use crate::retry::RetryPolicy;

/// Runtime configuration for a [`Cornea`](crate::Cornea) instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// Timeout armed for every outbound request.
    pub request_timeout: Duration,
    /// Coalescing window for controller view recomputation.
    /// `Duration::ZERO` posts the update immediately.
    pub view_debounce: Duration,
    /// Fixed-delay retry for multi-step workflows (subsystem catalog,
    /// subsystem member loads).
    pub retry: RetryPolicy,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            view_debounce: Duration::from_millis(100),
            retry: RetryPolicy::default(),
        }
    }
}

impl CoreConfig {
    /// Request timeout in whole milliseconds, as carried on the wire.
    pub fn request_timeout_ms(&self) -> u64 {
        u64::try_from(self.request_timeout.as_millis()).unwrap_or(u64::MAX)
    }
}
