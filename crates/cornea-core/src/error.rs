// ── Core error types ──
//
// Everything the core delivers through futures and callbacks. Errors are
// `Clone` because one completion fans out to many listeners. Transport
// failures are translated from `cornea_api::Error`; structured platform
// errors keep their `code` so controllers can pattern-match on it.

use thiserror::Error;

use cornea_api::ErrorEvent;

/// Unified error type for the core crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    // ── Transport errors ─────────────────────────────────────────────
    #[error("Request {command} to {address} timed out after {timeout_ms}ms")]
    Timeout {
        address: String,
        command: String,
        timeout_ms: u64,
    },

    #[error("Platform session disconnected")]
    Disconnected,

    #[error("Transport error: {message}")]
    Transport { message: String },

    // ── Platform errors ──────────────────────────────────────────────
    #[error("Platform error ({code}): {message}")]
    Remote { code: String, message: String },

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("Session expired")]
    SessionExpired,

    #[error("Load of {address} superseded by a rebind or delete")]
    Superseded { address: String },

    // ── Contract violations ──────────────────────────────────────────
    #[error("Source is not bound to an address")]
    NotBound,

    #[error("Model {address} is not loaded")]
    NotLoaded { address: String },

    #[error("Invalid model: {reason}")]
    InvalidModel { reason: String },

    #[error("Invalid address: {address}")]
    InvalidAddress { address: String },

    #[error("Future already completed")]
    AlreadyCompleted,
}

impl CoreError {
    /// Platform error code, if this is a structured remote error.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Remote { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Errors that retrying the same operation can never fix.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::SessionExpired
                | Self::Superseded { .. }
                | Self::NotBound
                | Self::InvalidModel { .. }
                | Self::InvalidAddress { .. }
        )
    }
}

// ── Conversion from platform / transport errors ──────────────────────

impl From<ErrorEvent> for CoreError {
    fn from(event: ErrorEvent) -> Self {
        Self::Remote {
            code: event.code,
            message: event.message,
        }
    }
}

impl From<cornea_api::Error> for CoreError {
    fn from(err: cornea_api::Error) -> Self {
        match err {
            cornea_api::Error::Disconnected | cornea_api::Error::ChannelClosed => {
                Self::Disconnected
            }
            cornea_api::Error::Rejected(message) => Self::Transport { message },
            cornea_api::Error::Encoding(e) => Self::Transport {
                message: format!("encoding failed: {e}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_errors_expose_code() {
        let err = CoreError::from(ErrorEvent::new("security.triggeredDevices", "door open"));
        assert_eq!(err.code(), Some("security.triggeredDevices"));
        assert!(!err.is_terminal());
    }

    #[test]
    fn transport_errors_translate() {
        assert_eq!(
            CoreError::from(cornea_api::Error::Disconnected),
            CoreError::Disconnected
        );
        let rejected = CoreError::from(cornea_api::Error::Rejected("too big".into()));
        assert_eq!(rejected.code(), None);
        assert!(rejected.to_string().contains("too big"));
    }

    #[test]
    fn lifecycle_errors_are_terminal() {
        assert!(CoreError::SessionExpired.is_terminal());
        assert!(
            CoreError::Superseded {
                address: "DRIV:dev:1".into()
            }
            .is_terminal()
        );
        assert!(
            !CoreError::Timeout {
                address: "DRIV:dev:1".into(),
                command: "base:GetAttributes".into(),
                timeout_ms: 10
            }
            .is_terminal()
        );
    }
}
