use thiserror::Error;

/// Top-level error type for the `cornea-api` crate.
///
/// Covers the transport-level failure modes only. Structured platform
/// errors (`ErrorEvent`) travel inside [`Inbound::Response`](crate::Inbound)
/// and are translated by `cornea-core`.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// The transport has no live session to send on.
    #[error("Transport disconnected")]
    Disconnected,

    /// The inbound channel to the UI loop has been dropped.
    #[error("Inbound channel closed")]
    ChannelClosed,

    /// The transport refused the request before sending it.
    #[error("Request rejected by transport: {0}")]
    Rejected(String),

    // ── Data ────────────────────────────────────────────────────────
    /// Message could not be encoded or decoded.
    #[error("Message encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}
