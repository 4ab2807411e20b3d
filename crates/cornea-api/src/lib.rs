//! Platform-facing types for the cornea client.
//!
//! - **[`messages`]** — push events, requests, responses, and session
//!   notices exchanged with the home-automation platform.
//! - **[`Transport`]** — the outbound seam. Inbound traffic is plain
//!   [`Inbound`] data sent over an [`InboundSender`] channel to the UI loop.
//! - **[`MemoryTransport`]** — in-process transport used by tests and the
//!   `cornea replay` command.

pub mod error;
pub mod messages;
pub mod transport;

pub use error::Error;
pub use messages::{
    Attributes, ClientRequest, ErrorEvent, EventKind, Inbound, PlatformEvent, SUBSYSTEM_SERVICE,
    SessionNotice, commands,
};
pub use transport::{
    InboundReceiver, InboundSender, MemoryTransport, Reply, Transport, inbound_channel,
};
