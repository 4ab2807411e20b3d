//! Transport seam between the platform session and the UI loop.
//!
//! A [`Transport`] only sends. Everything coming back (responses, push
//! events, session notices) is handed to the UI loop as [`Inbound`] data
//! through an [`InboundSender`], so the core never runs on a network
//! thread.

use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::error::Error;
use crate::messages::{Attributes, ClientRequest, ErrorEvent, Inbound};

/// Sending half of the inbound channel drained by the UI loop.
pub type InboundSender = mpsc::UnboundedSender<Inbound>;

/// Receiving half, owned by the UI loop.
pub type InboundReceiver = mpsc::UnboundedReceiver<Inbound>;

/// Create the inbound channel a transport and the UI loop share.
pub fn inbound_channel() -> (InboundSender, InboundReceiver) {
    mpsc::unbounded_channel()
}

/// Outbound half of a platform session.
///
/// Implementations must not block: hand the request to the network layer
/// and return. Errors returned here are delivered to the caller's future
/// by the core, never thrown at it.
pub trait Transport: Send + Sync {
    fn send(&self, request: ClientRequest) -> Result<(), Error>;
}

// ── MemoryTransport ──────────────────────────────────────────────────

/// Canned reply produced by a [`MemoryTransport`] responder.
pub type Reply = Result<Attributes, ErrorEvent>;

type Responder = Box<dyn Fn(&ClientRequest) -> Option<Reply> + Send + Sync>;

/// In-process transport that records every request.
///
/// With a responder installed, replies are pushed straight back onto the
/// inbound channel, which is how replays and tests drive the core without
/// a network.
pub struct MemoryTransport {
    sent: Mutex<Vec<ClientRequest>>,
    connected: Mutex<bool>,
    inbound: Option<InboundSender>,
    responder: Option<Responder>,
}

impl MemoryTransport {
    /// A transport that records requests and never replies.
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            connected: Mutex::new(true),
            inbound: None,
            responder: None,
        }
    }

    /// A transport that answers requests with `responder`.
    ///
    /// Requests the responder returns `None` for stay unanswered (and will
    /// time out in the core).
    pub fn with_responder(
        inbound: InboundSender,
        responder: impl Fn(&ClientRequest) -> Option<Reply> + Send + Sync + 'static,
    ) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            connected: Mutex::new(true),
            inbound: Some(inbound),
            responder: Some(Box::new(responder)),
        }
    }

    /// Simulate losing (or regaining) the connection.
    pub fn set_connected(&self, connected: bool) {
        *self.connected.lock().unwrap_or_else(PoisonError::into_inner) = connected;
    }

    /// Snapshot of every request sent so far.
    pub fn sent(&self) -> Vec<ClientRequest> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Requests sent with the given command.
    pub fn sent_with_command(&self, command: &str) -> Vec<ClientRequest> {
        self.sent()
            .into_iter()
            .filter(|r| r.command == command)
            .collect()
    }

    /// Number of requests sent so far.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MemoryTransport {
    fn send(&self, request: ClientRequest) -> Result<(), Error> {
        if !*self.connected.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(Error::Disconnected);
        }

        tracing::trace!(
            request_id = request.request_id,
            address = %request.address,
            command = %request.command,
            "memory transport send"
        );

        let reply = self.responder.as_ref().and_then(|respond| respond(&request));
        let request_id = request.request_id;
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        if let (Some(result), Some(inbound)) = (reply, self.inbound.as_ref()) {
            inbound
                .send(Inbound::Response { request_id, result })
                .map_err(|_| Error::ChannelClosed)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::messages::commands;

    fn request(id: u64, command: &str) -> ClientRequest {
        ClientRequest {
            request_id: id,
            address: "DRIV:dev:1".into(),
            command: command.into(),
            attributes: Attributes::new(),
            timeout_ms: 1_000,
        }
    }

    #[test]
    fn records_requests_in_order() {
        let transport = MemoryTransport::new();
        transport.send(request(1, commands::GET_ATTRIBUTES)).unwrap();
        transport.send(request(2, "dev:Ping")).unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].request_id, 1);
        assert_eq!(transport.sent_with_command("dev:Ping").len(), 1);
    }

    #[test]
    fn disconnected_transport_rejects() {
        let transport = MemoryTransport::new();
        transport.set_connected(false);
        let err = transport.send(request(1, commands::GET_ATTRIBUTES)).unwrap_err();
        assert!(matches!(err, Error::Disconnected));
        assert_eq!(transport.sent_count(), 0);
    }

    #[test]
    fn responder_replies_on_inbound_channel() {
        let (tx, mut rx) = inbound_channel();
        let transport = MemoryTransport::with_responder(tx, |req| {
            (req.command == commands::GET_ATTRIBUTES).then(|| {
                let mut attrs = Attributes::new();
                attrs.insert("base:address".into(), json!(req.address));
                Ok(attrs)
            })
        });

        transport.send(request(9, commands::GET_ATTRIBUTES)).unwrap();
        transport.send(request(10, "dev:Ping")).unwrap();

        match rx.try_recv().unwrap() {
            Inbound::Response { request_id, result } => {
                assert_eq!(request_id, 9);
                assert_eq!(result.unwrap()["base:address"], json!("DRIV:dev:1"));
            }
            other => panic!("unexpected inbound: {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }
}
