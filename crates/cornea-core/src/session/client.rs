// ── Client session ──
//
// Correlates outbound requests with inbound responses, enforces the
// per-request timeout, and routes push events and session notices.
// Everything here runs on the UI scheduler; the transport only sends.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use cornea_api::{ClientRequest, Inbound, SessionNotice, Transport, commands};

use crate::cache::ModelCache;
use crate::error::CoreError;
use crate::executor::UiScheduler;
use crate::future::{ClientFuture, SettableClientFuture};
use crate::listener::{ListenerList, ListenerRegistration};
use crate::model::{Address, Attributes};

struct PendingRequest {
    address: Address,
    command: String,
    future: SettableClientFuture<Attributes>,
}

struct SessionInner {
    transport: Arc<dyn Transport>,
    scheduler: UiScheduler,
    cache: Rc<ModelCache>,
    request_timeout: Duration,
    next_id: Cell<u64>,
    pending: RefCell<HashMap<u64, PendingRequest>>,
    active_place: RefCell<Option<String>>,
    place_listeners: ListenerList<str>,
    expiry_listeners: ListenerList<()>,
}

/// Handle to the platform session. Cheap to clone.
#[derive(Clone)]
pub struct ClientSession {
    inner: Rc<SessionInner>,
}

impl ClientSession {
    pub fn new(
        transport: Arc<dyn Transport>,
        scheduler: UiScheduler,
        cache: Rc<ModelCache>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            inner: Rc::new(SessionInner {
                transport,
                scheduler,
                cache,
                request_timeout,
                next_id: Cell::new(1),
                pending: RefCell::new(HashMap::new()),
                active_place: RefCell::new(None),
                place_listeners: ListenerList::new(),
                expiry_listeners: ListenerList::new(),
            }),
        }
    }

    // ── Requests ─────────────────────────────────────────────────────

    /// Send `command` to `address`. Transport errors, timeouts, and
    /// platform errors all arrive through the returned future.
    pub fn request(
        &self,
        address: &Address,
        command: &str,
        attributes: Attributes,
    ) -> ClientFuture<Attributes> {
        let request_id = self.inner.next_id.get();
        self.inner.next_id.set(request_id + 1);

        let settable = SettableClientFuture::new();
        let future = settable.future();
        self.inner.pending.borrow_mut().insert(
            request_id,
            PendingRequest {
                address: address.clone(),
                command: command.to_owned(),
                future: settable,
            },
        );

        let timeout_ms = u64::try_from(self.inner.request_timeout.as_millis()).unwrap_or(u64::MAX);
        let request = ClientRequest {
            request_id,
            address: address.to_string(),
            command: command.to_owned(),
            attributes,
            timeout_ms,
        };

        debug!(request_id, %address, command, "sending request");
        if let Err(e) = self.inner.transport.send(request) {
            warn!(request_id, %address, command, error = %e, "send failed");
            let pending = self.inner.pending.borrow_mut().remove(&request_id);
            if let Some(pending) = pending {
                pending.future.set_error(CoreError::from(e));
            }
            return future;
        }

        let weak: Weak<SessionInner> = Rc::downgrade(&self.inner);
        self.inner
            .scheduler
            .post_delayed(self.inner.request_timeout, move || {
                if let Some(inner) = weak.upgrade() {
                    inner.time_out(request_id, timeout_ms);
                }
            });
        future
    }

    /// `base:GetAttributes` on `address`.
    pub fn get_attributes(&self, address: &Address) -> ClientFuture<Attributes> {
        self.request(address, commands::GET_ATTRIBUTES, Attributes::new())
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    // ── Inbound ──────────────────────────────────────────────────────

    /// Route one inbound message. Must run on the UI scheduler.
    pub fn dispatch(&self, inbound: Inbound) {
        match inbound {
            Inbound::Event(event) => self.inner.cache.apply_event(&event),
            Inbound::Response { request_id, result } => {
                let pending = self.inner.pending.borrow_mut().remove(&request_id);
                match pending {
                    Some(pending) => {
                        debug!(
                            request_id,
                            address = %pending.address,
                            command = %pending.command,
                            ok = result.is_ok(),
                            "response received"
                        );
                        pending.future.complete(result.map_err(CoreError::from));
                    }
                    None => debug!(request_id, "dropping response for unknown request"),
                }
            }
            Inbound::Session(SessionNotice::PlaceActivated { place_id }) => {
                self.activate_place(&place_id);
            }
            Inbound::Session(SessionNotice::SessionExpired) => self.expire(),
        }
    }

    // ── Place / session lifecycle ────────────────────────────────────

    pub fn active_place(&self) -> Option<String> {
        self.inner.active_place.borrow().clone()
    }

    /// Make `place_id` the active place. Switching places clears the cache
    /// before listeners hear about it; re-activating the current place is
    /// a no-op.
    pub fn activate_place(&self, place_id: &str) {
        let previous = self
            .inner
            .active_place
            .replace(Some(place_id.to_owned()));
        if previous.as_deref() == Some(place_id) {
            debug!(place_id, "place already active");
            return;
        }
        if let Some(previous) = previous {
            info!(from = %previous, to = place_id, "switching place");
            self.inner.cache.clear_cache();
        } else {
            info!(place_id, "place activated");
        }
        self.inner.place_listeners.fire(place_id);
    }

    /// Tear down session state: pending requests fail, the cache and the
    /// active place are cleared, then expiry listeners run.
    pub fn expire(&self) {
        let pending: Vec<PendingRequest> = self
            .inner
            .pending
            .borrow_mut()
            .drain()
            .map(|(_, p)| p)
            .collect();
        info!(pending = pending.len(), "session expired");
        for request in pending {
            request.future.set_error(CoreError::SessionExpired);
        }
        self.inner.active_place.replace(None);
        self.inner.cache.clear_cache();
        self.inner.expiry_listeners.fire(&());
    }

    pub fn add_place_listener(&self, listener: impl Fn(&str) + 'static) -> ListenerRegistration {
        self.inner.place_listeners.add(listener)
    }

    pub fn add_expiry_listener(&self, listener: impl Fn() + 'static) -> ListenerRegistration {
        self.inner.expiry_listeners.add(move |()| listener())
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn cache(&self) -> &Rc<ModelCache> {
        &self.inner.cache
    }

    pub fn scheduler(&self) -> &UiScheduler {
        &self.inner.scheduler
    }
}

impl SessionInner {
    fn time_out(&self, request_id: u64, timeout_ms: u64) {
        let pending = self.pending.borrow_mut().remove(&request_id);
        if let Some(pending) = pending {
            warn!(
                request_id,
                address = %pending.address,
                command = %pending.command,
                "request timed out"
            );
            pending.future.set_error(CoreError::Timeout {
                address: pending.address.to_string(),
                command: pending.command,
                timeout_ms,
            });
        }
    }
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("active_place", &self.inner.active_place.borrow())
            .field("pending", &self.inner.pending.borrow().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::RefCell;

    use cornea_api::{ErrorEvent, PlatformEvent};
    use serde_json::json;

    use super::*;
    use crate::test_support::{Harness, attrs};

    #[test]
    fn response_completes_matching_request() {
        let h = Harness::new();
        let future = h.session.get_attributes(&Address::new("DRIV:dev:1"));
        let sent = h.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].command, commands::GET_ATTRIBUTES);

        h.respond(sent[0].request_id, attrs(json!({ "dev:name": "Door" })));
        assert_eq!(
            future.result().unwrap().unwrap()["dev:name"],
            json!("Door")
        );
        assert_eq!(h.session.pending_count(), 0);
    }

    #[test]
    fn remote_error_carries_code() {
        let h = Harness::new();
        let future = h.session.request(
            &Address::new("SERV:subs:1"),
            "subsecurity:Arm",
            Attributes::new(),
        );
        let id = h.transport.sent()[0].request_id;
        h.fail(id, ErrorEvent::new("security.triggeredDevices", "open"));
        let err = future.result().unwrap().unwrap_err();
        assert_eq!(err.code(), Some("security.triggeredDevices"));
    }

    #[test]
    fn request_times_out() {
        let h = Harness::new();
        let future = h.session.get_attributes(&Address::new("DRIV:dev:1"));
        let id = h.transport.sent()[0].request_id;
        h.advance(h.config.request_timeout);
        assert!(future.result().unwrap().unwrap_err().is_timeout());

        // A late response is dropped.
        h.respond(id, Attributes::new());
        assert!(future.result().unwrap().unwrap_err().is_timeout());
    }

    #[test]
    fn send_failure_arrives_through_the_future() {
        let h = Harness::new();
        h.transport.set_connected(false);
        let future = h.session.get_attributes(&Address::new("DRIV:dev:1"));
        assert_eq!(future.result().unwrap(), Err(CoreError::Disconnected));
        assert_eq!(h.session.pending_count(), 0);
    }

    #[test]
    fn events_reach_the_cache() {
        let h = Harness::new();
        h.push(Inbound::Event(PlatformEvent::added(
            "DRIV:dev:1",
            attrs(json!({ "dev:name": "Door" })),
        )));
        assert!(h.cache.get(&Address::new("DRIV:dev:1")).is_some());
    }

    #[test]
    fn place_switch_clears_cache_and_notifies() {
        let h = Harness::new();
        let places = Rc::new(RefCell::new(Vec::new()));
        let p = places.clone();
        let _reg = h.session.add_place_listener(move |place| p.borrow_mut().push(place.to_owned()));

        h.activate_place("p1");
        h.cache
            .add_or_update(attrs(json!({ "base:address": "DRIV:dev:1" })))
            .unwrap();
        h.activate_place("p1");
        assert_eq!(h.cache.len(), 1);

        h.activate_place("p2");
        assert!(h.cache.is_empty());
        assert_eq!(*places.borrow(), vec!["p1", "p2"]);
        assert_eq!(h.session.active_place().as_deref(), Some("p2"));
    }

    #[test]
    fn expiry_fails_pending_and_clears_state() {
        let h = Harness::new();
        h.activate_place("p1");
        h.cache
            .add_or_update(attrs(json!({ "base:address": "DRIV:dev:1" })))
            .unwrap();
        let future = h.session.get_attributes(&Address::new("DRIV:dev:2"));
        let expired = Rc::new(Cell::new(false));
        let e = expired.clone();
        let _reg = h.session.add_expiry_listener(move || e.set(true));

        h.expire_session();
        assert_eq!(future.result().unwrap(), Err(CoreError::SessionExpired));
        assert!(h.cache.is_empty());
        assert!(h.session.active_place().is_none());
        assert!(expired.get());
    }
}
