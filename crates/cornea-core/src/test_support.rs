//! Deterministic harness for driving the core in tests.
//!
//! A [`Harness`] wires a [`Cornea`] to a [`ManualClock`] and a
//! [`MemoryTransport`] that never answers on its own. Tests answer
//! requests explicitly and step time by hand.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use cornea_api::{ClientRequest, ErrorEvent, Inbound, MemoryTransport, SessionNotice, commands};

use crate::cache::ModelCache;
use crate::config::CoreConfig;
use crate::executor::{ManualClock, UiScheduler};
use crate::model::{Attributes, attrs as names};
use crate::session::{ClientSession, SubsystemCatalog};
use crate::Cornea;

/// Attribute map from a JSON object literal. Anything else yields an
/// empty map.
pub fn attrs(value: Value) -> Attributes {
    match value {
        Value::Object(map) => map,
        _ => Attributes::new(),
    }
}

pub struct Harness {
    pub clock: Rc<ManualClock>,
    pub transport: Arc<MemoryTransport>,
    pub config: CoreConfig,
    pub cornea: Cornea,
    pub scheduler: UiScheduler,
    pub cache: Rc<ModelCache>,
    pub session: ClientSession,
    pub catalog: SubsystemCatalog,
    answered: RefCell<HashSet<u64>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(CoreConfig::default())
    }

    pub fn with_config(config: CoreConfig) -> Self {
        let clock = Rc::new(ManualClock::new());
        let transport = Arc::new(MemoryTransport::new());
        let cornea = Cornea::with_clock(config.clone(), transport.clone(), clock.clone());
        Self {
            scheduler: cornea.scheduler().clone(),
            cache: Rc::clone(cornea.cache()),
            session: cornea.session().clone(),
            catalog: cornea.catalog().clone(),
            clock,
            transport,
            config,
            cornea,
            answered: RefCell::new(HashSet::new()),
        }
    }

    // ── Time ────────────────────────────────────────────────────────

    /// Run every task that is due without moving the clock.
    pub fn settle(&self) {
        self.scheduler.run_pending();
    }

    /// Move the clock forward and run whatever became due.
    pub fn advance(&self, by: Duration) {
        self.settle();
        self.clock.advance(by);
        self.settle();
    }

    /// Let a debounced view update fire.
    pub fn settle_views(&self) {
        self.advance(self.config.view_debounce);
    }

    // ── Inbound ─────────────────────────────────────────────────────

    /// Deliver `inbound` through the runtime and settle.
    pub fn push(&self, inbound: Inbound) {
        self.cornea.dispatch(inbound);
        self.settle();
    }

    pub fn respond(&self, request_id: u64, attributes: Attributes) {
        self.answered.borrow_mut().insert(request_id);
        self.push(Inbound::Response {
            request_id,
            result: Ok(attributes),
        });
    }

    pub fn fail(&self, request_id: u64, error: ErrorEvent) {
        self.answered.borrow_mut().insert(request_id);
        self.push(Inbound::Response {
            request_id,
            result: Err(error),
        });
    }

    pub fn activate_place(&self, place_id: &str) {
        self.push(Inbound::Session(SessionNotice::PlaceActivated {
            place_id: place_id.to_owned(),
        }));
    }

    pub fn expire_session(&self) {
        self.push(Inbound::Session(SessionNotice::SessionExpired));
    }

    // ── Outbound ────────────────────────────────────────────────────

    /// Requests with `command` the harness has not answered yet.
    pub fn unanswered(&self, command: &str) -> Vec<ClientRequest> {
        let answered = self.answered.borrow();
        self.transport
            .sent_with_command(command)
            .into_iter()
            .filter(|r| !answered.contains(&r.request_id))
            .collect()
    }

    /// Answer every open `base:GetAttributes` for `address` with `body`
    /// plus `base:address`.
    pub fn serve_get(&self, address: &str, body: Value) {
        let mut attributes = attrs(body);
        attributes.insert(names::base::ADDRESS.into(), Value::String(address.to_owned()));
        for request in self.unanswered(commands::GET_ATTRIBUTES) {
            if request.address == address {
                self.respond(request.request_id, attributes.clone());
            }
        }
    }

    /// Answer every open `subs:ListSubsystems` with `subsystems`.
    pub fn serve_catalog(&self, subsystems: &[Value]) {
        let mut body = Attributes::new();
        body.insert(
            names::subs::LIST_KEY.into(),
            Value::Array(subsystems.to_vec()),
        );
        for request in self.unanswered(commands::LIST_SUBSYSTEMS) {
            self.respond(request.request_id, body.clone());
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
