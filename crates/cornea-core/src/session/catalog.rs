// ── Subsystem catalog ──
//
// Loads the subsystem list of a place and reconciles it into the cache
// (upsert-then-prune on the `subs` namespace). One in-flight load per
// place; failures retry with a fixed delay. Any place switch or session
// expiry bumps the generation so late results are discarded.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use serde_json::Value;
use tracing::{debug, info};

use cornea_api::{SUBSYSTEM_SERVICE, commands};

use super::ClientSession;
use crate::cache::Store;
use crate::error::CoreError;
use crate::future::ClientFuture;
use crate::listener::ListenerRegistration;
use crate::model::{Address, Attributes, ModelView, SubsystemModel, attrs};
use crate::retry::{RetryPolicy, retry_with_fixed_delay};

struct InFlight {
    id: u64,
    future: ClientFuture<Vec<SubsystemModel>>,
}

struct CatalogInner {
    session: ClientSession,
    subsystems: Store<SubsystemModel>,
    retry: RetryPolicy,
    generation: Cell<u64>,
    next_load: Cell<u64>,
    in_flight: RefCell<HashMap<String, InFlight>>,
    registrations: RefCell<Vec<ListenerRegistration>>,
}

/// Per-place subsystem directory. Cheap to clone.
#[derive(Clone)]
pub struct SubsystemCatalog {
    inner: Rc<CatalogInner>,
}

impl SubsystemCatalog {
    pub fn new(session: ClientSession, retry: RetryPolicy) -> Self {
        let subsystems = Store::new(Rc::clone(session.cache()));
        let inner = Rc::new(CatalogInner {
            session,
            subsystems,
            retry,
            generation: Cell::new(0),
            next_load: Cell::new(0),
            in_flight: RefCell::new(HashMap::new()),
            registrations: RefCell::new(Vec::new()),
        });

        let weak = Rc::downgrade(&inner);
        let on_place = inner.session.add_place_listener(move |_| {
            if let Some(inner) = weak.upgrade() {
                inner.reset();
            }
        });
        let weak = Rc::downgrade(&inner);
        let on_expiry = inner.session.add_expiry_listener(move || {
            if let Some(inner) = weak.upgrade() {
                inner.reset();
            }
        });
        inner
            .registrations
            .borrow_mut()
            .extend([on_place, on_expiry]);

        Self { inner }
    }

    /// Load the subsystems of `place_id`. Concurrent calls for the same
    /// place share one request.
    pub fn load(&self, place_id: &str) -> ClientFuture<Vec<SubsystemModel>> {
        if let Some(existing) = self.inner.in_flight.borrow().get(place_id) {
            debug!(place_id, "joining in-flight catalog load");
            return existing.future.clone();
        }

        let generation = self.inner.generation.get();
        let weak = Rc::downgrade(&self.inner);
        let place = place_id.to_owned();
        let future = retry_with_fixed_delay(
            self.inner.session.scheduler(),
            self.inner.retry,
            move |attempt| list_subsystems(&weak, &place, generation, attempt),
        );
        if future.is_done() {
            return future;
        }

        let id = self.inner.next_load.get();
        self.inner.next_load.set(id + 1);
        self.inner.in_flight.borrow_mut().insert(
            place_id.to_owned(),
            InFlight {
                id,
                future: future.clone(),
            },
        );

        let weak = Rc::downgrade(&self.inner);
        let place = place_id.to_owned();
        future.on_completion(move |_| {
            if let Some(inner) = weak.upgrade() {
                let mut in_flight = inner.in_flight.borrow_mut();
                if in_flight.get(&place).is_some_and(|f| f.id == id) {
                    in_flight.remove(&place);
                }
            }
        });
        future
    }

    /// The active place's subsystem of `subsystem_type`, if cached.
    pub fn find(&self, subsystem_type: &str) -> Option<SubsystemModel> {
        let place = self.inner.session.active_place();
        self.inner.subsystems.find(|s| {
            s.subsystem_type().as_deref() == Some(subsystem_type)
                && s.place_id().is_none_or(|p| place.as_deref().is_none_or(|a| a == p))
        })
    }

    pub fn subsystems(&self) -> &Store<SubsystemModel> {
        &self.inner.subsystems
    }

    pub fn is_loading(&self, place_id: &str) -> bool {
        self.inner.in_flight.borrow().contains_key(place_id)
    }
}

impl CatalogInner {
    fn reset(&self) {
        self.generation.set(self.generation.get() + 1);
        self.in_flight.borrow_mut().clear();
    }
}

fn list_subsystems(
    weak: &Weak<CatalogInner>,
    place_id: &str,
    generation: u64,
    attempt: u32,
) -> ClientFuture<Vec<SubsystemModel>> {
    let Some(inner) = weak.upgrade() else {
        return ClientFuture::failed(CoreError::Disconnected);
    };
    if inner.generation.get() != generation {
        return ClientFuture::failed(CoreError::Superseded {
            address: SUBSYSTEM_SERVICE.to_owned(),
        });
    }

    debug!(place_id, attempt, "listing subsystems");
    let mut request = Attributes::new();
    request.insert("placeId".into(), Value::String(place_id.to_owned()));
    let response = inner.session.request(
        &Address::new(SUBSYSTEM_SERVICE),
        commands::LIST_SUBSYSTEMS,
        request,
    );

    let weak = weak.clone();
    let place = place_id.to_owned();
    response.transform(move |response| {
        let Some(inner) = weak.upgrade() else {
            return Err(CoreError::Disconnected);
        };
        if inner.generation.get() != generation {
            return Err(CoreError::Superseded {
                address: SUBSYSTEM_SERVICE.to_owned(),
            });
        }
        let entities = subsystem_entities(&response)?;
        let models = inner.session.cache().apply_list("subs", entities);
        info!(place_id = %place, count = models.len(), "subsystem catalog loaded");
        Ok(models.into_iter().map(SubsystemModel::from_model).collect())
    })
}

fn subsystem_entities(response: &Attributes) -> Result<Vec<Attributes>, CoreError> {
    let items = response
        .get(attrs::subs::LIST_KEY)
        .and_then(Value::as_array)
        .ok_or_else(|| CoreError::InvalidModel {
            reason: format!("response has no `{}` array", attrs::subs::LIST_KEY),
        })?;
    Ok(items
        .iter()
        .filter_map(|item| item.as_object().cloned())
        .collect())
}

impl std::fmt::Debug for SubsystemCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubsystemCatalog")
            .field("generation", &self.inner.generation.get())
            .field("in_flight", &self.inner.in_flight.borrow().len())
            .finish_non_exhaustive()
    }
}
