// ── Single-model source ──
//
// EMPTY -> LOADING -> LOADED, LOADED -> LOADING on reload, and back to
// EMPTY on delete. Every rebind or delete bumps the epoch; a fetch that
// completes under an older epoch is superseded and touches nothing.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use serde_json::Value;
use tracing::{debug, trace};

use super::{ModelSource, SourceState};
use crate::error::CoreError;
use crate::future::{ClientFuture, ClientResult, SettableClientFuture};
use crate::listener::{ListenerList, ListenerRegistration};
use crate::model::{Address, Attributes, Model, ModelEvent, ModelView, attrs};
use crate::session::ClientSession;

struct Slot<T> {
    address: Option<Address>,
    value: Option<T>,
    pending: Option<(u64, ClientFuture<T>)>,
    epoch: u64,
    registration: Option<ListenerRegistration>,
}

struct SourceInner<T> {
    session: ClientSession,
    slot: RefCell<Slot<T>>,
    next_fetch: Cell<u64>,
    listeners: ListenerList<ModelEvent>,
}

/// Reactive handle bound to one address. Cheap to clone; clones share
/// state and listeners.
pub struct AddressableModelSource<T> {
    inner: Rc<SourceInner<T>>,
}

impl<T> Clone for AddressableModelSource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: ModelView> AddressableModelSource<T> {
    /// An unbound source.
    pub fn new(session: ClientSession) -> Self {
        Self {
            inner: Rc::new(SourceInner {
                session,
                slot: RefCell::new(Slot {
                    address: None,
                    value: None,
                    pending: None,
                    epoch: 0,
                    registration: None,
                }),
                next_fetch: Cell::new(0),
                listeners: ListenerList::new(),
            }),
        }
    }

    pub fn bound(session: ClientSession, address: Address) -> Self {
        let source = Self::new(session);
        source.set_address(Some(address));
        source
    }

    pub fn address(&self) -> Option<Address> {
        self.inner.slot.borrow().address.clone()
    }

    /// Rebind. The old per-address listener goes away and the source
    /// resets to EMPTY; `None` unbinds.
    pub fn set_address(&self, address: Option<Address>) {
        let old = {
            let mut slot = self.inner.slot.borrow_mut();
            if slot.address == address {
                return;
            }
            slot.epoch += 1;
            slot.address.clone_from(&address);
            slot.value = None;
            slot.pending = None;
            slot.registration.take()
        };
        drop(old);

        let Some(address) = address else {
            return;
        };
        trace!(%address, "source bound");
        let weak: Weak<SourceInner<T>> = Rc::downgrade(&self.inner);
        let registration = self.inner.session.cache().add_listener(move |event| {
            if event.address() != &address {
                return;
            }
            if let Some(inner) = weak.upgrade() {
                inner.on_cache_event(event);
            }
        });
        self.inner.slot.borrow_mut().registration = Some(registration);
    }

    fn fetch(&self, address: Address) -> ClientFuture<T> {
        let fetch_id = self.inner.next_fetch.get();
        self.inner.next_fetch.set(fetch_id + 1);

        let out = SettableClientFuture::new();
        let future = out.future();
        let epoch = {
            let mut slot = self.inner.slot.borrow_mut();
            slot.pending = Some((fetch_id, future.clone()));
            slot.epoch
        };

        debug!(%address, "fetching model");
        let request = self.inner.session.get_attributes(&address);
        let weak = Rc::downgrade(&self.inner);
        request.on_completion(move |result| {
            let outcome = match weak.upgrade() {
                Some(inner) => inner.finish_fetch(&address, epoch, fetch_id, result),
                None => Err(CoreError::Superseded {
                    address: address.to_string(),
                }),
            };
            out.complete(outcome);
        });
        future
    }
}

impl<T: ModelView> ModelSource<T> for AddressableModelSource<T> {
    fn load(&self) -> ClientFuture<T> {
        let (address, value, pending) = {
            let slot = self.inner.slot.borrow();
            (
                slot.address.clone(),
                slot.value.clone(),
                slot.pending.as_ref().map(|(_, f)| f.clone()),
            )
        };
        let Some(address) = address else {
            return ClientFuture::failed(CoreError::NotBound);
        };
        if let Some(pending) = pending {
            return pending;
        }
        if let Some(value) = value {
            return ClientFuture::succeeded(value);
        }
        if let Some(model) = self.inner.session.cache().get(&address) {
            trace!(%address, "adopting cached model");
            return ClientFuture::ready(self.inner.adopt(model));
        }
        self.fetch(address)
    }

    fn reload(&self) -> ClientFuture<T> {
        match self.address() {
            Some(address) => self.fetch(address),
            None => ClientFuture::failed(CoreError::NotBound),
        }
    }

    fn get(&self) -> Option<T> {
        self.inner.slot.borrow().value.clone()
    }

    fn state(&self) -> SourceState {
        let slot = self.inner.slot.borrow();
        if slot.pending.is_some() {
            SourceState::Loading
        } else if slot.value.is_some() {
            SourceState::Loaded
        } else {
            SourceState::Empty
        }
    }

    fn add_listener(&self, listener: impl Fn(&ModelEvent) + 'static) -> ListenerRegistration {
        self.inner.listeners.add(listener)
    }
}

impl<T: ModelView> SourceInner<T> {
    fn adopt(&self, model: Rc<Model>) -> ClientResult<T> {
        if !T::accepts(&model) {
            return Err(CoreError::InvalidModel {
                reason: format!("{} is not a {}", model.address(), std::any::type_name::<T>()),
            });
        }
        let value = T::from_model(model);
        self.slot.borrow_mut().value = Some(value.clone());
        Ok(value)
    }

    fn finish_fetch(
        &self,
        address: &Address,
        epoch: u64,
        fetch_id: u64,
        result: ClientResult<Attributes>,
    ) -> ClientResult<T> {
        {
            let mut slot = self.slot.borrow_mut();
            if slot.epoch != epoch {
                debug!(%address, "fetch superseded");
                return Err(CoreError::Superseded {
                    address: address.to_string(),
                });
            }
            if slot.pending.as_ref().is_some_and(|(id, _)| *id == fetch_id) {
                slot.pending = None;
            }
        }

        let cache = self.session.cache();
        let outcome = result.and_then(|mut attributes| {
            attributes
                .entry(attrs::base::ADDRESS)
                .or_insert_with(|| Value::String(address.to_string()));
            cache.add_or_update(attributes)
        });
        match outcome {
            Ok(model) => self.adopt(model),
            Err(error) => {
                debug!(%address, error = %error, "fetch failed");
                // Back to EMPTY, reload included. The cache entry is left
                // alone, so the next `load()` can adopt it.
                self.slot.borrow_mut().value = None;
                Err(error)
            }
        }
    }

    fn on_cache_event(&self, event: &ModelEvent) {
        match event {
            ModelEvent::Added(model) | ModelEvent::Changed { model, .. } => {
                if T::accepts(model) {
                    self.slot.borrow_mut().value = Some(T::from_model(Rc::clone(model)));
                }
            }
            ModelEvent::Deleted(_) => {
                let mut slot = self.slot.borrow_mut();
                slot.epoch += 1;
                slot.value = None;
                slot.pending = None;
            }
        }
        self.listeners.fire(event);
    }
}

impl<T> std::fmt::Debug for AddressableModelSource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.inner.slot.borrow();
        f.debug_struct("AddressableModelSource")
            .field("address", &slot.address)
            .field("loaded", &slot.value.is_some())
            .field("pending", &slot.pending.is_some())
            .finish()
    }
}
