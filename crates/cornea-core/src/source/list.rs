// ── List source ──
//
// Tracks a changing set of addresses. Each member is an internal
// single-model source; the list only reconciles membership and
// aggregates member events. Members leaving the set are dropped from the
// list, never deleted from the shared cache. Member loads retry with a
// fixed delay; a member that still fails is reported and counted as
// settled-but-absent until a push event brings it in.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, warn};

use super::{AddressableModelSource, ModelSource};
use crate::error::CoreError;
use crate::future::ClientFuture;
use crate::listener::{ListenerList, ListenerRegistration};
use crate::model::{Address, ModelEvent, ModelView};
use crate::retry::{RetryPolicy, retry_with_fixed_delay};
use crate::session::ClientSession;

/// A member whose load gave up after every retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberFailure {
    pub address: Address,
    pub error: CoreError,
}

struct Member<T> {
    source: AddressableModelSource<T>,
    failed: Cell<bool>,
    _registration: ListenerRegistration,
}

struct ListInner<T> {
    session: ClientSession,
    retry: RetryPolicy,
    members: RefCell<IndexMap<Address, Member<T>>>,
    listeners: ListenerList<[T]>,
    model_listeners: ListenerList<ModelEvent>,
    failure_listeners: ListenerList<MemberFailure>,
}

/// Reactive handle bound to a set of addresses. Cheap to clone.
pub struct AddressableListSource<T> {
    inner: Rc<ListInner<T>>,
}

impl<T> Clone for AddressableListSource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: ModelView> AddressableListSource<T> {
    /// A list whose member loads are not retried.
    pub fn new(session: ClientSession) -> Self {
        Self::with_retry(session, RetryPolicy::none())
    }

    pub fn with_retry(session: ClientSession, retry: RetryPolicy) -> Self {
        Self {
            inner: Rc::new(ListInner {
                session,
                retry,
                members: RefCell::new(IndexMap::new()),
                listeners: ListenerList::new(),
                model_listeners: ListenerList::new(),
                failure_listeners: ListenerList::new(),
            }),
        }
    }

    /// Reconcile the tracked set against `addresses`. New members load,
    /// removed members are dropped, unchanged members are left alone.
    /// Listeners fire once if membership changed.
    pub fn set_addresses(&self, addresses: &[Address]) {
        let wanted: IndexSet<Address> = addresses.iter().cloned().collect();

        let removed: Vec<Member<T>> = {
            let mut members = self.inner.members.borrow_mut();
            let stale: Vec<Address> = members
                .keys()
                .filter(|a| !wanted.contains(*a))
                .cloned()
                .collect();
            stale
                .iter()
                .filter_map(|a| members.shift_remove(a))
                .collect()
        };

        let mut added = Vec::new();
        for address in wanted {
            if self.inner.members.borrow().contains_key(&address) {
                continue;
            }
            let source = AddressableModelSource::bound(self.inner.session.clone(), address.clone());
            let weak: Weak<ListInner<T>> = Rc::downgrade(&self.inner);
            let member = address.clone();
            let registration = source.add_listener(move |event| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_member_event(&member, event);
                }
            });
            self.inner.members.borrow_mut().insert(
                address.clone(),
                Member {
                    source,
                    failed: Cell::new(false),
                    _registration: registration,
                },
            );
            added.push(address);
        }

        let changed = !removed.is_empty() || !added.is_empty();
        drop(removed);
        if !changed {
            return;
        }
        debug!(added = added.len(), tracked = self.len(), "list membership changed");

        for address in &added {
            self.inner.load_member(address);
        }
        self.inner.listeners.fire(&self.get());
    }

    /// Stop tracking everything.
    pub fn clear(&self) {
        self.set_addresses(&[]);
    }

    /// Materialized members, in insertion order. Members still loading are
    /// not included.
    pub fn get(&self) -> Vec<T> {
        self.inner.get()
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.inner.members.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.members.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.members.borrow().is_empty()
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.inner.members.borrow().contains_key(address)
    }

    /// True when every tracked member is loaded.
    pub fn is_loaded(&self) -> bool {
        self.inner
            .members
            .borrow()
            .values()
            .all(|m| m.source.is_loaded())
    }

    /// True when every tracked member is either loaded or has given up
    /// loading.
    pub fn is_settled(&self) -> bool {
        self.inner
            .members
            .borrow()
            .values()
            .all(|m| m.failed.get() || m.source.is_loaded())
    }

    /// Members whose load failed after every retry.
    pub fn failed_addresses(&self) -> Vec<Address> {
        self.inner
            .members
            .borrow()
            .iter()
            .filter(|(_, m)| m.failed.get())
            .map(|(a, _)| a.clone())
            .collect()
    }

    /// Load every member and yield the list.
    pub fn load(&self) -> ClientFuture<Vec<T>> {
        let sources: Vec<AddressableModelSource<T>> = self
            .inner
            .members
            .borrow()
            .values()
            .map(|m| m.source.clone())
            .collect();
        ClientFuture::all(sources.iter().map(ModelSource::load).collect())
    }

    /// Fires with the current list whenever membership or a member changes.
    pub fn add_listener(&self, listener: impl Fn(&[T]) + 'static) -> ListenerRegistration {
        self.inner.listeners.add(listener)
    }

    /// Fires with each member's cache event.
    pub fn add_model_listener(
        &self,
        listener: impl Fn(&ModelEvent) + 'static,
    ) -> ListenerRegistration {
        self.inner.model_listeners.add(listener)
    }

    /// Fires when a member load fails after the last retry.
    pub fn add_failure_listener(
        &self,
        listener: impl Fn(&MemberFailure) + 'static,
    ) -> ListenerRegistration {
        self.inner.failure_listeners.add(listener)
    }
}

impl<T: ModelView> ListInner<T> {
    fn get(&self) -> Vec<T> {
        self.members
            .borrow()
            .values()
            .filter_map(|m| m.source.get())
            .collect()
    }

    fn member_source(&self, address: &Address) -> Option<AddressableModelSource<T>> {
        self.members.borrow().get(address).map(|m| m.source.clone())
    }

    /// Load a new member, retrying with the list's policy while it is
    /// still tracked.
    fn load_member(self: &Rc<Self>, address: &Address) {
        let weak = Rc::downgrade(self);
        let target = address.clone();
        let result = retry_with_fixed_delay(self.session.scheduler(), self.retry, move |attempt| {
            let source = weak.upgrade().and_then(|inner| inner.member_source(&target));
            match source {
                Some(source) => {
                    if attempt > 1 {
                        debug!(address = %target, attempt, "retrying member load");
                    }
                    source.load()
                }
                None => ClientFuture::failed(CoreError::Superseded {
                    address: target.to_string(),
                }),
            }
        });

        let weak = Rc::downgrade(self);
        let address = address.clone();
        result.on_failure(move |error| {
            if let Some(inner) = weak.upgrade() {
                inner.on_member_failed(address, error);
            }
        });
    }

    fn on_member_failed(&self, address: Address, error: CoreError) {
        if matches!(error, CoreError::Superseded { .. }) {
            return;
        }
        let marked = match self.members.borrow().get(&address) {
            Some(member) if !member.source.is_loaded() => {
                member.failed.set(true);
                true
            }
            _ => false,
        };
        if !marked {
            return;
        }
        warn!(%address, error = %error, "member load failed");
        self.failure_listeners.fire(&MemberFailure { address, error });
        self.listeners.fire(&self.get());
    }

    fn on_member_event(&self, address: &Address, event: &ModelEvent) {
        if !event.is_deleted() {
            if let Some(member) = self.members.borrow().get(address) {
                member.failed.set(false);
            }
        }
        self.model_listeners.fire(event);
        self.listeners.fire(&self.get());
    }
}

impl<T> std::fmt::Debug for AddressableListSource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressableListSource")
            .field("members", &self.inner.members.borrow().len())
            .finish_non_exhaustive()
    }
}
