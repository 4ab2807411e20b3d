// ── Generic subsystem controller ──
//
// UNINITIALIZED -> (place selected) -> LOADING -> LOADED, re-render on
// subsystem changes, full teardown back to UNINITIALIZED on session
// expiry. `update_view` is the single delivery point to the callback.
// Every closure handed to a listener or the scheduler holds a `Weak`.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::{Rc, Weak};
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use super::{ControllerState, SubsystemBinding, SubsystemSnapshot};
use crate::error::CoreError;
use crate::executor::UiScheduler;
use crate::future::{ClientFuture, ClientResult};
use crate::listener::ListenerRegistration;
use crate::model::{Address, Attributes, Model, ModelEvent, ModelView, SubsystemModel};
use crate::retry::RetryPolicy;
use crate::session::{ClientSession, SubsystemCatalog};
use crate::source::{AddressableListSource, AddressableModelSource, MemberFailure, ModelSource};
use crate::view::{CallbackSlot, ViewToken};

struct BoundList {
    source: AddressableListSource<Rc<Model>>,
    _registrations: [ListenerRegistration; 2],
}

pub(super) struct ControllerInner<B: SubsystemBinding> {
    this: Weak<Self>,
    session: ClientSession,
    catalog: SubsystemCatalog,
    scheduler: UiScheduler,
    debounce: Duration,
    retry: RetryPolicy,
    state: Cell<ControllerState>,
    initialized: Cell<bool>,
    /// Bumped on every place activation and teardown; stale async
    /// completions compare against it.
    load_epoch: Cell<u64>,
    update_generation: Cell<u64>,
    subsystem: AddressableModelSource<SubsystemModel>,
    lists: RefCell<Vec<BoundList>>,
    callback: CallbackSlot<B::Callback>,
    registrations: RefCell<Vec<ListenerRegistration>>,
}

/// Controller for one subsystem type. Cheap to clone.
pub struct SubsystemController<B: SubsystemBinding> {
    inner: Rc<ControllerInner<B>>,
}

impl<B: SubsystemBinding> Clone for SubsystemController<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<B: SubsystemBinding> SubsystemController<B> {
    pub fn new(
        session: ClientSession,
        catalog: SubsystemCatalog,
        scheduler: UiScheduler,
        debounce: Duration,
        retry: RetryPolicy,
    ) -> Self {
        let subsystem = AddressableModelSource::new(session.clone());
        Self {
            inner: Rc::new_cyclic(|this| ControllerInner {
                this: this.clone(),
                session,
                catalog,
                scheduler,
                debounce,
                retry,
                state: Cell::new(ControllerState::Uninitialized),
                initialized: Cell::new(false),
                load_epoch: Cell::new(0),
                update_generation: Cell::new(0),
                subsystem,
                lists: RefCell::new(Vec::new()),
                callback: CallbackSlot::new(),
                registrations: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Register for place activation, session expiry, and subsystem
    /// events. Starts loading right away if a place is already active.
    /// Later calls do nothing.
    pub fn init(&self) {
        let inner = &self.inner;
        if inner.initialized.replace(true) {
            return;
        }

        let weak = Rc::downgrade(inner);
        let on_place = inner.session.add_place_listener(move |place_id| {
            if let Some(inner) = weak.upgrade() {
                inner.on_place_activated(place_id);
            }
        });

        let weak = Rc::downgrade(inner);
        let on_expiry = inner.session.add_expiry_listener(move || {
            if let Some(inner) = weak.upgrade() {
                inner.teardown();
            }
        });

        let weak = Rc::downgrade(inner);
        let on_subsystem = inner.subsystem.add_listener(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.on_subsystem_event(event);
            }
        });

        let weak = Rc::downgrade(inner);
        let on_catalog = inner.catalog.subsystems().add_listener(move |event| {
            if let (ModelEvent::Added(model), Some(inner)) = (event, weak.upgrade()) {
                inner.on_subsystem_added(model);
            }
        });

        inner
            .registrations
            .borrow_mut()
            .extend([on_place, on_expiry, on_subsystem, on_catalog]);
        debug!(subsystem = B::SUBSYSTEM_TYPE, "controller initialized");

        if let Some(place_id) = inner.session.active_place() {
            inner.on_place_activated(&place_id);
        }
    }

    /// Attach a view. Held weakly; if the controller is loaded the view
    /// is updated synchronously before this returns.
    pub fn set_callback(&self, callback: &Rc<B::Callback>) -> ViewToken {
        let token = self.inner.callback.attach(callback);
        if self.is_loaded() {
            self.inner.update_view();
        }
        token
    }

    /// Detach the view attached with `token`, if it is still current.
    pub fn detach(&self, token: ViewToken) -> bool {
        self.inner.callback.detach(token)
    }

    pub fn clear_callback(&self) {
        self.inner.callback.clear();
    }

    pub fn state(&self) -> ControllerState {
        self.inner.state.get()
    }

    /// Subsystem loaded and every member list reconciled against it. A
    /// member that failed every retry counts as reconciled but absent.
    pub fn is_loaded(&self) -> bool {
        self.inner.is_loaded()
    }

    pub fn subsystem(&self) -> Option<SubsystemModel> {
        self.inner.subsystem.get()
    }

    pub fn subsystem_source(&self) -> AddressableModelSource<SubsystemModel> {
        self.inner.subsystem.clone()
    }

    /// Member list `index`, if bound.
    pub fn list(&self, index: usize) -> Option<AddressableListSource<Rc<Model>>> {
        self.inner
            .lists
            .borrow()
            .get(index)
            .map(|l| l.source.clone())
    }

    /// Render the current view model without delivering it.
    pub fn current_view(&self) -> Option<B::ViewModel> {
        if !self.is_loaded() {
            return None;
        }
        self.inner.snapshot().map(|s| B::render(&s))
    }

    /// Schedule a debounced view recomputation.
    pub fn request_update(&self) {
        self.inner.request_update();
    }

    /// Recompute and deliver the view now.
    pub fn update_view(&self) {
        self.inner.update_view();
    }

    /// Send `command` to the bound subsystem.
    pub fn send_command(&self, command: &str, attributes: Attributes) -> ClientFuture<Attributes> {
        match self.inner.subsystem.get() {
            Some(subsystem) => {
                info!(address = %subsystem.address(), command, "subsystem command");
                self.inner
                    .session
                    .request(subsystem.address(), command, attributes)
            }
            None => ClientFuture::failed(CoreError::NotLoaded {
                address: B::SUBSYSTEM_TYPE.to_owned(),
            }),
        }
    }

    /// Hand `error` to the attached view, or log it if none is attached.
    pub fn report_error(&self, error: &CoreError) {
        self.inner.deliver_error(error);
    }

    /// Run `f` with the attached view, if any.
    pub(crate) fn notify(&self, f: impl FnOnce(&B::Callback)) {
        match self.inner.callback.get() {
            Some(callback) => f(&callback),
            None => debug!(
                subsystem = B::SUBSYSTEM_TYPE,
                "no view attached, dropping notification"
            ),
        }
    }

    pub(crate) fn session(&self) -> &ClientSession {
        &self.inner.session
    }

    pub(crate) fn downgrade(&self) -> WeakController<B> {
        WeakController {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

/// Non-owning controller handle for command completions.
pub(crate) struct WeakController<B: SubsystemBinding> {
    inner: Weak<ControllerInner<B>>,
}

impl<B: SubsystemBinding> WeakController<B> {
    pub(crate) fn upgrade(&self) -> Option<SubsystemController<B>> {
        self.inner
            .upgrade()
            .map(|inner| SubsystemController { inner })
    }
}

impl<B: SubsystemBinding> ControllerInner<B> {
    // ── Lifecycle ────────────────────────────────────────────────────

    fn on_place_activated(self: &Rc<Self>, place_id: &str) {
        let epoch = self.load_epoch.get() + 1;
        self.load_epoch.set(epoch);
        self.state.set(ControllerState::Loading);
        self.subsystem.set_address(None);
        info!(subsystem = B::SUBSYSTEM_TYPE, place_id, "loading subsystem");

        if let Some(subsystem) = self.catalog.find(B::SUBSYSTEM_TYPE) {
            self.bind(subsystem.address().clone(), epoch);
            return;
        }

        let weak = Rc::downgrade(self);
        self.catalog.load(place_id).on_completion(move |result| {
            if let Some(inner) = weak.upgrade() {
                inner.on_catalog_loaded(epoch, result.map(|_| ()));
            }
        });
    }

    fn on_catalog_loaded(self: &Rc<Self>, epoch: u64, result: ClientResult<()>) {
        if epoch != self.load_epoch.get() {
            trace!(subsystem = B::SUBSYSTEM_TYPE, "ignoring stale catalog load");
            return;
        }
        match result {
            Ok(()) => match self.catalog.find(B::SUBSYSTEM_TYPE) {
                Some(subsystem) => self.bind(subsystem.address().clone(), epoch),
                None => info!(subsystem = B::SUBSYSTEM_TYPE, "subsystem not present at place"),
            },
            Err(CoreError::Superseded { .. }) => {}
            Err(error) => {
                warn!(subsystem = B::SUBSYSTEM_TYPE, error = %error, "catalog load failed");
                self.deliver_error(&error);
            }
        }
    }

    /// A subsystem of our type showed up after the catalog load.
    fn on_subsystem_added(self: &Rc<Self>, model: &Rc<Model>) {
        if self.state.get() != ControllerState::Loading || self.subsystem.address().is_some() {
            return;
        }
        let view = SubsystemModel::from_model(Rc::clone(model));
        if view.subsystem_type().as_deref() != Some(B::SUBSYSTEM_TYPE) {
            return;
        }
        let place = self.session.active_place();
        if view.place_id().is_some_and(|p| place.as_deref() != Some(p.as_str())) {
            return;
        }
        self.bind(model.address().clone(), self.load_epoch.get());
    }

    fn bind(self: &Rc<Self>, address: Address, epoch: u64) {
        debug!(subsystem = B::SUBSYSTEM_TYPE, %address, "binding subsystem");
        self.subsystem.set_address(Some(address));
        let weak = Rc::downgrade(self);
        self.subsystem.load().on_completion(move |result| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if epoch != inner.load_epoch.get() {
                return;
            }
            match result {
                Ok(_) => inner.on_subsystem_loaded(),
                Err(CoreError::Superseded { .. }) => {}
                Err(error) => inner.deliver_error(&error),
            }
        });
    }

    fn on_subsystem_loaded(&self) {
        if self.state.get() == ControllerState::Uninitialized {
            return;
        }
        self.state.set(ControllerState::Loaded);
        self.reconcile_lists();
        info!(subsystem = B::SUBSYSTEM_TYPE, "subsystem loaded");
        self.request_update();
    }

    fn on_subsystem_event(&self, event: &ModelEvent) {
        if self.state.get() == ControllerState::Uninitialized {
            return;
        }
        match event {
            ModelEvent::Added(_) | ModelEvent::Changed { .. } => {
                if self.state.get() == ControllerState::Loading && self.subsystem.is_loaded() {
                    self.state.set(ControllerState::Loaded);
                }
                self.reconcile_lists();
                self.request_update();
            }
            ModelEvent::Deleted(_) => {
                debug!(subsystem = B::SUBSYSTEM_TYPE, "subsystem deleted");
                self.state.set(ControllerState::Loading);
                self.update_generation
                    .set(self.update_generation.get() + 1);
            }
        }
    }

    /// Full teardown on session expiry.
    fn teardown(&self) {
        info!(subsystem = B::SUBSYSTEM_TYPE, "session expired, tearing down");
        self.state.set(ControllerState::Uninitialized);
        self.load_epoch.set(self.load_epoch.get() + 1);
        self.update_generation
            .set(self.update_generation.get() + 1);
        self.subsystem.set_address(None);
        let lists: Vec<BoundList> = self.lists.borrow_mut().drain(..).collect();
        for list in &lists {
            list.source.clear();
        }
    }

    // ── Member lists ─────────────────────────────────────────────────

    fn reconcile_lists(&self) {
        let Some(subsystem) = self.subsystem.get() else {
            return;
        };
        let memberships = B::member_lists(&subsystem);

        while self.lists.borrow().len() < memberships.len() {
            let source = AddressableListSource::with_retry(self.session.clone(), self.retry);
            let this = self.this.clone();
            let on_change = source.add_listener(move |_| {
                if let Some(inner) = this.upgrade() {
                    inner.request_update();
                }
            });
            let this = self.this.clone();
            let on_failure = source.add_failure_listener(move |failure| {
                if let Some(inner) = this.upgrade() {
                    inner.on_member_failed(failure);
                }
            });
            self.lists.borrow_mut().push(BoundList {
                source,
                _registrations: [on_change, on_failure],
            });
        }

        let sources: Vec<AddressableListSource<Rc<Model>>> = self
            .lists
            .borrow()
            .iter()
            .map(|l| l.source.clone())
            .collect();
        for (source, addresses) in sources.iter().zip(&memberships) {
            source.set_addresses(addresses);
        }
    }

    fn on_member_failed(&self, failure: &MemberFailure) {
        if self.state.get() == ControllerState::Uninitialized {
            return;
        }
        warn!(
            subsystem = B::SUBSYSTEM_TYPE,
            address = %failure.address,
            error = %failure.error,
            "member unavailable"
        );
        self.deliver_error(&failure.error);
    }

    // ── View ─────────────────────────────────────────────────────────

    fn is_loaded(&self) -> bool {
        if self.state.get() != ControllerState::Loaded || !self.subsystem.is_loaded() {
            return false;
        }
        let Some(subsystem) = self.subsystem.get() else {
            return false;
        };
        let memberships = B::member_lists(&subsystem);
        let lists = self.lists.borrow();
        if lists.len() < memberships.len() {
            return false;
        }
        lists.iter().zip(&memberships).all(|(list, declared)| {
            let tracked: HashSet<Address> = list.source.addresses().into_iter().collect();
            let declared: HashSet<&Address> = declared.iter().collect();
            tracked.len() == declared.len()
                && declared.iter().all(|a| tracked.contains(*a))
                && list.source.is_settled()
        })
    }

    fn snapshot(&self) -> Option<SubsystemSnapshot> {
        let subsystem = self.subsystem.get()?;
        let lists = self
            .lists
            .borrow()
            .iter()
            .map(|l| l.source.get())
            .collect();
        Some(SubsystemSnapshot { subsystem, lists })
    }

    /// Coalesce bursts into one `update_view`. Each request supersedes
    /// the previous one; a zero debounce posts immediately.
    fn request_update(&self) {
        let generation = self.update_generation.get() + 1;
        self.update_generation.set(generation);
        let this = self.this.clone();
        self.scheduler.post_delayed(self.debounce, move || {
            if let Some(inner) = this.upgrade() {
                if inner.update_generation.get() == generation {
                    inner.update_view();
                }
            }
        });
    }

    fn update_view(&self) {
        if !self.is_loaded() {
            trace!(subsystem = B::SUBSYSTEM_TYPE, "not loaded, skipping view update");
            return;
        }
        let Some(callback) = self.callback.get() else {
            return;
        };
        let Some(snapshot) = self.snapshot() else {
            return;
        };
        let view = B::render(&snapshot);
        trace!(subsystem = B::SUBSYSTEM_TYPE, "delivering view");
        B::deliver(&callback, &view);
    }

    fn deliver_error(&self, error: &CoreError) {
        match self.callback.get() {
            Some(callback) => B::deliver_error(&callback, error),
            None => warn!(
                subsystem = B::SUBSYSTEM_TYPE,
                error = %error,
                "no view attached, dropping error"
            ),
        }
    }
}
