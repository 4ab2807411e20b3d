// ── Presenter base ──
//
// Holds a view weakly plus a named set of listener registrations.
// `stop_presenting` releases every registration exactly once.

mod device;

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tracing::trace;

use crate::listener::ListenerRegistration;

pub use device::{DeviceDetails, DevicePresenter, DeviceView};

pub struct Presenter<V: ?Sized> {
    view: RefCell<Option<Weak<V>>>,
    registrations: RefCell<IndexMap<String, ListenerRegistration>>,
}

impl<V: ?Sized> Presenter<V> {
    pub fn new() -> Self {
        Self {
            view: RefCell::new(None),
            registrations: RefCell::new(IndexMap::new()),
        }
    }

    pub fn start_presenting(&self, view: &Rc<V>) {
        *self.view.borrow_mut() = Some(Rc::downgrade(view));
    }

    /// Release the view and remove every registration.
    pub fn stop_presenting(&self) {
        let registrations: Vec<(String, ListenerRegistration)> =
            self.registrations.borrow_mut().drain(..).collect();
        for (name, mut registration) in registrations {
            trace!(name, "removing registration");
            registration.remove();
        }
        self.view.borrow_mut().take();
    }

    /// Track `registration` under `name`, removing any registration
    /// already held under that name.
    pub fn add_registration(&self, name: impl Into<String>, registration: ListenerRegistration) {
        let previous = self
            .registrations
            .borrow_mut()
            .insert(name.into(), registration);
        if let Some(mut previous) = previous {
            previous.remove();
        }
    }

    pub fn remove_registration(&self, name: &str) -> bool {
        let removed = self.registrations.borrow_mut().shift_remove(name);
        removed.is_some_and(|mut r| r.remove())
    }

    pub fn has_registration(&self, name: &str) -> bool {
        self.registrations.borrow().contains_key(name)
    }

    pub fn registration_count(&self) -> usize {
        self.registrations.borrow().len()
    }

    pub fn is_presenting(&self) -> bool {
        self.view().is_some()
    }

    pub fn view(&self) -> Option<Rc<V>> {
        self.view.borrow().as_ref().and_then(Weak::upgrade)
    }

    /// Run `f` with the view if it is still alive.
    pub fn with_view<R>(&self, f: impl FnOnce(&V) -> R) -> Option<R> {
        self.view().map(|view| f(&view))
    }
}

impl<V: ?Sized> Default for Presenter<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: ?Sized> Drop for Presenter<V> {
    fn drop(&mut self) {
        self.stop_presenting();
    }
}
