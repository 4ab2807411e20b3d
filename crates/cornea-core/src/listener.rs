// ── Listener fan-out ──
//
// `ListenerList` is the fan-out used by the cache, sources, session and
// controllers. `ListenerRegistration` is the only way to unsubscribe.
// Firing iterates a snapshot, so listeners may re-enter the component
// that is firing, add listeners, or remove themselves mid-fan-out.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

// ── ListenerRegistration ─────────────────────────────────────────────

/// Idempotent unsubscribe handle.
///
/// After [`remove`](Self::remove) returns, the listener receives nothing
/// further, even if a fan-out is currently in progress. Dropping the
/// registration removes it too.
#[must_use = "dropping a ListenerRegistration removes the listener"]
pub struct ListenerRegistration {
    remove: Option<Box<dyn FnOnce()>>,
}

impl ListenerRegistration {
    pub fn new(remove: impl FnOnce() + 'static) -> Self {
        Self {
            remove: Some(Box::new(remove)),
        }
    }

    /// A registration that is already removed.
    pub fn empty() -> Self {
        Self { remove: None }
    }

    /// Remove the listener. Returns `false` if it was already removed.
    pub fn remove(&mut self) -> bool {
        match self.remove.take() {
            Some(remove) => {
                remove();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.remove.is_some()
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.remove();
    }
}

impl std::fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("active", &self.is_active())
            .finish()
    }
}

// ── ListenerList ─────────────────────────────────────────────────────

struct Entry<E: ?Sized> {
    id: u64,
    active: Cell<bool>,
    callback: Box<dyn Fn(&E)>,
}

struct ListInner<E: ?Sized> {
    entries: RefCell<Vec<Rc<Entry<E>>>>,
    next_id: Cell<u64>,
}

/// Ordered list of listeners for events of type `E`.
pub struct ListenerList<E: ?Sized> {
    inner: Rc<ListInner<E>>,
}

impl<E: ?Sized + 'static> ListenerList<E> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ListInner {
                entries: RefCell::new(Vec::new()),
                next_id: Cell::new(0),
            }),
        }
    }

    /// Append a listener. It receives events fired after this call.
    pub fn add(&self, callback: impl Fn(&E) + 'static) -> ListenerRegistration {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner.entries.borrow_mut().push(Rc::new(Entry {
            id,
            active: Cell::new(true),
            callback: Box::new(callback),
        }));

        let list: Weak<ListInner<E>> = Rc::downgrade(&self.inner);
        ListenerRegistration::new(move || {
            let Some(list) = list.upgrade() else {
                return;
            };
            let mut entries = list.entries.borrow_mut();
            if let Some(pos) = entries.iter().position(|e| e.id == id) {
                let entry = entries.remove(pos);
                entry.active.set(false);
            }
        })
    }

    /// Deliver `event` to every listener registered at the time of the call.
    pub fn fire(&self, event: &E) {
        let snapshot: Vec<Rc<Entry<E>>> = self.inner.entries.borrow().clone();
        for entry in snapshot {
            if entry.active.get() {
                (entry.callback)(event);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.borrow().is_empty()
    }
}

impl<E: ?Sized + 'static> Default for ListenerList<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ?Sized> std::fmt::Debug for ListenerList<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerList")
            .field("len", &self.inner.entries.borrow().len())
            .finish()
    }
}
