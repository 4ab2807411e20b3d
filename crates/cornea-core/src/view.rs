// ── Weak view binding ──
//
// Controllers hold their callback weakly. A dropped view simply stops
// receiving updates; a stale `ViewToken` cannot detach a newer view.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// Identifies one `attach` call on a [`CallbackSlot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewToken(u64);

/// Weakly-held callback plus an attach generation.
pub struct CallbackSlot<C: ?Sized> {
    callback: RefCell<Option<Weak<C>>>,
    generation: Cell<u64>,
}

impl<C: ?Sized> CallbackSlot<C> {
    pub fn new() -> Self {
        Self {
            callback: RefCell::new(None),
            generation: Cell::new(0),
        }
    }

    /// Replace the current callback.
    pub fn attach(&self, callback: &Rc<C>) -> ViewToken {
        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        *self.callback.borrow_mut() = Some(Rc::downgrade(callback));
        ViewToken(generation)
    }

    /// Release the callback if `token` is still the current attachment.
    pub fn detach(&self, token: ViewToken) -> bool {
        if token.0 != self.generation.get() || self.callback.borrow().is_none() {
            return false;
        }
        self.clear();
        true
    }

    pub fn clear(&self) {
        self.callback.borrow_mut().take();
    }

    /// The callback, if one is attached and still alive.
    pub fn get(&self) -> Option<Rc<C>> {
        self.callback.borrow().as_ref().and_then(Weak::upgrade)
    }
}

impl<C: ?Sized> Default for CallbackSlot<C> {
    fn default() -> Self {
        Self::new()
    }
}
