use std::marker::PhantomData;
use std::rc::Rc;

use super::ModelCache;
use crate::listener::ListenerRegistration;
use crate::model::{Address, ModelEvent, ModelView};

/// Typed, namespace-filtered view over the [`ModelCache`].
///
/// Holds no data of its own; every read goes straight to the cache.
pub struct Store<T> {
    cache: Rc<ModelCache>,
    _view: PhantomData<fn() -> T>,
}

impl<T: ModelView> Store<T> {
    pub fn new(cache: Rc<ModelCache>) -> Self {
        Self {
            cache,
            _view: PhantomData,
        }
    }

    pub fn size(&self) -> usize {
        self.cache
            .models()
            .iter()
            .filter(|m| T::accepts(m))
            .count()
    }

    pub fn get(&self, address: &Address) -> Option<T> {
        self.cache
            .get(address)
            .filter(|m| T::accepts(m))
            .map(T::from_model)
    }

    pub fn values(&self) -> Vec<T> {
        self.cache
            .models()
            .into_iter()
            .filter(|m| T::accepts(m))
            .map(T::from_model)
            .collect()
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.cache
            .models()
            .iter()
            .filter(|m| T::accepts(m))
            .map(|m| m.address().clone())
            .collect()
    }

    /// First value matching `predicate`, in cache insertion order.
    pub fn find(&self, predicate: impl Fn(&T) -> bool) -> Option<T> {
        self.values().into_iter().find(|v| predicate(v))
    }

    /// Listen to cache events for this store's namespace only.
    pub fn add_listener(&self, listener: impl Fn(&ModelEvent) + 'static) -> ListenerRegistration {
        self.cache.add_listener(move |event| {
            if T::accepts(event.model()) {
                listener(event);
            }
        })
    }
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            cache: Rc::clone(&self.cache),
            _view: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("view", &std::any::type_name::<T>())
            .finish_non_exhaustive()
    }
}
