//! Reactive handles bound to one address or to a changing set of them.

mod list;
mod model;

use strum::{Display, EnumString};

use crate::future::ClientFuture;
use crate::listener::ListenerRegistration;
use crate::model::{ModelEvent, ModelView};

pub use list::{AddressableListSource, MemberFailure};
pub use model::AddressableModelSource;

/// Load state of a single-model source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceState {
    Empty,
    Loading,
    Loaded,
}

/// A reactive handle onto one cached model.
pub trait ModelSource<T: ModelView> {
    /// Idempotent load: the current value, the in-flight fetch, or a new
    /// fetch, in that order of preference.
    fn load(&self) -> ClientFuture<T>;

    /// Always fetch, whatever the current state.
    fn reload(&self) -> ClientFuture<T>;

    /// The exact object the cache holds, if loaded.
    fn get(&self) -> Option<T>;

    fn state(&self) -> SourceState;

    fn is_loaded(&self) -> bool {
        self.state() == SourceState::Loaded
    }

    /// Listen to cache events for the bound address.
    fn add_listener(&self, listener: impl Fn(&ModelEvent) + 'static) -> ListenerRegistration;
}
