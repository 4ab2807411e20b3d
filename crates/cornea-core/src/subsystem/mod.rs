//! Subsystem controllers.
//!
//! [`SubsystemController`] is the generic lifecycle: place activation,
//! catalog lookup, subsystem and member-list binding, debounced view
//! recomputation, and teardown on session expiry. A [`SubsystemBinding`]
//! supplies what differs per subsystem: its type, its member lists, a pure
//! `render`, and how to talk to its callback trait.

mod controller;
pub mod presence;
pub mod security;

use std::fmt::Debug;
use std::rc::Rc;

use strum::{Display, EnumString};

use crate::error::CoreError;
use crate::model::{Address, Model, ModelView, SubsystemModel};

pub use controller::SubsystemController;
pub use presence::{
    PresenceBinding, PresenceCallback, PresenceController, PresenceSummary, PresenceView,
};
pub use security::{
    AlarmMode, AlarmState, SecurityBinding, SecurityCallback, SecurityController, SecuritySummary,
    SecurityView,
};

/// Lifecycle of a subsystem controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ControllerState {
    Uninitialized,
    Loading,
    Loaded,
}

/// Everything a binding's `render` can see.
#[derive(Debug, Clone)]
pub struct SubsystemSnapshot {
    pub subsystem: SubsystemModel,
    /// Materialized member lists, in the order `member_lists` declared them.
    pub lists: Vec<Vec<Rc<Model>>>,
}

impl SubsystemSnapshot {
    /// Members of list `index` as typed views. Members of another
    /// namespace are skipped.
    pub fn list<T: ModelView>(&self, index: usize) -> Vec<T> {
        self.lists
            .get(index)
            .map(|models| {
                models
                    .iter()
                    .filter(|m| T::accepts(m))
                    .cloned()
                    .map(T::from_model)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Per-subsystem behavior plugged into [`SubsystemController`].
pub trait SubsystemBinding: 'static {
    /// Callback trait views implement, held weakly.
    type Callback: ?Sized + 'static;
    /// UI-ready model produced by `render`.
    type ViewModel: Clone + PartialEq + Debug + 'static;

    /// `base:type` of the subsystem this controller binds.
    const SUBSYSTEM_TYPE: &'static str;

    /// Member lists derived from the subsystem's attributes.
    fn member_lists(subsystem: &SubsystemModel) -> Vec<Vec<Address>>;

    fn render(snapshot: &SubsystemSnapshot) -> Self::ViewModel;

    fn deliver(callback: &Self::Callback, view: &Self::ViewModel);

    fn deliver_error(callback: &Self::Callback, error: &CoreError);
}
