// ── Domain model ──
//
// A `Model` is an address plus a mutable attribute bag. Typed views
// (`DeviceModel`, `SubsystemModel`, ...) are projections over the same
// `Rc<Model>`, never separate storage, so identity survives every
// Changed event.

mod address;
pub mod attrs;
mod views;

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;

pub use address::Address;
pub use cornea_api::Attributes;
pub use views::{DeviceModel, PersonModel, PlaceModel, SceneModel, SubsystemModel};

// ── Model ────────────────────────────────────────────────────────────

/// Cached attribute snapshot for one remote entity.
#[derive(Debug)]
pub struct Model {
    address: Address,
    attributes: RefCell<Attributes>,
}

impl Model {
    pub fn new(address: Address, attributes: Attributes) -> Self {
        Self {
            address,
            attributes: RefCell::new(attributes),
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Snapshot of the full attribute map.
    pub fn attributes(&self) -> Attributes {
        self.attributes.borrow().clone()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.attributes.borrow().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attributes.borrow().contains_key(name)
    }

    pub fn get_str(&self, name: &str) -> Option<String> {
        self.attributes
            .borrow()
            .get(name)
            .and_then(Value::as_str)
            .map(str::to_owned)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.attributes.borrow().get(name).and_then(Value::as_bool)
    }

    pub fn get_u64(&self, name: &str) -> Option<u64> {
        self.attributes.borrow().get(name).and_then(Value::as_u64)
    }

    /// String-array attribute. Non-string entries are skipped; a missing
    /// or non-array attribute is empty.
    pub fn get_string_list(&self, name: &str) -> Vec<String> {
        self.attributes
            .borrow()
            .get(name)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Address-array attribute, e.g. a subsystem's member devices.
    pub fn get_addresses(&self, name: &str) -> Vec<Address> {
        self.get_string_list(name)
            .into_iter()
            .map(Address::new)
            .collect()
    }

    /// `base:type`.
    pub fn model_type(&self) -> Option<String> {
        self.get_str(attrs::base::TYPE)
    }

    /// `base:caps`: names of the capabilities this model supports.
    pub fn capabilities(&self) -> Vec<String> {
        self.get_string_list(attrs::base::CAPS)
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities().iter().any(|c| c == capability)
    }

    /// Merge `incoming` into this model. Returns the attributes whose
    /// values actually changed.
    pub(crate) fn merge(&self, incoming: &Attributes) -> Attributes {
        let mut attributes = self.attributes.borrow_mut();
        let mut delta = Attributes::new();
        for (name, value) in incoming {
            if attributes.get(name) != Some(value) {
                attributes.insert(name.clone(), value.clone());
                delta.insert(name.clone(), value.clone());
            }
        }
        delta
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address && *self.attributes.borrow() == *other.attributes.borrow()
    }
}

// ── ModelEvent ───────────────────────────────────────────────────────

/// Change notification for one cached model. Only `ModelCache` emits these.
#[derive(Debug, Clone)]
pub enum ModelEvent {
    Added(Rc<Model>),
    Changed {
        model: Rc<Model>,
        /// Attribute names mapped to their new values.
        changes: Attributes,
    },
    Deleted(Rc<Model>),
}

impl ModelEvent {
    pub fn model(&self) -> &Rc<Model> {
        match self {
            Self::Added(model) | Self::Deleted(model) | Self::Changed { model, .. } => model,
        }
    }

    pub fn address(&self) -> &Address {
        Model::address(self.model())
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted(_))
    }

    /// True if this is a Changed event touching `name`.
    pub fn changed(&self, name: &str) -> bool {
        matches!(self, Self::Changed { changes, .. } if changes.contains_key(name))
    }
}

// ── ModelView ────────────────────────────────────────────────────────

/// A typed projection over a cached [`Model`].
pub trait ModelView: Clone + 'static {
    /// Namespace this view applies to, or `None` for any model.
    const NAMESPACE: Option<&'static str>;

    fn from_model(model: Rc<Model>) -> Self;

    fn model(&self) -> &Rc<Model>;

    fn address(&self) -> &Address {
        // `Rc<Model>` is itself a `ModelView`; name the inherent method.
        Model::address(self.model())
    }

    fn accepts(model: &Model) -> bool {
        Self::NAMESPACE.is_none_or(|ns| model.address().namespace() == ns)
    }
}

impl ModelView for Rc<Model> {
    const NAMESPACE: Option<&'static str> = None;

    fn from_model(model: Rc<Model>) -> Self {
        model
    }

    fn model(&self) -> &Rc<Model> {
        self
    }
}
