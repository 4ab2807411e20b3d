use std::rc::Rc;

use super::attrs::{base, dev, devconn, person, place, scene, subs};
use super::{Address, Model, ModelView};

macro_rules! model_view {
    ($(#[$meta:meta])* $name:ident, $namespace:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name(Rc<Model>);

        impl ModelView for $name {
            const NAMESPACE: Option<&'static str> = Some($namespace);

            fn from_model(model: Rc<Model>) -> Self {
                Self(model)
            }

            fn model(&self) -> &Rc<Model> {
                &self.0
            }
        }
    };
}

// ── Device ───────────────────────────────────────────────────────────

model_view!(
    /// Physical device (`dev` namespace).
    DeviceModel,
    "dev"
);

impl DeviceModel {
    pub fn name(&self) -> Option<String> {
        self.0.get_str(dev::NAME)
    }

    pub fn vendor(&self) -> Option<String> {
        self.0.get_str(dev::VENDOR)
    }

    pub fn product(&self) -> Option<String> {
        self.0.get_str(dev::MODEL)
    }

    pub fn type_hint(&self) -> Option<String> {
        self.0.get_str(dev::TYPE_HINT)
    }

    /// Missing connectivity state counts as online.
    pub fn is_online(&self) -> bool {
        self.0
            .get_str(devconn::STATE)
            .is_none_or(|state| state == devconn::ONLINE)
    }
}

// ── Subsystem ────────────────────────────────────────────────────────

model_view!(
    /// Server-side aggregate such as alarm or presence (`subs` namespace).
    SubsystemModel,
    "subs"
);

impl SubsystemModel {
    /// `base:type`, e.g. `subsecurity`.
    pub fn subsystem_type(&self) -> Option<String> {
        self.0.get_str(base::TYPE)
    }

    pub fn name(&self) -> Option<String> {
        self.0.get_str(subs::NAME)
    }

    pub fn is_available(&self) -> bool {
        self.0.get_bool(subs::AVAILABLE).unwrap_or(false)
    }

    pub fn state(&self) -> Option<String> {
        self.0.get_str(subs::STATE)
    }

    pub fn place_id(&self) -> Option<String> {
        self.0.get_str(subs::PLACE_ID)
    }

    pub fn addresses(&self, attribute: &str) -> Vec<Address> {
        self.0.get_addresses(attribute)
    }
}

// ── Place ────────────────────────────────────────────────────────────

model_view!(PlaceModel, "place");

impl PlaceModel {
    pub fn name(&self) -> Option<String> {
        self.0.get_str(place::NAME)
    }

    pub fn street(&self) -> Option<String> {
        self.0.get_str(place::STREET)
    }

    pub fn city(&self) -> Option<String> {
        self.0.get_str(place::CITY)
    }

    pub fn timezone(&self) -> Option<String> {
        self.0.get_str(place::TIMEZONE)
    }
}

// ── Person ───────────────────────────────────────────────────────────

model_view!(PersonModel, "person");

impl PersonModel {
    pub fn first_name(&self) -> Option<String> {
        self.0.get_str(person::FIRST_NAME)
    }

    pub fn last_name(&self) -> Option<String> {
        self.0.get_str(person::LAST_NAME)
    }

    /// First and last name joined, falling back to the address id.
    pub fn display_name(&self) -> String {
        let parts: Vec<String> = [self.first_name(), self.last_name()]
            .into_iter()
            .flatten()
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            self.0.address().id().to_owned()
        } else {
            parts.join(" ")
        }
    }
}

// ── Scene ────────────────────────────────────────────────────────────

model_view!(SceneModel, "scene");

impl SceneModel {
    pub fn name(&self) -> Option<String> {
        self.0.get_str(scene::NAME)
    }

    pub fn is_enabled(&self) -> bool {
        self.0.get_bool(scene::ENABLED).unwrap_or(true)
    }
}
