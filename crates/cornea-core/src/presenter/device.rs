use std::rc::Rc;

use serde::Serialize;

use super::Presenter;
use crate::error::CoreError;
use crate::model::{Address, DeviceModel, Model, ModelEvent, ModelView};
use crate::session::ClientSession;
use crate::source::{AddressableModelSource, ModelSource};

/// Flattened device details for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceDetails {
    pub address: String,
    pub name: Option<String>,
    pub vendor: Option<String>,
    pub product: Option<String>,
    pub online: bool,
}

impl From<&DeviceModel> for DeviceDetails {
    fn from(device: &DeviceModel) -> Self {
        Self {
            address: device.address().to_string(),
            name: device.name(),
            vendor: device.vendor(),
            product: device.product(),
            online: device.is_online(),
        }
    }
}

pub trait DeviceView {
    fn show_device(&self, device: &DeviceDetails);
    fn show_removed(&self);
    fn show_error(&self, error: &CoreError);
}

/// Shows one device through a single-model source.
pub struct DevicePresenter {
    base: Rc<Presenter<dyn DeviceView>>,
    source: AddressableModelSource<DeviceModel>,
}

impl DevicePresenter {
    pub fn new(session: ClientSession, address: Address) -> Self {
        Self {
            base: Rc::new(Presenter::new()),
            source: AddressableModelSource::bound(session, address),
        }
    }

    pub fn start_presenting(&self, view: &Rc<dyn DeviceView>) {
        self.base.start_presenting(view);

        let base = Rc::downgrade(&self.base);
        let registration = self.source.add_listener(move |event| {
            let Some(base) = base.upgrade() else {
                return;
            };
            match event {
                ModelEvent::Deleted(_) => base.with_view(|v| v.show_removed()),
                ModelEvent::Added(model) | ModelEvent::Changed { model, .. } => {
                    base.with_view(|v| v.show_device(&details(model)))
                }
            };
        });
        self.base.add_registration("device", registration);

        let base = Rc::downgrade(&self.base);
        self.source.load().on_completion(move |result| {
            let Some(base) = base.upgrade() else {
                return;
            };
            match result {
                Ok(device) => base.with_view(|v| v.show_device(&DeviceDetails::from(&device))),
                Err(error) => base.with_view(|v| v.show_error(&error)),
            };
        });
    }

    pub fn stop_presenting(&self) {
        self.base.stop_presenting();
    }

    pub fn is_presenting(&self) -> bool {
        self.base.is_presenting()
    }

    pub fn source(&self) -> &AddressableModelSource<DeviceModel> {
        &self.source
    }
}

fn details(model: &Rc<Model>) -> DeviceDetails {
    DeviceDetails::from(&DeviceModel::from_model(Rc::clone(model)))
}
