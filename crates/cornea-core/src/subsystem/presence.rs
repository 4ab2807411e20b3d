// ── Presence subsystem ──

use serde::Serialize;

use super::{SubsystemBinding, SubsystemController, SubsystemSnapshot};
use crate::error::CoreError;
use crate::model::attrs::subspres;
use crate::model::{Address, PersonModel, SubsystemModel};

/// Who is home, who is away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceSummary {
    pub people_at_home: Vec<String>,
    pub people_away: Vec<String>,
    pub devices_at_home: usize,
    pub devices_away: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum PresenceView {
    Summary(PresenceSummary),
    LearnMore,
}

pub trait PresenceCallback {
    fn show_summary(&self, summary: &PresenceSummary);
    fn show_learn_more(&self);
    fn on_error(&self, error: &CoreError);
}

pub struct PresenceBinding;

pub type PresenceController = SubsystemController<PresenceBinding>;

impl SubsystemBinding for PresenceBinding {
    type Callback = dyn PresenceCallback;
    type ViewModel = PresenceView;

    const SUBSYSTEM_TYPE: &'static str = "subspres";

    fn member_lists(subsystem: &SubsystemModel) -> Vec<Vec<Address>> {
        vec![
            subsystem.addresses(subspres::PEOPLE_AT_HOME),
            subsystem.addresses(subspres::PEOPLE_AWAY),
        ]
    }

    fn render(snapshot: &SubsystemSnapshot) -> PresenceView {
        let subsystem = &snapshot.subsystem;
        if !subsystem.is_available() {
            return PresenceView::LearnMore;
        }
        let names = |index: usize| -> Vec<String> {
            snapshot
                .list::<PersonModel>(index)
                .iter()
                .map(PersonModel::display_name)
                .collect()
        };
        PresenceView::Summary(PresenceSummary {
            people_at_home: names(0),
            people_away: names(1),
            devices_at_home: subsystem.addresses(subspres::DEVICES_AT_HOME).len(),
            devices_away: subsystem.addresses(subspres::DEVICES_AWAY).len(),
        })
    }

    fn deliver(callback: &dyn PresenceCallback, view: &PresenceView) {
        match view {
            PresenceView::Summary(summary) => callback.show_summary(summary),
            PresenceView::LearnMore => callback.show_learn_more(),
        }
    }

    fn deliver_error(callback: &dyn PresenceCallback, error: &CoreError) {
        callback.on_error(error);
    }
}
