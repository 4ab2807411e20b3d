// ── Security (alarm) subsystem ──

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};
use tracing::info;

use super::{SubsystemBinding, SubsystemController, SubsystemSnapshot};
use crate::error::CoreError;
use crate::future::ClientFuture;
use crate::model::attrs::subsecurity;
use crate::model::{Address, Attributes, DeviceModel, ModelView, SubsystemModel};

/// Alarm lifecycle as reported by `subsecurity:alarmState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmState {
    Inactive,
    Disarmed,
    Arming,
    Armed,
    Alert,
    Clearing,
    Soaking,
    Unknown,
}

/// Arming mode (`subsecurity:alarmMode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmMode {
    On,
    Partial,
    Off,
}

/// UI-ready summary of the alarm subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecuritySummary {
    pub alarm_state: AlarmState,
    pub alarm_mode: AlarmMode,
    pub total_devices: usize,
    pub offline_devices: usize,
    /// Names of devices currently triggered.
    pub triggered_devices: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum SecurityView {
    Summary(SecuritySummary),
    LearnMore,
}

/// Implemented by views showing the alarm subsystem.
pub trait SecurityCallback {
    fn show_summary(&self, summary: &SecuritySummary);
    fn show_learn_more(&self);
    /// Arming was refused because devices are triggered; offer to bypass.
    fn show_bypass_prompt(&self, mode: AlarmMode, triggered: &[DeviceModel]);
    fn on_error(&self, error: &CoreError);
}

pub struct SecurityBinding;

pub type SecurityController = SubsystemController<SecurityBinding>;

impl SubsystemBinding for SecurityBinding {
    type Callback = dyn SecurityCallback;
    type ViewModel = SecurityView;

    const SUBSYSTEM_TYPE: &'static str = "subsecurity";

    fn member_lists(subsystem: &SubsystemModel) -> Vec<Vec<Address>> {
        vec![
            subsystem.addresses(subsecurity::SECURITY_DEVICES),
            subsystem.addresses(subsecurity::TRIGGERED_DEVICES),
        ]
    }

    fn render(snapshot: &SubsystemSnapshot) -> SecurityView {
        let subsystem = &snapshot.subsystem;
        if !subsystem.is_available() {
            return SecurityView::LearnMore;
        }

        let devices: Vec<DeviceModel> = snapshot.list(0);
        let triggered: Vec<DeviceModel> = snapshot.list(1);
        SecurityView::Summary(SecuritySummary {
            alarm_state: parse_attr(subsystem, subsecurity::ALARM_STATE)
                .unwrap_or(AlarmState::Unknown),
            alarm_mode: parse_attr(subsystem, subsecurity::ALARM_MODE).unwrap_or(AlarmMode::Off),
            total_devices: devices.len(),
            offline_devices: devices.iter().filter(|d| !d.is_online()).count(),
            triggered_devices: triggered
                .iter()
                .map(|d| d.name().unwrap_or_else(|| d.address().id().to_owned()))
                .collect(),
        })
    }

    fn deliver(callback: &dyn SecurityCallback, view: &SecurityView) {
        match view {
            SecurityView::Summary(summary) => callback.show_summary(summary),
            SecurityView::LearnMore => callback.show_learn_more(),
        }
    }

    fn deliver_error(callback: &dyn SecurityCallback, error: &CoreError) {
        callback.on_error(error);
    }
}

fn parse_attr<T: FromStr>(subsystem: &SubsystemModel, name: &str) -> Option<T> {
    subsystem.model().get_str(name).and_then(|raw| raw.parse().ok())
}

// ── Commands ─────────────────────────────────────────────────────────

impl SubsystemController<SecurityBinding> {
    /// Arm in `mode`. If devices are triggered the view gets a bypass
    /// prompt instead of an error.
    pub fn arm(&self, mode: AlarmMode) -> ClientFuture<Attributes> {
        self.security_command(subsecurity::ARM, Some(mode))
    }

    /// Arm in `mode`, bypassing triggered devices.
    pub fn arm_bypassed(&self, mode: AlarmMode) -> ClientFuture<Attributes> {
        self.security_command(subsecurity::ARM_BYPASSED, Some(mode))
    }

    pub fn disarm(&self) -> ClientFuture<Attributes> {
        self.security_command(subsecurity::DISARM, None)
    }

    fn security_command(&self, command: &str, mode: Option<AlarmMode>) -> ClientFuture<Attributes> {
        let mut attributes = Attributes::new();
        if let Some(mode) = mode {
            attributes.insert(subsecurity::MODE_ARG.into(), Value::String(mode.to_string()));
        }

        let result = self.send_command(command, attributes);
        let weak = self.downgrade();
        result.on_failure(move |error| {
            let Some(controller) = weak.upgrade() else {
                return;
            };
            match (error.code(), mode) {
                (Some(subsecurity::ERR_TRIGGERED_DEVICES), Some(mode)) => {
                    let triggered = controller.triggered_devices();
                    info!(count = triggered.len(), "arming blocked by triggered devices");
                    controller.notify(|view| view.show_bypass_prompt(mode, &triggered));
                }
                _ => controller.report_error(&error),
            }
        });
        result
    }

    /// Devices listed in `subsecurity:triggeredDevices` that are cached.
    pub fn triggered_devices(&self) -> Vec<DeviceModel> {
        let Some(subsystem) = self.subsystem() else {
            return Vec::new();
        };
        let cache = self.session().cache();
        subsystem
            .addresses(subsecurity::TRIGGERED_DEVICES)
            .iter()
            .filter_map(|a| cache.get(a))
            .filter(|m| DeviceModel::accepts(m))
            .map(DeviceModel::from_model)
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use cornea_api::{ErrorEvent, Inbound, PlatformEvent, commands};
    use serde_json::json;

    use super::*;
    use crate::model::Model;
    use crate::subsystem::ControllerState;
    use crate::test_support::{Harness, attrs};

    #[derive(Default)]
    struct RecordingView {
        log: RefCell<Vec<String>>,
    }

    impl SecurityCallback for RecordingView {
        fn show_summary(&self, summary: &SecuritySummary) {
            self.log.borrow_mut().push(format!(
                "summary {} {} total={} offline={} triggered={:?}",
                summary.alarm_state,
                summary.alarm_mode,
                summary.total_devices,
                summary.offline_devices,
                summary.triggered_devices
            ));
        }

        fn show_learn_more(&self) {
            self.log.borrow_mut().push("learn_more".into());
        }

        fn show_bypass_prompt(&self, mode: AlarmMode, triggered: &[DeviceModel]) {
            let names: Vec<String> = triggered.iter().filter_map(DeviceModel::name).collect();
            self.log.borrow_mut().push(format!("bypass {mode} {names:?}"));
        }

        fn on_error(&self, error: &CoreError) {
            self.log.borrow_mut().push(format!("error {}", error.code().unwrap_or("-")));
        }
    }

    fn alarm() -> serde_json::Value {
        json!({
            "base:address": "SERV:subs:alarm",
            "base:type": "subsecurity",
            "subs:available": true,
            "subs:placeId": "p1",
            "subsecurity:alarmState": "DISARMED",
            "subsecurity:alarmMode": "OFF",
            "subsecurity:securityDevices": ["DRIV:dev:door", "DRIV:dev:window"],
            "subsecurity:triggeredDevices": ["DRIV:dev:door"],
        })
    }

    fn loaded(h: &Harness) -> (SecurityController, Rc<RecordingView>) {
        for (address, name, conn) in [
            ("DRIV:dev:door", "Door", "ONLINE"),
            ("DRIV:dev:window", "Window", "OFFLINE"),
        ] {
            h.cache
                .add_or_update(attrs(json!({
                    "base:address": address,
                    "dev:name": name,
                    "devconn:state": conn,
                })))
                .unwrap();
        }
        let controller = h.cornea.security().clone();
        controller.init();
        h.activate_place("p1");
        h.serve_catalog(&[alarm()]);
        h.settle_views();

        let view = Rc::new(RecordingView::default());
        let callback: Rc<dyn SecurityCallback> = view.clone();
        controller.set_callback(&callback);
        (controller, view)
    }

    /// Door cached, window left for the controller to fetch.
    fn loading_window(h: &Harness) -> (SecurityController, Rc<RecordingView>) {
        h.cache
            .add_or_update(attrs(json!({
                "base:address": "DRIV:dev:door",
                "dev:name": "Door",
                "devconn:state": "ONLINE",
            })))
            .unwrap();
        let controller = h.cornea.security().clone();
        controller.init();
        h.activate_place("p1");
        h.serve_catalog(&[alarm()]);

        let view = Rc::new(RecordingView::default());
        let callback: Rc<dyn SecurityCallback> = view.clone();
        controller.set_callback(&callback);
        (controller, view)
    }

    fn window_gets(h: &Harness) -> usize {
        h.transport
            .sent_with_command(commands::GET_ATTRIBUTES)
            .iter()
            .filter(|r| r.address == "DRIV:dev:window")
            .count()
    }

    const WITHOUT_WINDOW: &str = r#"summary DISARMED OFF total=1 offline=0 triggered=["Door"]"#;

    #[test]
    fn failed_member_is_reported_and_view_renders_without_it() {
        let h = Harness::new();
        let (controller, view) = loading_window(&h);
        assert_eq!(controller.state(), ControllerState::Loaded);
        assert!(!controller.is_loaded());

        for attempt in 1..=h.config.retry.max_attempts {
            let request = h
                .unanswered(commands::GET_ATTRIBUTES)
                .into_iter()
                .find(|r| r.address == "DRIV:dev:window")
                .unwrap();
            h.fail(request.request_id, ErrorEvent::new("base.notFound", "gone"));
            if attempt < h.config.retry.max_attempts {
                h.advance(h.config.retry.delay);
                assert!(view.log.borrow().is_empty());
            }
        }
        h.settle_views();

        assert!(controller.is_loaded());
        assert_eq!(window_gets(&h), 3);
        assert_eq!(
            *view.log.borrow(),
            vec!["error base.notFound".to_string(), WITHOUT_WINDOW.to_string()]
        );

        h.push(Inbound::Event(PlatformEvent::changed(
            "SERV:subs:alarm",
            attrs(json!({ "subsecurity:alarmState": "ARMING" })),
        )));
        h.settle_views();
        assert!(view.log.borrow().last().unwrap().starts_with("summary ARMING"));
    }

    #[test]
    fn timed_out_member_is_reported_after_retries() {
        let h = Harness::new();
        let (controller, view) = loading_window(&h);

        for _ in 0..h.config.retry.max_attempts {
            h.advance(h.config.request_timeout);
            h.advance(h.config.retry.delay);
        }
        h.settle_views();

        assert_eq!(window_gets(&h), 3);
        assert!(controller.is_loaded());
        assert_eq!(
            *view.log.borrow(),
            vec!["error -".to_string(), WITHOUT_WINDOW.to_string()]
        );
    }

    #[test]
    fn member_arriving_later_joins_the_summary() {
        let h = Harness::new();
        let (_controller, view) = loading_window(&h);
        h.serve_get("DRIV:dev:window", json!({ "dev:name": "Window" }));
        h.settle_views();
        assert_eq!(
            view.log.borrow().last().unwrap(),
            r#"summary DISARMED OFF total=2 offline=0 triggered=["Door"]"#
        );
    }

    #[test]
    fn renders_summary_on_attach() {
        let h = Harness::new();
        let (controller, view) = loaded(&h);
        assert_eq!(controller.state(), ControllerState::Loaded);
        assert!(controller.is_loaded());
        assert_eq!(
            *view.log.borrow(),
            vec![r#"summary DISARMED OFF total=2 offline=1 triggered=["Door"]"#.to_string()]
        );
    }

    #[test]
    fn unavailable_subsystem_renders_learn_more() {
        let h = Harness::new();
        let (controller, view) = loaded(&h);
        h.push(Inbound::Event(PlatformEvent::changed(
            "SERV:subs:alarm",
            attrs(json!({ "subs:available": false })),
        )));
        h.settle_views();
        assert_eq!(view.log.borrow().last().unwrap(), "learn_more");
        assert_eq!(controller.current_view(), Some(SecurityView::LearnMore));
    }

    #[test]
    fn triggered_devices_error_prompts_bypass() {
        let h = Harness::new();
        let (controller, view) = loaded(&h);
        let result = controller.arm(AlarmMode::On);

        let request = h.unanswered(subsecurity::ARM).pop().unwrap();
        assert_eq!(request.address, "SERV:subs:alarm");
        assert_eq!(request.attributes["mode"], json!("ON"));

        h.fail(
            request.request_id,
            ErrorEvent::new(subsecurity::ERR_TRIGGERED_DEVICES, "door open"),
        );
        assert!(result.result().unwrap().is_err());
        assert_eq!(view.log.borrow().last().unwrap(), r#"bypass ON ["Door"]"#);
    }

    #[test]
    fn other_command_errors_reach_on_error() {
        let h = Harness::new();
        let (controller, view) = loaded(&h);
        controller.disarm();
        let request = h.unanswered(subsecurity::DISARM).pop().unwrap();
        assert!(request.attributes.is_empty());
        h.fail(request.request_id, ErrorEvent::new("security.pin", "bad pin"));
        assert_eq!(view.log.borrow().last().unwrap(), "error security.pin");
    }

    #[test]
    fn command_without_subsystem_fails() {
        let h = Harness::new();
        let result = h.cornea.security().arm_bypassed(AlarmMode::Partial);
        assert!(matches!(
            result.result().unwrap(),
            Err(CoreError::NotLoaded { .. })
        ));
    }

    #[test]
    fn render_is_pure() {
        let subsystem = SubsystemModel::from_model(Rc::new(Model::new(
            Address::new("SERV:subs:alarm"),
            attrs(alarm()),
        )));
        let snapshot = SubsystemSnapshot {
            subsystem,
            lists: vec![Vec::new(), Vec::new()],
        };
        let SecurityView::Summary(summary) = SecurityBinding::render(&snapshot) else {
            panic!("expected summary");
        };
        assert_eq!(summary.alarm_state, AlarmState::Disarmed);
        assert_eq!(summary.total_devices, 0);
    }
}
