//! Deterministic replay of platform traffic through the core.
//!
//! A script declares the platform's canned data (model attributes,
//! subsystem catalogs per place, command replies) and a list of steps.
//! Requests are answered by a [`MemoryTransport`] responder; time only
//! moves on a [`ManualClock`], so a replay produces the same report every
//! run.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use cornea_api::{
    Attributes, ClientRequest, ErrorEvent, Inbound, InboundReceiver, MemoryTransport,
    PlatformEvent, Reply, SessionNotice, commands, inbound_channel,
};
use cornea_core::model::attrs;
use cornea_core::{
    Address, AlarmMode, CoreConfig, CoreError, Cornea, DeviceDetails, DeviceModel, DevicePresenter,
    DeviceView, ManualClock, Model, ModelView, PresenceCallback, PresenceSummary,
    SecurityCallback, SecuritySummary,
};

// ── Script format ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    /// `base:GetAttributes` answers, keyed by address.
    #[serde(default)]
    pub models: HashMap<String, Attributes>,

    /// `subs:ListSubsystems` answers, keyed by place id.
    #[serde(default)]
    pub subsystems: HashMap<String, Vec<Value>>,

    /// Replies to any other command, keyed by command name. Unlisted
    /// commands succeed with an empty body.
    #[serde(default)]
    pub commands: HashMap<String, CommandReply>,

    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandReply {
    Ok(Attributes),
    Error(ErrorEvent),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case", deny_unknown_fields)]
pub enum Step {
    ActivatePlace { place_id: String },
    Event { event: PlatformEvent },
    Advance { ms: u64 },
    Arm { mode: AlarmMode },
    ArmBypassed { mode: AlarmMode },
    Disarm,
    ShowDevice { address: String },
    Expire,
}

// ── Report ──────────────────────────────────────────────────────────

/// One callback delivery observed during the replay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewRecord {
    pub step: usize,
    pub source: String,
    pub event: String,
    pub detail: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedModel {
    pub address: String,
    #[serde(rename = "type")]
    pub model_type: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayReport {
    pub steps: usize,
    pub requests: usize,
    pub views: Vec<ViewRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<Vec<CachedModel>>,
}

// ── Responder ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Fixtures {
    models: HashMap<String, Attributes>,
    subsystems: HashMap<String, Vec<Value>>,
    commands: HashMap<String, CommandReply>,
}

impl Fixtures {
    fn reply(&self, request: &ClientRequest) -> Reply {
        match request.command.as_str() {
            commands::GET_ATTRIBUTES => match self.models.get(&request.address) {
                Some(model) => {
                    let mut body = model.clone();
                    body.insert(attrs::base::ADDRESS.into(), json!(request.address));
                    Ok(body)
                }
                None => Err(ErrorEvent::new(
                    "base.notFound",
                    format!("no model at {}", request.address),
                )),
            },
            commands::LIST_SUBSYSTEMS => {
                let place = request
                    .attributes
                    .get("placeId")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let list = self.subsystems.get(place).cloned().unwrap_or_default();
                let mut body = Attributes::new();
                body.insert(attrs::subs::LIST_KEY.into(), Value::Array(list));
                Ok(body)
            }
            command => match self.commands.get(command) {
                Some(CommandReply::Ok(body)) => Ok(body.clone()),
                Some(CommandReply::Error(error)) => Err(error.clone()),
                None => Ok(Attributes::new()),
            },
        }
    }
}

// ── Recording views ─────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    step: Cell<usize>,
    records: RefCell<Vec<ViewRecord>>,
}

impl Recorder {
    fn record(&self, source: &str, event: &str, detail: Value) {
        self.records.borrow_mut().push(ViewRecord {
            step: self.step.get(),
            source: source.to_owned(),
            event: event.to_owned(),
            detail,
        });
    }
}

fn error_detail(error: &CoreError) -> Value {
    json!({ "code": error.code(), "message": error.to_string() })
}

fn to_value(value: &impl Serialize) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

impl SecurityCallback for Recorder {
    fn show_summary(&self, summary: &SecuritySummary) {
        self.record("security", "summary", to_value(summary));
    }

    fn show_learn_more(&self) {
        self.record("security", "learn_more", Value::Null);
    }

    fn show_bypass_prompt(&self, mode: AlarmMode, triggered: &[DeviceModel]) {
        let names: Vec<String> = triggered
            .iter()
            .map(|d| d.name().unwrap_or_else(|| d.address().to_string()))
            .collect();
        self.record(
            "security",
            "bypass_prompt",
            json!({ "mode": mode, "triggered": names }),
        );
    }

    fn on_error(&self, error: &CoreError) {
        self.record("security", "error", error_detail(error));
    }
}

impl PresenceCallback for Recorder {
    fn show_summary(&self, summary: &PresenceSummary) {
        self.record("presence", "summary", to_value(summary));
    }

    fn show_learn_more(&self) {
        self.record("presence", "learn_more", Value::Null);
    }

    fn on_error(&self, error: &CoreError) {
        self.record("presence", "error", error_detail(error));
    }
}

struct DeviceRecorder {
    source: String,
    recorder: Rc<Recorder>,
}

impl DeviceView for DeviceRecorder {
    fn show_device(&self, device: &DeviceDetails) {
        self.recorder.record(&self.source, "device", to_value(device));
    }

    fn show_removed(&self) {
        self.recorder.record(&self.source, "removed", Value::Null);
    }

    fn show_error(&self, error: &CoreError) {
        self.recorder.record(&self.source, "error", error_detail(error));
    }
}

// ── Engine ──────────────────────────────────────────────────────────

pub struct Replay {
    clock: Rc<ManualClock>,
    transport: Arc<MemoryTransport>,
    inbound: RefCell<InboundReceiver>,
    cornea: Cornea,
    recorder: Rc<Recorder>,
    presenters: Vec<(DevicePresenter, Rc<dyn DeviceView>)>,
}

impl Replay {
    pub fn new(config: CoreConfig, script: &Script) -> Self {
        let fixtures = Fixtures {
            models: script.models.clone(),
            subsystems: script.subsystems.clone(),
            commands: script.commands.clone(),
        };
        let (tx, inbound) = inbound_channel();
        let transport = Arc::new(MemoryTransport::with_responder(tx, move |request| {
            Some(fixtures.reply(request))
        }));
        let clock = Rc::new(ManualClock::new());
        let cornea = Cornea::with_clock(config, transport.clone(), clock.clone());

        let recorder = Rc::new(Recorder::default());
        let security: Rc<dyn SecurityCallback> = recorder.clone();
        let presence: Rc<dyn PresenceCallback> = recorder.clone();
        cornea.security().set_callback(&security);
        cornea.presence().set_callback(&presence);
        cornea.security().init();
        cornea.presence().init();

        Self {
            clock,
            transport,
            inbound: RefCell::new(inbound),
            cornea,
            recorder,
            presenters: Vec::new(),
        }
    }

    /// Run every step, letting views settle after each one.
    pub fn run(mut self, steps: &[Step], include_cache: bool) -> ReplayReport {
        info!(steps = steps.len(), "replay started");
        for (index, step) in steps.iter().enumerate() {
            self.recorder.step.set(index + 1);
            debug!(step = index + 1, ?step, "replay step");
            self.apply(step);
            self.settle();
            self.advance(self.cornea.config().view_debounce);
        }

        let cache = include_cache.then(|| self.cache_rows());
        let report = ReplayReport {
            steps: steps.len(),
            requests: self.transport.sent_count(),
            views: self.recorder.records.borrow().clone(),
            cache,
        };
        for (presenter, _) in &self.presenters {
            presenter.stop_presenting();
        }
        info!(views = report.views.len(), requests = report.requests, "replay finished");
        report
    }

    fn apply(&mut self, step: &Step) {
        match step {
            Step::ActivatePlace { place_id } => {
                self.cornea
                    .dispatch(Inbound::Session(SessionNotice::PlaceActivated {
                        place_id: place_id.clone(),
                    }));
            }
            Step::Event { event } => self.cornea.dispatch(Inbound::Event(event.clone())),
            Step::Advance { ms } => self.advance(Duration::from_millis(*ms)),
            Step::Arm { mode } => {
                self.cornea.security().arm(*mode);
            }
            Step::ArmBypassed { mode } => {
                self.cornea.security().arm_bypassed(*mode);
            }
            Step::Disarm => {
                self.cornea.security().disarm();
            }
            Step::ShowDevice { address } => {
                let presenter = DevicePresenter::new(
                    self.cornea.session().clone(),
                    Address::new(address.as_str()),
                );
                let view: Rc<dyn DeviceView> = Rc::new(DeviceRecorder {
                    source: format!("device {address}"),
                    recorder: Rc::clone(&self.recorder),
                });
                presenter.start_presenting(&view);
                self.presenters.push((presenter, view));
            }
            Step::Expire => self.cornea.dispatch(Inbound::Session(SessionNotice::SessionExpired)),
        }
    }

    /// Move the clock, settling at every scheduler deadline on the way.
    fn advance(&self, by: Duration) {
        self.settle();
        let target = self.clock.elapsed() + by;
        while let Some(deadline) = self.cornea.scheduler().next_deadline() {
            let now = self.cornea.scheduler().now();
            let step = deadline.saturating_duration_since(now);
            if self.clock.elapsed() + step > target {
                break;
            }
            self.clock.advance(step);
            self.settle();
        }
        let rest = target.saturating_sub(self.clock.elapsed());
        self.clock.advance(rest);
        self.settle();
    }

    /// Drain the inbound channel and the scheduler until both are quiet.
    fn settle(&self) {
        loop {
            let mut progressed = false;
            while let Ok(message) = self.inbound.borrow_mut().try_recv() {
                self.cornea.dispatch(message);
                progressed = true;
            }
            if self.cornea.run_pending() > 0 {
                progressed = true;
            }
            if !progressed {
                break;
            }
        }
    }

    fn cache_rows(&self) -> Vec<CachedModel> {
        self.cornea
            .cache()
            .models()
            .iter()
            .map(|model| cached_model(model))
            .collect()
    }
}

fn cached_model(model: &Model) -> CachedModel {
    let name = [
        attrs::dev::NAME,
        attrs::subs::NAME,
        attrs::place::NAME,
        attrs::scene::NAME,
        attrs::person::FIRST_NAME,
    ]
    .iter()
    .find_map(|attr| model.get_str(attr));
    CachedModel {
        address: model.address().to_string(),
        model_type: model.model_type(),
        name,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn script(raw: Value) -> Script {
        serde_json::from_value(raw).unwrap()
    }

    fn alarm_script() -> Script {
        script(json!({
            "models": {
                "DRIV:dev:door": { "dev:name": "Door" },
                "DRIV:dev:window": { "dev:name": "Window", "devconn:state": "OFFLINE" }
            },
            "subsystems": {
                "home": [{
                    "base:address": "SERV:subs:alarm",
                    "base:type": "subsecurity",
                    "subs:available": true,
                    "subs:placeId": "home",
                    "subsecurity:alarmState": "DISARMED",
                    "subsecurity:alarmMode": "OFF",
                    "subsecurity:securityDevices": ["DRIV:dev:door", "DRIV:dev:window"],
                    "subsecurity:triggeredDevices": ["DRIV:dev:door"]
                }]
            },
            "commands": {
                "subsecurity:Arm": {
                    "error": { "code": "security.triggeredDevices", "message": "door open" }
                }
            },
            "steps": [
                { "step": "activate_place", "place_id": "home" },
                { "step": "arm", "mode": "ON" },
                { "step": "event", "event": {
                    "type": "CHANGED",
                    "source": "SERV:subs:alarm",
                    "changedAttributes": { "subsecurity:alarmState": "ARMED" }
                } }
            ]
        }))
    }

    #[test]
    fn replays_alarm_flow() {
        let script = alarm_script();
        let report = Replay::new(CoreConfig::default(), &script).run(&script.steps, true);

        let events: Vec<(usize, &str)> = report
            .views
            .iter()
            .map(|v| (v.step, v.event.as_str()))
            .collect();
        assert_eq!(events, vec![(1, "summary"), (2, "bypass_prompt"), (3, "summary")]);
        assert_eq!(report.views[0].detail["total_devices"], json!(2));
        assert_eq!(report.views[0].detail["offline_devices"], json!(1));
        assert_eq!(report.views[1].detail["triggered"], json!(["Door"]));
        assert_eq!(report.views[2].detail["alarm_state"], json!("ARMED"));
        assert_eq!(report.cache.unwrap().len(), 3);
    }

    #[test]
    fn show_device_reports_missing_models() {
        let script = script(json!({
            "steps": [{ "step": "show_device", "address": "DRIV:dev:ghost" }]
        }));
        let report = Replay::new(CoreConfig::default(), &script).run(&script.steps, false);
        assert_eq!(report.views.len(), 1);
        assert_eq!(report.views[0].event, "error");
        assert_eq!(report.views[0].detail["code"], json!("base.notFound"));
        assert!(report.cache.is_none());
    }

    #[test]
    fn unknown_step_is_rejected() {
        let err = serde_json::from_value::<Script>(json!({
            "steps": [{ "step": "reboot" }]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("reboot"));
    }
}
