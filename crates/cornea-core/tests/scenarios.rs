#![allow(clippy::unwrap_used)]

// End-to-end behavior of the core, driven through the deterministic
// harness: cache identity, source loading, list reconciliation, and the
// subsystem controller lifecycle.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use cornea_api::{
    Inbound, MemoryTransport, PlatformEvent, SessionNotice, commands, inbound_channel,
};
use cornea_core::test_support::{Harness, attrs};
use cornea_core::{
    Address, AddressableListSource, AddressableModelSource, AlarmMode, ControllerState, CoreConfig,
    CoreError, Cornea, DeviceModel, ModelEvent, ModelSource, ModelView, SecurityCallback,
    SecurityController, SecuritySummary, SourceState, SubsystemModel,
};

// ── Fixtures ────────────────────────────────────────────────────────

#[derive(Default)]
struct SummaryLog {
    summaries: RefCell<Vec<SecuritySummary>>,
    learn_more: Cell<usize>,
    errors: RefCell<Vec<CoreError>>,
}

impl SecurityCallback for SummaryLog {
    fn show_summary(&self, summary: &SecuritySummary) {
        self.summaries.borrow_mut().push(summary.clone());
    }

    fn show_learn_more(&self) {
        self.learn_more.set(self.learn_more.get() + 1);
    }

    fn show_bypass_prompt(&self, _mode: AlarmMode, _triggered: &[DeviceModel]) {}

    fn on_error(&self, error: &CoreError) {
        self.errors.borrow_mut().push(error.clone());
    }
}

impl SummaryLog {
    fn count(&self) -> usize {
        self.summaries.borrow().len()
    }
}

fn alarm() -> Value {
    json!({
        "base:address": "SERV:subs:alarm",
        "base:type": "subsecurity",
        "subs:available": true,
        "subs:placeId": "p1",
        "subsecurity:alarmState": "DISARMED",
        "subsecurity:alarmMode": "OFF",
        "subsecurity:securityDevices": ["DRIV:dev:door", "DRIV:dev:window"],
        "subsecurity:triggeredDevices": [],
    })
}

fn seed_devices(h: &Harness) {
    for (address, name) in [("DRIV:dev:door", "Door"), ("DRIV:dev:window", "Window")] {
        h.cache
            .add_or_update(attrs(json!({ "base:address": address, "dev:name": name })))
            .unwrap();
    }
}

/// A security controller loaded at place `p1` with a view attached.
fn loaded_security(h: &Harness) -> (SecurityController, Rc<SummaryLog>) {
    seed_devices(h);
    let controller = h.cornea.security().clone();
    controller.init();
    h.activate_place("p1");
    h.serve_catalog(&[alarm()]);
    h.settle_views();

    let log = Rc::new(SummaryLog::default());
    let callback: Rc<dyn SecurityCallback> = log.clone();
    controller.set_callback(&callback);
    assert!(controller.is_loaded());
    assert_eq!(log.count(), 1);
    (controller, log)
}

fn addrs(raw: &[&str]) -> Vec<Address> {
    raw.iter().copied().map(Address::new).collect()
}

// ── Cache and source properties ─────────────────────────────────────

#[test]
fn load_twice_yields_same_model_with_one_request() {
    let h = Harness::new();
    let source: AddressableModelSource<DeviceModel> =
        AddressableModelSource::bound(h.session.clone(), Address::new("DRIV:dev:1"));

    let first = source.load();
    let joined = source.load();
    assert_eq!(source.state(), SourceState::Loading);
    h.serve_get("DRIV:dev:1", json!({ "dev:name": "Door" }));

    let again = source.load();
    let a = first.result().unwrap().unwrap();
    let b = joined.result().unwrap().unwrap();
    let c = again.result().unwrap().unwrap();
    assert!(Rc::ptr_eq(a.model(), b.model()));
    assert!(Rc::ptr_eq(a.model(), c.model()));
    assert_eq!(h.transport.sent_with_command(commands::GET_ATTRIBUTES).len(), 1);
}

#[test]
fn reload_always_fetches() {
    let h = Harness::new();
    let source: AddressableModelSource<DeviceModel> =
        AddressableModelSource::bound(h.session.clone(), Address::new("DRIV:dev:1"));
    source.load();
    h.serve_get("DRIV:dev:1", json!({ "dev:name": "Door" }));
    assert!(source.is_loaded());

    let reloaded = source.reload();
    assert_eq!(h.transport.sent_with_command(commands::GET_ATTRIBUTES).len(), 2);
    h.serve_get("DRIV:dev:1", json!({ "dev:name": "Front Door" }));
    assert_eq!(
        reloaded.result().unwrap().unwrap().name().as_deref(),
        Some("Front Door")
    );
}

#[test]
fn add_then_get_round_trips_attributes() {
    let h = Harness::new();
    let attributes = attrs(json!({
        "base:address": "DRIV:dev:7",
        "base:caps": ["base", "dev"],
        "dev:name": "Lamp",
        "dev:vendor": "Acme",
    }));
    h.cache.add_or_update(attributes.clone()).unwrap();
    let model = h.cache.get(&Address::new("DRIV:dev:7")).unwrap();
    assert_eq!(model.attributes(), attributes);
}

#[test]
fn clearing_twice_is_one_transition() {
    let h = Harness::new();
    seed_devices(&h);
    let deleted = Rc::new(Cell::new(0));
    let d = deleted.clone();
    let _reg = h.cache.add_listener(move |event| {
        if event.is_deleted() {
            d.set(d.get() + 1);
        }
    });

    h.cache.clear_cache();
    h.cache.clear_cache();
    assert_eq!(deleted.get(), 2);
    assert!(h.cache.is_empty());
}

#[test]
fn cached_model_loads_without_network() {
    let h = Harness::new();
    let source: AddressableModelSource<SubsystemModel> =
        AddressableModelSource::bound(h.session.clone(), Address::new("SERV:subs:1"));
    assert_eq!(source.state(), SourceState::Empty);

    h.cache
        .add_or_update(attrs(json!({ "base:address": "SERV:subs:1", "base:type": "alarm" })))
        .unwrap();
    assert_eq!(h.cornea.subsystems().size(), 1);
    assert_eq!(source.state(), SourceState::Loaded);
    assert_eq!(source.get().unwrap().subsystem_type().as_deref(), Some("alarm"));
    assert_eq!(h.transport.sent_count(), 0);
}

#[test]
fn list_refresh_prunes_missing_subsystems() {
    let h = Harness::new();
    h.activate_place("p1");
    for address in ["SERV:subs:old1", "SERV:subs:old2", "SERV:subs:keep"] {
        h.cache
            .add_or_update(attrs(json!({ "base:address": address })))
            .unwrap();
    }
    h.cache
        .add_or_update(attrs(json!({ "base:address": "DRIV:dev:1" })))
        .unwrap();

    let deleted = Rc::new(RefCell::new(Vec::new()));
    let d = deleted.clone();
    let _reg = h.cache.add_listener(move |event| {
        if let ModelEvent::Deleted(model) = event {
            d.borrow_mut().push(model.address().to_string());
        }
    });

    h.catalog.load("p1");
    h.serve_catalog(&[
        json!({ "base:address": "SERV:subs:keep", "base:type": "subsecurity" }),
        json!({ "base:address": "SERV:subs:new", "base:type": "subspres" }),
    ]);

    assert_eq!(*deleted.borrow(), vec!["SERV:subs:old1", "SERV:subs:old2"]);
    assert_eq!(h.cornea.subsystems().size(), 2);
    assert!(h.cache.get(&Address::new("DRIV:dev:1")).is_some());
    assert!(h.cache.last_refresh("subs").is_some());
}

#[test]
fn list_reconciliation_fetches_only_new_members() {
    let h = Harness::new();
    let list: AddressableListSource<DeviceModel> = AddressableListSource::new(h.session.clone());
    list.set_addresses(&addrs(&["DRIV:dev:a", "DRIV:dev:b"]));
    h.serve_get("DRIV:dev:a", json!({}));
    h.serve_get("DRIV:dev:b", json!({}));

    let b_present = Rc::new(Cell::new(true));
    let seen = b_present.clone();
    let _reg = list.add_listener(move |devices| {
        let has_b = devices.iter().any(|d| d.address().as_str() == "DRIV:dev:b");
        seen.set(seen.get() && has_b);
    });

    list.set_addresses(&addrs(&["DRIV:dev:b", "DRIV:dev:c"]));
    assert!(!list.contains(&Address::new("DRIV:dev:a")));
    h.serve_get("DRIV:dev:c", json!({}));

    assert_eq!(
        list.get().iter().map(|d| d.address().clone()).collect::<Vec<_>>(),
        addrs(&["DRIV:dev:b", "DRIV:dev:c"])
    );
    assert!(b_present.get());
    let fetched_b = h
        .transport
        .sent_with_command(commands::GET_ATTRIBUTES)
        .iter()
        .filter(|r| r.address == "DRIV:dev:b")
        .count();
    assert_eq!(fetched_b, 1);
}

// ── Controller lifecycle ────────────────────────────────────────────

#[test]
fn controller_is_uninitialized_until_a_place_is_active() {
    let h = Harness::new();
    let controller = h.cornea.security().clone();
    controller.init();
    assert_eq!(controller.state(), ControllerState::Uninitialized);
    assert!(h.transport.sent().is_empty());

    h.activate_place("p1");
    assert_eq!(controller.state(), ControllerState::Loading);
    assert_eq!(h.unanswered(commands::LIST_SUBSYSTEMS).len(), 1);
}

#[test]
fn change_bursts_coalesce_into_one_delivery() {
    let h = Harness::new();
    let (_controller, log) = loaded_security(&h);

    for state in ["ARMING", "ARMING", "ARMED", "ALERT", "ARMED"] {
        h.push(Inbound::Event(PlatformEvent::changed(
            "SERV:subs:alarm",
            attrs(json!({ "subsecurity:alarmState": state })),
        )));
    }
    assert_eq!(log.count(), 1);
    h.settle_views();

    assert_eq!(log.count(), 2);
    assert_eq!(
        log.summaries.borrow().last().unwrap().alarm_state.to_string(),
        "ARMED"
    );
}

#[test]
fn deleted_subsystem_stops_deliveries_until_added() {
    let h = Harness::new();
    let (controller, log) = loaded_security(&h);

    h.push(Inbound::Event(PlatformEvent::deleted("SERV:subs:alarm")));
    assert!(!controller.is_loaded());
    assert_eq!(controller.state(), ControllerState::Loading);

    h.push(Inbound::Event(PlatformEvent::changed(
        "DRIV:dev:door",
        attrs(json!({ "dev:name": "Front Door" })),
    )));
    h.settle_views();
    assert_eq!(log.count(), 1);

    h.push(Inbound::Event(PlatformEvent::added("SERV:subs:alarm", attrs(alarm()))));
    h.settle_views();
    assert!(controller.is_loaded());
    assert_eq!(log.count(), 2);
}

#[test]
fn membership_change_waits_for_new_members() {
    let h = Harness::new();
    let (controller, log) = loaded_security(&h);

    h.push(Inbound::Event(PlatformEvent::changed(
        "SERV:subs:alarm",
        attrs(json!({
            "subsecurity:securityDevices": [
                "DRIV:dev:door",
                "DRIV:dev:window",
                "DRIV:dev:motion",
            ],
        })),
    )));
    h.settle_views();
    assert!(!controller.is_loaded());
    assert_eq!(log.count(), 1);

    h.serve_get("DRIV:dev:motion", json!({ "dev:name": "Motion" }));
    h.settle_views();
    assert!(controller.is_loaded());
    assert_eq!(log.summaries.borrow().last().unwrap().total_devices, 3);
}

#[test]
fn dropped_view_stops_receiving() {
    let h = Harness::new();
    let (controller, log) = loaded_security(&h);
    let weak = Rc::downgrade(&log);
    drop(log);
    assert!(weak.upgrade().is_none());

    controller.update_view();
    h.push(Inbound::Event(PlatformEvent::changed(
        "SERV:subs:alarm",
        attrs(json!({ "subsecurity:alarmState": "ARMED" })),
    )));
    h.settle_views();
    assert!(controller.is_loaded());
}

#[test]
fn stale_token_does_not_detach_newer_view() {
    let h = Harness::new();
    let (controller, first) = loaded_security(&h);
    let old_token = {
        let callback: Rc<dyn SecurityCallback> = first.clone();
        controller.set_callback(&callback)
    };
    let second = Rc::new(SummaryLog::default());
    let callback: Rc<dyn SecurityCallback> = second.clone();
    controller.set_callback(&callback);

    assert!(!controller.detach(old_token));
    controller.update_view();
    assert_eq!(second.count(), 2);
}

#[test]
fn expiry_tears_down_and_place_activation_repopulates() {
    let h = Harness::new();
    let (controller, log) = loaded_security(&h);
    let subsystem = controller.subsystem_source();

    h.expire_session();
    assert_eq!(controller.state(), ControllerState::Uninitialized);
    assert!(!subsystem.is_loaded());
    assert!(!controller.is_loaded());
    assert!(controller.list(0).is_none());

    h.activate_place("p1");
    h.serve_catalog(&[alarm()]);
    h.serve_get("DRIV:dev:door", json!({ "dev:name": "Door" }));
    h.serve_get("DRIV:dev:window", json!({ "dev:name": "Window" }));
    h.settle_views();

    assert_eq!(controller.state(), ControllerState::Loaded);
    assert!(controller.is_loaded());
    assert_eq!(log.count(), 2);
    assert_eq!(log.summaries.borrow().last().unwrap().total_devices, 2);
}

#[test]
fn catalog_failure_reaches_the_view_after_retries() {
    let config = CoreConfig {
        retry: cornea_core::RetryPolicy {
            delay: std::time::Duration::from_secs(1),
            max_attempts: 2,
        },
        ..CoreConfig::default()
    };
    let h = Harness::with_config(config);
    let controller = h.cornea.security().clone();
    let log = Rc::new(SummaryLog::default());
    let callback: Rc<dyn SecurityCallback> = log.clone();
    controller.set_callback(&callback);
    controller.init();
    h.activate_place("p1");

    for _ in 0..2 {
        let request = h.unanswered(commands::LIST_SUBSYSTEMS).pop().unwrap();
        h.fail(request.request_id, cornea_api::ErrorEvent::new("server.busy", "later"));
        h.advance(h.config.retry.delay);
    }
    assert_eq!(h.transport.sent_with_command(commands::LIST_SUBSYSTEMS).len(), 2);
    assert_eq!(log.errors.borrow().len(), 1);
    assert_eq!(log.errors.borrow()[0].code(), Some("server.busy"));
}

// ── Event loop ──────────────────────────────────────────────────────

#[tokio::test(flavor = "current_thread")]
async fn run_applies_inbound_until_the_channel_closes() {
    let (tx, rx) = inbound_channel();
    let cornea = Cornea::new(CoreConfig::default(), Arc::new(MemoryTransport::new()));

    tx.send(Inbound::Session(SessionNotice::PlaceActivated {
        place_id: "p1".into(),
    }))
    .unwrap();
    tx.send(Inbound::Event(PlatformEvent::added(
        "DRIV:dev:1",
        attrs(json!({ "dev:name": "Door" })),
    )))
    .unwrap();
    drop(tx);

    cornea.run(rx, CancellationToken::new()).await;
    assert_eq!(cornea.session().active_place().as_deref(), Some("p1"));
    assert_eq!(cornea.devices().size(), 1);
    assert_eq!(
        cornea.place().address(),
        Some(Address::new("SERV:place:p1"))
    );
}

#[tokio::test(flavor = "current_thread")]
async fn run_stops_when_cancelled() {
    let (tx, rx) = inbound_channel();
    let cornea = Cornea::new(CoreConfig::default(), Arc::new(MemoryTransport::new()));
    tx.send(Inbound::Session(SessionNotice::PlaceActivated {
        place_id: "p1".into(),
    }))
    .unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    cornea.run(rx, cancel).await;
    assert_eq!(cornea.session().active_place(), None);
    assert!(cornea.cache().is_empty());
    assert!(tx.is_closed());
}

#[tokio::test(flavor = "current_thread")]
async fn run_fires_request_timeouts() {
    let (_tx, rx) = inbound_channel();
    let config = CoreConfig {
        request_timeout: std::time::Duration::from_millis(50),
        ..CoreConfig::default()
    };
    let cornea = Cornea::new(config, Arc::new(MemoryTransport::new()));
    let pending = cornea
        .session()
        .get_attributes(&Address::new("DRIV:dev:1"));

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    pending.on_completion(move |_| stop.cancel());
    cornea.run(rx, cancel).await;

    assert!(pending.result().unwrap().unwrap_err().is_timeout());
}
