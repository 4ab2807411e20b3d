//! Reactive model-synchronization core for the cornea smart-home client.
//!
//! A single-threaded runtime that keeps a local cache of remote entities
//! in sync with the platform and pushes UI-ready view models to weakly
//! held callbacks.
//!
//! - **[`ModelCache`]** — address-keyed identity cache; the single source
//!   of truth. [`Store`]s are namespace-filtered views over it.
//! - **[`AddressableModelSource`] / [`AddressableListSource`]** — reactive
//!   handles bound to one address or a changing set of addresses.
//! - **[`SubsystemController`]** — binds a subsystem and its member lists,
//!   debounces change bursts, and delivers a derived view model.
//! - **[`ClientSession`]** — request/response correlation, timeouts, and
//!   session lifecycle over a [`Transport`](cornea_api::Transport).
//! - **[`Cornea`]** — the composition root and event loop.
//!
//! Everything here is `!Send`. Network traffic reaches the core as
//! [`Inbound`] data over a channel and is posted onto the [`UiScheduler`]
//! before it touches any state.

pub mod cache;
pub mod config;
pub mod error;
pub mod executor;
pub mod future;
pub mod listener;
pub mod model;
pub mod presenter;
pub mod retry;
pub mod session;
pub mod source;
pub mod subsystem;
#[doc(hidden)]
pub mod test_support;
pub mod view;

use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use cornea_api::{Inbound, InboundReceiver, Transport};

// ── Primary re-exports ──────────────────────────────────────────────
pub use cache::{ModelCache, Store};
pub use config::CoreConfig;
pub use error::CoreError;
pub use executor::{Clock, ManualClock, SystemClock, UiScheduler};
pub use future::{ClientFuture, ClientResult, Listeners, SettableClientFuture};
pub use listener::{ListenerList, ListenerRegistration};
pub use model::{
    Address, Attributes, DeviceModel, Model, ModelEvent, ModelView, PersonModel, PlaceModel,
    SceneModel, SubsystemModel,
};
pub use presenter::{DeviceDetails, DevicePresenter, DeviceView, Presenter};
pub use retry::{RetryPolicy, retry_with_fixed_delay};
pub use session::{ClientSession, SubsystemCatalog};
pub use source::{
    AddressableListSource, AddressableModelSource, MemberFailure, ModelSource, SourceState,
};
pub use subsystem::{
    AlarmMode, AlarmState, ControllerState, PresenceCallback, PresenceController,
    PresenceSummary, PresenceView, SecurityCallback, SecurityController, SecuritySummary,
    SecurityView, SubsystemBinding, SubsystemController, SubsystemSnapshot,
};
pub use view::{CallbackSlot, ViewToken};

// ── Cornea ──────────────────────────────────────────────────────────

/// Composition root: owns the scheduler, cache, session, catalog, the
/// well-known controllers, and the active place source.
///
/// Controllers are constructed but not initialized; call
/// [`SubsystemController::init`] on the ones a view needs.
pub struct Cornea {
    config: CoreConfig,
    scheduler: UiScheduler,
    cache: Rc<ModelCache>,
    session: ClientSession,
    catalog: SubsystemCatalog,
    security: SecurityController,
    presence: PresenceController,
    place: AddressableModelSource<PlaceModel>,
    devices: Store<DeviceModel>,
    places: Store<PlaceModel>,
    people: Store<PersonModel>,
    scenes: Store<SceneModel>,
    _registrations: Vec<ListenerRegistration>,
}

impl Cornea {
    /// A runtime on the wall clock.
    pub fn new(config: CoreConfig, transport: Arc<dyn Transport>) -> Self {
        Self::with_clock(config, transport, Rc::new(SystemClock))
    }

    /// A runtime on an injected clock (replays and tests).
    pub fn with_clock(
        config: CoreConfig,
        transport: Arc<dyn Transport>,
        clock: Rc<dyn Clock>,
    ) -> Self {
        let scheduler = UiScheduler::new(clock);
        let cache = Rc::new(ModelCache::new());
        let session = ClientSession::new(
            transport,
            scheduler.clone(),
            Rc::clone(&cache),
            config.request_timeout,
        );
        let catalog = SubsystemCatalog::new(session.clone(), config.retry);
        let security = SecurityController::new(
            session.clone(),
            catalog.clone(),
            scheduler.clone(),
            config.view_debounce,
            config.retry,
        );
        let presence = PresenceController::new(
            session.clone(),
            catalog.clone(),
            scheduler.clone(),
            config.view_debounce,
            config.retry,
        );

        let place = AddressableModelSource::new(session.clone());
        let on_place = {
            let place = place.clone();
            session.add_place_listener(move |place_id| {
                place.set_address(Some(Address::new(format!("SERV:place:{place_id}"))));
            })
        };
        let on_expiry = {
            let place = place.clone();
            session.add_expiry_listener(move || place.set_address(None))
        };

        info!(
            request_timeout_ms = config.request_timeout_ms(),
            view_debounce_ms = u64::try_from(config.view_debounce.as_millis()).unwrap_or(u64::MAX),
            "cornea runtime created"
        );

        Self {
            devices: Store::new(Rc::clone(&cache)),
            places: Store::new(Rc::clone(&cache)),
            people: Store::new(Rc::clone(&cache)),
            scenes: Store::new(Rc::clone(&cache)),
            config,
            scheduler,
            cache,
            session,
            catalog,
            security,
            presence,
            place,
            _registrations: vec![on_place, on_expiry],
        }
    }

    // ── Inbound ─────────────────────────────────────────────────────

    /// Post one inbound message onto the scheduler. Nothing is applied
    /// until the scheduler runs.
    pub fn dispatch(&self, inbound: Inbound) {
        let session = self.session.clone();
        self.scheduler.post(move || session.dispatch(inbound));
    }

    /// Run every task that is due now.
    pub fn run_pending(&self) -> usize {
        self.scheduler.run_pending()
    }

    /// Drive the runtime until `cancel` fires or the inbound channel
    /// closes. Must run on a current-thread runtime (or a `LocalSet`).
    pub async fn run(&self, mut inbound: InboundReceiver, cancel: CancellationToken) {
        info!("cornea event loop started");
        loop {
            self.scheduler.run_pending();
            let deadline = self.scheduler.next_deadline();

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("event loop cancelled");
                    break;
                }
                message = inbound.recv() => match message {
                    Some(message) => self.dispatch(message),
                    None => {
                        debug!("inbound channel closed");
                        self.scheduler.run_pending();
                        break;
                    }
                },
                () = sleep_until(deadline) => {}
            }
        }
        info!("cornea event loop stopped");
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &UiScheduler {
        &self.scheduler
    }

    pub fn cache(&self) -> &Rc<ModelCache> {
        &self.cache
    }

    pub fn session(&self) -> &ClientSession {
        &self.session
    }

    pub fn catalog(&self) -> &SubsystemCatalog {
        &self.catalog
    }

    pub fn security(&self) -> &SecurityController {
        &self.security
    }

    pub fn presence(&self) -> &PresenceController {
        &self.presence
    }

    /// Source bound to the active place (`SERV:place:<id>`). Unbound
    /// while no place is active; not loaded until asked.
    pub fn place(&self) -> &AddressableModelSource<PlaceModel> {
        &self.place
    }

    pub fn devices(&self) -> &Store<DeviceModel> {
        &self.devices
    }

    pub fn subsystems(&self) -> &Store<SubsystemModel> {
        self.catalog.subsystems()
    }

    pub fn places(&self) -> &Store<PlaceModel> {
        &self.places
    }

    pub fn people(&self) -> &Store<PersonModel> {
        &self.people
    }

    pub fn scenes(&self) -> &Store<SceneModel> {
        &self.scenes
    }
}

impl std::fmt::Debug for Cornea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cornea")
            .field("session", &self.session)
            .field("cache", &self.cache.len())
            .finish_non_exhaustive()
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}
