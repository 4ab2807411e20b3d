// ── Model cache ──
//
// One table per client runtime: address -> the single live `Model` for
// that entity. The mutation methods here are the only places that emit
// `ModelEvent`s. Listeners are always fired with no borrow held, so they
// may read from or write back into the cache.

mod store;

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, trace, warn};

use cornea_api::{EventKind, PlatformEvent};

use crate::error::CoreError;
use crate::listener::{ListenerList, ListenerRegistration};
use crate::model::{Address, Attributes, Model, ModelEvent, attrs};

pub use store::Store;

/// Local cache of server-owned entities.
pub struct ModelCache {
    models: RefCell<IndexMap<Address, Rc<Model>>>,
    listeners: ListenerList<ModelEvent>,
    last_refresh: RefCell<HashMap<String, DateTime<Utc>>>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self {
            models: RefCell::new(IndexMap::new()),
            listeners: ListenerList::new(),
            last_refresh: RefCell::new(HashMap::new()),
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn get(&self, address: &Address) -> Option<Rc<Model>> {
        self.models.borrow().get(address).cloned()
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.models.borrow().contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.models.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.borrow().is_empty()
    }

    /// Every cached model, in insertion order.
    pub fn models(&self) -> Vec<Rc<Model>> {
        self.models.borrow().values().cloned().collect()
    }

    /// Cached models whose address is in `namespace`.
    pub fn models_in(&self, namespace: &str) -> Vec<Rc<Model>> {
        self.models
            .borrow()
            .values()
            .filter(|m| m.address().namespace() == namespace)
            .cloned()
            .collect()
    }

    /// When `namespace` was last reconciled by [`apply_list`](Self::apply_list).
    pub fn last_refresh(&self, namespace: &str) -> Option<DateTime<Utc>> {
        self.last_refresh.borrow().get(namespace).copied()
    }

    pub fn add_listener(&self, listener: impl Fn(&ModelEvent) + 'static) -> ListenerRegistration {
        self.listeners.add(listener)
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Insert or merge an entity. The address is read from `base:address`.
    ///
    /// Emits Added for a new entity, Changed with exactly the differing
    /// attributes for a known one, and nothing if nothing differs.
    pub fn add_or_update(&self, attributes: Attributes) -> Result<Rc<Model>, CoreError> {
        let address = address_of(&attributes)?;
        Ok(self.upsert(address, attributes))
    }

    /// Apply a platform push event.
    pub fn apply_event(&self, event: &PlatformEvent) {
        let address = match Address::parse(&event.source) {
            Ok(address) => address,
            Err(e) => {
                warn!(error = %e, "dropping event with invalid source");
                return;
            }
        };

        match event.kind {
            EventKind::Added => {
                let mut attributes = event.attributes.clone();
                attributes
                    .entry(attrs::base::ADDRESS)
                    .or_insert_with(|| Value::String(address.to_string()));
                self.upsert(address, attributes);
            }
            EventKind::Changed => {
                let Some(model) = self.get(&address) else {
                    trace!(%address, "ignoring change for uncached model");
                    return;
                };
                let changes = event
                    .changed_attributes
                    .as_ref()
                    .unwrap_or(&event.attributes);
                self.merge_into(model, changes);
            }
            EventKind::Deleted => {
                self.remove(&address);
            }
        }
    }

    /// Remove one entity, emitting Deleted.
    pub fn remove(&self, address: &Address) -> Option<Rc<Model>> {
        let removed = self.models.borrow_mut().shift_remove(address);
        if let Some(model) = &removed {
            trace!(%address, "model deleted");
            self.listeners.fire(&ModelEvent::Deleted(Rc::clone(model)));
        }
        removed
    }

    /// Remove everything, emitting one Deleted per entity. A no-op (and
    /// silent) on an empty cache.
    pub fn clear_cache(&self) {
        let drained: Vec<Rc<Model>> = {
            let mut models = self.models.borrow_mut();
            models.drain(..).map(|(_, model)| model).collect()
        };
        if drained.is_empty() {
            return;
        }
        self.last_refresh.borrow_mut().clear();
        debug!(count = drained.len(), "cache cleared");
        for model in drained {
            self.listeners.fire(&ModelEvent::Deleted(model));
        }
    }

    /// Remove every cached entity of `namespace` whose address is not in
    /// `keep`. Returns how many were removed.
    pub fn retain_all(&self, namespace: &str, keep: &[Address]) -> usize {
        let keep: HashSet<&Address> = keep.iter().collect();
        let stale: Vec<Address> = self
            .models
            .borrow()
            .keys()
            .filter(|a| a.namespace() == namespace && !keep.contains(a))
            .cloned()
            .collect();
        for address in &stale {
            self.remove(address);
        }
        stale.len()
    }

    /// Full refresh of one namespace: upsert every entity, then prune what
    /// was not in the list. Entities with a bad or foreign address are
    /// skipped.
    pub fn apply_list(&self, namespace: &str, entities: Vec<Attributes>) -> Vec<Rc<Model>> {
        let mut applied = Vec::with_capacity(entities.len());
        for attributes in entities {
            match address_of(&attributes) {
                Ok(address) if address.namespace() == namespace => {
                    applied.push(self.upsert(address, attributes));
                }
                Ok(address) => {
                    warn!(%address, namespace, "skipping entity outside namespace");
                }
                Err(e) => {
                    warn!(error = %e, namespace, "skipping entity in list refresh");
                }
            }
        }

        let keep: Vec<Address> = applied.iter().map(|m| m.address().clone()).collect();
        let pruned = self.retain_all(namespace, &keep);
        self.last_refresh
            .borrow_mut()
            .insert(namespace.to_owned(), Utc::now());
        debug!(namespace, count = applied.len(), pruned, "list applied");
        applied
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn upsert(&self, address: Address, attributes: Attributes) -> Rc<Model> {
        if let Some(model) = self.get(&address) {
            self.merge_into(Rc::clone(&model), &attributes);
            return model;
        }

        let model = Rc::new(Model::new(address.clone(), attributes));
        self.models.borrow_mut().insert(address, Rc::clone(&model));
        trace!(address = %model.address(), "model added");
        self.listeners.fire(&ModelEvent::Added(Rc::clone(&model)));
        model
    }

    fn merge_into(&self, model: Rc<Model>, incoming: &Attributes) {
        let changes = model.merge(incoming);
        if changes.is_empty() {
            return;
        }
        trace!(address = %model.address(), changed = changes.len(), "model changed");
        self.listeners.fire(&ModelEvent::Changed { model, changes });
    }
}

impl Default for ModelCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ModelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCache")
            .field("len", &self.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

fn address_of(attributes: &Attributes) -> Result<Address, CoreError> {
    let raw = attributes
        .get(attrs::base::ADDRESS)
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::InvalidModel {
            reason: format!("missing {}", attrs::base::ADDRESS),
        })?;
    Address::parse(raw).map_err(|_| CoreError::InvalidModel {
        reason: format!("invalid address {raw:?}"),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::RefCell;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::test_support::attrs;

    fn recorder(cache: &ModelCache) -> (Rc<RefCell<Vec<String>>>, ListenerRegistration) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = log.clone();
        let reg = cache.add_listener(move |event| {
            let tag = match event {
                ModelEvent::Added(_) => "added",
                ModelEvent::Changed { .. } => "changed",
                ModelEvent::Deleted(_) => "deleted",
            };
            l.borrow_mut().push(format!("{tag} {}", event.address()));
        });
        (log, reg)
    }

    #[test]
    fn add_or_update_round_trips() {
        let cache = ModelCache::new();
        let input = attrs(json!({ "base:address": "DRIV:dev:1", "dev:name": "Door" }));
        cache.add_or_update(input.clone()).unwrap();
        let model = cache.get(&Address::new("DRIV:dev:1")).unwrap();
        assert_eq!(model.attributes(), input);
    }

    #[test]
    fn update_preserves_identity_and_reports_delta() {
        let cache = ModelCache::new();
        let first = cache
            .add_or_update(attrs(json!({ "base:address": "DRIV:dev:1", "dev:name": "A" })))
            .unwrap();

        let changes = Rc::new(RefCell::new(None));
        let c = changes.clone();
        let _reg = cache.add_listener(move |event| {
            if let ModelEvent::Changed { changes, .. } = event {
                *c.borrow_mut() = Some(changes.clone());
            }
        });

        let second = cache
            .add_or_update(attrs(json!({ "base:address": "DRIV:dev:1", "dev:name": "B" })))
            .unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(
            changes.borrow().clone().unwrap(),
            attrs(json!({ "dev:name": "B" }))
        );
    }

    #[test]
    fn identical_update_is_silent() {
        let cache = ModelCache::new();
        let input = attrs(json!({ "base:address": "DRIV:dev:1", "dev:name": "A" }));
        cache.add_or_update(input.clone()).unwrap();
        let (log, _reg) = recorder(&cache);
        cache.add_or_update(input).unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn missing_address_is_invalid() {
        let cache = ModelCache::new();
        let err = cache
            .add_or_update(attrs(json!({ "dev:name": "A" })))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidModel { .. }));
        assert!(cache.is_empty());
    }

    #[test]
    fn events_apply_in_order() {
        let cache = ModelCache::new();
        let (log, _reg) = recorder(&cache);

        cache.apply_event(&PlatformEvent::changed(
            "DRIV:dev:1",
            attrs(json!({ "dev:name": "ghost" })),
        ));
        cache.apply_event(&PlatformEvent::added(
            "DRIV:dev:1",
            attrs(json!({ "dev:name": "A" })),
        ));
        cache.apply_event(&PlatformEvent::changed(
            "DRIV:dev:1",
            attrs(json!({ "dev:name": "B" })),
        ));
        cache.apply_event(&PlatformEvent::deleted("DRIV:dev:1"));

        assert_eq!(
            *log.borrow(),
            vec!["added DRIV:dev:1", "changed DRIV:dev:1", "deleted DRIV:dev:1"]
        );
        assert!(cache.is_empty());
    }

    #[test]
    fn added_event_fills_in_address() {
        let cache = ModelCache::new();
        cache.apply_event(&PlatformEvent::added("DRIV:dev:9", Attributes::new()));
        let model = cache.get(&Address::new("DRIV:dev:9")).unwrap();
        assert_eq!(
            model.get_str("base:address").as_deref(),
            Some("DRIV:dev:9")
        );
    }

    #[test]
    fn clear_twice_is_one_transition() {
        let cache = ModelCache::new();
        cache
            .add_or_update(attrs(json!({ "base:address": "DRIV:dev:1" })))
            .unwrap();
        cache
            .add_or_update(attrs(json!({ "base:address": "DRIV:dev:2" })))
            .unwrap();
        let (log, _reg) = recorder(&cache);

        cache.clear_cache();
        cache.clear_cache();
        assert_eq!(log.borrow().len(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn retain_all_prunes_only_the_namespace() {
        let cache = ModelCache::new();
        for address in ["SERV:subs:1", "SERV:subs:2", "DRIV:dev:1"] {
            cache
                .add_or_update(attrs(json!({ "base:address": address })))
                .unwrap();
        }
        let removed = cache.retain_all("subs", &[Address::new("SERV:subs:2")]);
        assert_eq!(removed, 1);
        assert!(cache.get(&Address::new("SERV:subs:1")).is_none());
        assert!(cache.get(&Address::new("DRIV:dev:1")).is_some());
    }

    #[test]
    fn apply_list_upserts_then_prunes() {
        let cache = ModelCache::new();
        cache
            .add_or_update(attrs(json!({ "base:address": "SERV:subs:old" })))
            .unwrap();
        let (log, _reg) = recorder(&cache);

        let applied = cache.apply_list(
            "subs",
            vec![
                attrs(json!({ "base:address": "SERV:subs:1", "base:type": "subsecurity" })),
                attrs(json!({ "base:address": "DRIV:dev:1" })),
                attrs(json!({ "nope": true })),
            ],
        );

        assert_eq!(applied.len(), 1);
        assert_eq!(
            *log.borrow(),
            vec!["added SERV:subs:1", "deleted SERV:subs:old"]
        );
        assert!(cache.last_refresh("subs").is_some());
        assert!(cache.last_refresh("dev").is_none());
    }

    #[test]
    fn listeners_may_write_back_into_the_cache() {
        let cache = Rc::new(ModelCache::new());
        let c = Rc::downgrade(&cache);
        let _reg = cache.add_listener(move |event| {
            if let (ModelEvent::Added(model), Some(cache)) = (event, c.upgrade()) {
                if model.address().as_str() == "DRIV:dev:1" {
                    cache
                        .add_or_update(attrs(json!({ "base:address": "DRIV:dev:2" })))
                        .unwrap();
                }
            }
        });
        cache
            .add_or_update(attrs(json!({ "base:address": "DRIV:dev:1" })))
            .unwrap();
        assert_eq!(cache.len(), 2);
    }
}
