//! In-memory state of one named storage instance.
//!
//! An [`Instance`] never performs I/O. Every mutation returns the event it
//! raised so the owning registry can persist afterwards; notification of
//! public subscribers happens here, outside the instance lock.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::duration::Duration;
use crate::event::{Dispatch, Observer, Observers, StoreEvent, Subscription, Watcher};
use crate::item::StoreItem;

/// Settings an instance is created with.
///
/// Persisted alongside the instance so a restored instance keeps them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Lifetime of the whole instance, counted from its creation.
    /// `None` or a zero duration means the instance never expires.
    #[serde(rename = "expireIn", default, skip_serializing_if = "Option::is_none")]
    pub expire_in: Option<Duration>,
}

impl InstanceConfig {
    pub fn expiring_in(expire_in: Duration) -> Self {
        Self {
            expire_in: Some(expire_in),
        }
    }
}

pub(crate) struct Instance {
    name: String,
    config: InstanceConfig,
    entries: HashMap<String, StoreItem>,
    expire_at: Option<DateTime<Utc>>,
    observers: Observers,
    clock: Arc<dyn Clock>,
}

impl Instance {
    pub(crate) fn new(name: &str, config: InstanceConfig, clock: Arc<dyn Clock>) -> Self {
        let expire_at = config.expire_in.and_then(|d| d.expire_from(clock.now()));
        Self::restored(name, config, expire_at, HashMap::new(), clock)
    }

    pub(crate) fn restored(
        name: &str,
        config: InstanceConfig,
        expire_at: Option<DateTime<Utc>>,
        entries: HashMap<String, StoreItem>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name: name.to_string(),
            config,
            entries,
            expire_at,
            observers: Observers::default(),
            clock,
        }
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn config(&self) -> InstanceConfig {
        self.config
    }

    pub(crate) fn expire_at(&self) -> Option<DateTime<Utc>> {
        self.expire_at
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (&String, &StoreItem)> {
        self.entries.iter()
    }

    pub(crate) fn is_expired(&self) -> bool {
        self.expire_at.is_some_and(|expire_at| expire_at < self.now())
    }

    fn set(&mut self, key: &str, value: Value, ttl: Option<Duration>) -> Dispatch {
        if ttl.is_some_and(|ttl| ttl.is_negative()) {
            warn!(instance = %self.name, key, "negative lifetime, item is stored already expired");
        }
        let expire_at = ttl.and_then(|ttl| ttl.expire_from(self.now()));
        let event = StoreEvent::Set {
            key: key.to_string(),
        };
        let dispatch = self.observers.dispatch(&event, Some(&value));
        self.entries
            .insert(key.to_string(), StoreItem::new(value, expire_at));
        dispatch
    }

    /// Returns the live value, or removes an expired entry and returns the
    /// resulting event.
    fn get(&mut self, key: &str) -> std::result::Result<Option<Value>, Dispatch> {
        let now = self.now();
        match self.entries.get(key) {
            Some(item) if item.is_expired_at(now) => {
                debug!(instance = %self.name, key, "entry expired, removing");
                Err(self.remove(key))
            },
            Some(item) => Ok(item.value_at(now).cloned()),
            None => Ok(None),
        }
    }

    fn remove(&mut self, key: &str) -> Dispatch {
        self.entries.remove(key);
        let event = StoreEvent::Remove {
            key: key.to_string(),
        };
        self.observers.dispatch(&event, None)
    }

    fn clear(&mut self) -> Dispatch {
        self.entries.clear();
        self.observers.dispatch(&StoreEvent::Clear, None)
    }

    fn sorted_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// An instance behind its lock, shared by the registry and every handle.
#[derive(Clone)]
pub(crate) struct SharedInstance(Arc<Mutex<Instance>>);

impl SharedInstance {
    pub(crate) fn new(instance: Instance) -> Self {
        Self(Arc::new(Mutex::new(instance)))
    }

    pub(crate) fn lock(&self) -> parking_lot::MutexGuard<'_, Instance> {
        self.0.lock()
    }

    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn name(&self) -> String {
        self.lock().name.clone()
    }

    pub(crate) fn is_expired(&self) -> bool {
        self.lock().is_expired()
    }

    pub(crate) fn expire_at(&self) -> Option<DateTime<Utc>> {
        self.lock().expire_at
    }

    pub(crate) fn config(&self) -> InstanceConfig {
        self.lock().config
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub(crate) fn contains_key(&self, key: &str) -> bool {
        self.lock().entries.contains_key(key)
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.lock().sorted_keys()
    }

    pub(crate) fn key(&self, index: usize) -> Option<String> {
        self.lock().sorted_keys().into_iter().nth(index)
    }

    pub(crate) fn set_value(&self, key: &str, value: Value, ttl: Option<Duration>) -> StoreEvent {
        let dispatch = self.lock().set(key, value, ttl);
        notify(dispatch)
    }

    /// Reads a value. An expired entry is removed and its event returned.
    pub(crate) fn get_value(&self, key: &str) -> (Option<Value>, Option<StoreEvent>) {
        let outcome = self.lock().get(key);
        match outcome {
            Ok(value) => (value, None),
            Err(dispatch) => (None, Some(notify(dispatch))),
        }
    }

    pub(crate) fn remove(&self, key: &str) -> StoreEvent {
        let dispatch = self.lock().remove(key);
        notify(dispatch)
    }

    pub(crate) fn clear(&self) -> StoreEvent {
        let dispatch = self.lock().clear();
        notify(dispatch)
    }

    pub(crate) fn subscribe(&self, observer: Observer) -> Subscription {
        self.lock().observers.subscribe(observer)
    }

    pub(crate) fn watch(&self, key: &str, watcher: Watcher) -> Subscription {
        self.lock().observers.watch(key, watcher)
    }

    pub(crate) fn unsubscribe(&self, id: Subscription) -> bool {
        self.lock().observers.unsubscribe(id)
    }
}

/// Runs subscribers with no lock held.
fn notify(dispatch: Dispatch) -> StoreEvent {
    let event = dispatch.event().clone();
    dispatch.run();
    event
}
