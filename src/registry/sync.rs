//! Registry over a synchronous backing store.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::{RegistryOptions, live_names, live_or_create, prune_expired};
use crate::backend::BackingStore;
use crate::clock::Clock;
use crate::duration::Duration;
use crate::error::{Error, Result};
use crate::event::{StoreEvent, Subscription};
use crate::instance::{InstanceConfig, SharedInstance};
use crate::snapshot::{self, Instances};

struct Shared<S> {
    store: S,
    options: RegistryOptions,
    /// `None` until the first restore, and again after `reset`.
    state: Mutex<Option<Instances>>,
}

impl<S: BackingStore> Shared<S> {
    fn restore(&self) -> Instances {
        let key = &self.options.storage_key;
        snapshot::restore(self.store.get_item(key), key, &self.options.clock)
    }

    /// Runs `f` on the restored instance map, restoring it first if needed.
    fn with_instances<T>(&self, f: impl FnOnce(&mut Instances) -> T) -> T {
        let mut state = self.state.lock();
        let instances = state.get_or_insert_with(|| self.restore());
        f(instances)
    }

    /// Prunes expired instances and writes the blob.
    fn write(&self, instances: &mut Instances) -> Result<usize> {
        prune_expired(instances);
        let blob = snapshot::encode(instances)?;
        self.store
            .set_item(&self.options.storage_key, &blob)
            .map_err(|e| Error::backend("write", e))?;
        Ok(blob.len())
    }
}

/// Persists the registry after a mutation made through a handle.
struct PersistHook<S>(Arc<Shared<S>>);

impl<S> Clone for PersistHook<S> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<S: BackingStore> PersistHook<S> {
    fn persist(&self, event: &StoreEvent) -> Result<()> {
        let mut state = self.0.state.lock();
        let Some(instances) = state.as_mut() else {
            debug!(%event, "registry was reset, not persisting");
            return Ok(());
        };
        let bytes = self.0.write(instances)?;
        debug!(%event, bytes, "registry persisted");
        Ok(())
    }
}

/// Registry of named storage instances over a synchronous store.
///
/// Cloning is cheap and clones share the same instances.
///
/// # Example
///
/// ```
/// use persistor::{Duration, InstanceConfig, Registry};
/// use persistor::backend::MemoryStore;
///
/// # fn main() -> persistor::Result<()> {
/// let registry = Registry::new(MemoryStore::new());
/// let session = registry.get_or_create("session", InstanceConfig::default());
///
/// session.set_item("user", &"ada", Some(Duration::HOUR))?;
/// assert_eq!(session.get_item::<String>("user")?.as_deref(), Some("ada"));
/// # Ok(())
/// # }
/// ```
pub struct Registry<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for Registry<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S> fmt::Debug for Registry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("storage_key", &self.shared.options.storage_key)
            .finish_non_exhaustive()
    }
}

impl<S: BackingStore> Registry<S> {
    /// Creates a registry with the default key and the system clock.
    pub fn new(store: S) -> Self {
        Self::with_options(store, RegistryOptions::default())
    }

    pub fn builder(store: S) -> RegistryBuilder<S> {
        RegistryBuilder {
            store,
            options: RegistryOptions::default(),
        }
    }

    pub fn with_options(store: S, options: RegistryOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                options,
                state: Mutex::new(None),
            }),
        }
    }

    /// Returns the live instance called `name`, creating it from `config`
    /// if it does not exist or has expired.
    ///
    /// The first call restores the registry from the store. Restore problems
    /// are logged and yield an empty registry; they never fail this call.
    /// `config` is ignored when a live instance already exists.
    pub fn get_or_create(&self, name: &str, config: InstanceConfig) -> Storage<S> {
        let instance = self.shared.with_instances(|instances| {
            let (instance, created) =
                live_or_create(instances, name, config, &self.shared.options.clock);
            if created {
                debug!(instance = name, "instance created");
            }
            instance
        });

        Storage {
            instance,
            hook: PersistHook(Arc::clone(&self.shared)),
        }
    }

    /// Names of the live instances, sorted.
    pub fn names(&self) -> Vec<String> {
        self.shared.with_instances(|instances| live_names(instances))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.shared
            .with_instances(|instances| instances.get(name).is_some_and(|i| !i.is_expired()))
    }

    /// Number of live instances.
    pub fn len(&self) -> usize {
        self.names().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evicts the instance called `name` and persists the registry.
    ///
    /// Returns whether the instance existed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] if the registry cannot be written.
    pub fn remove(&self, name: &str) -> Result<bool> {
        self.shared.with_instances(|instances| {
            let removed = instances.remove(name).is_some();
            if removed {
                self.shared.write(instances)?;
                debug!(instance = name, "instance removed");
            }
            Ok(removed)
        })
    }

    /// The blob the next persist would write.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the registry cannot be encoded.
    pub fn snapshot(&self) -> Result<String> {
        self.shared.with_instances(|instances| {
            prune_expired(instances);
            snapshot::encode(instances)
        })
    }

    /// Forgets every in-memory instance. The next access restores from the
    /// store again.
    pub fn reset(&self) {
        *self.shared.state.lock() = None;
    }

    pub fn storage_key(&self) -> &str {
        &self.shared.options.storage_key
    }

    pub fn store(&self) -> &S {
        &self.shared.store
    }
}

/// Builder for [`Registry`].
pub struct RegistryBuilder<S> {
    store: S,
    options: RegistryOptions,
}

impl<S: BackingStore> RegistryBuilder<S> {
    /// Backing store key the registry blob is written under.
    pub fn storage_key(mut self, key: impl Into<String>) -> Self {
        self.options.storage_key = key.into();
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.options.clock = clock;
        self
    }

    pub fn build(self) -> Registry<S> {
        Registry::with_options(self.store, self.options)
    }
}

/// Handle onto one storage instance of a [`Registry`].
///
/// Every mutation is persisted before it returns.
pub struct Storage<S> {
    instance: SharedInstance,
    hook: PersistHook<S>,
}

impl<S> Clone for Storage<S> {
    fn clone(&self) -> Self {
        Self {
            instance: self.instance.clone(),
            hook: self.hook.clone(),
        }
    }
}

impl<S> fmt::Debug for Storage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("name", &self.instance.name())
            .field("expire_at", &self.instance.expire_at())
            .field("len", &self.instance.len())
            .finish()
    }
}

impl<S: BackingStore> Storage<S> {
    pub fn name(&self) -> String {
        self.instance.name()
    }

    pub fn config(&self) -> InstanceConfig {
        self.instance.config()
    }

    /// When the whole instance expires, if ever.
    pub fn expire_at(&self) -> Option<DateTime<Utc>> {
        self.instance.expire_at()
    }

    pub fn is_expired(&self) -> bool {
        self.instance.is_expired()
    }

    /// Whether both handles point at the same instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.instance.ptr_eq(&other.instance)
    }

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// `ttl` of `None` or zero never expires; a negative `ttl` stores an
    /// already expired item.
    ///
    /// # Errors
    ///
    /// - [`Error::Serialization`] if `value` cannot be converted to JSON;
    ///   nothing is stored
    /// - [`Error::Backend`] if the registry cannot be written
    pub fn set_item<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.set_value(key, value, ttl)
    }

    /// Like [`set_item`](Self::set_item) with an already built JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] if the registry cannot be written.
    pub fn set_value(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        let event = self.instance.set_value(key, value, ttl);
        self.hook.persist(&event)
    }

    /// Reads `key` as a `T`. An expired entry is removed and reads as `None`.
    ///
    /// # Errors
    ///
    /// - [`Error::Serialization`] if the stored value is not a `T`
    /// - [`Error::Backend`] if removing an expired entry cannot be persisted
    pub fn get_item<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_value(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Reads the raw JSON value of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] if removing an expired entry cannot be
    /// persisted.
    pub fn get_value(&self, key: &str) -> Result<Option<Value>> {
        let (value, event) = self.instance.get_value(key);
        if let Some(event) = event {
            self.hook.persist(&event)?;
        }
        Ok(value)
    }

    /// Removes `key`. Notifies subscribers even if the key was absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] if the registry cannot be written.
    pub fn remove_item(&self, key: &str) -> Result<()> {
        let event = self.instance.remove(key);
        self.hook.persist(&event)
    }

    /// Removes every entry with a single `CLEAR` event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] if the registry cannot be written.
    pub fn clear(&self) -> Result<()> {
        let event = self.instance.clear();
        self.hook.persist(&event)
    }

    /// Entry count, including expired entries that have not been read yet.
    pub fn len(&self) -> usize {
        self.instance.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Key at `index` in sorted key order.
    pub fn key(&self, index: usize) -> Option<String> {
        self.instance.key(index)
    }

    pub fn keys(&self) -> Vec<String> {
        self.instance.keys()
    }

    /// Whether `key` is stored. Does not check or clean up expiration.
    pub fn contains_key(&self, key: &str) -> bool {
        self.instance.contains_key(key)
    }

    /// Calls `observer` after every mutation of this instance.
    ///
    /// Observers run on the mutating thread with no lock held, before the
    /// registry is persisted.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        self.instance.subscribe(Arc::new(observer))
    }

    /// Calls `watcher` with the new value whenever `key` is set, and with
    /// `None` when it is removed or the instance is cleared.
    pub fn watch<F>(&self, key: &str, watcher: F) -> Subscription
    where
        F: Fn(Option<&Value>) + Send + Sync + 'static,
    {
        self.instance.watch(key, Arc::new(watcher))
    }

    /// Returns whether the subscription was still registered.
    pub fn unsubscribe(&self, id: Subscription) -> bool {
        self.instance.unsubscribe(id)
    }
}
