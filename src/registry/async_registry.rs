//! Registry over an async backing store.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

use super::{RegistryOptions, live_names, live_or_create, prune_expired};
use crate::backend::AsyncBackingStore;
use crate::clock::Clock;
use crate::duration::Duration;
use crate::error::{Error, Result};
use crate::event::{StoreEvent, Subscription};
use crate::instance::{InstanceConfig, SharedInstance};
use crate::snapshot::{self, Instances};

/// One restore generation. Replaced wholesale by `reset`.
type State = OnceCell<Mutex<Instances>>;

struct Shared<S> {
    store: S,
    options: RegistryOptions,
    state: parking_lot::Mutex<Arc<State>>,
}

impl<S: AsyncBackingStore> Shared<S> {
    fn current(&self) -> Arc<State> {
        Arc::clone(&self.state.lock())
    }

    async fn restore(&self) -> Mutex<Instances> {
        let key = &self.options.storage_key;
        let read = self.store.get_item(key).await;
        Mutex::new(snapshot::restore(read, key, &self.options.clock))
    }

    /// Restores `state` once; concurrent callers wait for the same read.
    ///
    /// The restore runs on its own task, so it completes even when the
    /// caller that started it is dropped.
    async fn instances<'a>(self: &Arc<Self>, state: &'a Arc<State>) -> &'a Mutex<Instances> {
        if let Some(instances) = state.get() {
            return instances;
        }

        let task = {
            let shared = Arc::clone(self);
            let state = Arc::clone(state);
            tokio::spawn(async move {
                state.get_or_init(|| shared.restore()).await;
            })
        };
        if let Err(e) = task.await {
            warn!(error = %e, "restore task failed, restoring inline");
        }
        state.get_or_init(|| self.restore()).await
    }

    /// Prunes expired instances and writes the blob.
    ///
    /// Callers hold the instance map lock across the write, so writes never
    /// interleave.
    async fn write(&self, instances: &mut Instances) -> Result<usize> {
        prune_expired(instances);
        let blob = snapshot::encode(instances)?;
        self.store
            .set_item(&self.options.storage_key, &blob)
            .await
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

impl<S: AsyncBackingStore> PersistHook<S> {
    async fn persist(&self, event: &StoreEvent) -> Result<()> {
        let state = self.0.current();
        let Some(instances) = state.get() else {
            debug!(%event, "registry was reset, not persisting");
            return Ok(());
        };
        let mut instances = instances.lock().await;
        let bytes = self.0.write(&mut instances).await?;
        debug!(%event, bytes, "registry persisted");
        Ok(())
    }
}

/// Registry of named storage instances over an async store.
///
/// Concurrent first calls share a single restore: exactly one read of the
/// registry key is issued.
///
/// # Example
///
/// ```
/// use persistor::{AsyncRegistry, InstanceConfig};
/// use persistor::backend::MemoryStore;
///
/// # #[tokio::main]
/// # async fn main() -> persistor::Result<()> {
/// let registry = AsyncRegistry::new(MemoryStore::new());
/// let cart = registry.get_or_create("cart", InstanceConfig::default()).await;
///
/// cart.set_item("items", &vec!["apple", "pear"], None).await?;
/// assert_eq!(cart.get_item::<Vec<String>>("items").await?.map(|v| v.len()), Some(2));
/// # Ok(())
/// # }
/// ```
pub struct AsyncRegistry<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for AsyncRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S> fmt::Debug for AsyncRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncRegistry")
            .field("storage_key", &self.shared.options.storage_key)
            .finish_non_exhaustive()
    }
}

impl<S: AsyncBackingStore> AsyncRegistry<S> {
    /// Creates a registry with the default key and the system clock.
    pub fn new(store: S) -> Self {
        Self::with_options(store, RegistryOptions::default())
    }

    pub fn builder(store: S) -> AsyncRegistryBuilder<S> {
        AsyncRegistryBuilder {
            store,
            options: RegistryOptions::default(),
        }
    }

    pub fn with_options(store: S, options: RegistryOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                options,
                state: parking_lot::Mutex::new(Arc::new(State::new())),
            }),
        }
    }

    /// Returns the live instance called `name`, creating it from `config`
    /// if it does not exist or has expired.
    ///
    /// The first call restores the registry from the store. Restore problems
    /// are logged and yield an empty registry; they never fail this call.
    pub async fn get_or_create(&self, name: &str, config: InstanceConfig) -> AsyncStorage<S> {
        let state = self.shared.current();
        let mut instances = self.shared.instances(&state).await.lock().await;
        let (instance, created) =
            live_or_create(&mut instances, name, config, &self.shared.options.clock);
        if created {
            debug!(instance = name, "instance created");
        }

        AsyncStorage {
            instance,
            hook: PersistHook(Arc::clone(&self.shared)),
        }
    }

    /// Names of the live instances, sorted.
    pub async fn names(&self) -> Vec<String> {
        let state = self.shared.current();
        let instances = self.shared.instances(&state).await.lock().await;
        live_names(&instances)
    }

    pub async fn contains(&self, name: &str) -> bool {
        let state = self.shared.current();
        let instances = self.shared.instances(&state).await.lock().await;
        instances.get(name).is_some_and(|i| !i.is_expired())
    }

    /// Number of live instances.
    pub async fn len(&self) -> usize {
        self.names().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Evicts the instance called `name` and persists the registry.
    ///
    /// Returns whether the instance existed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] if the registry cannot be written.
    pub async fn remove(&self, name: &str) -> Result<bool> {
        let state = self.shared.current();
        let mut instances = self.shared.instances(&state).await.lock().await;
        let removed = instances.remove(name).is_some();
        if removed {
            self.shared.write(&mut instances).await?;
            debug!(instance = name, "instance removed");
        }
        Ok(removed)
    }

    /// The blob the next persist would write.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the registry cannot be encoded.
    pub async fn snapshot(&self) -> Result<String> {
        let state = self.shared.current();
        let mut instances = self.shared.instances(&state).await.lock().await;
        prune_expired(&mut instances);
        snapshot::encode(&instances)
    }

    /// Forgets every in-memory instance. The next access restores from the
    /// store again.
    pub fn reset(&self) {
        *self.shared.state.lock() = Arc::new(State::new());
    }

    pub fn storage_key(&self) -> &str {
        &self.shared.options.storage_key
    }

    pub fn store(&self) -> &S {
        &self.shared.store
    }
}

/// Builder for [`AsyncRegistry`].
pub struct AsyncRegistryBuilder<S> {
    store: S,
    options: RegistryOptions,
}

impl<S: AsyncBackingStore> AsyncRegistryBuilder<S> {
    /// Backing store key the registry blob is written under.
    pub fn storage_key(mut self, key: impl Into<String>) -> Self {
        self.options.storage_key = key.into();
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.options.clock = clock;
        self
    }

    pub fn build(self) -> AsyncRegistry<S> {
        AsyncRegistry::with_options(self.store, self.options)
    }
}

/// Handle onto one storage instance of an [`AsyncRegistry`].
///
/// Reads of unexpired data and subscriber management never suspend; every
/// mutation awaits the registry write before it returns.
pub struct AsyncStorage<S> {
    instance: SharedInstance,
    hook: PersistHook<S>,
}

impl<S> Clone for AsyncStorage<S> {
    fn clone(&self) -> Self {
        Self {
            instance: self.instance.clone(),
            hook: self.hook.clone(),
        }
    }
}

impl<S> fmt::Debug for AsyncStorage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncStorage")
            .field("name", &self.instance.name())
            .field("expire_at", &self.instance.expire_at())
            .field("len", &self.instance.len())
            .finish()
    }
}

impl<S: AsyncBackingStore> AsyncStorage<S> {
    pub fn name(&self) -> String {
        self.instance.name()
    }

    pub fn config(&self) -> InstanceConfig {
        self.instance.config()
    }

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
    /// # Errors
    ///
    /// - [`Error::Serialization`] if `value` cannot be converted to JSON;
    ///   nothing is stored
    /// - [`Error::Backend`] if the registry cannot be written
    pub async fn set_item<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.set_value(key, value, ttl).await
    }

    /// # Errors
    ///
    /// Returns [`Error::Backend`] if the registry cannot be written.
    pub async fn set_value(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        let event = self.instance.set_value(key, value, ttl);
        self.hook.persist(&event).await
    }

    /// Reads `key` as a `T`. An expired entry is removed and reads as `None`.
    ///
    /// # Errors
    ///
    /// - [`Error::Serialization`] if the stored value is not a `T`
    /// - [`Error::Backend`] if removing an expired entry cannot be persisted
    pub async fn get_item<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_value(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::Backend`] if removing an expired entry cannot be
    /// persisted.
    pub async fn get_value(&self, key: &str) -> Result<Option<Value>> {
        let (value, event) = self.instance.get_value(key);
        if let Some(event) = event {
            self.hook.persist(&event).await?;
        }
        Ok(value)
    }

    /// # Errors
    ///
    /// Returns [`Error::Backend`] if the registry cannot be written.
    pub async fn remove_item(&self, key: &str) -> Result<()> {
        let event = self.instance.remove(key);
        self.hook.persist(&event).await
    }

    /// # Errors
    ///
    /// Returns [`Error::Backend`] if the registry cannot be written.
    pub async fn clear(&self) -> Result<()> {
        let event = self.instance.clear();
        self.hook.persist(&event).await
    }

    pub fn len(&self) -> usize {
        self.instance.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn key(&self, index: usize) -> Option<String> {
        self.instance.key(index)
    }

    pub fn keys(&self) -> Vec<String> {
        self.instance.keys()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.instance.contains_key(key)
    }

    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        self.instance.subscribe(Arc::new(observer))
    }

    pub fn watch<F>(&self, key: &str, watcher: F) -> Subscription
    where
        F: Fn(Option<&Value>) + Send + Sync + 'static,
    {
        self.instance.watch(key, Arc::new(watcher))
    }

    pub fn unsubscribe(&self, id: Subscription) -> bool {
        self.instance.unsubscribe(id)
    }
}
