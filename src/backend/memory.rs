//! In-memory backing store.

use super::{AsyncBackingStore, BackingStore};
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// In-memory backing store.
///
/// Nothing survives the process, but clones share the same map, so a test
/// can hand one clone to a registry, drop the registry, and restore a new one
/// from another clone to simulate a restart.
///
/// Implements both [`BackingStore`] and [`AsyncBackingStore`]; the async
/// methods never suspend.
///
/// # Example
///
/// ```
/// use persistor::backend::{BackingStore, MemoryStore};
///
/// let store = MemoryStore::new();
/// store.set_item("key", "value").unwrap();
/// assert_eq!(store.get_item("key").unwrap().as_deref(), Some("value"));
/// ```
#[derive(Clone, Default, Debug)]
pub struct MemoryStore {
    data: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `entries`.
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let data = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.data.read().clone()
    }
}

impl BackingStore for MemoryStore {
    fn len(&self) -> Result<usize> {
        Ok(self.data.read().len())
    }

    fn key(&self, index: usize) -> Result<Option<String>> {
        Ok(self.data.read().keys().nth(index).cloned())
    }

    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.data.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.data.write().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.data.write().clear();
        Ok(())
    }
}

#[async_trait]
impl AsyncBackingStore for MemoryStore {
    async fn len(&self) -> Result<usize> {
        BackingStore::len(self)
    }

    async fn key(&self, index: usize) -> Result<Option<String>> {
        BackingStore::key(self, index)
    }

    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        BackingStore::get_item(self, key)
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        BackingStore::set_item(self, key, value)
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        BackingStore::remove_item(self, key)
    }

    async fn clear(&self) -> Result<()> {
        BackingStore::clear(self)
    }
}
