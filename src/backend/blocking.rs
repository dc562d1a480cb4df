//! Async adapter for synchronous stores.
//!
//! Every call runs on tokio's blocking pool via `spawn_blocking`, so slow
//! file or database I/O never stalls the async runtime.

use super::{AsyncBackingStore, BackingStore};
use anyhow::{Context, Result};
use async_trait::async_trait;

/// Wraps a synchronous [`BackingStore`] as an [`AsyncBackingStore`].
///
/// The inner store is cloned into each blocking task, so it should be cheap
/// to clone (all bundled stores share their state behind an `Arc`).
///
/// # Example
///
/// ```no_run
/// use persistor::AsyncRegistry;
/// use persistor::backend::{Blocking, RedbStore};
///
/// # fn main() -> anyhow::Result<()> {
/// let store = Blocking::new(RedbStore::open("/tmp/persistor.redb")?);
/// let registry = AsyncRegistry::new(store);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct Blocking<S> {
    inner: S,
}

impl<S> Blocking<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: BackingStore + Clone> Blocking<S> {
    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&S) -> Result<T> + Send + 'static,
    {
        let store = self.inner.clone();
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .context("Task join error")?
    }
}

#[async_trait]
impl<S: BackingStore + Clone> AsyncBackingStore for Blocking<S> {
    async fn len(&self) -> Result<usize> {
        self.run(|store| store.len()).await
    }

    async fn key(&self, index: usize) -> Result<Option<String>> {
        self.run(move |store| store.key(index)).await
    }

    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.run(move |store| store.get_item(&key)).await
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.run(move |store| store.set_item(&key, &value)).await
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.run(move |store| store.remove_item(&key)).await
    }

    async fn clear(&self) -> Result<()> {
        self.run(|store| store.clear()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FileStore;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_store_through_blocking_pool() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("store.json");
        let store = Blocking::new(FileStore::open(&path).unwrap());

        store.set_item("key", "value").await.unwrap();
        assert_eq!(store.get_item("key").await.unwrap().as_deref(), Some("value"));
        assert_eq!(store.len().await.unwrap(), 1);
        assert_eq!(store.key(0).await.unwrap().as_deref(), Some("key"));

        store.remove_item("key").await.unwrap();
        assert_eq!(store.get_item("key").await.unwrap(), None);

        // The wrapped store sees the same data
        store.set_item("other", "1").await.unwrap();
        assert_eq!(store.inner().get_item("other").unwrap().as_deref(), Some("1"));
    }
}
