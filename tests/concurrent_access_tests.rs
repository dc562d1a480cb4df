//! Concurrency tests for both registry flavors.
//!
//! Tests include:
//! - Many OS threads writing through one synchronous registry
//! - Many tasks on a multi-threaded runtime racing the first restore
//! - Observers that call back into the registry while it persists
//!
//! Run with:
//! ```bash
//! cargo test --test concurrent_access_tests
//! ```

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use persistor::backend::{AsyncBackingStore, BackingStore, MemoryStore};
use persistor::{AsyncRegistry, DEFAULT_STORAGE_KEY, InstanceConfig, Registry, StoreEvent};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use tokio::sync::Barrier;

/// Async store that counts reads and makes each one slow.
#[derive(Clone, Default)]
struct CountingStore {
    inner: MemoryStore,
    reads: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
}

#[async_trait]
impl AsyncBackingStore for CountingStore {
    async fn len(&self) -> AnyResult<usize> {
        AsyncBackingStore::len(&self.inner).await
    }

    async fn key(&self, index: usize) -> AnyResult<Option<String>> {
        AsyncBackingStore::key(&self.inner, index).await
    }

    async fn get_item(&self, key: &str) -> AnyResult<Option<String>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        AsyncBackingStore::get_item(&self.inner, key).await
    }

    async fn set_item(&self, key: &str, value: &str) -> AnyResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        AsyncBackingStore::set_item(&self.inner, key, value).await
    }

    async fn remove_item(&self, key: &str) -> AnyResult<()> {
        AsyncBackingStore::remove_item(&self.inner, key).await
    }

    async fn clear(&self) -> AnyResult<()> {
        AsyncBackingStore::clear(&self.inner).await
    }
}

#[test]
fn test_threads_share_one_sync_registry() {
    const THREADS: usize = 8;
    const WRITES: usize = 25;

    let store = MemoryStore::new();
    let registry = Registry::new(store.clone());

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let registry = registry.clone();
            thread::spawn(move || {
                let s = registry.get_or_create("shared", InstanceConfig::default());
                for i in 0..WRITES {
                    s.set_item(&format!("t{t}-{i}"), &i, None).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let s = registry.get_or_create("shared", InstanceConfig::default());
    assert_eq!(s.len(), THREADS * WRITES);

    // The last write carried every entry
    registry.reset();
    let restored = registry.get_or_create("shared", InstanceConfig::default());
    assert_eq!(restored.len(), THREADS * WRITES);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_first_access_restores_once() {
    const TASKS: usize = 16;

    let store = CountingStore::default();
    let registry = AsyncRegistry::new(store.clone());
    let barrier = Arc::new(Barrier::new(TASKS));

    let handles: Vec<_> = (0..TASKS)
        .map(|_| {
            let registry = registry.clone();
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                registry.get_or_create("C", InstanceConfig::default()).await
            })
        })
        .collect();

    let mut storages = Vec::with_capacity(TASKS);
    for handle in handles {
        storages.push(handle.await.unwrap());
    }

    assert!(storages.iter().all(|s| s.ptr_eq(&storages[0])));
    assert_eq!(store.reads.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_async_writes_all_persist() {
    const TASKS: usize = 10;

    let store = CountingStore::default();
    let registry = AsyncRegistry::new(store.clone());

    let handles: Vec<_> = (0..TASKS)
        .map(|i| {
            let registry = registry.clone();
            tokio::spawn(async move {
                let s = registry
                    .get_or_create(&format!("instance-{i}"), InstanceConfig::default())
                    .await;
                s.set_item("n", &i, None).await.unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(store.writes.load(Ordering::SeqCst), TASKS);
    let raw = BackingStore::get_item(&store.inner, DEFAULT_STORAGE_KEY)
        .unwrap()
        .unwrap();
    let blob: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(blob.as_array().map(Vec::len), Some(TASKS));
}

#[test]
fn test_observer_writes_to_another_instance() {
    let store = MemoryStore::new();
    let registry = Registry::new(store.clone());
    let source = registry.get_or_create("source", InstanceConfig::default());
    let audit = registry.get_or_create("audit", InstanceConfig::default());

    let counter = Arc::new(AtomicUsize::new(0));
    {
        let audit = audit.clone();
        let counter = Arc::clone(&counter);
        source.subscribe(move |event: &StoreEvent| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            audit
                .set_item(&format!("{n:03}"), &event.to_string(), None)
                .unwrap();
        });
    }

    source.set_item("a", &1, None).unwrap();
    source.remove_item("a").unwrap();
    source.clear().unwrap();

    assert_eq!(
        audit
            .keys()
            .iter()
            .map(|k| audit.get_item::<String>(k).unwrap().unwrap())
            .collect::<Vec<_>>(),
        vec!["SET a", "REMOVE a", "CLEAR"]
    );

    registry.reset();
    let restored = registry.get_or_create("audit", InstanceConfig::default());
    assert_eq!(restored.len(), 3);
}
