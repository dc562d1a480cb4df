//! End-to-end persistence tests against the durable stores.
//!
//! Each test writes through one registry, drops it, and restores a new one
//! from the same file or database, the way a restarted process would.
//!
//! Run with:
//! ```bash
//! cargo test --test persistence_tests
//! ```

use chrono::{TimeZone, Utc};
use persistor::backend::{BackingStore, Blocking, FileStore, RedbStore};
use persistor::{
    AsyncRegistry, DEFAULT_STORAGE_KEY, Duration, InstanceConfig, ManualClock, Registry,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Profile {
    name: String,
    visits: u32,
    tags: Vec<String>,
}

fn profile() -> Profile {
    Profile {
        name: "ada".to_string(),
        visits: 3,
        tags: vec!["admin".to_string()],
    }
}

#[test]
fn test_file_store_survives_restart() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("store.json");

    {
        let registry = Registry::new(FileStore::open(&path).unwrap());
        let users = registry.get_or_create("users", InstanceConfig::default());
        users.set_item("ada", &profile(), None).unwrap();
        users.set_item("k", "v", Some(Duration::ZERO)).unwrap();
    }

    let registry = Registry::new(FileStore::open(&path).unwrap());
    let users = registry.get_or_create("users", InstanceConfig::default());
    assert_eq!(users.get_item::<Profile>("ada").unwrap(), Some(profile()));
    assert_eq!(users.get_item::<String>("k").unwrap().as_deref(), Some("v"));
    assert_eq!(users.keys(), vec!["ada", "k"]);
}

#[test]
fn test_redb_store_survives_restart() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("store.redb");

    {
        let registry = Registry::new(RedbStore::open(&path).unwrap());
        let s = registry.get_or_create("A", InstanceConfig::expiring_in(Duration::DAY));
        s.set_item("k", &json!({"nested": [1, 2, 3]}), None).unwrap();
    }

    let registry = Registry::new(RedbStore::open(&path).unwrap());
    assert_eq!(registry.names(), vec!["A"]);
    let s = registry.get_or_create("A", InstanceConfig::default());
    assert_eq!(s.get_value("k").unwrap(), Some(json!({"nested": [1, 2, 3]})));
    assert_eq!(s.config(), InstanceConfig::expiring_in(Duration::DAY));
}

#[test]
fn test_item_expiry_carries_across_restart() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("store.json");
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());

    {
        let registry = Registry::builder(FileStore::open(&path).unwrap())
            .clock(Arc::new(clock.clone()))
            .build();
        let s = registry.get_or_create("B", InstanceConfig::default());
        s.set_item("short", &1, Some(Duration::MINUTE)).unwrap();
        s.set_item("long", &2, Some(Duration::HOUR)).unwrap();
    }

    clock.advance(Duration::minutes(30.0));
    let registry = Registry::builder(FileStore::open(&path).unwrap())
        .clock(Arc::new(clock.clone()))
        .build();
    let s = registry.get_or_create("B", InstanceConfig::default());

    // Restored, but still subject to its original deadline
    assert_eq!(s.len(), 2);
    assert_eq!(s.get_item::<i32>("short").unwrap(), None);
    assert_eq!(s.get_item::<i32>("long").unwrap(), Some(2));
    assert_eq!(s.len(), 1);
}

#[test]
fn test_expired_instance_is_not_restored_after_next_write() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("store.redb");
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());

    {
        let registry = Registry::builder(RedbStore::open(&path).unwrap())
            .clock(Arc::new(clock.clone()))
            .build();
        registry
            .get_or_create("session", InstanceConfig::expiring_in(Duration::minutes(5.0)))
            .set_item("user", "ada", None)
            .unwrap();
        registry
            .get_or_create("prefs", InstanceConfig::default())
            .set_item("theme", "dark", None)
            .unwrap();
    }

    clock.advance(Duration::minutes(10.0));
    {
        let registry = Registry::builder(RedbStore::open(&path).unwrap())
            .clock(Arc::new(clock.clone()))
            .build();
        assert_eq!(registry.names(), vec!["prefs"]);
        registry
            .get_or_create("prefs", InstanceConfig::default())
            .set_item("theme", "light", None)
            .unwrap();
    }

    let store = RedbStore::open(&path).unwrap();
    let raw = store.get_item(DEFAULT_STORAGE_KEY).unwrap().unwrap();
    assert!(!raw.contains("session"));
    assert!(raw.contains("light"));
}

#[test]
fn test_corrupted_blob_starts_over() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("store.json");
    {
        let store = FileStore::open(&path).unwrap();
        store.set_item(DEFAULT_STORAGE_KEY, "[{\"key\": 1}]").unwrap();
        store.set_item("unrelated", "kept").unwrap();
    }

    let store = FileStore::open(&path).unwrap();
    let registry = Registry::new(store.clone());
    assert!(registry.is_empty());

    registry
        .get_or_create("fresh", InstanceConfig::default())
        .set_item("k", &true, None)
        .unwrap();
    assert_eq!(store.get_item("unrelated").unwrap().as_deref(), Some("kept"));
    assert!(
        store
            .get_item(DEFAULT_STORAGE_KEY)
            .unwrap()
            .unwrap()
            .contains("fresh")
    );
}

#[tokio::test]
async fn test_async_registry_over_blocking_redb() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("store.redb");

    {
        let registry = AsyncRegistry::new(Blocking::new(RedbStore::open(&path).unwrap()));
        let cart = registry.get_or_create("cart", InstanceConfig::default()).await;
        cart.set_item("items", &vec!["apple", "pear"], None)
            .await
            .unwrap();
        cart.set_item("total", &12.5, None).await.unwrap();
        cart.remove_item("total").await.unwrap();
    }

    // The sync flavor reads what the async flavor wrote
    let registry = Registry::new(RedbStore::open(&path).unwrap());
    let cart = registry.get_or_create("cart", InstanceConfig::default());
    assert_eq!(
        cart.get_item::<Vec<String>>("items").unwrap(),
        Some(vec!["apple".to_string(), "pear".to_string()])
    );
    assert!(!cart.contains_key("total"));
}
