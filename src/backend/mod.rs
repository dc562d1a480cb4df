//! Backing store contract and reference implementations.
//!
//! A backing store is a flat string-to-string map, the same shape as a
//! browser's `localStorage`. The registry only ever touches one key of it,
//! but the whole contract is exposed so stores can be inspected and shared.
//!
//! - [`BackingStore`]: synchronous stores, used by [`Registry`](crate::Registry)
//! - [`AsyncBackingStore`]: async stores, used by [`AsyncRegistry`](crate::AsyncRegistry)
//! - [`Blocking`]: runs a synchronous store on tokio's blocking pool so it
//!   can back an `AsyncRegistry`
//!
//! Implementations:
//!
//! - [`MemoryStore`]: in-process map, ideal for tests and embedding
//! - [`FileStore`]: one JSON file rewritten on every mutation
//! - [`RedbStore`]: redb table with ACID commits
//!
//! # Custom Stores
//!
//! ```ignore
//! use persistor::backend::BackingStore;
//!
//! struct RedisStore { /* ... */ }
//! impl BackingStore for RedisStore { /* ... */ }
//!
//! let registry = persistor::Registry::new(RedisStore::connect("redis://localhost")?);
//! ```

mod blocking;
mod file;
mod memory;
mod redb;

pub use blocking::Blocking;
pub use file::FileStore;
pub use memory::MemoryStore;
pub use redb::RedbStore;

use anyhow::Result;
use async_trait::async_trait;

/// Synchronous backing store.
///
/// All stores must be thread-safe (`Send + Sync`); the registry may be
/// shared across threads.
pub trait BackingStore: Send + Sync + 'static {
    /// Number of stored keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be read.
    fn len(&self) -> Result<usize>;

    /// Returns true if nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be read.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Key at `index` in the store's enumeration order, if any.
    ///
    /// The order is stable while the store is not mutated.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be read.
    fn key(&self, index: usize) -> Result<Option<String>>;

    /// Retrieves a value by key. `Ok(None)` if the key doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be read.
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Stores a value, overwriting any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Removes a key. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn remove_item(&self, key: &str) -> Result<()>;

    /// Removes every key.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn clear(&self) -> Result<()>;
}

/// Async backing store.
///
/// Same contract as [`BackingStore`]; every call may suspend.
#[async_trait]
pub trait AsyncBackingStore: Send + Sync + 'static {
    /// Number of stored keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be read.
    async fn len(&self) -> Result<usize>;

    /// Key at `index` in the store's enumeration order, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be read.
    async fn key(&self, index: usize) -> Result<Option<String>>;

    /// Retrieves a value by key. `Ok(None)` if the key doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be read.
    async fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Stores a value, overwriting any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Removes a key. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn remove_item(&self, key: &str) -> Result<()>;

    /// Removes every key.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn clear(&self) -> Result<()>;
}
