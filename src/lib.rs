//! TTL-aware, observable key-value storage instances persisted through a
//! pluggable backing store.
//!
//! A [`Registry`] manages named storage instances. Each instance holds JSON
//! values with optional per-item lifetimes and can itself expire as a whole.
//! Every mutation rewrites the complete registry as one JSON document under a
//! single key of the backing store, and the next process restores it from
//! there on first access.
//!
//! ```
//! use persistor::{Duration, InstanceConfig, Registry, StoreEvent};
//! use persistor::backend::MemoryStore;
//!
//! # fn main() -> persistor::Result<()> {
//! let store = MemoryStore::new();
//! let registry = Registry::new(store.clone());
//!
//! let cache = registry.get_or_create("cache", InstanceConfig::expiring_in(Duration::DAY));
//! cache.subscribe(|event: &StoreEvent| println!("{event}"));
//! cache.set_item("greeting", "hello", Some(Duration::minutes(5.0)))?;
//!
//! // A registry over the same store picks the data back up.
//! let restarted = Registry::new(store);
//! let cache = restarted.get_or_create("cache", InstanceConfig::default());
//! assert_eq!(cache.get_item::<String>("greeting")?.as_deref(), Some("hello"));
//! # Ok(())
//! # }
//! ```
//!
//! Async stores go through [`AsyncRegistry`]; synchronous stores can be
//! lifted onto tokio's blocking pool with [`backend::Blocking`].

pub mod backend;
pub mod clock;
pub mod config;
mod duration;
mod error;
pub mod event;
mod instance;
pub mod item;
pub mod registry;
pub mod snapshot;

pub use clock::{Clock, ManualClock, SystemClock};
pub use duration::Duration;
pub use error::{Error, Result};
pub use event::{StoreEvent, Subscription};
pub use instance::InstanceConfig;
pub use item::StoreItem;
pub use registry::{
    AsyncRegistry, AsyncStorage, DEFAULT_STORAGE_KEY, Registry, RegistryOptions, Storage,
};
