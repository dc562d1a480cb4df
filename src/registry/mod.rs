//! The multiton instance manager.
//!
//! A registry owns every named storage instance backed by one store. It is
//! filled lazily: the first [`get_or_create`](Registry::get_or_create) reads
//! the registry blob once and rebuilds every instance from it. After that,
//! each mutation made through a handle rewrites the whole blob under the
//! registry key.
//!
//! Two flavors share the same instance core and blob format:
//!
//! - [`Registry`] over a synchronous [`BackingStore`](crate::backend::BackingStore)
//! - [`AsyncRegistry`] over an [`AsyncBackingStore`](crate::backend::AsyncBackingStore)
//!
//! # Handles
//!
//! [`Storage`] and [`AsyncStorage`] are cheap clonable handles onto one
//! instance. A handle to an instance that was later evicted (expired,
//! removed, or dropped by [`Registry::reset`]) keeps working in memory, but
//! its changes are no longer written to the store.

mod async_registry;
mod sync;

pub use async_registry::{AsyncRegistry, AsyncRegistryBuilder, AsyncStorage};
pub use sync::{Registry, RegistryBuilder, Storage};

use std::sync::Arc;
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::error::Error;
use crate::instance::{Instance, InstanceConfig, SharedInstance};
use crate::snapshot::Instances;

/// Backing store key the registry blob lives under unless configured.
pub const DEFAULT_STORAGE_KEY: &str = "persistor:registry";

/// Settings shared by both registry flavors.
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    pub(crate) storage_key: String,
    pub(crate) clock: Arc<dyn Clock>,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            clock: Arc::new(SystemClock),
        }
    }
}

impl RegistryOptions {
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

/// Drops every instance whose whole-instance expiration has passed.
pub(crate) fn prune_expired(instances: &mut Instances) {
    instances.retain(|name, instance| {
        let expired = instance.is_expired();
        if expired {
            info!(error = %Error::storage_expired(name.as_str()), "evicting instance");
        }
        !expired
    });
}

/// Returns the live instance called `name`, replacing an expired one.
///
/// The boolean is true when a new instance was created.
pub(crate) fn live_or_create(
    instances: &mut Instances,
    name: &str,
    config: InstanceConfig,
    clock: &Arc<dyn Clock>,
) -> (SharedInstance, bool) {
    match instances.get(name) {
        Some(existing) if !existing.is_expired() => (existing.clone(), false),
        existing => {
            if existing.is_some() {
                info!(error = %Error::storage_expired(name), "recreating instance");
            }
            let created = SharedInstance::new(Instance::new(name, config, Arc::clone(clock)));
            instances.insert(name.to_string(), created.clone());
            (created, true)
        },
    }
}

/// Names of the instances that are still alive.
pub(crate) fn live_names(instances: &Instances) -> Vec<String> {
    instances
        .iter()
        .filter(|(_, instance)| !instance.is_expired())
        .map(|(name, _)| name.clone())
        .collect()
}
