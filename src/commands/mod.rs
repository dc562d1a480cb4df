//! CLI command implementations for persistor.
//!
//! Every command opens the configured store, wraps it in an
//! [`AsyncRegistry`] and works on one instance of it:
//!
//! - `persistor get|set|remove <instance> <key>` - single entries
//! - `persistor clear|keys <instance>` - whole instances
//! - `persistor list` - every live instance
//! - `persistor dump` - the persisted registry document

mod store;

use store::ConfiguredStore;

use anyhow::{Context, Result};
use persistor::backend::Blocking;
use persistor::config::Settings;
use persistor::{AsyncRegistry, AsyncStorage, Duration, InstanceConfig};
use serde_json::Value;

use crate::Command;

type CliRegistry = AsyncRegistry<Blocking<ConfiguredStore>>;

/// Parses a command-line value as JSON, falling back to a plain string.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn seconds(secs: Option<f64>) -> Option<Duration> {
    secs.map(Duration::seconds)
}

/// Returns an existing live instance, or an error naming the missing one.
async fn existing(
    registry: &CliRegistry,
    instance: &str,
) -> Result<AsyncStorage<Blocking<ConfiguredStore>>> {
    if !registry.contains(instance).await {
        anyhow::bail!("Storage instance '{instance}' not found");
    }
    Ok(registry.get_or_create(instance, InstanceConfig::default()).await)
}

/// Execute a CLI command against the configured store.
pub async fn execute(command: Command, settings: &Settings) -> Result<()> {
    let store = ConfiguredStore::open(settings).with_context(|| {
        format!("Failed to open store at {}", settings.store_path().display())
    })?;
    let registry = AsyncRegistry::builder(Blocking::new(store))
        .storage_key(settings.storage_key.clone())
        .build();

    match command {
        Command::Get { instance, key } => {
            let storage = existing(&registry, &instance).await?;
            match storage.get_value(&key).await? {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => anyhow::bail!("Key '{key}' not found in '{instance}'"),
            }
        },
        Command::Set {
            instance,
            key,
            value,
            ttl_secs,
            instance_ttl_secs,
        } => {
            let config = InstanceConfig {
                expire_in: seconds(instance_ttl_secs),
            };
            let storage = registry.get_or_create(&instance, config).await;
            storage
                .set_value(&key, parse_value(&value), seconds(ttl_secs))
                .await?;
        },
        Command::Remove { instance, key } => {
            let storage = existing(&registry, &instance).await?;
            storage.remove_item(&key).await?;
        },
        Command::Clear { instance } => {
            let storage = existing(&registry, &instance).await?;
            let count = storage.len();
            storage.clear().await?;
            println!("Cleared {count} entries from '{instance}'");
        },
        Command::Keys { instance } => {
            let storage = existing(&registry, &instance).await?;
            for key in storage.keys() {
                println!("{key}");
            }
        },
        Command::List => {
            let names = registry.names().await;
            if names.is_empty() {
                println!("No storage instances");
                return Ok(());
            }

            println!("{:<32} {:>8}  EXPIRES", "INSTANCE", "ENTRIES");
            for name in names {
                let storage = registry.get_or_create(&name, InstanceConfig::default()).await;
                let expires = storage
                    .expire_at()
                    .map_or_else(|| "never".to_string(), persistor::item::format_date);
                println!("{name:<32} {:>8}  {expires}", storage.len());
            }
        },
        Command::Dump => {
            let snapshot: Value = serde_json::from_str(&registry.snapshot().await?)?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        },
    }

    Ok(())
}
