//! The persisted registry format.
//!
//! The whole registry is stored as one JSON array under a single backing
//! store key:
//!
//! ```text
//! [ { "key": "<instance name>", "item": {
//!       "expireIn": "<date>" | absent,
//!       "config": { "expireIn": { "minutes": 5.0 } },
//!       "items": [ { "key": "<entry key>",
//!                    "value": { "value": <json>, "expireIn": "<date>" | absent } } ]
//! } } ]
//! ```
//!
//! Dates use [`format_date`](crate::item::format_date).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::instance::{Instance, InstanceConfig, SharedInstance};
use crate::item::{StoreItem, StoreItemJson, format_date, parse_date};

/// Live instances of one registry, keyed and ordered by name.
pub(crate) type Instances = BTreeMap<String, SharedInstance>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntryJson {
    pub key: String,
    pub item: InstanceJson,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceJson {
    #[serde(rename = "expireIn", default, skip_serializing_if = "Option::is_none")]
    pub expire_in: Option<String>,
    #[serde(default)]
    pub config: InstanceConfig,
    #[serde(default)]
    pub items: Vec<EntryJson>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryJson {
    pub key: String,
    pub value: StoreItemJson,
}

fn instance_to_json(instance: &Instance, now: DateTime<Utc>) -> InstanceJson {
    let mut items: Vec<EntryJson> = instance
        .entries()
        .filter_map(|(key, item)| {
            item.to_json_at(now).map(|value| EntryJson {
                key: key.clone(),
                value,
            })
        })
        .collect();
    items.sort_by(|a, b| a.key.cmp(&b.key));

    InstanceJson {
        expire_in: instance.expire_at().map(format_date),
        config: instance.config(),
        items,
    }
}

fn instance_from_json(name: &str, json: InstanceJson, clock: &Arc<dyn Clock>) -> Result<Instance> {
    let expire_at = json.expire_in.as_deref().map(parse_date).transpose()?;

    let mut entries = HashMap::with_capacity(json.items.len());
    for EntryJson { key, value } in json.items {
        match StoreItem::from_json(value) {
            Ok(item) => {
                entries.insert(key, item);
            },
            Err(e) => warn!(instance = name, key = %key, error = %e, "dropping unreadable entry"),
        }
    }

    Ok(Instance::restored(
        name,
        json.config,
        expire_at,
        entries,
        Arc::clone(clock),
    ))
}

/// Serializes every instance that is still alive at its own clock's now.
///
/// Callers prune expired instances first; this only filters expired items.
pub(crate) fn encode(instances: &Instances) -> Result<String> {
    let entries: Vec<RegistryEntryJson> = instances
        .iter()
        .map(|(name, shared)| {
            let instance = shared.lock();
            let now = instance.now();
            RegistryEntryJson {
                key: name.clone(),
                item: instance_to_json(&instance, now),
            }
        })
        .collect();

    Ok(serde_json::to_string(&entries)?)
}

/// Parses a stored blob into instances.
///
/// An instance with an unreadable expiration is dropped; the rest are kept.
///
/// # Errors
///
/// - [`Error::StructureNonExistent`] if `raw` is `None`
/// - [`Error::StructureInvalid`] if `raw` is not a registry array
pub(crate) fn decode(raw: Option<&str>, clock: &Arc<dyn Clock>) -> Result<Instances> {
    let raw = raw.ok_or(Error::StructureNonExistent)?;
    let entries: Vec<RegistryEntryJson> =
        serde_json::from_str(raw).map_err(Error::structure_invalid)?;

    let mut instances = Instances::new();
    for RegistryEntryJson { key, item } in entries {
        match instance_from_json(&key, item, clock) {
            Ok(instance) => {
                instances.insert(key, SharedInstance::new(instance));
            },
            Err(e) => warn!(instance = %key, error = %e, "dropping unreadable instance"),
        }
    }
    Ok(instances)
}

/// Turns the outcome of reading the registry key into a usable registry.
///
/// Never fails: a missing blob, a read error or a malformed blob all yield
/// an empty registry, with a log line saying which.
pub(crate) fn restore(
    read: anyhow::Result<Option<String>>,
    storage_key: &str,
    clock: &Arc<dyn Clock>,
) -> Instances {
    let raw = match read {
        Ok(raw) => raw,
        Err(e) => {
            warn!(storage_key, error = %format!("{e:#}"), "failed to read registry, starting empty");
            return Instances::new();
        },
    };

    match decode(raw.as_deref(), clock) {
        Ok(instances) => {
            debug!(storage_key, count = instances.len(), "registry restored");
            instances
        },
        Err(Error::StructureNonExistent) => {
            debug!(storage_key, "no registry stored yet");
            Instances::new()
        },
        Err(e) => {
            warn!(storage_key, error = %e, "stored registry is unreadable, starting empty");
            Instances::new()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::duration::Duration;
    use chrono::TimeZone;
    use serde_json::json;

    fn clock() -> (ManualClock, Arc<dyn Clock>) {
        let manual = ManualClock::new(Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap());
        let shared: Arc<dyn Clock> = Arc::new(manual.clone());
        (manual, shared)
    }

    fn one_instance(clock: &Arc<dyn Clock>) -> Instances {
        let shared = SharedInstance::new(Instance::new(
            "A",
            InstanceConfig::expiring_in(Duration::HOUR),
            Arc::clone(clock),
        ));
        shared.set_value("k", json!("v"), None);
        shared.set_value("n", json!(42), Some(Duration::MINUTE));
        let mut instances = Instances::new();
        instances.insert("A".to_string(), shared);
        instances
    }

    #[test]
    fn test_encode_shape() {
        let (_, clock) = clock();
        let blob = encode(&one_instance(&clock)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&blob).unwrap();

        assert_eq!(
            value,
            json!([{
                "key": "A",
                "item": {
                    "expireIn": "2026-10-19T13:00:00.000Z",
                    "config": { "expireIn": { "hours": 1.0 } },
                    "items": [
                        { "key": "k", "value": { "value": "v" } },
                        { "key": "n", "value": { "value": 42, "expireIn": "2026-10-19T12:01:00.000Z" } }
                    ]
                }
            }])
        );
    }

    #[test]
    fn test_round_trip() {
        let (_, clock) = clock();
        let blob = encode(&one_instance(&clock)).unwrap();
        let restored = decode(Some(&blob), &clock).unwrap();

        assert_eq!(encode(&restored).unwrap(), blob);
        let a = &restored["A"];
        assert_eq!(a.get_value("k").0, Some(json!("v")));
        assert_eq!(a.config(), InstanceConfig::expiring_in(Duration::HOUR));
    }

    #[test]
    fn test_expired_items_are_left_out() {
        let (manual, clock) = clock();
        let instances = one_instance(&clock);
        manual.advance(Duration::minutes(2.0));

        let blob = encode(&instances).unwrap();
        let restored = decode(Some(&blob), &clock).unwrap();
        assert_eq!(restored["A"].keys(), vec!["k"]);
    }

    #[test]
    fn test_missing_and_invalid_structures() {
        let (_, clock) = clock();

        assert!(matches!(decode(None, &clock), Err(Error::StructureNonExistent)));
        for raw in ["", "null", "{}", "[1]", r#"[{"key": "A"}]"#, "not json"] {
            assert!(
                matches!(decode(Some(raw), &clock), Err(Error::StructureInvalid { .. })),
                "{raw:?} should be invalid"
            );
        }
    }

    #[test]
    fn test_bad_instance_date_drops_only_that_instance() {
        let (_, clock) = clock();
        let raw = json!([
            { "key": "bad", "item": { "expireIn": "soon", "items": [] } },
            { "key": "good", "item": { "items": [ { "key": "k", "value": { "value": 1 } } ] } }
        ])
        .to_string();

        let restored = decode(Some(&raw), &clock).unwrap();
        assert!(!restored.contains_key("bad"));
        assert_eq!(restored["good"].len(), 1);
    }

    #[test]
    fn test_bad_item_date_drops_only_that_item() {
        let (_, clock) = clock();
        let raw = json!([{ "key": "A", "item": { "items": [
            { "key": "bad", "value": { "value": 1, "expireIn": "31/12/2026" } },
            { "key": "good", "value": { "value": 2 } }
        ] } }])
        .to_string();

        let restored = decode(Some(&raw), &clock).unwrap();
        assert_eq!(restored["A"].keys(), vec!["good"]);
    }

    #[test]
    fn test_restore_never_fails() {
        let (_, clock) = clock();

        assert!(restore(Ok(None), "k", &clock).is_empty());
        assert!(restore(Ok(Some("garbage".into())), "k", &clock).is_empty());
        assert!(restore(Err(anyhow::anyhow!("disk on fire")), "k", &clock).is_empty());
    }
}
