//! A single stored value and its expiration.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Formats an instant the way every `expireIn` field is written.
///
/// RFC 3339, UTC, exactly three fractional digits: milliseconds round-trip,
/// anything finer is truncated.
pub fn format_date(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Layout [`format_date`] falls back to for years past 9999 (`+10022-...`).
const EXTENDED_YEAR_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

/// Parses an `expireIn` field written by [`format_date`].
///
/// Any RFC 3339 offset is accepted and normalized to UTC. UTC instants with
/// a signed year beyond four digits are accepted too.
///
/// # Errors
///
/// Returns [`Error::DateInvalid`] if `value` is not a timestamp in either form.
pub fn parse_date(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Ok(instant.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, EXTENDED_YEAR_FORMAT)
        .map(|instant| instant.and_utc())
        .map_err(|_| Error::date_invalid(value))
}

/// Serialized form of a [`StoreItem`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreItemJson {
    pub value: Value,
    #[serde(rename = "expireIn", default, skip_serializing_if = "Option::is_none")]
    pub expire_in: Option<String>,
}

/// One value plus an optional absolute expiration instant.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreItem {
    value: Value,
    expire_at: Option<DateTime<Utc>>,
}

impl StoreItem {
    pub fn new(value: Value, expire_at: Option<DateTime<Utc>>) -> Self {
        Self { value, expire_at }
    }

    pub fn expire_at(&self) -> Option<DateTime<Utc>> {
        self.expire_at
    }

    /// Whether the item expired strictly before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expire_at.is_some_and(|expire_at| expire_at < now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// The stored value, or `None` once the item has expired.
    pub fn value_at(&self, now: DateTime<Utc>) -> Option<&Value> {
        if self.is_expired_at(now) {
            None
        } else {
            Some(&self.value)
        }
    }

    pub fn value(&self) -> Option<&Value> {
        self.value_at(Utc::now())
    }

    /// Rebuilds an item from its serialized form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DateInvalid`] if `expireIn` is present but malformed.
    pub fn from_json(json: StoreItemJson) -> Result<Self> {
        let expire_at = json.expire_in.as_deref().map(parse_date).transpose()?;
        Ok(Self::new(json.value, expire_at))
    }

    /// Parses an item from raw JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StructureInvalid`] if the text is not a
    /// `{value, expireIn}` object and [`Error::DateInvalid`] if the date is
    /// malformed.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let json: StoreItemJson = serde_json::from_str(text).map_err(Error::structure_invalid)?;
        Self::from_json(json)
    }

    /// Serialized form, or `None` if the item is expired at `now`.
    pub fn to_json_at(&self, now: DateTime<Utc>) -> Option<StoreItemJson> {
        let value = self.value_at(now)?.clone();
        Some(StoreItemJson {
            value,
            expire_in: self.expire_at.map(format_date),
        })
    }

    pub fn to_json(&self) -> Option<StoreItemJson> {
        self.to_json_at(Utc::now())
    }
}
