//! The settings store: current values, validation and change detection.
//!
//! The store is owned by the dispatch task and mutated only there.  It does
//! not deliver notifications itself; every successful write that changes a
//! value returns a [`SettingChange`] which the dispatcher publishes to
//! subscribers after the current event has settled.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::schema::{KeyRole, Schema};
use super::value::{SettingKind, SettingValue};

// ---------------------------------------------------------------------------
// SettingsError
// ---------------------------------------------------------------------------

/// Validation failures.  The setting is left unchanged in every case.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("unknown setting key {0:?}")]
    UnknownKey(String),

    #[error("setting {key:?} expects a {expected} value, got {found}")]
    WrongType {
        key: String,
        expected: SettingKind,
        found: SettingKind,
    },

    #[error("invalid value {value:?} for {key:?} (allowed: {allowed})")]
    InvalidValue {
        key: String,
        value: String,
        allowed: String,
    },

    /// Derived keys are computed from primary keys and cannot be written.
    #[error("setting {0:?} is derived and cannot be set directly")]
    DerivedKey(String),

    /// A required key was absent from the initial snapshot.
    #[error("initial snapshot is missing required setting {0:?}")]
    MissingKey(String),
}

// ---------------------------------------------------------------------------
// SettingsSnapshot
// ---------------------------------------------------------------------------

/// Immutable key → value mapping at a point in time.
///
/// Serialises as a flat table, so the persistence collaborator can write it
/// straight to TOML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettingsSnapshot {
    values: BTreeMap<String, SettingValue>,
}

impl SettingsSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy of this snapshot with `key` set to `value`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<SettingValue>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&SettingValue> {
        self.values.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SettingValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<SettingValue>> FromIterator<(K, V)> for SettingsSnapshot {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// SettingChange
// ---------------------------------------------------------------------------

/// One observed change of a stored value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingChange {
    pub key: String,
    pub old: SettingValue,
    pub new: SettingValue,
}

// ---------------------------------------------------------------------------
// SettingsStore
// ---------------------------------------------------------------------------

/// Typed key/value store backed by a [`Schema`].
#[derive(Debug)]
pub struct SettingsStore {
    schema: Arc<Schema>,
    values: BTreeMap<String, SettingValue>,
}

impl SettingsStore {
    /// Build the store from the snapshot supplied by the persistence loader.
    ///
    /// Every entry must be a known key with a valid value, and every
    /// `required` key must be present.  Derived entries are accepted as-is;
    /// the derivation engine overwrites them on the first settle.
    pub fn from_snapshot(
        schema: Arc<Schema>,
        snapshot: &SettingsSnapshot,
    ) -> Result<Self, SettingsError> {
        let mut values = BTreeMap::new();
        for (key, value) in snapshot.iter() {
            schema.validate(key, value)?;
            values.insert(key.to_string(), value.clone());
        }
        if let Some(missing) = schema
            .specs()
            .find(|spec| spec.required && !values.contains_key(spec.key))
        {
            return Err(SettingsError::MissingKey(missing.key.to_string()));
        }
        log::debug!("settings: store loaded with {} entries", values.len());
        Ok(Self { schema, values })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Current value of `key`, or its schema default when not stored.
    pub fn get(&self, key: &str) -> Result<SettingValue, SettingsError> {
        let spec = self.schema.require(key)?;
        Ok(self
            .values
            .get(key)
            .cloned()
            .unwrap_or_else(|| spec.default.clone()))
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).ok().and_then(|v| v.as_bool())
    }

    /// Write `value` to a primary or plain key.
    ///
    /// Returns `Ok(None)` when the stored value already equals `value`, so
    /// repeated writes produce no change events.
    pub fn set(
        &mut self,
        key: &str,
        value: SettingValue,
    ) -> Result<Option<SettingChange>, SettingsError> {
        self.schema.validate_external(key, &value)?;
        Ok(self.write(key, value))
    }

    /// Write a derived key.  Only the derivation engine calls this.
    pub(crate) fn write_derived(
        &mut self,
        key: &str,
        value: SettingValue,
    ) -> Result<Option<SettingChange>, SettingsError> {
        let spec = self.schema.validate(key, &value)?;
        if spec.role != KeyRole::Derived {
            log::warn!("settings: derived write to non-derived key {key:?}");
        }
        Ok(self.write(key, value))
    }

    fn write(&mut self, key: &str, value: SettingValue) -> Option<SettingChange> {
        let old = self.get(key).ok()?;
        let stored = self.values.contains_key(key);
        if stored && old == value {
            return None;
        }
        self.values.insert(key.to_string(), value.clone());
        if old == value {
            // First explicit write of a value equal to its default.
            return None;
        }
        log::debug!("settings: {key} = {value} (was {old})");
        Some(SettingChange {
            key: key.to_string(),
            old,
            new: value,
        })
    }

    /// Every schema key with its current (or default) value.
    pub fn snapshot(&self) -> SettingsSnapshot {
        self.schema
            .specs()
            .map(|spec| {
                let value = self
                    .values
                    .get(spec.key)
                    .cloned()
                    .unwrap_or_else(|| spec.default.clone());
                (spec.key, value)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
