//! Rotation usage: when each special rotation product was last used.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies a rotation rule whose usage is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RotationKey {
    #[serde(rename = "AM_SPECIAL", alias = "am_vitc")]
    AmSpecial,
    #[serde(rename = "PM_SPECIAL", alias = "pm_high_niacin")]
    PmSpecial,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationUsage {
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Keyed store of rotation usage. Mutated only by the completion recorder.
pub trait RotationUsageStore {
    fn last_used_at(&self, key: RotationKey) -> Option<DateTime<Utc>>;
    fn mark_used(&mut self, key: RotationKey, at: DateTime<Utc>);
}

/// In-memory usage map; serializes as `{"AM_SPECIAL": {"lastUsedAt": ...}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RotationUsageBook {
    records: BTreeMap<RotationKey, RotationUsage>,
}

impl RotationUsageBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure a (possibly empty) record exists for `key`.
    pub fn ensure(&mut self, key: RotationKey) {
        self.records.entry(key).or_default();
    }

    pub fn get(&self, key: RotationKey) -> Option<&RotationUsage> {
        self.records.get(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RotationKey, &RotationUsage)> {
        self.records.iter()
    }
}

impl RotationUsageStore for RotationUsageBook {
    fn last_used_at(&self, key: RotationKey) -> Option<DateTime<Utc>> {
        self.records.get(&key).and_then(|r| r.last_used_at)
    }

    fn mark_used(&mut self, key: RotationKey, at: DateTime<Utc>) {
        self.records.entry(key).or_default().last_used_at = Some(at);
    }
}
