//! Condition state: boolean flags describing the user's current skin/energy state.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A condition key as referenced by step templates and rule block lists.
///
/// Unknown keys are kept as [`ConditionKey::Custom`] and evaluate to `false`
/// unless a custom flag of that name is set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConditionKey {
    Sensitive,
    Irritated,
    Dry,
    Trouble,
    NeedExtraHydration,
    LazyMode,
    /// Derived: `dry || sensitive || irritated`. Never stored.
    SkinIsDryOrSensitive,
    Custom(String),
}

impl ConditionKey {
    pub fn as_str(&self) -> &str {
        match self {
            ConditionKey::Sensitive => "sensitive",
            ConditionKey::Irritated => "irritated",
            ConditionKey::Dry => "dry",
            ConditionKey::Trouble => "trouble",
            ConditionKey::NeedExtraHydration => "need_extra_hydration",
            ConditionKey::LazyMode => "lazy_mode",
            ConditionKey::SkinIsDryOrSensitive => "skin_is_dry_or_sensitive",
            ConditionKey::Custom(name) => name,
        }
    }

    pub fn is_derived(&self) -> bool {
        matches!(self, ConditionKey::SkinIsDryOrSensitive)
    }
}

impl From<&str> for ConditionKey {
    fn from(value: &str) -> Self {
        match value {
            "sensitive" => ConditionKey::Sensitive,
            "irritated" => ConditionKey::Irritated,
            "dry" => ConditionKey::Dry,
            "trouble" => ConditionKey::Trouble,
            "need_extra_hydration" => ConditionKey::NeedExtraHydration,
            "lazy_mode" => ConditionKey::LazyMode,
            "skin_is_dry_or_sensitive" => ConditionKey::SkinIsDryOrSensitive,
            other => ConditionKey::Custom(other.to_string()),
        }
    }
}

impl From<String> for ConditionKey {
    fn from(value: String) -> Self {
        ConditionKey::from(value.as_str())
    }
}

impl From<ConditionKey> for String {
    fn from(key: ConditionKey) -> Self {
        key.as_str().to_string()
    }
}

impl fmt::Display for ConditionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current condition flags.
///
/// Deserializing rejects the derived key, so it can never be stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredConditions")]
pub struct ConditionState {
    pub sensitive: bool,
    pub irritated: bool,
    pub dry: bool,
    pub trouble: bool,
    pub need_extra_hydration: bool,
    pub lazy_mode: bool,

    /// Additional flags looked up by name.
    #[serde(flatten)]
    pub custom: BTreeMap<String, bool>,
}

impl ConditionState {
    pub fn is_set(&self, key: &ConditionKey) -> bool {
        match key {
            ConditionKey::Sensitive => self.sensitive,
            ConditionKey::Irritated => self.irritated,
            ConditionKey::Dry => self.dry,
            ConditionKey::Trouble => self.trouble,
            ConditionKey::NeedExtraHydration => self.need_extra_hydration,
            ConditionKey::LazyMode => self.lazy_mode,
            ConditionKey::SkinIsDryOrSensitive => self.dry || self.sensitive || self.irritated,
            ConditionKey::Custom(name) => self.custom.get(name).copied().unwrap_or(false),
        }
    }

    /// True if any of `keys` is set.
    pub fn any<'a>(&self, keys: impl IntoIterator<Item = &'a ConditionKey>) -> bool {
        keys.into_iter().any(|k| self.is_set(k))
    }

    /// Set a stored flag. Returns `false` (and changes nothing) for derived keys.
    pub fn set(&mut self, key: &ConditionKey, value: bool) -> bool {
        match key {
            ConditionKey::Sensitive => self.sensitive = value,
            ConditionKey::Irritated => self.irritated = value,
            ConditionKey::Dry => self.dry = value,
            ConditionKey::Trouble => self.trouble = value,
            ConditionKey::NeedExtraHydration => self.need_extra_hydration = value,
            ConditionKey::LazyMode => self.lazy_mode = value,
            ConditionKey::SkinIsDryOrSensitive => return false,
            ConditionKey::Custom(name) => {
                self.custom.insert(name.clone(), value);
            }
        }
        true
    }
}

#[derive(Deserialize)]
struct StoredConditions {
    #[serde(default)]
    sensitive: bool,
    #[serde(default)]
    irritated: bool,
    #[serde(default)]
    dry: bool,
    #[serde(default)]
    trouble: bool,
    #[serde(default)]
    need_extra_hydration: bool,
    #[serde(default)]
    lazy_mode: bool,
    #[serde(flatten)]
    custom: BTreeMap<String, bool>,
}

impl TryFrom<StoredConditions> for ConditionState {
    type Error = String;

    fn try_from(stored: StoredConditions) -> Result<Self, Self::Error> {
        if let Some(key) = stored
            .custom
            .keys()
            .find(|k| ConditionKey::from(k.as_str()).is_derived())
        {
            return Err(format!("condition '{key}' is derived and cannot be stored"));
        }
        Ok(Self {
            sensitive: stored.sensitive,
            irritated: stored.irritated,
            dry: stored.dry,
            trouble: stored.trouble,
            need_extra_hydration: stored.need_extra_hydration,
            lazy_mode: stored.lazy_mode,
            custom: stored.custom,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn composite_key_is_or_of_dry_sensitive_irritated() {
        let mut c = ConditionState::default();
        assert!(!c.is_set(&ConditionKey::SkinIsDryOrSensitive));
        c.irritated = true;
        assert!(c.is_set(&ConditionKey::SkinIsDryOrSensitive));
        assert!(!c.set(&ConditionKey::SkinIsDryOrSensitive, false));
        assert!(c.is_set(&ConditionKey::SkinIsDryOrSensitive));
    }

    #[test]
    fn unknown_key_is_false_until_set() {
        let mut c = ConditionState::default();
        let key = ConditionKey::from("post_workout");
        assert_eq!(key, ConditionKey::Custom("post_workout".to_string()));
        assert!(!c.is_set(&key));
        c.set(&key, true);
        assert!(c.is_set(&key));
    }

    #[test]
    fn extra_json_keys_become_custom_flags() {
        let c: ConditionState = serde_json::from_value(json!({
            "dry": true,
            "lazy_mode": false,
            "travelling": true
        }))
        .unwrap();
        assert!(c.dry);
        assert!(c.is_set(&ConditionKey::from("travelling")));
        assert_eq!(c.custom.len(), 1);
    }

    #[test]
    fn derived_key_is_rejected_on_load() {
        let err = serde_json::from_value::<ConditionState>(json!({
            "dry": false,
            "skin_is_dry_or_sensitive": true
        }))
        .unwrap_err();
        assert!(err.to_string().contains("skin_is_dry_or_sensitive"));
    }
}
