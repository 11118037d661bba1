//! Rule set: AM/PM product rotation, hydration boost, lazy-mode fallbacks.
//!
//! Field names follow the persisted camelCase document. The older document
//! shape (`amSerumRotation.vitc`, `only_if_condition_not`, `toggle`, ...) is
//! accepted on input so existing rule files keep loading.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::conditions::{ConditionKey, ConditionState};
use crate::error::{ConfigurationError, Result, RoutineError};
use crate::task::Slot;
use crate::time::Season;

/// Cross-slot constraint tags on a special rule.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RotationConstraint {
    /// Do not use this special product on a day the AM special was selected.
    NotWithAmSpecial,
    Other(String),
}

impl From<String> for RotationConstraint {
    fn from(value: String) -> Self {
        match value.as_str() {
            "not_with_am_special" | "do_not_pair_with_vitc_same_day" => {
                RotationConstraint::NotWithAmSpecial
            }
            _ => RotationConstraint::Other(value),
        }
    }
}

impl From<RotationConstraint> for String {
    fn from(value: RotationConstraint) -> Self {
        match value {
            RotationConstraint::NotWithAmSpecial => "not_with_am_special".to_string(),
            RotationConstraint::Other(tag) => tag,
        }
    }
}

/// Interval-gated substitute for a rotation's default product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialRule {
    pub product_id: String,
    #[serde(alias = "interval_days")]
    pub interval_days: i64,
    /// Any of these conditions being set blocks the special product.
    #[serde(default, alias = "only_if_condition_not")]
    pub block_if: BTreeSet<ConditionKey>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub constraints: BTreeSet<RotationConstraint>,
}

impl SpecialRule {
    pub fn new(product_id: impl Into<String>, interval_days: i64) -> Self {
        Self {
            product_id: product_id.into(),
            interval_days,
            block_if: BTreeSet::new(),
            constraints: BTreeSet::new(),
        }
    }

    pub fn blocked_by<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<ConditionKey>,
    {
        self.block_if = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn not_with_am_special(mut self) -> Self {
        self.constraints.insert(RotationConstraint::NotWithAmSpecial);
        self
    }

    pub fn has_constraint(&self, constraint: &RotationConstraint) -> bool {
        self.constraints.contains(constraint)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationRule {
    pub default: String,
    #[serde(
        default,
        alias = "vitc",
        alias = "highNiacinamide",
        skip_serializing_if = "Option::is_none"
    )]
    pub special: Option<SpecialRule>,
}

impl RotationRule {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            default: default.into(),
            special: None,
        }
    }

    pub fn with_special(mut self, special: SpecialRule) -> Self {
        self.special = Some(special);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HydrationBoost {
    #[serde(default, alias = "toggle", skip_serializing_if = "Option::is_none")]
    pub toggle_condition: Option<ConditionKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    #[serde(default)]
    pub auto_seasons: BTreeSet<Season>,
}

impl HydrationBoost {
    /// The substitute product, if configured and non-empty.
    pub fn product(&self) -> Option<&str> {
        self.product_id.as_deref().filter(|p| !p.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LazyFallback {
    #[serde(default)]
    pub am: Vec<String>,
    #[serde(default)]
    pub pm: Vec<String>,
}

impl LazyFallback {
    pub fn for_slot(&self, slot: &Slot) -> &[String] {
        match slot {
            Slot::Pm => &self.pm,
            _ => &self.am,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    #[serde(default, alias = "amSerumRotation", skip_serializing_if = "Option::is_none")]
    pub am_rotation: Option<RotationRule>,
    #[serde(default, alias = "pmSerumRotation", skip_serializing_if = "Option::is_none")]
    pub pm_rotation: Option<RotationRule>,
    #[serde(default)]
    pub hydration_boost: HydrationBoost,
    #[serde(default)]
    pub lazy_fallback: LazyFallback,
}

impl RuleSet {
    /// Every product id the rules refer to, with a human-readable location.
    pub fn product_references(&self) -> Vec<(String, &str)> {
        let mut refs = Vec::new();
        for (name, rotation) in [("amRotation", &self.am_rotation), ("pmRotation", &self.pm_rotation)] {
            let Some(rotation) = rotation else { continue };
            refs.push((format!("rules.{name}.default"), rotation.default.as_str()));
            if let Some(special) = &rotation.special {
                refs.push((format!("rules.{name}.special"), special.product_id.as_str()));
            }
        }
        if let Some(product) = self.hydration_boost.product_id.as_deref() {
            refs.push(("rules.hydrationBoost.productId".to_string(), product));
        }
        for (i, product) in self.lazy_fallback.am.iter().enumerate() {
            refs.push((format!("rules.lazyFallback.am[{i}]"), product.as_str()));
        }
        for (i, product) in self.lazy_fallback.pm.iter().enumerate() {
            refs.push((format!("rules.lazyFallback.pm[{i}]"), product.as_str()));
        }
        refs
    }

    /// Check product references against a catalog lookup.
    pub fn validate(&self, product_exists: impl Fn(&str) -> bool) -> Vec<ConfigurationError> {
        self.product_references()
            .into_iter()
            .filter_map(|(location, product_id)| {
                if product_id.trim().is_empty() {
                    Some(ConfigurationError::EmptyProductId { location })
                } else if !product_exists(product_id) {
                    Some(ConfigurationError::UnknownProduct {
                        location,
                        product_id: product_id.to_string(),
                    })
                } else {
                    None
                }
            })
            .collect()
    }
}

/// Rules and conditions, queried and updated as one record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesState {
    #[serde(default)]
    pub rules: RuleSet,
    #[serde(default)]
    pub conditions: ConditionState,
}

/// Partial update for [`RulesState`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RulesPatch {
    /// Deep-merged into the current rule document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<BTreeMap<String, bool>>,
}

impl RulesState {
    /// Apply a patch. On any error the state is left unchanged.
    pub fn apply_patch(&mut self, patch: &RulesPatch) -> Result<()> {
        let rules = match &patch.rules {
            Some(update) => {
                let mut merged = serde_json::to_value(&self.rules)?;
                deep_merge(&mut merged, update);
                serde_json::from_value::<RuleSet>(merged)
                    .map_err(|e| RoutineError::malformed_patch(format!("rules no longer valid: {e}")))?
            }
            None => self.rules.clone(),
        };

        let mut conditions = self.conditions.clone();
        for (name, value) in patch.conditions.iter().flatten() {
            let key = ConditionKey::from(name.as_str());
            if !conditions.set(&key, *value) {
                return Err(RoutineError::malformed_patch(format!(
                    "condition '{key}' is derived and cannot be set"
                )));
            }
        }

        self.rules = rules;
        self.conditions = conditions;
        Ok(())
    }
}

/// Objects merge recursively; any other value replaces the target.
pub fn deep_merge(base: &mut Value, update: &Value) {
    match (base, update) {
        (Value::Object(base), Value::Object(update)) => {
            for (key, value) in update {
                match base.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(existing, value);
                    }
                    _ => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, update) => *base = update.clone(),
    }
}
