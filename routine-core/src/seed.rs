//! Seed document used to initialise an empty state directory.

use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, Product};
use crate::conditions::ConditionState;
use crate::error::Result;
use crate::rules::{RuleSet, RulesState};
use crate::status::TaskStatusBook;
use crate::task::TaskDefinition;
use crate::usage::{RotationKey, RotationUsageBook};

const BUILTIN_SEED: &str = include_str!("../data/seed.json");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedData {
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub task_definitions: Vec<TaskDefinition>,
    #[serde(default)]
    pub rules: RuleSet,
}

/// Everything a fresh state directory starts with.
#[derive(Debug, Clone, PartialEq)]
pub struct SeededState {
    pub catalog: Catalog,
    pub rules: RulesState,
    pub status: TaskStatusBook,
    pub usage: RotationUsageBook,
}

impl SeedData {
    pub fn from_json(text: &str) -> Result<Self> {
        // Some editors save with a BOM.
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        Ok(serde_json::from_str(text)?)
    }

    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_SEED)
    }

    /// Default conditions, empty status, and an empty usage record per
    /// special rule the rules define.
    pub fn into_state(self) -> SeededState {
        let mut usage = RotationUsageBook::new();
        let specials = [
            (RotationKey::AmSpecial, &self.rules.am_rotation),
            (RotationKey::PmSpecial, &self.rules.pm_rotation),
        ];
        for (key, rotation) in specials {
            if rotation.as_ref().is_some_and(|r| r.special.is_some()) {
                usage.ensure(key);
            }
        }

        SeededState {
            catalog: Catalog::new(self.products, self.task_definitions),
            rules: RulesState {
                rules: self.rules,
                conditions: ConditionState::default(),
            },
            status: TaskStatusBook::new(),
            usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Slot;

    #[test]
    fn builtin_seed_loads_and_validates() {
        let seed = SeedData::builtin().unwrap();
        assert!(seed.task_definitions.iter().any(|t| t.id == "skin_am" && t.slot == Slot::Am));
        let state = seed.into_state();
        assert!(state.catalog.validate(&state.rules.rules).is_empty());
        assert!(state.usage.get(RotationKey::AmSpecial).is_some());
        assert!(state.usage.get(RotationKey::PmSpecial).is_some());
    }

    #[test]
    fn legacy_seed_shape_is_accepted() {
        let text = "\u{feff}".to_string()
            + r#"{
            "products": [{"id": "serum_vitc", "name": "Vit C", "category": "serum", "role": "brighten"}],
            "taskDefinitions": [{
                "id": "skin_am", "slot": "AM", "type": "skincare", "interval_days": 1,
                "steps": [{"step": 1, "action": "apply_serum", "productSelector": "rule_based_serum_am"}]
            }],
            "rules": {
                "amSerumRotation": {
                    "default": "serum_vitc",
                    "vitc": {"productId": "serum_vitc", "interval_days": 2, "only_if_condition_not": ["sensitive"]}
                }
            }
        }"#;
        let state = SeedData::from_json(&text).unwrap().into_state();
        assert!(state.catalog.products[0].is_active);
        assert!(state.usage.get(RotationKey::AmSpecial).is_some());
        assert!(state.usage.get(RotationKey::PmSpecial).is_none());
        let special = state.rules.rules.am_rotation.unwrap().special.unwrap();
        assert_eq!(special.interval_days, 2);
    }
}
