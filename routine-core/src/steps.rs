//! Step resolver: expands a task definition's step templates into the
//! concrete steps shown on a card for one date.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::conditions::{ConditionKey, ConditionState};
use crate::rotation::{select_am, select_pm, Selection};
use crate::rules::{HydrationBoost, RuleSet};
use crate::task::{ProductSelector, TaskDefinition};
use crate::time::season_of;
use crate::usage::{RotationKey, RotationUsageStore};

/// Action code of the synthetic lazy-mode step.
pub const LAZY_ACTION: &str = "apply_products";

/// A concrete step on a card. Indices are contiguous from 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardStep {
    #[serde(rename = "step")]
    pub index: u32,
    pub action: String,
    pub products: Vec<String>,
}

/// Read-only inputs shared by every task resolved in one card pass.
#[derive(Clone, Copy)]
pub struct ResolveContext<'a> {
    pub rules: &'a RuleSet,
    pub conditions: &'a ConditionState,
    pub usage: &'a dyn RotationUsageStore,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSteps {
    pub steps: Vec<CardStep>,
    /// AM product to thread into later PM resolution in the same pass.
    pub am_selection: Option<String>,
    /// Special rotation rules that produced a product on this card.
    pub fired: Vec<RotationKey>,
}

pub fn resolve_steps(
    task: &TaskDefinition,
    ctx: &ResolveContext<'_>,
    am_selected: Option<&str>,
) -> ResolvedSteps {
    if ctx.conditions.lazy_mode && task.is_serum_routine() {
        return ResolvedSteps {
            steps: vec![CardStep {
                index: 1,
                action: LAZY_ACTION.to_string(),
                products: ctx.rules.lazy_fallback.for_slot(&task.slot).to_vec(),
            }],
            am_selection: am_selected.map(str::to_string),
            fired: Vec::new(),
        };
    }

    let mut am_selection = am_selected.map(str::to_string);
    let mut fired = Vec::new();
    let mut steps = Vec::new();

    for template in task.ordered_steps() {
        if !condition_met(template.condition.as_ref(), ctx.conditions) {
            continue;
        }

        let products = match template.product_selector {
            None => template.products.clone(),
            Some(selector) => {
                let selection = match selector {
                    ProductSelector::AmRotation => {
                        let sel = select_am(ctx.rules, ctx.conditions, ctx.usage, ctx.date);
                        am_selection = sel.as_ref().map(|s| s.product_id.clone());
                        sel
                    }
                    ProductSelector::PmRotation => select_pm(
                        ctx.rules,
                        ctx.conditions,
                        ctx.usage,
                        ctx.date,
                        am_selection.as_deref(),
                    ),
                };
                match selection {
                    Some(sel) => {
                        fired.extend(sel.rule);
                        let product = displayed_product(&sel, &ctx.rules.hydration_boost, ctx.conditions, ctx.date);
                        if product.is_empty() { Vec::new() } else { vec![product] }
                    }
                    None => Vec::new(),
                }
            }
        };

        steps.push(CardStep {
            index: steps.len() as u32 + 1,
            action: template.action.clone(),
            products,
        });
    }

    ResolvedSteps {
        steps,
        am_selection,
        fired,
    }
}

fn condition_met(condition: Option<&ConditionKey>, conditions: &ConditionState) -> bool {
    condition.is_none_or(|key| conditions.is_set(key))
}

/// Hydration override: a default selection is swapped for the boost product
/// in an auto season or while the toggle condition is set.
fn displayed_product(
    selection: &Selection,
    boost: &HydrationBoost,
    conditions: &ConditionState,
    date: NaiveDate,
) -> String {
    if !selection.is_default() {
        return selection.product_id.clone();
    }
    let Some(boost_product) = boost.product() else {
        return selection.product_id.clone();
    };
    let in_season = boost.auto_seasons.contains(&season_of(date));
    let toggled = boost
        .toggle_condition
        .as_ref()
        .is_some_and(|key| conditions.is_set(key));
    if in_season || toggled {
        boost_product.to_string()
    } else {
        selection.product_id.clone()
    }
}
