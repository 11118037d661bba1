//! Rotation selector: which product an AM/PM rotation step uses on a date.
//!
//! Both selectors are pure functions of (rules, conditions, usage, date) plus,
//! for PM, the AM selection made in the same card pass. The completion
//! recorder re-runs them to find out which rule produced the product that was
//! shown, so any hidden input here would break that agreement.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;

use crate::conditions::ConditionState;
use crate::rules::{RotationConstraint, RotationRule, RuleSet};
use crate::time::{date_key, days_between};
use crate::usage::{RotationKey, RotationUsageStore};

/// Outcome of a rotation selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub product_id: String,
    /// The special rule that fired; `None` means the default was chosen.
    pub rule: Option<RotationKey>,
}

impl Selection {
    fn default_of(rotation: &RotationRule) -> Self {
        Self {
            product_id: rotation.default.clone(),
            rule: None,
        }
    }

    pub fn is_default(&self) -> bool {
        self.rule.is_none()
    }
}

/// Special rule eligibility by cadence.
///
/// Due when never used, when last used on `target` itself (so re-querying the
/// same day after completing is stable), or when at least `interval_days`
/// passed since the last use.
pub fn rotation_due(last_used_at: Option<DateTime<Utc>>, interval_days: i64, target: NaiveDate) -> bool {
    let Some(last_used_at) = last_used_at else {
        return true;
    };
    let last_used = date_key(last_used_at);
    if last_used == target {
        return true;
    }
    days_between(last_used, target) >= interval_days
}

/// AM rotation.
pub fn select_am(
    rules: &RuleSet,
    conditions: &ConditionState,
    usage: &dyn RotationUsageStore,
    target: NaiveDate,
) -> Option<Selection> {
    let rotation = rules.am_rotation.as_ref()?;
    Some(select(rotation, RotationKey::AmSpecial, conditions, usage, target, false))
}

/// PM rotation. `am_selected` is the AM product chosen in the same card pass,
/// or `None` when no AM selection was made.
pub fn select_pm(
    rules: &RuleSet,
    conditions: &ConditionState,
    usage: &dyn RotationUsageStore,
    target: NaiveDate,
    am_selected: Option<&str>,
) -> Option<Selection> {
    let rotation = rules.pm_rotation.as_ref()?;

    let paired_with_am_special = rotation
        .special
        .as_ref()
        .filter(|s| s.has_constraint(&RotationConstraint::NotWithAmSpecial))
        .and_then(|_| rules.am_rotation.as_ref()?.special.as_ref())
        .is_some_and(|am_special| am_selected == Some(am_special.product_id.as_str()));

    Some(select(
        rotation,
        RotationKey::PmSpecial,
        conditions,
        usage,
        target,
        paired_with_am_special,
    ))
}

fn select(
    rotation: &RotationRule,
    key: RotationKey,
    conditions: &ConditionState,
    usage: &dyn RotationUsageStore,
    target: NaiveDate,
    excluded: bool,
) -> Selection {
    let Some(special) = rotation.special.as_ref() else {
        return Selection::default_of(rotation);
    };

    if conditions.any(&special.block_if) {
        debug!(?key, "special product blocked by conditions");
        return Selection::default_of(rotation);
    }

    if excluded {
        debug!(?key, "special product excluded by same-day pairing constraint");
        return Selection::default_of(rotation);
    }

    if rotation_due(usage.last_used_at(key), special.interval_days, target) {
        return Selection {
            product_id: special.product_id.clone(),
            rule: Some(key),
        };
    }

    Selection::default_of(rotation)
}
