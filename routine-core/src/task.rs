//! Task definitions (routine templates) and task instance ids.
//!
//! A task definition is a template: a slot, a due policy and an ordered list
//! of step templates. A concrete day's card is derived from it by the
//! scheduler and never stored.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::conditions::ConditionKey;
use crate::error::{ConfigurationError, RoutineError};
use crate::time::{format_date_key, parse_date_key};

/// Time-of-day / context bucket. At most one card per slot per day.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Slot {
    Am,
    Pm,
    Shower,
    Scalp,
    Supp,
    Other(String),
}

impl Slot {
    /// Fixed display priority; `None` for extension slots, which sort after
    /// the known ones in first-seen order.
    pub fn priority(&self) -> Option<u8> {
        match self {
            Slot::Am => Some(0),
            Slot::Pm => Some(1),
            Slot::Shower => Some(2),
            Slot::Scalp => Some(3),
            Slot::Supp => Some(4),
            Slot::Other(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Slot::Am => "AM",
            Slot::Pm => "PM",
            Slot::Shower => "SHOWER",
            Slot::Scalp => "SCALP",
            Slot::Supp => "SUPP",
            Slot::Other(name) => name,
        }
    }
}

impl From<String> for Slot {
    fn from(value: String) -> Self {
        match value.as_str() {
            "AM" => Slot::Am,
            "PM" => Slot::Pm,
            "SHOWER" => Slot::Shower,
            "SCALP" => Slot::Scalp,
            "SUPP" => Slot::Supp,
            _ => Slot::Other(value),
        }
    }
}

impl From<&str> for Slot {
    fn from(value: &str) -> Self {
        Slot::from(value.to_string())
    }
}

impl From<Slot> for String {
    fn from(slot: Slot) -> Self {
        slot.as_str().to_string()
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which rotation rule resolves a step's product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductSelector {
    #[serde(rename = "AM_ROTATION", alias = "rule_based_serum_am")]
    AmRotation,
    #[serde(rename = "PM_ROTATION", alias = "rule_based_serum_pm")]
    PmRotation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTemplate {
    /// 1-based position within the template.
    #[serde(rename = "step", default)]
    pub index: u32,
    /// Action code, e.g. `apply_serum`.
    pub action: String,
    /// Static products, replaced entirely when `product_selector` is set.
    #[serde(default, alias = "staticProducts")]
    pub products: Vec<String>,
    #[serde(
        rename = "productSelector",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub product_selector: Option<ProductSelector>,
    /// Step is dropped unless this condition holds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionKey>,
}

impl StepTemplate {
    pub fn new(index: u32, action: impl Into<String>) -> Self {
        Self {
            index,
            action: action.into(),
            products: Vec::new(),
            product_selector: None,
            condition: None,
        }
    }

    pub fn with_products<I, S>(mut self, products: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.products = products.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_selector(mut self, selector: ProductSelector) -> Self {
        self.product_selector = Some(selector);
        self
    }

    pub fn when(mut self, condition: impl Into<ConditionKey>) -> Self {
        self.condition = Some(condition.into());
        self
    }
}

/// Normalized due policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DueRule {
    /// Due when at least this many days passed since the last completion.
    Interval(i64),
    /// Due on these weekdays (Monday = 0).
    Weekdays(BTreeSet<u8>),
    /// Only shown when an event was recorded on the date itself.
    Never,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: String,
    pub slot: Slot,
    /// Category label (skincare, hygiene, scalp, mask, ...).
    #[serde(rename = "type", alias = "task_type")]
    pub task_type: String,
    #[serde(default)]
    pub steps: Vec<StepTemplate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_days: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_weekdays: Option<Vec<u8>>,
}

impl TaskDefinition {
    pub fn new(id: impl Into<String>, slot: impl Into<Slot>, task_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            slot: slot.into(),
            task_type: task_type.into(),
            steps: Vec::new(),
            interval_days: None,
            cron_weekdays: None,
        }
    }

    pub fn every(mut self, days: i64) -> Self {
        self.interval_days = Some(days);
        self
    }

    pub fn on_weekdays(mut self, weekdays: impl IntoIterator<Item = u8>) -> Self {
        self.cron_weekdays = Some(weekdays.into_iter().collect());
        self
    }

    pub fn with_step(mut self, step: StepTemplate) -> Self {
        self.steps.push(step);
        self
    }

    /// AM/PM skincare routines collapse to a single step in lazy mode.
    pub fn is_serum_routine(&self) -> bool {
        matches!(self.slot, Slot::Am | Slot::Pm) && self.task_type == "skincare"
    }

    /// Collision tie-break score: longer cadences win a contested slot.
    pub fn interval_score(&self) -> i64 {
        self.interval_days.unwrap_or(0)
    }

    /// Normalize the raw policy fields, reporting anything suspicious.
    ///
    /// Interval wins when both fields are set. Invalid weekdays are dropped.
    pub fn due_rule(&self) -> (DueRule, Vec<ConfigurationError>) {
        let mut issues = Vec::new();
        let weekdays = self.cron_weekdays.as_deref().unwrap_or_default();

        if let Some(days) = self.interval_days {
            if !weekdays.is_empty() {
                issues.push(ConfigurationError::ConflictingDuePolicy {
                    task_id: self.id.clone(),
                });
            }
            if days <= 0 {
                issues.push(ConfigurationError::NonPositiveInterval {
                    task_id: self.id.clone(),
                });
                return (DueRule::Never, issues);
            }
            return (DueRule::Interval(days), issues);
        }

        if weekdays.is_empty() {
            issues.push(ConfigurationError::MissingDuePolicy {
                task_id: self.id.clone(),
            });
            return (DueRule::Never, issues);
        }

        let mut valid = BTreeSet::new();
        for &day in weekdays {
            if day <= 6 {
                valid.insert(day);
            } else {
                issues.push(ConfigurationError::InvalidWeekday {
                    task_id: self.id.clone(),
                    value: day,
                });
            }
        }
        if valid.is_empty() {
            return (DueRule::Never, issues);
        }
        (DueRule::Weekdays(valid), issues)
    }

    /// Step templates in index order.
    pub fn ordered_steps(&self) -> Vec<&StepTemplate> {
        let mut steps: Vec<&StepTemplate> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.index);
        steps
    }
}

/// Binds a task definition to one calendar date: `"<task id>|YYYY-MM-DD"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskInstanceId {
    pub task_definition_id: String,
    pub date: NaiveDate,
}

impl TaskInstanceId {
    pub fn new(task_definition_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            task_definition_id: task_definition_id.into(),
            date,
        }
    }
}

impl fmt::Display for TaskInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.task_definition_id, format_date_key(self.date))
    }
}

impl FromStr for TaskInstanceId {
    type Err = RoutineError;

    // Split at the last separator: date keys never contain '|', task ids may.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| RoutineError::InvalidInstanceId {
            value: value.to_string(),
            reason: reason.to_string(),
        };

        let (task_id, date) = value
            .rsplit_once('|')
            .ok_or_else(|| invalid("missing '|' separator"))?;
        if task_id.is_empty() {
            return Err(invalid("empty task definition id"));
        }
        let date = parse_date_key(date).map_err(|_| invalid("date part is not YYYY-MM-DD"))?;
        Ok(Self::new(task_id, date))
    }
}

impl TryFrom<String> for TaskInstanceId {
    type Error = RoutineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TaskInstanceId> for String {
    fn from(id: TaskInstanceId) -> Self {
        id.to_string()
    }
}
