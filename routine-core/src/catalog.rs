//! Product and task definition catalog.
//!
//! Products are never hard-deleted: deactivation flips `is_active` so old
//! task definitions and rules keep resolving display names. Task definitions
//! are removed outright together with their status record.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::error::{ConfigurationError, EntityKind, Result, RoutineError};
use crate::rules::RuleSet;
use crate::status::TaskStatusStore;
use crate::task::{Slot, StepTemplate, TaskDefinition};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub category: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Free-form verification facts (ingredients, percentages, sources).
    #[serde(default)]
    pub verified: Map<String, Value>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl Product {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: category.into(),
            role: role.into(),
            notes: None,
            verified: Map::new(),
            is_active: true,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Missing field = keep, `null` = clear (for optional fields).
fn present<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub notes: Option<Option<String>>,
    #[serde(default)]
    pub verified: Option<Map<String, Value>>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl ProductPatch {
    fn apply(&self, product: &mut Product) {
        if let Some(name) = &self.name {
            product.name = name.clone();
        }
        if let Some(category) = &self.category {
            product.category = category.clone();
        }
        if let Some(role) = &self.role {
            product.role = role.clone();
        }
        if let Some(notes) = &self.notes {
            product.notes = notes.clone();
        }
        if let Some(verified) = &self.verified {
            product.verified = verified.clone();
        }
        if let Some(active) = self.is_active {
            product.is_active = active;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskPatch {
    #[serde(default)]
    pub slot: Option<Slot>,
    #[serde(default, rename = "type")]
    pub task_type: Option<String>,
    #[serde(default)]
    pub steps: Option<Vec<StepTemplate>>,
    #[serde(default, deserialize_with = "present")]
    pub interval_days: Option<Option<i64>>,
    #[serde(default, deserialize_with = "present")]
    pub cron_weekdays: Option<Option<Vec<u8>>>,
}

impl TaskPatch {
    fn apply(&self, task: &mut TaskDefinition) {
        if let Some(slot) = &self.slot {
            task.slot = slot.clone();
        }
        if let Some(task_type) = &self.task_type {
            task.task_type = task_type.clone();
        }
        if let Some(steps) = &self.steps {
            task.steps = steps.clone();
        }
        if let Some(interval) = self.interval_days {
            task.interval_days = interval;
        }
        if let Some(weekdays) = &self.cron_weekdays {
            task.cron_weekdays = weekdays.clone();
        }
    }
}

/// Products and task definitions. Task order is significant: it breaks
/// slot-collision ties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    pub products: Vec<Product>,
    pub tasks: Vec<TaskDefinition>,
}

impl Catalog {
    pub fn new(products: Vec<Product>, tasks: Vec<TaskDefinition>) -> Self {
        Self { products, tasks }
    }

    // --- products ---

    pub fn product(&self, id: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    pub fn active_products(&self) -> impl Iterator<Item = &Product> {
        self.products.iter().filter(|p| p.is_active)
    }

    pub fn add_product(&mut self, product: Product) -> Result<&Product> {
        if self.product(&product.id).is_some() {
            return Err(RoutineError::conflict(EntityKind::Product, product.id));
        }
        info!(product = %product.id, "product added");
        self.products.push(product);
        Ok(&self.products[self.products.len() - 1])
    }

    pub fn update_product(&mut self, id: &str, patch: &ProductPatch) -> Result<&Product> {
        let product = self
            .products
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| RoutineError::not_found(EntityKind::Product, id))?;
        patch.apply(product);
        Ok(product)
    }

    /// Soft delete.
    pub fn deactivate_product(&mut self, id: &str) -> Result<()> {
        let product = self
            .products
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| RoutineError::not_found(EntityKind::Product, id))?;
        product.is_active = false;
        info!(product = %id, "product deactivated");
        Ok(())
    }

    pub fn display_name(&self, id: &str) -> String {
        display_name(&self.products, id)
    }

    // --- task definitions ---

    pub fn task(&self, id: &str) -> Option<&TaskDefinition> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn add_task(&mut self, task: TaskDefinition) -> Result<&TaskDefinition> {
        if self.task(&task.id).is_some() {
            return Err(RoutineError::conflict(EntityKind::TaskDefinition, task.id));
        }
        info!(task = %task.id, slot = %task.slot, "task definition added");
        self.tasks.push(task);
        Ok(&self.tasks[self.tasks.len() - 1])
    }

    pub fn update_task(&mut self, id: &str, patch: &TaskPatch) -> Result<&TaskDefinition> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| RoutineError::not_found(EntityKind::TaskDefinition, id))?;
        patch.apply(task);
        Ok(task)
    }

    /// Remove a task definition and its status record.
    pub fn remove_task(&mut self, id: &str, status: &mut dyn TaskStatusStore) -> Result<TaskDefinition> {
        let pos = self
            .tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| RoutineError::not_found(EntityKind::TaskDefinition, id))?;
        let removed = self.tasks.remove(pos);
        status.remove(id);
        info!(task = %id, "task definition removed");
        Ok(removed)
    }

    pub fn validate(&self, rules: &RuleSet) -> Vec<ConfigurationError> {
        validate_catalog(&self.products, &self.tasks, rules)
    }
}

/// Product name if known, else the id with underscores shown as spaces.
pub fn display_name(products: &[Product], id: &str) -> String {
    match products.iter().find(|p| p.id == id) {
        Some(product) => product.name.clone(),
        None => id.replace('_', " "),
    }
}

/// Cross-check task definitions and rules against the active products.
pub fn validate_catalog(products: &[Product], tasks: &[TaskDefinition], rules: &RuleSet) -> Vec<ConfigurationError> {
    let active = |id: &str| products.iter().any(|p| p.is_active && p.id == id);
    let mut issues = Vec::new();

    for task in tasks {
        let (_, due_issues) = task.due_rule();
        issues.extend(due_issues);

        for step in &task.steps {
            for product_id in &step.products {
                let location = format!("tasks.{}.steps[{}]", task.id, step.index);
                if product_id.trim().is_empty() {
                    issues.push(ConfigurationError::EmptyProductId { location });
                } else if !active(product_id.as_str()) {
                    issues.push(ConfigurationError::UnknownProduct {
                        location,
                        product_id: product_id.clone(),
                    });
                }
            }
        }
    }

    issues.extend(rules.validate(active));
    issues
}
