//! Error taxonomy for routine-core.
//!
//! Scheduling itself never fails: per-task configuration problems are
//! collected as [`ConfigurationError`]s on the schedule. Commands that mutate
//! state return [`RoutineError`] and leave every store untouched on failure.

use std::fmt;

use thiserror::Error;

/// Kind of entity referenced by a not-found / conflict error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    TaskDefinition,
    Product,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::TaskDefinition => f.write_str("task definition"),
            EntityKind::Product => f.write_str("product"),
        }
    }
}

/// A configuration problem on a single task definition or rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("task '{task_id}' has no due policy (neither interval_days nor cron_weekdays)")]
    MissingDuePolicy { task_id: String },

    #[error("task '{task_id}' sets both interval_days and cron_weekdays; interval wins")]
    ConflictingDuePolicy { task_id: String },

    #[error("task '{task_id}' has non-positive interval_days")]
    NonPositiveInterval { task_id: String },

    #[error("task '{task_id}' has weekday {value} outside 0..=6")]
    InvalidWeekday { task_id: String, value: u8 },

    #[error("{location} references an empty product id")]
    EmptyProductId { location: String },

    #[error("{location} references unknown product '{product_id}'")]
    UnknownProduct { location: String, product_id: String },
}

impl ConfigurationError {
    /// Task definition this problem belongs to, if any.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            ConfigurationError::MissingDuePolicy { task_id }
            | ConfigurationError::ConflictingDuePolicy { task_id }
            | ConfigurationError::NonPositiveInterval { task_id }
            | ConfigurationError::InvalidWeekday { task_id, .. } => Some(task_id),
            _ => None,
        }
    }
}

/// Command-level error.
#[derive(Debug, Error)]
pub enum RoutineError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: EntityKind, id: String },

    #[error("{kind} id '{id}' already exists")]
    Conflict { kind: EntityKind, id: String },

    #[error("invalid task instance id '{value}': {reason}")]
    InvalidInstanceId { value: String, reason: String },

    #[error("invalid instant '{value}': {reason}")]
    InvalidInstant { value: String, reason: String },

    #[error("invalid date '{value}' (expected YYYY-MM-DD)")]
    InvalidDate { value: String },

    #[error("malformed patch: {message}")]
    MalformedPatch { message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RoutineError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        RoutineError::NotFound { kind, id: id.into() }
    }

    pub fn conflict(kind: EntityKind, id: impl Into<String>) -> Self {
        RoutineError::Conflict { kind, id: id.into() }
    }

    pub fn malformed_patch(message: impl Into<String>) -> Self {
        RoutineError::MalformedPatch {
            message: message.into(),
        }
    }
}

pub type Result<T, E = RoutineError> = std::result::Result<T, E>;
