//! Task status: the most recent completion and skip per task definition.
//!
//! Only the latest event of each kind is kept; there is no event log.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::time::date_key;

/// State of a task instance on a given date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardState {
    Due,
    Completed,
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    #[serde(default)]
    pub last_completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_skipped_at: Option<DateTime<Utc>>,
}

impl TaskStatus {
    pub fn last_completed_date(&self) -> Option<NaiveDate> {
        self.last_completed_at.map(date_key)
    }

    /// Terminal state recorded for exactly `date`, if any. A completion on
    /// the date takes precedence over a skip on the same date.
    pub fn state_on(&self, date: NaiveDate) -> Option<CardState> {
        if self.last_completed_at.map(date_key) == Some(date) {
            return Some(CardState::Completed);
        }
        if self.last_skipped_at.map(date_key) == Some(date) {
            return Some(CardState::Skipped);
        }
        None
    }
}

/// Keyed store of task status. Mutated only by the completion recorder.
pub trait TaskStatusStore {
    fn status(&self, task_definition_id: &str) -> TaskStatus;
    fn put(&mut self, task_definition_id: &str, status: TaskStatus);
    fn remove(&mut self, task_definition_id: &str) -> Option<TaskStatus>;
}

/// In-memory status map keyed by task definition id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskStatusBook {
    records: BTreeMap<String, TaskStatus>,
}

impl TaskStatusBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, task_definition_id: &str) -> Option<&TaskStatus> {
        self.records.get(task_definition_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl TaskStatusStore for TaskStatusBook {
    fn status(&self, task_definition_id: &str) -> TaskStatus {
        self.records.get(task_definition_id).cloned().unwrap_or_default()
    }

    fn put(&mut self, task_definition_id: &str, status: TaskStatus) {
        self.records.insert(task_definition_id.to_string(), status);
    }

    fn remove(&mut self, task_definition_id: &str) -> Option<TaskStatus> {
        self.records.remove(task_definition_id)
    }
}
