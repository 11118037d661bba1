//! Completion recorder: records completions/skips and advances rotation usage.
//!
//! Each command is split into a pure `plan_*` step that reads the current
//! stores and computes every write, and a `commit` step that applies them.
//! Errors can only happen while planning, so a failed command never leaves a
//! partial write behind.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{EntityKind, Result, RoutineError};
use crate::scheduler::{run_pass, ScheduleInputs};
use crate::status::{TaskStatus, TaskStatusStore};
use crate::task::{TaskDefinition, TaskInstanceId};
use crate::usage::{RotationKey, RotationUsageStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Completed,
    Skipped,
}

/// Writes computed for one completion/skip command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPlan {
    pub kind: EventKind,
    pub task_definition_id: String,
    pub instance_date: NaiveDate,
    pub at: DateTime<Utc>,
    pub next_status: TaskStatus,
    pub rotation_updates: Vec<RotationKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordReceipt {
    pub kind: EventKind,
    pub task_definition_id: String,
    pub instance_date: NaiveDate,
    pub at: DateTime<Utc>,
    pub rotation_updates: Vec<RotationKey>,
}

fn find_task<'a>(inputs: &ScheduleInputs<'a>, id: &str) -> Result<&'a TaskDefinition> {
    inputs
        .tasks
        .iter()
        .find(|t| t.id == id)
        .ok_or_else(|| RoutineError::not_found(EntityKind::TaskDefinition, id))
}

pub fn plan_completion(
    inputs: &ScheduleInputs<'_>,
    instance_id: &str,
    at: DateTime<Utc>,
) -> Result<RecordPlan> {
    let instance: TaskInstanceId = instance_id.parse()?;
    let task = find_task(inputs, &instance.task_definition_id)?;

    let mut next_status = inputs.status.status(&task.id);
    next_status.last_completed_at = Some(at);

    let rotation_updates = if inputs.conditions.lazy_mode {
        Vec::new()
    } else {
        rules_fired_for(inputs, task, instance.date)
    };

    Ok(RecordPlan {
        kind: EventKind::Completed,
        task_definition_id: task.id.clone(),
        instance_date: instance.date,
        at,
        next_status,
        rotation_updates,
    })
}

pub fn plan_skip(inputs: &ScheduleInputs<'_>, instance_id: &str, at: DateTime<Utc>) -> Result<RecordPlan> {
    let instance: TaskInstanceId = instance_id.parse()?;
    let task = find_task(inputs, &instance.task_definition_id)?;

    let mut next_status = inputs.status.status(&task.id);
    next_status.last_skipped_at = Some(at);

    Ok(RecordPlan {
        kind: EventKind::Skipped,
        task_definition_id: task.id.clone(),
        instance_date: instance.date,
        at,
        next_status,
        rotation_updates: Vec::new(),
    })
}

pub fn commit(
    plan: RecordPlan,
    status: &mut dyn TaskStatusStore,
    usage: &mut dyn RotationUsageStore,
) -> RecordReceipt {
    status.put(&plan.task_definition_id, plan.next_status);
    for key in &plan.rotation_updates {
        usage.mark_used(*key, plan.at);
    }
    info!(
        task = %plan.task_definition_id,
        kind = ?plan.kind,
        at = %plan.at,
        rotation_updates = ?plan.rotation_updates,
        "task event recorded"
    );
    RecordReceipt {
        kind: plan.kind,
        task_definition_id: plan.task_definition_id,
        instance_date: plan.instance_date,
        at: plan.at,
        rotation_updates: plan.rotation_updates,
    }
}

/// Re-derive which special rotation rules produced the products shown for
/// `task` on `date`, by replaying the card pass on the current stores. A task
/// that is not on the day's cards showed no products, so nothing fired.
fn rules_fired_for(inputs: &ScheduleInputs<'_>, task: &TaskDefinition, date: NaiveDate) -> Vec<RotationKey> {
    let pass = run_pass(inputs, date);

    let Some(card) = pass.cards.iter().find(|c| c.task.id == task.id) else {
        debug!(task = %task.id, %date, "task not on the day's cards; rotation usage unchanged");
        return Vec::new();
    };
    let mut fired = card.resolved.fired.clone();
    fired.sort();
    fired.dedup();
    fired
}
