//! Card scheduler: decides, per slot, which task definition is shown on a
//! date and in which state, then resolves its steps.
//!
//! Per query:
//! - every definition that is due by policy, or has a completion/skip recorded
//!   on the date itself, becomes a candidate for its slot
//! - a contested slot goes to the candidate with the longest interval
//!   (absent interval = 0; ties keep the earlier definition)
//! - slots are ordered AM, PM, SHOWER, SCALP, SUPP, then extension slots in
//!   first-seen order, and resolved in that order so the AM rotation choice
//!   reaches the PM card

use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};
use tracing::{debug, warn};

use crate::conditions::ConditionState;
use crate::error::ConfigurationError;
use crate::rules::RuleSet;
use crate::status::{CardState, TaskStatus, TaskStatusStore};
use crate::steps::{resolve_steps, CardStep, ResolveContext, ResolvedSteps};
use crate::task::{DueRule, Slot, TaskDefinition, TaskInstanceId};
use crate::time::{days_between, weekday_index};
use crate::usage::RotationUsageStore;

/// One scheduled card. Derived on every query, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCard {
    pub task_instance_id: TaskInstanceId,
    pub task_definition_id: String,
    pub slot: Slot,
    #[serde(rename = "type")]
    pub task_type: String,
    pub state: CardState,
    pub steps: Vec<CardStep>,
}

/// Result of a scheduling query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaySchedule {
    pub date: NaiveDate,
    pub cards: Vec<TaskCard>,
    /// Configuration problems found while scheduling; affected definitions
    /// were treated as never due.
    #[serde(serialize_with = "issue_messages")]
    pub issues: Vec<ConfigurationError>,
}

fn issue_messages<S: Serializer>(issues: &[ConfigurationError], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(issues.iter().map(ToString::to_string))
}

impl DaySchedule {
    pub fn card_for_slot(&self, slot: &Slot) -> Option<&TaskCard> {
        self.cards.iter().find(|c| &c.slot == slot)
    }

    pub fn card_for_task(&self, task_definition_id: &str) -> Option<&TaskCard> {
        self.cards
            .iter()
            .find(|c| c.task_definition_id == task_definition_id)
    }
}

/// Everything a card pass reads. Nothing here is mutated.
#[derive(Clone, Copy)]
pub struct ScheduleInputs<'a> {
    pub tasks: &'a [TaskDefinition],
    pub rules: &'a RuleSet,
    pub conditions: &'a ConditionState,
    pub status: &'a dyn TaskStatusStore,
    pub usage: &'a dyn RotationUsageStore,
}

impl<'a> ScheduleInputs<'a> {
    pub(crate) fn resolve_context(&self, date: NaiveDate) -> ResolveContext<'a> {
        ResolveContext {
            rules: self.rules,
            conditions: self.conditions,
            usage: self.usage,
            date,
        }
    }
}

/// A slot winner with its resolved steps.
pub(crate) struct PlannedCard<'a> {
    pub task: &'a TaskDefinition,
    pub state: CardState,
    pub resolved: ResolvedSteps,
}

pub(crate) struct CardPass<'a> {
    pub cards: Vec<PlannedCard<'a>>,
    pub issues: Vec<ConfigurationError>,
}

struct Candidate<'a> {
    task: &'a TaskDefinition,
    state: CardState,
}

/// Due-by-policy evaluation, independent of events recorded on `date`.
pub fn is_due(rule: &DueRule, status: &TaskStatus, date: NaiveDate) -> bool {
    match rule {
        DueRule::Interval(days) => match status.last_completed_date() {
            None => true,
            Some(last) => days_between(last, date) >= *days,
        },
        DueRule::Weekdays(days) => days.contains(&weekday_index(date)),
        DueRule::Never => false,
    }
}

pub fn schedule_for_date(inputs: &ScheduleInputs<'_>, date: NaiveDate) -> DaySchedule {
    let pass = run_pass(inputs, date);
    let cards = pass
        .cards
        .into_iter()
        .map(|planned| TaskCard {
            task_instance_id: TaskInstanceId::new(planned.task.id.clone(), date),
            task_definition_id: planned.task.id.clone(),
            slot: planned.task.slot.clone(),
            task_type: planned.task.task_type.clone(),
            state: planned.state,
            steps: planned.resolved.steps,
        })
        .collect();

    DaySchedule {
        date,
        cards,
        issues: pass.issues,
    }
}

pub(crate) fn run_pass<'a>(inputs: &ScheduleInputs<'a>, date: NaiveDate) -> CardPass<'a> {
    let mut issues = Vec::new();
    let mut candidates: Vec<Candidate<'a>> = Vec::new();

    for task in inputs.tasks {
        let (rule, task_issues) = task.due_rule();
        for issue in task_issues {
            warn!(task = %task.id, %issue, "task definition misconfigured");
            issues.push(issue);
        }

        let status = inputs.status.status(&task.id);
        let recorded = status.state_on(date);
        if recorded.is_none() && !is_due(&rule, &status, date) {
            continue;
        }
        let candidate = Candidate {
            task,
            state: recorded.unwrap_or(CardState::Due),
        };

        match candidates.iter_mut().find(|c| c.task.slot == task.slot) {
            Some(existing) => {
                if task.interval_score() > existing.task.interval_score() {
                    debug!(slot = %task.slot, winner = %task.id, loser = %existing.task.id, "slot collision");
                    *existing = candidate;
                } else {
                    debug!(slot = %task.slot, winner = %existing.task.id, loser = %task.id, "slot collision");
                }
            }
            None => candidates.push(candidate),
        }
    }

    // Stable sort: extension slots keep first-seen order after the known ones.
    candidates.sort_by_key(|c| c.task.slot.priority().unwrap_or(u8::MAX));

    let ctx = inputs.resolve_context(date);
    let mut am_selection: Option<String> = None;
    let mut cards = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let resolved = resolve_steps(candidate.task, &ctx, am_selection.as_deref());
        am_selection = resolved.am_selection.clone();
        debug!(
            slot = %candidate.task.slot,
            task = %candidate.task.id,
            state = ?candidate.state,
            steps = resolved.steps.len(),
            "card resolved"
        );
        cards.push(PlannedCard {
            task: candidate.task,
            state: candidate.state,
            resolved,
        });
    }

    CardPass { cards, issues }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::TaskStatusBook;
    use crate::usage::RotationUsageBook;
    use chrono::{TimeZone, Utc};

    fn jan(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    fn schedule(tasks: &[TaskDefinition], status: &TaskStatusBook, date: NaiveDate) -> DaySchedule {
        let rules = RuleSet::default();
        let conditions = ConditionState::default();
        let usage = RotationUsageBook::new();
        let inputs = ScheduleInputs {
            tasks,
            rules: &rules,
            conditions: &conditions,
            status,
            usage: &usage,
        };
        schedule_for_date(&inputs, date)
    }

    #[test]
    fn slot_prefers_longer_interval() {
        let tasks = vec![
            TaskDefinition::new("shower_normal", "SHOWER", "hygiene").every(1),
            TaskDefinition::new("scalp_scale_day", "SHOWER", "scalp").every(4),
        ];
        let out = schedule(&tasks, &TaskStatusBook::new(), jan(4));
        assert_eq!(out.cards.len(), 1);
        assert_eq!(out.cards[0].task_definition_id, "scalp_scale_day");
    }

    #[test]
    fn equal_intervals_keep_first_definition() {
        let tasks = vec![
            TaskDefinition::new("a", "SUPP", "supplement").every(1),
            TaskDefinition::new("b", "SUPP", "supplement").every(1),
        ];
        let out = schedule(&tasks, &TaskStatusBook::new(), jan(4));
        assert_eq!(out.cards[0].task_definition_id, "a");
    }

    #[test]
    fn slots_are_ordered_by_priority_then_first_seen() {
        let tasks = vec![
            TaskDefinition::new("mask", "MASK", "mask").every(1),
            TaskDefinition::new("supp", "SUPP", "supplement").every(1),
            TaskDefinition::new("nails", "NAILS", "hygiene").every(1),
            TaskDefinition::new("pm", "PM", "skincare").every(1),
            TaskDefinition::new("am", "AM", "skincare").every(1),
        ];
        let out = schedule(&tasks, &TaskStatusBook::new(), jan(4));
        let order: Vec<&str> = out.cards.iter().map(|c| c.slot.as_str()).collect();
        assert_eq!(order, vec!["AM", "PM", "SUPP", "MASK", "NAILS"]);
    }

    #[test]
    fn interval_due_after_enough_days() {
        let tasks = vec![TaskDefinition::new("scalp", "SCALP", "scalp").every(3)];
        let mut status = TaskStatusBook::new();
        status.put(
            "scalp",
            TaskStatus {
                last_completed_at: Some(Utc.with_ymd_and_hms(2026, 1, 4, 1, 0, 0).unwrap()),
                last_skipped_at: None,
            },
        );
        assert_eq!(schedule(&tasks, &status, jan(4)).cards[0].state, CardState::Completed);
        assert!(schedule(&tasks, &status, jan(6)).cards.is_empty());
        assert_eq!(schedule(&tasks, &status, jan(7)).cards[0].state, CardState::Due);
    }

    #[test]
    fn misconfigured_task_is_reported_but_others_schedule() {
        let tasks = vec![
            TaskDefinition::new("broken", "SUPP", "supplement"),
            TaskDefinition::new("am", "AM", "skincare").every(1),
        ];
        let out = schedule(&tasks, &TaskStatusBook::new(), jan(4));
        assert_eq!(out.cards.len(), 1);
        assert_eq!(out.issues.len(), 1);
        assert_eq!(out.issues[0].task_id(), Some("broken"));
    }

    #[test]
    fn issues_are_included_in_json_output() {
        let tasks = vec![TaskDefinition::new("broken", "SUPP", "supplement")];
        let out = schedule(&tasks, &TaskStatusBook::new(), jan(4));
        let json = serde_json::to_value(&out).unwrap();
        let issues = json["issues"].as_array().unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].as_str(), Some(out.issues[0].to_string().as_str()));
        assert!(issues[0].as_str().unwrap().contains("'broken'"));
    }

    #[test]
    fn never_due_task_still_shows_its_recorded_event() {
        let tasks = vec![TaskDefinition::new("adhoc", "SUPP", "supplement")];
        let mut status = TaskStatusBook::new();
        status.put(
            "adhoc",
            TaskStatus {
                last_completed_at: None,
                last_skipped_at: Some(Utc.with_ymd_and_hms(2026, 1, 4, 3, 0, 0).unwrap()),
            },
        );
        let out = schedule(&tasks, &status, jan(4));
        assert_eq!(out.cards[0].state, CardState::Skipped);
        assert_eq!(out.cards[0].task_instance_id.to_string(), "adhoc|2026-01-04");
    }
}
