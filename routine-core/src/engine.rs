//! Routine engine: owns the catalog, rules and the two keyed stores, and
//! exposes the query/command surface.
//!
//! Store backends are injected as type parameters; the CLI uses the
//! in-memory books loaded from and saved to JSON files.

use chrono::{DateTime, NaiveDate, Utc};

use crate::assist::{AppliedEdit, EditableSnapshot};
use crate::catalog::Catalog;
use crate::error::Result;
use crate::recorder::{commit, plan_completion, plan_skip, RecordReceipt};
use crate::rules::{RulesPatch, RulesState};
use crate::scheduler::{schedule_for_date, DaySchedule, ScheduleInputs};
use crate::status::TaskStatusStore;
use crate::task::TaskDefinition;
use crate::time::date_key;
use crate::usage::RotationUsageStore;

#[derive(Debug, Clone)]
pub struct RoutineEngine<S: TaskStatusStore, U: RotationUsageStore> {
    catalog: Catalog,
    state: RulesState,
    status: S,
    usage: U,
}

impl<S: TaskStatusStore, U: RotationUsageStore> RoutineEngine<S, U> {
    pub fn new(catalog: Catalog, state: RulesState, status: S, usage: U) -> Self {
        Self {
            catalog,
            state,
            status,
            usage,
        }
    }

    fn inputs(&self) -> ScheduleInputs<'_> {
        ScheduleInputs {
            tasks: &self.catalog.tasks,
            rules: &self.state.rules,
            conditions: &self.state.conditions,
            status: &self.status,
            usage: &self.usage,
        }
    }

    pub fn schedule_for_date(&self, date: NaiveDate) -> DaySchedule {
        schedule_for_date(&self.inputs(), date)
    }

    /// Cards for the civil date containing `now`.
    pub fn schedule_today(&self, now: DateTime<Utc>) -> DaySchedule {
        self.schedule_for_date(date_key(now))
    }

    /// Record a completion. On error nothing is written.
    pub fn record_completion(&mut self, instance_id: &str, completed_at: DateTime<Utc>) -> Result<RecordReceipt> {
        let plan = plan_completion(&self.inputs(), instance_id, completed_at)?;
        Ok(commit(plan, &mut self.status, &mut self.usage))
    }

    /// Record a skip. Rotation usage is never touched.
    pub fn record_skip(&mut self, instance_id: &str, skipped_at: DateTime<Utc>) -> Result<RecordReceipt> {
        let plan = plan_skip(&self.inputs(), instance_id, skipped_at)?;
        Ok(commit(plan, &mut self.status, &mut self.usage))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut Catalog {
        &mut self.catalog
    }

    pub fn rules(&self) -> &RulesState {
        &self.state
    }

    pub fn apply_rules_patch(&mut self, patch: &RulesPatch) -> Result<()> {
        self.state.apply_patch(patch)
    }

    /// Remove a task definition together with its status record.
    pub fn remove_task(&mut self, id: &str) -> Result<TaskDefinition> {
        self.catalog.remove_task(id, &mut self.status)
    }

    pub fn status(&self) -> &S {
        &self.status
    }

    pub fn usage(&self) -> &U {
        &self.usage
    }

    pub fn snapshot(&self) -> EditableSnapshot {
        EditableSnapshot {
            rules: self.state.rules.clone(),
            conditions: self.state.conditions.clone(),
            products: self.catalog.products.clone(),
            task_definitions: self.catalog.tasks.clone(),
        }
    }

    /// Adopt the documents of an accepted edit. Status records of removed
    /// task definitions are dropped.
    pub fn apply_edit(&mut self, edit: AppliedEdit) {
        for id in &edit.tasks.removed {
            self.status.remove(id);
        }
        let snapshot = edit.snapshot;
        self.catalog = Catalog::new(snapshot.products, snapshot.task_definitions);
        self.state = RulesState {
            rules: snapshot.rules,
            conditions: snapshot.conditions,
        };
    }

    pub fn into_parts(self) -> (Catalog, RulesState, S, U) {
        (self.catalog, self.state, self.status, self.usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assist::{apply_proposal, PatchProposal};
    use crate::seed::SeedData;
    use crate::status::{CardState, TaskStatusBook};
    use crate::usage::{RotationKey, RotationUsageBook};
    use chrono::TimeZone;
    use serde_json::json;

    fn engine() -> RoutineEngine<TaskStatusBook, RotationUsageBook> {
        let seeded = SeedData::builtin().unwrap().into_state();
        RoutineEngine::new(seeded.catalog, seeded.rules, seeded.status, seeded.usage)
    }

    #[test]
    fn schedule_today_uses_local_date() {
        let e = engine();
        // 2026-01-05 20:00 UTC is already 2026-01-06 in Seoul.
        let out = e.schedule_today(Utc.with_ymd_and_hms(2026, 1, 5, 20, 0, 0).unwrap());
        assert_eq!(out.date, NaiveDate::from_ymd_opt(2026, 1, 6).unwrap());
        assert!(out.card_for_task("skin_am").is_some());
    }

    #[test]
    fn completion_updates_status_and_usage() {
        let mut e = engine();
        let at = Utc.with_ymd_and_hms(2026, 1, 5, 0, 30, 0).unwrap();
        let receipt = e.record_completion("skin_am|2026-01-05", at).unwrap();
        assert_eq!(receipt.rotation_updates, vec![RotationKey::AmSpecial]);

        let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let card = e.schedule_for_date(date).card_for_task("skin_am").cloned().unwrap();
        assert_eq!(card.state, CardState::Completed);
        assert!(e.usage().get(RotationKey::AmSpecial).and_then(|u| u.last_used_at).is_some());
    }

    #[test]
    fn failed_command_leaves_stores_alone() {
        let mut e = engine();
        let at = Utc.with_ymd_and_hms(2026, 1, 5, 0, 30, 0).unwrap();
        assert!(e.record_completion("ghost|2026-01-05", at).is_err());
        assert!(e.record_completion("skin_am-2026-01-05", at).is_err());
        assert!(e.status().is_empty());
        assert!(e.usage().get(RotationKey::AmSpecial).and_then(|u| u.last_used_at).is_none());
    }

    #[test]
    fn accepted_edit_replaces_documents_and_drops_status() {
        let mut e = engine();
        let at = Utc.with_ymd_and_hms(2026, 1, 5, 0, 30, 0).unwrap();
        e.record_skip("supplements_daily|2026-01-05", at).unwrap();
        assert_eq!(e.status().len(), 1);

        let snapshot = e.snapshot();
        let index = snapshot
            .task_definitions
            .iter()
            .position(|t| t.id == "supplements_daily")
            .unwrap();
        let proposal = PatchProposal {
            json_patch: json!([
                {"op": "remove", "path": format!("/taskDefinitions/{index}")},
                {"op": "replace", "path": "/conditions/lazy_mode", "value": true}
            ]),
            summary: "drop supplements".to_string(),
        };
        let edit = apply_proposal(&snapshot, &proposal).unwrap();
        e.apply_edit(edit);

        assert!(e.catalog().task("supplements_daily").is_none());
        assert!(e.status().is_empty());
        assert!(e.rules().conditions.lazy_mode);
    }
}
