use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use routine_core::{
    CardState, Catalog, ConditionState, DaySchedule, LazyFallback, ProductSelector, RotationKey,
    RotationRule, RotationUsageBook, RoutineEngine, RoutineError, RuleSet, RulesPatch, RulesState,
    SeedData, SpecialRule, StepTemplate, TaskDefinition, TaskStatusBook,
};
use serde_json::json;

type Engine = RoutineEngine<TaskStatusBook, RotationUsageBook>;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// 09:00 in Seoul on `day`.
fn morning(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_hms_opt(0, 0, 0).unwrap())
}

fn am_task() -> TaskDefinition {
    TaskDefinition::new("skin_am", "AM", "skincare")
        .every(1)
        .with_step(StepTemplate::new(1, "cleanse").with_products(["cleanser"]))
        .with_step(StepTemplate::new(2, "apply_toner").with_products(["toner"]).when("dry"))
        .with_step(StepTemplate::new(3, "apply_serum").with_selector(ProductSelector::AmRotation))
}

fn pm_task() -> TaskDefinition {
    TaskDefinition::new("skin_pm", "PM", "skincare")
        .every(1)
        .with_step(StepTemplate::new(1, "apply_serum").with_selector(ProductSelector::PmRotation))
}

fn rotation_rules() -> RuleSet {
    RuleSet {
        am_rotation: Some(RotationRule::new("A").with_special(SpecialRule::new("B", 2))),
        pm_rotation: Some(
            RotationRule::new("P").with_special(SpecialRule::new("N", 3).not_with_am_special()),
        ),
        lazy_fallback: LazyFallback {
            am: vec!["lazy_lotion".to_string(), "sunscreen".to_string()],
            pm: vec!["lazy_lotion".to_string()],
        },
        ..RuleSet::default()
    }
}

fn engine_with(tasks: Vec<TaskDefinition>, rules: RuleSet) -> Engine {
    RoutineEngine::new(
        Catalog::new(Vec::new(), tasks),
        RulesState {
            rules,
            conditions: ConditionState::default(),
        },
        TaskStatusBook::new(),
        RotationUsageBook::new(),
    )
}

fn seeded_engine() -> Engine {
    let seeded = SeedData::builtin().unwrap().into_state();
    RoutineEngine::new(seeded.catalog, seeded.rules, seeded.status, seeded.usage)
}

fn serum(schedule: &DaySchedule, task: &str) -> String {
    let card = schedule.card_for_task(task).expect("card scheduled");
    let step = card
        .steps
        .iter()
        .find(|s| s.action == "apply_serum")
        .expect("serum step");
    step.products[0].clone()
}

#[test]
fn at_most_one_card_per_slot() {
    let engine = seeded_engine();
    let start = date(2026, 1, 1);
    for offset in 0..60 {
        let day = start + Duration::days(offset);
        let schedule = engine.schedule_for_date(day);
        let slots: BTreeSet<&str> = schedule.cards.iter().map(|c| c.slot.as_str()).collect();
        assert_eq!(slots.len(), schedule.cards.len(), "duplicate slot on {day}");
    }
}

#[test]
fn scheduling_is_idempotent() {
    let mut engine = seeded_engine();
    let day = date(2026, 1, 10);
    engine.record_completion("skin_am|2026-01-09", morning(date(2026, 1, 9))).unwrap();
    let first = engine.schedule_for_date(day);
    let second = engine.schedule_for_date(day);
    assert_eq!(first, second);
}

#[test]
fn rotation_follows_interval_and_same_day_requery() {
    let mut engine = engine_with(vec![am_task()], rotation_rules());
    let d = date(2026, 3, 2);

    assert_eq!(serum(&engine.schedule_for_date(d), "skin_am"), "B");
    let receipt = engine.record_completion("skin_am|2026-03-02", morning(d)).unwrap();
    assert_eq!(receipt.rotation_updates, vec![RotationKey::AmSpecial]);

    assert_eq!(serum(&engine.schedule_for_date(d), "skin_am"), "B");
    assert_eq!(serum(&engine.schedule_for_date(d + Duration::days(1)), "skin_am"), "A");
    assert_eq!(serum(&engine.schedule_for_date(d + Duration::days(2)), "skin_am"), "B");
}

#[test]
fn pm_special_is_not_paired_with_am_special() {
    let with_am = engine_with(vec![am_task(), pm_task()], rotation_rules());
    let d = date(2026, 3, 2);
    let schedule = with_am.schedule_for_date(d);
    assert_eq!(serum(&schedule, "skin_am"), "B");
    assert_eq!(serum(&schedule, "skin_pm"), "P");

    // Without an AM card there is no AM selection to conflict with.
    let pm_only = engine_with(vec![pm_task()], rotation_rules());
    assert_eq!(serum(&pm_only.schedule_for_date(d), "skin_pm"), "N");
}

#[test]
fn recorder_updates_the_rule_behind_the_displayed_product() {
    let mut engine = engine_with(vec![am_task(), pm_task()], rotation_rules());
    let start = date(2026, 3, 2);

    for offset in 0..12 {
        let day = start + Duration::days(offset);
        if offset == 5 {
            // From here on the AM special is blocked, so PM is free to rotate.
            let patch = RulesPatch {
                rules: Some(json!({"amRotation": {"special": {"blockIf": ["dry"]}}})),
                conditions: Some(BTreeMap::from([("dry".to_string(), true)])),
            };
            engine.apply_rules_patch(&patch).unwrap();
        }

        let schedule = engine.schedule_for_date(day);
        let am_shown = serum(&schedule, "skin_am");
        let pm_shown = serum(&schedule, "skin_pm");

        let am = engine
            .record_completion(&format!("skin_am|{day}"), morning(day))
            .unwrap();
        assert_eq!(am.rotation_updates.contains(&RotationKey::AmSpecial), am_shown == "B", "AM on {day}");
        assert!(!am.rotation_updates.contains(&RotationKey::PmSpecial));

        let pm = engine
            .record_completion(&format!("skin_pm|{day}"), morning(day) + Duration::hours(12))
            .unwrap();
        assert_eq!(pm.rotation_updates.contains(&RotationKey::PmSpecial), pm_shown == "N", "PM on {day}");
        assert!(!pm.rotation_updates.contains(&RotationKey::AmSpecial));

        // Completing does not change what the day shows.
        let after = engine.schedule_for_date(day);
        assert_eq!(serum(&after, "skin_am"), am_shown);
        assert_eq!(serum(&after, "skin_pm"), pm_shown);
    }
}

#[test]
fn completing_a_task_that_lost_its_slot_leaves_rotation_alone() {
    let mask = TaskDefinition::new("am_mask", "AM", "mask")
        .every(7)
        .with_step(StepTemplate::new(1, "apply_mask").with_products(["sheet_mask"]));
    let mut engine = engine_with(vec![am_task(), mask], rotation_rules());
    let day = date(2026, 3, 2);

    let cards: Vec<_> = engine
        .schedule_for_date(day)
        .cards
        .iter()
        .map(|c| c.task_definition_id.clone())
        .collect();
    assert_eq!(cards, vec!["am_mask".to_string()]);

    let receipt = engine
        .record_completion(&format!("skin_am|{day}"), morning(day))
        .unwrap();
    assert!(receipt.rotation_updates.is_empty());
    assert_eq!(engine.usage().get(RotationKey::AmSpecial).and_then(|u| u.last_used_at), None);

    let after = engine.schedule_for_date(day);
    assert_eq!(after.cards.len(), 1);
    assert_eq!(after.cards[0].task_definition_id, "am_mask");
    assert_eq!(after.cards[0].state, CardState::Due);

    // Once the mask is done for the week, the serum routine gets the slot and
    // the special it never showed is still due.
    engine
        .record_completion(&format!("am_mask|{day}"), morning(day))
        .unwrap();
    let next = day + Duration::days(1);
    assert_eq!(serum(&engine.schedule_for_date(next), "skin_am"), "B");
}

#[test]
fn lazy_mode_collapses_card_and_skips_usage() {
    let mut engine = engine_with(vec![am_task()], rotation_rules());
    let patch = RulesPatch {
        rules: None,
        conditions: Some(BTreeMap::from([
            ("lazy_mode".to_string(), true),
            ("dry".to_string(), true),
        ])),
    };
    engine.apply_rules_patch(&patch).unwrap();

    let d = date(2026, 3, 2);
    let schedule = engine.schedule_for_date(d);
    let card = schedule.card_for_task("skin_am").unwrap();
    assert_eq!(card.steps.len(), 1);
    assert_eq!(card.steps[0].index, 1);
    assert_eq!(card.steps[0].products, vec!["lazy_lotion".to_string(), "sunscreen".to_string()]);

    let receipt = engine.record_completion("skin_am|2026-03-02", morning(d)).unwrap();
    assert!(receipt.rotation_updates.is_empty());
    assert_eq!(engine.usage(), &RotationUsageBook::new());
}

#[test]
fn weekday_task_only_on_saturday() {
    let tonic = TaskDefinition::new("scalp_tonic", "SCALP", "scalp")
        .on_weekdays([5])
        .with_step(StepTemplate::new(1, "apply_tonic").with_products(["tonic"]));
    let mut engine = engine_with(vec![tonic], RuleSet::default());

    let saturday = date(2026, 3, 7);
    for offset in 0..7 {
        let day = date(2026, 3, 2) + Duration::days(offset);
        let scheduled = engine.schedule_for_date(day).card_for_task("scalp_tonic").is_some();
        assert_eq!(scheduled, day == saturday, "{day}");
    }

    engine.record_completion("scalp_tonic|2026-03-07", morning(saturday)).unwrap();
    let next = engine.schedule_for_date(saturday + Duration::days(7));
    assert_eq!(next.card_for_task("scalp_tonic").unwrap().state, CardState::Due);
}

#[test]
fn weekday_is_taken_in_seoul_time() {
    let tonic = TaskDefinition::new("scalp_tonic", "SCALP", "scalp").on_weekdays([5]);
    let engine = engine_with(vec![tonic], RuleSet::default());
    // Friday 16:00 UTC is Saturday 01:00 in Seoul.
    let late_friday = Utc.with_ymd_and_hms(2026, 3, 6, 16, 0, 0).unwrap();
    assert!(engine.schedule_today(late_friday).card_for_task("scalp_tonic").is_some());
}

#[test]
fn skip_then_query_shows_skipped() {
    let mut engine = engine_with(vec![am_task()], rotation_rules());
    let d = date(2026, 3, 2);
    let receipt = engine.record_skip("skin_am|2026-03-02", morning(d)).unwrap();
    assert!(receipt.rotation_updates.is_empty());

    let card = engine.schedule_for_date(d).card_for_task("skin_am").cloned().unwrap();
    assert_eq!(card.state, CardState::Skipped);
    assert_eq!(engine.usage(), &RotationUsageBook::new());

    // Still due by policy the next day, since nothing was completed.
    let next = engine.schedule_for_date(d + Duration::days(1));
    assert_eq!(next.card_for_task("skin_am").unwrap().state, CardState::Due);
}

#[test]
fn completion_wins_over_skip_on_the_same_day() {
    let mut engine = engine_with(vec![am_task()], rotation_rules());
    let d = date(2026, 3, 2);
    engine.record_completion("skin_am|2026-03-02", morning(d)).unwrap();
    engine
        .record_skip("skin_am|2026-03-02", morning(d) + Duration::hours(2))
        .unwrap();
    let card = engine.schedule_for_date(d).card_for_task("skin_am").cloned().unwrap();
    assert_eq!(card.state, CardState::Completed);
}

#[test]
fn rejected_commands_change_nothing() {
    let mut engine = engine_with(vec![am_task()], rotation_rules());
    let d = date(2026, 3, 2);
    engine.record_completion("skin_am|2026-03-02", morning(d)).unwrap();
    let status_before = engine.status().clone();
    let usage_before = engine.usage().clone();

    let at = morning(d + Duration::days(1));
    for bad in ["skin_am", "skin_am|03/03/2026", "|2026-03-03", "skin_am|2026-02-30"] {
        let err = engine.record_completion(bad, at).unwrap_err();
        assert!(matches!(err, RoutineError::InvalidInstanceId { .. }), "{bad}: {err}");
    }
    let err = engine.record_completion("ghost|2026-03-03", at).unwrap_err();
    assert!(matches!(err, RoutineError::NotFound { .. }));
    let err = engine.record_skip("ghost|2026-03-03", at).unwrap_err();
    assert!(matches!(err, RoutineError::NotFound { .. }));

    assert_eq!(engine.status(), &status_before);
    assert_eq!(engine.usage(), &usage_before);
}

#[test]
fn misconfigured_definition_does_not_block_other_slots() {
    let broken = TaskDefinition::new("broken", "SUPP", "supplement");
    let engine = engine_with(vec![broken, am_task()], rotation_rules());
    let schedule = engine.schedule_for_date(date(2026, 3, 2));
    assert_eq!(schedule.cards.len(), 1);
    assert_eq!(schedule.issues.len(), 1);
}

#[test]
fn seeded_scalp_day_takes_the_shower_slot() {
    let mut engine = seeded_engine();
    let d = date(2026, 1, 5);
    let schedule = engine.schedule_for_date(d);
    assert_eq!(
        schedule.card_for_slot(&"SHOWER".into()).unwrap().task_definition_id,
        "scalp_scale_day"
    );

    engine.record_completion("scalp_scale_day|2026-01-05", morning(d)).unwrap();
    let next = engine.schedule_for_date(d + Duration::days(1));
    assert_eq!(
        next.card_for_slot(&"SHOWER".into()).unwrap().task_definition_id,
        "shower_normal"
    );
}
