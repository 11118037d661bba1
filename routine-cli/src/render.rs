//! Plain-text rendering for the terminal.

use routine_core::{
    display_name, AppliedEdit, CardState, ConfigurationError, DaySchedule, EntityDiff, Product,
    RecordReceipt, TaskDefinition,
};
use std::fmt::Write;

fn state_label(state: CardState) -> &'static str {
    match state {
        CardState::Due => "due",
        CardState::Completed => "done",
        CardState::Skipped => "skipped",
    }
}

/// Product ids, or display names when `products` is given.
fn product_list(ids: &[String], products: Option<&[Product]>) -> String {
    match products {
        Some(products) => ids
            .iter()
            .map(|id| display_name(products, id))
            .collect::<Vec<_>>()
            .join(", "),
        None => ids.join(", "),
    }
}

pub fn render_schedule(schedule: &DaySchedule, products: Option<&[Product]>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {} ({})\n", schedule.date.format("%Y-%m-%d %A"), routine_core::ROUTINE_TZ);

    if schedule.cards.is_empty() {
        out.push_str("Nothing scheduled.\n");
    }

    for card in &schedule.cards {
        let _ = writeln!(
            out,
            "[{}] {} ({}) -- {}",
            card.slot,
            card.task_definition_id,
            state_label(card.state),
            card.task_instance_id
        );
        for step in &card.steps {
            if step.products.is_empty() {
                let _ = writeln!(out, "  {}. {}", step.index, step.action);
            } else {
                let _ = writeln!(
                    out,
                    "  {}. {}: {}",
                    step.index,
                    step.action,
                    product_list(&step.products, products)
                );
            }
        }
    }

    if !schedule.issues.is_empty() {
        out.push('\n');
        out.push_str(&render_issues(&schedule.issues));
    }
    out
}

pub fn render_issues(issues: &[ConfigurationError]) -> String {
    let mut out = String::new();
    for issue in issues {
        let _ = writeln!(out, "! {issue}");
    }
    out
}

pub fn render_receipt(receipt: &RecordReceipt) -> String {
    let mut out = format!(
        "{:?}: {} on {} at {}",
        receipt.kind,
        receipt.task_definition_id,
        receipt.instance_date,
        routine_core::time::to_local_rfc3339(receipt.at)
    );
    if !receipt.rotation_updates.is_empty() {
        let keys: Vec<String> = receipt
            .rotation_updates
            .iter()
            .map(|k| format!("{k:?}"))
            .collect();
        let _ = write!(out, " (rotation used: {})", keys.join(", "));
    }
    out
}

pub fn render_products<'a>(products: impl IntoIterator<Item = &'a Product>) -> String {
    let mut out = String::new();
    for p in products {
        let inactive = if p.is_active { "" } else { " [inactive]" };
        let _ = writeln!(out, "{:<24} {:<12} {:<14} {}{}", p.id, p.category, p.role, p.name, inactive);
    }
    out
}

pub fn render_tasks(tasks: &[TaskDefinition]) -> String {
    let mut out = String::new();
    for t in tasks {
        let cadence = match (t.interval_days, &t.cron_weekdays) {
            (Some(days), _) => format!("every {days}d"),
            (None, Some(days)) => format!("weekdays {days:?}"),
            (None, None) => "no due policy".to_string(),
        };
        let _ = writeln!(
            out,
            "{:<24} {:<8} {:<12} {:<16} {} steps",
            t.id,
            t.slot,
            t.task_type,
            cadence,
            t.steps.len()
        );
    }
    out
}

fn render_diff(out: &mut String, label: &str, diff: &EntityDiff) {
    for (sign, ids) in [("+", &diff.added), ("~", &diff.changed), ("-", &diff.removed)] {
        for id in ids {
            let _ = writeln!(out, "  {sign} {label} {id}");
        }
    }
}

pub fn render_edit(edit: &AppliedEdit) -> String {
    let mut out = String::new();
    if !edit.summary.is_empty() {
        let _ = writeln!(out, "{}", edit.summary);
    }
    if edit.is_noop() {
        out.push_str("  (no changes)\n");
        return out;
    }
    render_diff(&mut out, "product", &edit.products);
    render_diff(&mut out, "task", &edit.tasks);
    if edit.rules_changed {
        out.push_str("  ~ rules\n");
    }
    if edit.conditions_changed {
        out.push_str("  ~ conditions\n");
    }
    out
}
