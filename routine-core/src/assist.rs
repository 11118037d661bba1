//! Assisted editing: an external collaborator proposes an RFC 6902 JSON
//! Patch against the editable documents, and this module applies it
//! all-or-nothing.
//!
//! The collaborator never touches stored state. A proposal is applied to a
//! clone of the snapshot, the result must still deserialize into the typed
//! documents, and only then is the caller told what changed so it can
//! persist each sub-document on its own.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::catalog::Product;
use crate::conditions::ConditionState;
use crate::error::{Result, RoutineError};
use crate::rules::RuleSet;
use crate::task::TaskDefinition;

/// The documents an assistant may edit, addressed by JSON Pointer
/// (`/rules/amRotation/special/intervalDays`, `/products/3/name`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditableSnapshot {
    #[serde(default)]
    pub rules: RuleSet,
    #[serde(default)]
    pub conditions: ConditionState,
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub task_definitions: Vec<TaskDefinition>,
}

impl EditableSnapshot {
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchProposal {
    /// RFC 6902 operation array. Kept untyped until applied so a malformed
    /// proposal can still be shown to the user.
    #[serde(default = "empty_patch")]
    pub json_patch: Value,
    #[serde(default)]
    pub summary: String,
}

fn empty_patch() -> Value {
    Value::Array(Vec::new())
}

impl PatchProposal {
    pub fn empty(summary: impl Into<String>) -> Self {
        Self {
            json_patch: empty_patch(),
            summary: summary.into(),
        }
    }

    /// Parse a proposal out of free-form model output: the text between the
    /// first `{` and the last `}` must be a proposal object.
    pub fn from_model_text(text: &str) -> Result<Self> {
        let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
            return Err(RoutineError::malformed_patch("no JSON object in assistant output"));
        };
        if end <= start {
            return Err(RoutineError::malformed_patch("no JSON object in assistant output"));
        }
        serde_json::from_str(&text[start..=end])
            .map_err(|e| RoutineError::malformed_patch(format!("assistant output is not a proposal: {e}")))
    }

    pub fn is_empty(&self) -> bool {
        self.json_patch.as_array().is_some_and(|ops| ops.is_empty())
    }
}

/// External collaborator that turns an instruction into a patch proposal.
pub trait PatchAssistant {
    fn propose(&self, instruction: &str, snapshot: &EditableSnapshot) -> Result<PatchProposal>;
}

/// Used when no assistant backend is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredAssistant;

impl PatchAssistant for UnconfiguredAssistant {
    fn propose(&self, _instruction: &str, _snapshot: &EditableSnapshot) -> Result<PatchProposal> {
        Ok(PatchProposal::empty(
            "No patch assistant is configured; nothing was proposed.",
        ))
    }
}

/// Ids added, changed, or removed in one entity collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntityDiff {
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub removed: Vec<String>,
}

impl EntityDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    fn between<T: PartialEq>(before: &[T], after: &[T], id: impl Fn(&T) -> &str) -> Self {
        let mut diff = EntityDiff::default();
        for item in after {
            match before.iter().find(|b| id(*b) == id(item)) {
                None => diff.added.push(id(item).to_string()),
                Some(old) if old != item => diff.changed.push(id(item).to_string()),
                Some(_) => {}
            }
        }
        for item in before {
            if !after.iter().any(|a| id(a) == id(item)) {
                diff.removed.push(id(item).to_string());
            }
        }
        diff
    }
}

/// Outcome of a successfully applied proposal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedEdit {
    #[serde(skip)]
    pub snapshot: EditableSnapshot,
    pub products: EntityDiff,
    pub tasks: EntityDiff,
    pub rules_changed: bool,
    pub conditions_changed: bool,
    pub summary: String,
}

impl AppliedEdit {
    pub fn is_noop(&self) -> bool {
        self.products.is_empty() && self.tasks.is_empty() && !self.rules_changed && !self.conditions_changed
    }
}

fn duplicate_id<'a>(ids: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    let mut seen = std::collections::BTreeSet::new();
    ids.into_iter().find(|id| !seen.insert(*id))
}

/// Apply `proposal` to a copy of `snapshot`. Any failure rejects the whole
/// patch and `snapshot` is never modified.
pub fn apply_proposal(snapshot: &EditableSnapshot, proposal: &PatchProposal) -> Result<AppliedEdit> {
    let ops: json_patch::Patch = serde_json::from_value(proposal.json_patch.clone())
        .map_err(|e| RoutineError::malformed_patch(format!("invalid JSON Patch: {e}")))?;

    let mut document = snapshot.to_value()?;
    json_patch::patch(&mut document, &ops)
        .map_err(|e| RoutineError::malformed_patch(format!("patch failed: {e}")))?;

    let patched: EditableSnapshot = serde_json::from_value(document)
        .map_err(|e| RoutineError::malformed_patch(format!("patched documents are invalid: {e}")))?;

    if let Some(id) = duplicate_id(patched.products.iter().map(|p| p.id.as_str())) {
        return Err(RoutineError::malformed_patch(format!("duplicate product id '{id}'")));
    }
    if let Some(id) = duplicate_id(patched.task_definitions.iter().map(|t| t.id.as_str())) {
        return Err(RoutineError::malformed_patch(format!("duplicate task definition id '{id}'")));
    }

    let edit = AppliedEdit {
        products: EntityDiff::between(&snapshot.products, &patched.products, |p| p.id.as_str()),
        tasks: EntityDiff::between(&snapshot.task_definitions, &patched.task_definitions, |t| t.id.as_str()),
        rules_changed: snapshot.rules != patched.rules,
        conditions_changed: snapshot.conditions != patched.conditions,
        summary: proposal.summary.clone(),
        snapshot: patched,
    };

    debug!(operations = ops.0.len(), "patch applied to snapshot copy");
    info!(
        products = ?edit.products,
        tasks = ?edit.tasks,
        rules_changed = edit.rules_changed,
        conditions_changed = edit.conditions_changed,
        "assisted edit accepted"
    );
    Ok(edit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::SeedData;
    use serde_json::json;

    fn snapshot() -> EditableSnapshot {
        let seed = SeedData::builtin().unwrap();
        EditableSnapshot {
            rules: seed.rules,
            conditions: ConditionState::default(),
            products: seed.products,
            task_definitions: seed.task_definitions,
        }
    }

    #[test]
    fn extracts_proposal_from_chatty_output() {
        let text = r#"Sure! Here you go:
```json
{"jsonPatch": [{"op": "replace", "path": "/conditions/dry", "value": true}], "summary": "Mark skin dry"}
```
Let me know if you need anything else."#;
        let proposal = PatchProposal::from_model_text(text).unwrap();
        assert_eq!(proposal.summary, "Mark skin dry");
        assert!(!proposal.is_empty());

        assert!(PatchProposal::from_model_text("no json here").is_err());
        assert!(PatchProposal::from_model_text("} backwards {").is_err());
    }

    #[test]
    fn unconfigured_assistant_proposes_nothing() {
        let snap = snapshot();
        let proposal = UnconfiguredAssistant.propose("add retinol on fridays", &snap).unwrap();
        assert!(proposal.is_empty());
        let edit = apply_proposal(&snap, &proposal).unwrap();
        assert!(edit.is_noop());
    }

    #[test]
    fn reports_per_entity_changes() {
        let snap = snapshot();
        let proposal = PatchProposal {
            json_patch: json!([
                {"op": "add", "path": "/products/-", "value": {
                    "id": "retinal_cream", "name": "Retinal Cream", "category": "cream", "role": "renew"
                }},
                {"op": "replace", "path": "/products/0/name", "value": "Gentle Cleanser"},
                {"op": "replace", "path": "/rules/amRotation/special/intervalDays", "value": 3},
                {"op": "replace", "path": "/conditions/dry", "value": true}
            ]),
            summary: "Add retinal, slow vitamin C".to_string(),
        };
        let edit = apply_proposal(&snap, &proposal).unwrap();
        assert_eq!(edit.products.added, vec!["retinal_cream".to_string()]);
        assert_eq!(edit.products.changed, vec!["cleanser_low_ph".to_string()]);
        assert!(edit.tasks.is_empty());
        assert!(edit.rules_changed);
        assert!(edit.conditions_changed);
        assert!(edit.snapshot.products.iter().any(|p| p.id == "retinal_cream" && p.is_active));
    }

    #[test]
    fn removal_is_reported() {
        let snap = snapshot();
        let last = snap.task_definitions.len() - 1;
        let removed_id = snap.task_definitions[last].id.clone();
        let proposal = PatchProposal {
            json_patch: json!([{"op": "remove", "path": format!("/taskDefinitions/{last}")}]),
            summary: String::new(),
        };
        let edit = apply_proposal(&snap, &proposal).unwrap();
        assert_eq!(edit.tasks.removed, vec![removed_id]);
        assert!(!edit.rules_changed);
    }

    #[test]
    fn rejects_whole_patch_on_any_failure() {
        let snap = snapshot();
        let cases = [
            // not an operation array
            json!({"op": "add"}),
            // failing test op after a valid one
            json!([
                {"op": "replace", "path": "/conditions/dry", "value": true},
                {"op": "test", "path": "/conditions/dry", "value": false}
            ]),
            // path that does not exist
            json!([{"op": "replace", "path": "/products/99/name", "value": "x"}]),
            // result no longer deserializes
            json!([{"op": "replace", "path": "/taskDefinitions/0/interval_days", "value": "daily"}]),
            // duplicate id
            json!([{"op": "copy", "from": "/products/0", "path": "/products/-"}]),
            // derived condition cannot be stored
            json!([{"op": "add", "path": "/conditions/skin_is_dry_or_sensitive", "value": true}]),
        ];
        for patch in cases {
            let proposal = PatchProposal {
                json_patch: patch.clone(),
                summary: String::new(),
            };
            let err = apply_proposal(&snap, &proposal).unwrap_err();
            assert!(matches!(err, RoutineError::MalformedPatch { .. }), "{patch}: {err}");
        }
        assert_eq!(snap, snapshot());
    }
}
