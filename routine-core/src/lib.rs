//! routine-core: scheduling engine for the daily routine cards

pub mod assist;
pub mod catalog;
pub mod conditions;
pub mod engine;
pub mod error;
pub mod recorder;
pub mod rotation;
pub mod rules;
pub mod scheduler;
pub mod seed;
pub mod status;
pub mod steps;
pub mod task;
pub mod time;
pub mod usage;

pub use assist::{
    apply_proposal, AppliedEdit, EditableSnapshot, EntityDiff, PatchAssistant, PatchProposal,
    UnconfiguredAssistant,
};
pub use catalog::{display_name, validate_catalog, Catalog, Product, ProductPatch, TaskPatch};
pub use conditions::{ConditionKey, ConditionState};
pub use engine::RoutineEngine;
pub use error::{ConfigurationError, EntityKind, Result, RoutineError};
pub use recorder::{EventKind, RecordReceipt};
pub use rotation::{rotation_due, select_am, select_pm, Selection};
pub use rules::{
    HydrationBoost, LazyFallback, RotationConstraint, RotationRule, RuleSet, RulesPatch, RulesState,
    SpecialRule,
};
pub use scheduler::{schedule_for_date, DaySchedule, ScheduleInputs, TaskCard};
pub use seed::{SeedData, SeededState};
pub use status::{CardState, TaskStatus, TaskStatusBook, TaskStatusStore};
pub use steps::{resolve_steps, CardStep, ResolveContext, ResolvedSteps};
pub use task::{DueRule, ProductSelector, Slot, StepTemplate, TaskDefinition, TaskInstanceId};
pub use time::{Season, ROUTINE_TZ};
pub use usage::{RotationKey, RotationUsage, RotationUsageBook, RotationUsageStore};
