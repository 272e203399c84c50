//! Content plans: allow-listed tables, plan model, review diffs and execution

pub mod executor;
pub mod model;
pub mod review;
pub mod table;

pub use executor::{
    ActionOutcome, ActionResult, EditorLink, ExecutionReport, ExecutionStatus, FailurePolicy,
    Invalidation, PlanExecutor, Progress,
};
pub use model::{ActionKind, ContentAction, ContentPlan, CONTENT_PLAN_TOOL};
pub use review::{diff_action, ActionDiff, FieldChange, FieldDiff, PlanReview};
pub use table::{Column, ColumnKind, ContentTable};
