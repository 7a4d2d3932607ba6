//! Hive Planning - build mode selection and plan partitioning
//!
//! This crate decides how a run is parallelized: which sandbox topology to
//! use, what it should cost, and how a plan's tasks are dealt out to
//! sandboxes.

pub mod cost;
pub mod mode;
pub mod partition;

pub use cost::{estimate_build_cost, CostComparison, CostEstimate};
pub use mode::{
    determine_build_mode, validate_build_mode_config, BuildComplexityMetrics, BuildMode,
    BuildModeConfig, ConfigValidation, ContextStrategy, FaultTolerance, TaskDistribution,
    UserTier,
};
pub use partition::{
    assign_tasks, dispatch_within_budget, format_duration, partition_tasks, BudgetTracker,
    DispatchReport, ImplementationPlan, PlanFeature, PlanPhase, TaskOutcome,
};
