//! Implementation plan partitioning
//!
//! Turns a plan of phases (or, lacking phases, features) into tasks and deals
//! them out to sandboxes.

use hive_core::Task;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{debug, warn};

use crate::mode::{BuildComplexityMetrics, UserTier};

const VISUAL_KEYWORDS: &[&str] = &[
    "ui", "visual", "design", "layout", "style", "theme", "animation", "component", "page",
    "screen",
];

/// A phase of an implementation plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanPhase {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    /// Names of features built in this phase
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// A feature of an implementation plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanFeature {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    /// Paths the feature is expected to touch
    #[serde(default)]
    pub files: Vec<String>,
}

/// Phases and features to build
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplementationPlan {
    #[serde(default)]
    pub phases: Vec<PlanPhase>,
    #[serde(default)]
    pub features: Vec<PlanFeature>,
}

impl ImplementationPlan {
    pub fn from_json(json: &str) -> hive_core::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    fn mentions_visual_work(&self) -> bool {
        let phase_text = self
            .phases
            .iter()
            .flat_map(|p| [p.name.as_deref().unwrap_or(""), p.description.as_str()]);
        let feature_text = self
            .features
            .iter()
            .flat_map(|f| [f.name.as_deref().unwrap_or(""), f.description.as_str()]);

        phase_text
            .chain(feature_text)
            .any(|text| has_visual_keyword(text))
    }
}

fn has_visual_keyword(text: &str) -> bool {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| VISUAL_KEYWORDS.contains(&word))
}

/// Split a plan into tasks
///
/// One task per phase; when the plan has no phases, one task per feature.
/// Missing ids default to `phase-{index}` / `feature-{index}`.
pub fn partition_tasks(plan: &ImplementationPlan) -> Vec<Task> {
    if !plan.phases.is_empty() {
        return plan
            .phases
            .iter()
            .enumerate()
            .map(|(idx, phase)| {
                let description = if phase.features.is_empty() {
                    phase.description.clone()
                } else if phase.description.is_empty() {
                    format!("Features: {}", phase.features.join(", "))
                } else {
                    format!("{}\n\nFeatures: {}", phase.description, phase.features.join(", "))
                };
                Task::new(
                    phase.id.clone().unwrap_or_else(|| format!("phase-{}", idx)),
                    phase.name.clone().unwrap_or_else(|| "Unnamed Phase".to_string()),
                    description,
                )
                .with_dependencies(phase.dependencies.clone())
            })
            .collect();
    }

    plan.features
        .iter()
        .enumerate()
        .map(|(idx, feature)| {
            let description = if feature.files.is_empty() {
                feature.description.clone()
            } else if feature.description.is_empty() {
                format!("Files: {}", feature.files.join(", "))
            } else {
                format!("{}\n\nFiles: {}", feature.description, feature.files.join(", "))
            };
            Task::new(
                feature.id.clone().unwrap_or_else(|| format!("feature-{}", idx)),
                feature.name.clone().unwrap_or_else(|| "Unnamed Feature".to_string()),
                description,
            )
        })
        .collect()
}

/// Deal tasks round-robin over `sandbox_count` sandboxes (0 is treated as 1)
pub fn assign_tasks(tasks: &[Task], sandbox_count: usize) -> Vec<Vec<Task>> {
    let sandbox_count = sandbox_count.max(1);
    let mut assignments = vec![Vec::new(); sandbox_count];
    for (i, task) in tasks.iter().enumerate() {
        assignments[i % sandbox_count].push(task.clone());
    }
    assignments
}

impl BuildComplexityMetrics {
    /// Derive metrics from a plan
    pub fn from_plan(
        plan: &ImplementationPlan,
        estimated_duration_minutes: f64,
        user_tier: UserTier,
        tournament: bool,
    ) -> Self {
        let phase_features: usize = plan.phases.iter().map(|p| p.features.len()).sum();
        Self {
            task_count: partition_tasks(plan).len(),
            feature_count: plan.features.len().max(phase_features),
            estimated_duration_minutes,
            has_visual_intents: plan.mentions_visual_work(),
            has_tournament_mode: tournament,
            user_tier,
        }
    }
}

/// Human-readable duration: `"12.5s"`, `"3.2m"`, `"1.5h"`, `"2.0d"`
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{:.1}s", seconds)
    } else if seconds < 3600.0 {
        format!("{:.1}m", seconds / 60.0)
    } else if seconds < 86400.0 {
        format!("{:.1}h", seconds / 3600.0)
    } else {
        format!("{:.1}d", seconds / 86400.0)
    }
}

/// Running spend against a budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetTracker {
    pub limit_usd: f64,
    #[serde(default)]
    spent_usd: f64,
}

impl BudgetTracker {
    pub fn new(limit_usd: f64) -> Self {
        Self {
            limit_usd,
            spent_usd: 0.0,
        }
    }

    /// Record a task's cost. Returns `true` once the limit is reached.
    pub fn record(&mut self, cost_usd: f64) -> bool {
        self.spent_usd += cost_usd.max(0.0);
        if self.is_exhausted() {
            warn!(
                "Budget exhausted: ${:.2} spent of ${:.2}",
                self.spent_usd,
                self.limit_usd
            );
        }
        self.is_exhausted()
    }

    pub fn spent(&self) -> f64 {
        self.spent_usd
    }

    pub fn remaining(&self) -> f64 {
        (self.limit_usd - self.spent_usd).max(0.0)
    }

    pub fn is_exhausted(&self) -> bool {
        self.spent_usd >= self.limit_usd
    }
}

impl Default for BudgetTracker {
    fn default() -> Self {
        Self::new(100.0)
    }
}

/// What running one task cost and whether it succeeded
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskOutcome {
    pub success: bool,
    pub cost_usd: f64,
}

/// Tally of a budgeted dispatch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchReport {
    pub completed: Vec<String>,
    pub failed: Vec<String>,
    /// Tasks never started because the budget ran out
    pub skipped: Vec<String>,
    pub cost_usd: f64,
    pub budget_exhausted: bool,
}

/// Run each sandbox's tasks in order, charging every outcome to `budget`
///
/// The budget is checked after each task; once it is exhausted no further
/// task is started in any sandbox and the rest are reported as skipped.
pub async fn dispatch_within_budget<F, Fut>(
    assignments: &[Vec<Task>],
    budget: &mut BudgetTracker,
    mut execute: F,
) -> DispatchReport
where
    F: FnMut(usize, Task) -> Fut,
    Fut: Future<Output = TaskOutcome>,
{
    let mut report = DispatchReport::default();

    for (sandbox, tasks) in assignments.iter().enumerate() {
        for task in tasks {
            if budget.is_exhausted() {
                report.skipped.push(task.id.clone());
                continue;
            }

            debug!("Sandbox {}: starting {}", sandbox, task.id);
            let outcome = execute(sandbox, task.clone()).await;
            report.cost_usd += outcome.cost_usd.max(0.0);
            if outcome.success {
                report.completed.push(task.id.clone());
            } else {
                report.failed.push(task.id.clone());
            }
            budget.record(outcome.cost_usd);
        }
    }

    report.budget_exhausted = budget.is_exhausted();
    if !report.skipped.is_empty() {
        warn!(
            "Budget of ${:.2} exhausted, skipped {} task(s)",
            budget.limit_usd,
            report.skipped.len()
        );
    }
    report
}
