//! Merge pipeline records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Number of gates in every verification run
pub const GATES_TOTAL: usize = 7;

/// The seven verification gates, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateKind {
    Swarm,
    AntiSlop,
    Build,
    Compatibility,
    Intent,
    Visual,
    MainTest,
}

impl GateKind {
    pub const ALL: [GateKind; GATES_TOTAL] = [
        Self::Swarm,
        Self::AntiSlop,
        Self::Build,
        Self::Compatibility,
        Self::Intent,
        Self::Visual,
        Self::MainTest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Swarm => "swarm",
            Self::AntiSlop => "antislop",
            Self::Build => "build",
            Self::Compatibility => "compatibility",
            Self::Intent => "intent",
            Self::Visual => "visual",
            Self::MainTest => "maintest",
        }
    }

    /// 1-based position in the pipeline
    pub fn number(&self) -> usize {
        match self {
            Self::Swarm => 1,
            Self::AntiSlop => 2,
            Self::Build => 3,
            Self::Compatibility => 4,
            Self::Intent => 5,
            Self::Visual => 6,
            Self::MainTest => 7,
        }
    }

    /// Short message listed in `failed_checks` when this gate fails
    pub fn description(&self) -> &'static str {
        match self {
            Self::Swarm => "Verification swarm found blocking issues",
            Self::AntiSlop => "Anti-slop score below threshold",
            Self::Build => "Build check failed",
            Self::Compatibility => "Cross-sandbox compatibility issues",
            Self::Intent => "Intent contract not satisfied",
            Self::Visual => "Visual verification failed",
            Self::MainTest => "Main test sandbox replay failed",
        }
    }

    /// A failing critical gate aborts the run under strict mode
    pub fn critical(&self) -> bool {
        !matches!(self, Self::Compatibility | Self::Visual)
    }

    /// Gates that must pass when not every gate is required
    pub fn decisive(&self) -> bool {
        matches!(self, Self::Swarm | Self::Build | Self::Intent)
    }
}

impl std::fmt::Display for GateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub details: String,
    pub duration_ms: u64,
    /// Set when the gate raised or timed out instead of reaching a verdict
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    pub fn pass(details: impl Into<String>) -> Self {
        Self {
            passed: true,
            score: None,
            details: details.into(),
            duration_ms: 0,
            error: None,
        }
    }

    pub fn fail(details: impl Into<String>) -> Self {
        Self {
            passed: false,
            ..Self::pass(details)
        }
    }

    pub fn errored(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            error: Some(error.clone()),
            ..Self::fail(error)
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = duration.as_millis() as u64;
        self
    }
}

/// One slot per gate, filled in pipeline order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationChecklist {
    pub swarm: Option<CheckResult>,
    pub antislop: Option<CheckResult>,
    pub build: Option<CheckResult>,
    pub compatibility: Option<CheckResult>,
    pub intent: Option<CheckResult>,
    pub visual: Option<CheckResult>,
    pub maintest: Option<CheckResult>,
}

impl VerificationChecklist {
    pub fn get(&self, kind: GateKind) -> Option<&CheckResult> {
        match kind {
            GateKind::Swarm => self.swarm.as_ref(),
            GateKind::AntiSlop => self.antislop.as_ref(),
            GateKind::Build => self.build.as_ref(),
            GateKind::Compatibility => self.compatibility.as_ref(),
            GateKind::Intent => self.intent.as_ref(),
            GateKind::Visual => self.visual.as_ref(),
            GateKind::MainTest => self.maintest.as_ref(),
        }
    }

    pub fn set(&mut self, kind: GateKind, result: CheckResult) {
        let slot = match kind {
            GateKind::Swarm => &mut self.swarm,
            GateKind::AntiSlop => &mut self.antislop,
            GateKind::Build => &mut self.build,
            GateKind::Compatibility => &mut self.compatibility,
            GateKind::Intent => &mut self.intent,
            GateKind::Visual => &mut self.visual,
            GateKind::MainTest => &mut self.maintest,
        };
        *slot = Some(result);
    }

    /// Filled slots in pipeline order
    pub fn results(&self) -> impl Iterator<Item = (GateKind, &CheckResult)> {
        GateKind::ALL
            .into_iter()
            .filter_map(move |kind| self.get(kind).map(|r| (kind, r)))
    }

    pub fn completed(&self) -> usize {
        self.results().count()
    }

    pub fn passed(&self, kind: GateKind) -> bool {
        self.get(kind).is_some_and(|r| r.passed)
    }

    pub fn all_passed(&self) -> bool {
        GateKind::ALL.iter().all(|kind| self.passed(*kind))
    }

    pub fn failed(&self) -> impl Iterator<Item = GateKind> + '_ {
        self.results()
            .filter(|(_, r)| !r.passed)
            .map(|(kind, _)| kind)
    }
}

/// Merge run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeState {
    Pending,
    Verifying,
    Approved,
    Rejected,
    Merging,
    Completed,
    Failed,
}

impl MergeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Verifying => "verifying",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Merging => "merging",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// A run is in flight while verifying or merging
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Verifying | Self::Merging)
    }

    /// No further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for MergeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live status of a merge run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeStatus {
    pub id: String,
    pub status: MergeState,
    pub current_gate: Option<GateKind>,
    pub gates_completed: usize,
    pub gates_total_count: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl MergeStatus {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: MergeState::Pending,
            current_gate: None,
            gates_completed: 0,
            gates_total_count: GATES_TOTAL,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }
}

/// Final outcome of a merge run, retained for audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeResult {
    pub success: bool,
    /// Paths applied to the target; empty until the change set is merged
    pub merged_files: Vec<String>,
    pub failed_checks: Option<Vec<String>>,
    pub verification_results: VerificationChecklist,
    pub merge_duration_ms: u64,
    /// Gates evaluated in this run
    pub gates_passed: usize,
    /// Gates that reported a pass
    pub gates_succeeded: usize,
    pub gates_total_count: usize,
    pub main_test_sandbox_id: Option<String>,
}
