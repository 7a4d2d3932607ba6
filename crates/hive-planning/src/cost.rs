//! Build cost estimation
//!
//! Estimates are advisory. The baseline comparison exists for display only and
//! never feeds back into mode selection.

use hive_core::CostRates;
use serde::{Deserialize, Serialize};

use crate::mode::{BuildMode, BuildModeConfig};
use crate::partition::format_duration;

/// Sandbox count of the naive parallel baseline
const NAIVE_MULTI_SANDBOXES: usize = 5;

/// What the same run would cost under naive topologies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostComparison {
    /// One sandbox for the whole run
    pub single_sandbox: f64,
    /// Five sandboxes each running for the whole duration
    pub naive_multi_sandbox: f64,
    /// Savings of this estimate relative to the naive multi-sandbox baseline
    pub savings_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub sandbox_cost: f64,
    pub storage_cost: f64,
    pub total_cost: f64,
    pub explanation: String,
    pub comparison: CostComparison,
}

/// Estimate what a run costs under `config`
///
/// Parallel modes spread the work over `min(sandbox_count, max_agents)`
/// sandboxes, so each one runs for a fraction of the total time. The result is
/// non-decreasing in `estimated_minutes`.
pub fn estimate_build_cost(
    config: &BuildModeConfig,
    estimated_minutes: f64,
    rates: &CostRates,
) -> CostEstimate {
    let total_seconds = estimated_minutes.max(0.0) * 60.0;
    let sandboxes = config.sandbox_count.max(1);
    let rate = rates.sandbox_cost_per_second;

    let effective_seconds = match config.mode {
        BuildMode::SingleSandbox => total_seconds,
        BuildMode::MultiSandbox | BuildMode::Tournament => {
            let parallelism = sandboxes.min(config.max_agents).max(1);
            total_seconds / parallelism as f64
        }
    };

    let sandbox_cost = sandboxes as f64 * effective_seconds * rate;
    let storage_cost = if config.is_parallel() {
        rates.storage_cost
    } else {
        0.0
    };
    let total_cost = sandbox_cost + storage_cost;

    let single_sandbox = total_seconds * rate;
    let naive_multi_sandbox = NAIVE_MULTI_SANDBOXES as f64 * total_seconds * rate;
    let savings_percent = if naive_multi_sandbox > 0.0 {
        (naive_multi_sandbox - total_cost) / naive_multi_sandbox * 100.0
    } else {
        0.0
    };

    let explanation = match config.mode {
        BuildMode::SingleSandbox => format!(
            "1 sandbox running {} at ${}/s",
            format_duration(total_seconds),
            rate
        ),
        _ => format!(
            "{} {} sandboxes running {} each at ${}/s, plus ${:.2} shared storage",
            sandboxes,
            config.mode,
            format_duration(effective_seconds),
            rate,
            storage_cost
        ),
    };

    CostEstimate {
        sandbox_cost,
        storage_cost,
        total_cost,
        explanation,
        comparison: CostComparison {
            single_sandbox,
            naive_multi_sandbox,
            savings_percent,
        },
    }
}
