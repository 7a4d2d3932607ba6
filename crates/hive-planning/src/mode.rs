//! Build mode selection
//!
//! Chooses a sandbox topology for a run from its complexity metrics. Most runs
//! land in a single sandbox; large plans and long runs on paid tiers fan out
//! to several sandboxes sharing context over a pub/sub channel; tournament
//! runs get one sandbox per competing implementation.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Upper bound on sandboxes for any run
pub const MAX_SANDBOXES: usize = 10;

/// Agents above this count per run trigger a validation warning
pub const MAX_RECOMMENDED_AGENTS: usize = 10;

/// Sandbox topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildMode {
    SingleSandbox,
    MultiSandbox,
    Tournament,
}

impl std::fmt::Display for BuildMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SingleSandbox => write!(f, "single-sandbox"),
            Self::MultiSandbox => write!(f, "multi-sandbox"),
            Self::Tournament => write!(f, "tournament"),
        }
    }
}

impl std::str::FromStr for BuildMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single-sandbox" | "single" => Ok(Self::SingleSandbox),
            "multi-sandbox" | "multi" => Ok(Self::MultiSandbox),
            "tournament" => Ok(Self::Tournament),
            _ => Err(format!("Invalid build mode: {}", s)),
        }
    }
}

/// How agents share context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContextStrategy {
    /// In-process memory, only reachable inside one sandbox
    LocalMemory,
    /// Pub/sub channel spanning sandboxes
    RedisPubsub,
}

impl std::fmt::Display for ContextStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LocalMemory => write!(f, "local-memory"),
            Self::RedisPubsub => write!(f, "redis-pubsub"),
        }
    }
}

/// How tasks are spread over sandboxes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskDistribution {
    AllInOne,
    ByPhase,
    ByFeature,
    /// Every sandbox builds the whole plan; the best result wins
    Competitive,
}

/// Recovery behavior when a sandbox fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultTolerance {
    Retry,
    Failover,
    Redundant,
}

/// Account tier of the user starting the run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserTier {
    #[default]
    Free,
    Pro,
    Team,
    Enterprise,
}

impl std::fmt::Display for UserTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Pro => write!(f, "pro"),
            Self::Team => write!(f, "team"),
            Self::Enterprise => write!(f, "enterprise"),
        }
    }
}

impl std::str::FromStr for UserTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "pro" => Ok(Self::Pro),
            "team" => Ok(Self::Team),
            "enterprise" => Ok(Self::Enterprise),
            _ => Err(format!("Invalid user tier: {}", s)),
        }
    }
}

/// Read-only input to mode selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildComplexityMetrics {
    pub task_count: usize,
    pub feature_count: usize,
    pub estimated_duration_minutes: f64,
    #[serde(default)]
    pub has_visual_intents: bool,
    #[serde(default)]
    pub has_tournament_mode: bool,
    #[serde(default)]
    pub user_tier: UserTier,
}

impl BuildComplexityMetrics {
    pub fn new(task_count: usize, feature_count: usize, estimated_duration_minutes: f64) -> Self {
        Self {
            task_count,
            feature_count,
            estimated_duration_minutes,
            has_visual_intents: false,
            has_tournament_mode: false,
            user_tier: UserTier::Free,
        }
    }

    pub fn with_tier(mut self, tier: UserTier) -> Self {
        self.user_tier = tier;
        self
    }

    pub fn with_tournament(mut self, tournament: bool) -> Self {
        self.has_tournament_mode = tournament;
        self
    }

    pub fn with_visual_intents(mut self, visual: bool) -> Self {
        self.has_visual_intents = visual;
        self
    }
}

/// Selected topology for a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildModeConfig {
    pub mode: BuildMode,
    pub max_agents: usize,
    pub sandbox_count: usize,
    pub context_strategy: ContextStrategy,
    pub use_shared_volume: bool,
    pub use_memory_snapshots: bool,
    pub task_distribution: TaskDistribution,
    pub fault_tolerance: FaultTolerance,
}

impl BuildModeConfig {
    /// One sandbox, agents share in-process memory
    pub fn single_sandbox() -> Self {
        Self {
            mode: BuildMode::SingleSandbox,
            max_agents: 5,
            sandbox_count: 1,
            context_strategy: ContextStrategy::LocalMemory,
            use_shared_volume: false,
            use_memory_snapshots: false,
            task_distribution: TaskDistribution::AllInOne,
            fault_tolerance: FaultTolerance::Retry,
        }
    }

    /// Several sandboxes splitting the plan by phase
    pub fn multi_sandbox(sandbox_count: usize) -> Self {
        Self {
            mode: BuildMode::MultiSandbox,
            max_agents: 10,
            sandbox_count,
            context_strategy: ContextStrategy::RedisPubsub,
            use_shared_volume: true,
            use_memory_snapshots: false,
            task_distribution: TaskDistribution::ByPhase,
            fault_tolerance: FaultTolerance::Failover,
        }
    }

    /// One sandbox per competing implementation
    pub fn tournament(competitors: usize) -> Self {
        Self {
            mode: BuildMode::Tournament,
            max_agents: competitors,
            sandbox_count: competitors,
            context_strategy: ContextStrategy::RedisPubsub,
            use_shared_volume: true,
            use_memory_snapshots: false,
            task_distribution: TaskDistribution::Competitive,
            fault_tolerance: FaultTolerance::Redundant,
        }
    }

    pub fn with_memory_snapshots(mut self, enabled: bool) -> Self {
        self.use_memory_snapshots = enabled;
        self
    }

    pub fn is_parallel(&self) -> bool {
        self.mode != BuildMode::SingleSandbox
    }
}

/// Choose a topology; the first matching rule wins
pub fn determine_build_mode(metrics: &BuildComplexityMetrics) -> BuildModeConfig {
    let (config, reason) = if metrics.has_tournament_mode {
        let competitors = if metrics.user_tier == UserTier::Enterprise {
            5
        } else {
            3
        };
        (BuildModeConfig::tournament(competitors), "tournament requested")
    } else if metrics.feature_count >= 100 || metrics.task_count >= 50 {
        let sandboxes = metrics.task_count.div_ceil(10).clamp(1, MAX_SANDBOXES);
        (BuildModeConfig::multi_sandbox(sandboxes), "large plan")
    } else if metrics.estimated_duration_minutes >= 30.0 && metrics.user_tier != UserTier::Free {
        (BuildModeConfig::multi_sandbox(3), "long run on paid tier")
    } else {
        (BuildModeConfig::single_sandbox(), "default")
    };

    let config = config.with_memory_snapshots(metrics.has_visual_intents);

    debug!(
        "Selected {} with {} sandbox(es) ({}): tasks={} features={} minutes={:.1} tier={}",
        config.mode,
        config.sandbox_count,
        reason,
        metrics.task_count,
        metrics.feature_count,
        metrics.estimated_duration_minutes,
        metrics.user_tier
    );

    config
}

/// Outcome of [`validate_build_mode_config`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Check a config before starting a run
///
/// Problems are reported, never raised, so the caller can fix and retry.
pub fn validate_build_mode_config(config: &BuildModeConfig) -> ConfigValidation {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if !(1..=MAX_SANDBOXES).contains(&config.sandbox_count) {
        errors.push(format!(
            "sandbox_count must be between 1 and {} (got {})",
            MAX_SANDBOXES, config.sandbox_count
        ));
    }

    match config.mode {
        BuildMode::MultiSandbox if config.context_strategy != ContextStrategy::RedisPubsub => {
            errors.push(format!(
                "multi-sandbox mode requires redis-pubsub context (got {})",
                config.context_strategy
            ));
        }
        BuildMode::Tournament if config.sandbox_count < 2 => {
            errors.push(format!(
                "tournament mode requires at least 2 sandboxes (got {})",
                config.sandbox_count
            ));
        }
        BuildMode::SingleSandbox if config.context_strategy == ContextStrategy::RedisPubsub => {
            warnings.push(
                "single-sandbox mode with redis-pubsub context adds overhead; local-memory is sufficient"
                    .to_string(),
            );
        }
        _ => {}
    }

    if config.max_agents > MAX_RECOMMENDED_AGENTS {
        warnings.push(format!(
            "max_agents {} exceeds recommended maximum of {}",
            config.max_agents, MAX_RECOMMENDED_AGENTS
        ));
    }

    ConfigValidation {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}
