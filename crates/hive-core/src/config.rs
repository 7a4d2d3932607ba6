//! Configuration management for Hive
//!
//! This module provides configuration structures for project-level Hive
//! settings: merge pipeline policy, generation service, cost rates and the
//! local test sandbox.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{HiveError, Result};

/// Project-level Hive configuration
///
/// Loaded from `.hive/config.toml` in the project root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HiveConfig {
    /// Merge pipeline policy
    #[serde(default)]
    pub merge: MergeConfig,

    /// Generation service settings
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Sandbox pricing used by cost estimates
    #[serde(default)]
    pub cost: CostRates,

    /// Local test sandbox settings
    #[serde(default)]
    pub sandbox: SandboxConfig,
}

/// Merge pipeline policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Abort the run as soon as a critical gate fails
    #[serde(default = "default_true")]
    pub strict_mode: bool,

    /// Minimum anti-slop score (0-100) for gate 2
    #[serde(default = "default_anti_slop_threshold")]
    pub anti_slop_threshold: u32,

    /// Require every gate to pass instead of only swarm/build/intent
    #[serde(default = "default_true")]
    pub require_all_gates: bool,

    /// Apply approved change sets without waiting for an external trigger
    #[serde(default)]
    pub auto_merge: bool,

    /// Per-gate timeout in seconds
    #[serde(default = "default_gate_timeout_secs")]
    pub gate_timeout_secs: u64,
}

/// Generation service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Model identifier sent to the API
    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable containing the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Maximum tokens per response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Sandbox pricing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostRates {
    /// USD per sandbox-second
    #[serde(default = "default_sandbox_cost_per_second")]
    pub sandbox_cost_per_second: f64,

    /// Flat USD storage charge for runs with more than one sandbox
    #[serde(default = "default_storage_cost")]
    pub storage_cost: f64,
}

/// Local test sandbox settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Shell commands run inside the test sandbox after applying a change set
    #[serde(default)]
    pub check_commands: Vec<String>,
}

// Default value providers
fn default_true() -> bool {
    true
}

fn default_anti_slop_threshold() -> u32 {
    85
}

fn default_gate_timeout_secs() -> u64 {
    300
}

fn default_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_max_tokens() -> usize {
    16000
}

fn default_request_timeout_secs() -> u64 {
    600
}

fn default_sandbox_cost_per_second() -> f64 {
    0.00003
}

fn default_storage_cost() -> f64 {
    0.01
}

impl HiveConfig {
    /// Load configuration from `.hive/config.toml` or use defaults
    pub fn load_or_default(project_root: &Path) -> Result<Self> {
        let config_path = project_root.join(".hive/config.toml");

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_toml(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| HiveError::Config(format!("Failed to parse config file: {}", e)))?;
        if config.merge.gate_timeout_secs == 0 {
            return Err(HiveError::Config(
                "merge.gate_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }

    /// Write default configuration to `.hive/config.toml`
    pub fn write_default(project_root: &Path) -> Result<()> {
        let config_dir = project_root.join(".hive");
        std::fs::create_dir_all(&config_dir)?;

        let config_path = config_dir.join("config.toml");
        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| HiveError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }
}

impl MergeConfig {
    /// Per-gate time limit, never shorter than one second
    pub fn gate_timeout(&self) -> Duration {
        Duration::from_secs(self.gate_timeout_secs.max(1))
    }

    pub fn with_strict_mode(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    pub fn with_require_all_gates(mut self, require: bool) -> Self {
        self.require_all_gates = require;
        self
    }

    pub fn with_auto_merge(mut self, auto_merge: bool) -> Self {
        self.auto_merge = auto_merge;
        self
    }

    pub fn with_anti_slop_threshold(mut self, threshold: u32) -> Self {
        self.anti_slop_threshold = threshold;
        self
    }

    pub fn with_gate_timeout(mut self, timeout: Duration) -> Self {
        self.gate_timeout_secs = timeout.as_secs().max(1);
        self
    }
}

impl GenerationConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            strict_mode: default_true(),
            anti_slop_threshold: default_anti_slop_threshold(),
            require_all_gates: default_true(),
            auto_merge: false,
            gate_timeout_secs: default_gate_timeout_secs(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for CostRates {
    fn default() -> Self {
        Self {
            sandbox_cost_per_second: default_sandbox_cost_per_second(),
            storage_cost: default_storage_cost(),
        }
    }
}
