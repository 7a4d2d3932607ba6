//! External collaborators of the merge pipeline
//!
//! The controller only talks to these traits. `RuleBasedSwarm` and
//! `RuleBasedSlopDetector` are deterministic local stand-ins built on the
//! content rules, used by the CLI when no remote services are configured.

use async_trait::async_trait;
use hive_core::{language_from_path, FileChange, IntentContract, MergeRequest, Result};
use hive_validation::scan_content;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{MergeResult, MergeStatus};

/// Path to content, in path order
pub type FileContents = BTreeMap<String, String>;

/// Contents of every file the request creates or modifies
pub fn file_contents(files: &[FileChange]) -> FileContents {
    files
        .iter()
        .filter(|f| f.action != hive_core::FileAction::Delete)
        .map(|f| (f.path.clone(), f.content.clone()))
        .collect()
}

/// The feature a change set claims to implement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureUnderReview {
    pub request_id: String,
    pub task_id: String,
    pub sandbox_id: String,
    pub intent_contract: Option<IntentContract>,
}

impl FeatureUnderReview {
    pub fn from_request(request: &MergeRequest) -> Self {
        Self {
            request_id: request.id.clone(),
            task_id: request.task_id.clone(),
            sandbox_id: request.sandbox_id.clone(),
            intent_contract: request.intent_contract.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmVerdict {
    pub all_passed: bool,
    pub verdict: String,
    pub overall_score: f64,
    #[serde(default)]
    pub blockers: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AntiSlopScore {
    pub overall: f64,
    pub passes_threshold: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxCheckReport {
    pub passed: bool,
    pub output: String,
}

/// Multi-agent review of a feature's files
#[async_trait]
pub trait VerificationSwarm: Send + Sync {
    async fn verify_feature(
        &self,
        feature: &FeatureUnderReview,
        files: &FileContents,
    ) -> Result<SwarmVerdict>;
}

/// Scores generated code for placeholder and low-effort output
#[async_trait]
pub trait AntiSlopDetector: Send + Sync {
    async fn analyze(&self, files: &FileContents) -> Result<AntiSlopScore>;
}

/// Isolated sandboxes used to replay a change set before merging
#[async_trait]
pub trait TestSandboxProvider: Send + Sync {
    /// Create a sandbox cloned from the merge target; returns its id
    async fn create(&self, request: &MergeRequest) -> Result<String>;

    async fn apply_changes(&self, sandbox_id: &str, files: &[FileChange]) -> Result<()>;

    async fn run_checks(&self, sandbox_id: &str) -> Result<SandboxCheckReport>;

    async fn destroy(&self, sandbox_id: &str) -> Result<()>;
}

/// Where approved change sets land
#[async_trait]
pub trait MergeTarget: Send + Sync {
    /// Apply the request's file changes; returns the paths written or removed
    async fn apply(&self, request: &MergeRequest) -> Result<Vec<String>>;
}

/// Write-behind persistence for merge records
#[async_trait]
pub trait MergeStore: Send + Sync {
    async fn persist(&self, status: &MergeStatus, result: Option<&MergeResult>) -> Result<()>;
}

/// Points deducted from 100 per content-rule finding
const SLOP_PENALTY: f64 = 5.0;

/// Anti-slop score derived from the artifact content rules
#[derive(Debug, Clone, Copy)]
pub struct RuleBasedSlopDetector {
    threshold: f64,
}

impl RuleBasedSlopDetector {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: f64::from(threshold),
        }
    }
}

impl Default for RuleBasedSlopDetector {
    fn default() -> Self {
        Self::new(85)
    }
}

#[async_trait]
impl AntiSlopDetector for RuleBasedSlopDetector {
    async fn analyze(&self, files: &FileContents) -> Result<AntiSlopScore> {
        let findings: usize = files
            .iter()
            .map(|(path, content)| scan_content(content, language_from_path(path)).len())
            .sum();
        let overall = (100.0 - SLOP_PENALTY * findings as f64).max(0.0);
        Ok(AntiSlopScore {
            overall,
            passes_threshold: overall >= self.threshold,
        })
    }
}

/// Review that blocks on any content-rule finding
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedSwarm;

#[async_trait]
impl VerificationSwarm for RuleBasedSwarm {
    async fn verify_feature(
        &self,
        _feature: &FeatureUnderReview,
        files: &FileContents,
    ) -> Result<SwarmVerdict> {
        let blockers: Vec<String> = files
            .iter()
            .flat_map(|(path, content)| {
                scan_content(content, language_from_path(path))
                    .into_iter()
                    .map(move |issue| format!("{}: {}", path, issue.display_message()))
            })
            .collect();

        let all_passed = blockers.is_empty();
        let checked = files.len().max(1) as f64;
        let overall_score = 100.0 * (1.0 - (blockers.len() as f64 / checked).min(1.0));
        Ok(SwarmVerdict {
            all_passed,
            verdict: if all_passed { "approved" } else { "blocked" }.to_string(),
            overall_score,
            blockers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(entries: &[(&str, &str)]) -> FileContents {
        entries
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect()
    }

    #[test]
    fn test_file_contents_skips_deletions() {
        let files = vec![
            FileChange::create("src/a.ts", "a"),
            FileChange::delete("src/old.ts"),
            FileChange::modify("src/b.ts", "b"),
        ];
        let map = file_contents(&files);
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["src/a.ts", "src/b.ts"]);
    }

    #[tokio::test]
    async fn test_slop_detector_penalizes_findings() {
        let detector = RuleBasedSlopDetector::new(85);

        let clean = detector
            .analyze(&contents(&[("src/a.ts", "export const a = 1;\n")]))
            .await
            .unwrap();
        assert_eq!(clean.overall, 100.0);
        assert!(clean.passes_threshold);

        let sloppy = detector
            .analyze(&contents(&[
                ("src/a.ts", "// TODO: real data\n// FIXME: later\n"),
                ("src/b.ts", "const url = 'https://example.com';\nconst x: any = 1;\n"),
            ]))
            .await
            .unwrap();
        assert!(sloppy.overall < 85.0);
        assert!(!sloppy.passes_threshold);
    }

    #[tokio::test]
    async fn test_rule_swarm_lists_blockers() {
        let feature = FeatureUnderReview {
            request_id: "mr-1".to_string(),
            task_id: "t-1".to_string(),
            sandbox_id: "sb-1".to_string(),
            intent_contract: None,
        };

        let verdict = RuleBasedSwarm
            .verify_feature(&feature, &contents(&[("src/a.ts", "// TODO: wire up\n")]))
            .await
            .unwrap();
        assert!(!verdict.all_passed);
        assert_eq!(verdict.verdict, "blocked");
        assert!(verdict.blockers[0].starts_with("src/a.ts: "));

        let verdict = RuleBasedSwarm
            .verify_feature(&feature, &contents(&[("README.md", "# Users\n")]))
            .await
            .unwrap();
        assert!(verdict.all_passed);
        assert_eq!(verdict.overall_score, 100.0);
    }
}
