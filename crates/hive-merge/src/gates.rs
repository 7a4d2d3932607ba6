//! The seven verification gates
//!
//! Gates run in the order returned by `standard_gates`. Each one turns a
//! change set into a `CheckResult`; an `Err` means the gate could not reach
//! a verdict and is recorded as `CheckResult.error` by the controller.

use async_trait::async_trait;
use hive_core::{FileAction, MergeConfig, MergeRequest, Result};
use hive_validation::{find_unstyled_components, scan_anti_patterns, scan_build_blockers};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::services::{
    AntiSlopDetector, FeatureUnderReview, FileContents, TestSandboxProvider, VerificationSwarm,
};
use crate::types::{CheckResult, GateKind};

/// Inputs shared by every gate of one run
pub struct GateContext<'a> {
    pub request: &'a MergeRequest,
    pub files: FileContents,
    pub config: &'a MergeConfig,
    test_sandbox_id: Mutex<Option<String>>,
}

impl<'a> GateContext<'a> {
    pub fn new(request: &'a MergeRequest, files: FileContents, config: &'a MergeConfig) -> Self {
        Self {
            request,
            files,
            config,
            test_sandbox_id: Mutex::new(None),
        }
    }

    fn file_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(p, c)| (p.as_str(), c.as_str()))
    }

    /// Remember the sandbox created for the replay so it can be torn down
    pub fn record_test_sandbox(&self, id: impl Into<String>) {
        if let Ok(mut slot) = self.test_sandbox_id.lock() {
            *slot = Some(id.into());
        }
    }

    pub fn test_sandbox_id(&self) -> Option<String> {
        self.test_sandbox_id.lock().ok().and_then(|slot| slot.clone())
    }
}

#[async_trait]
pub trait Gate: Send + Sync {
    fn kind(&self) -> GateKind;

    /// Under strict mode a failing critical gate ends the run
    fn critical(&self) -> bool {
        self.kind().critical()
    }

    async fn run(&self, ctx: &GateContext<'_>) -> Result<CheckResult>;
}

fn summarize(findings: &[String]) -> String {
    findings.join("; ")
}

/// Gate 1: external multi-agent review
pub struct SwarmGate {
    swarm: Arc<dyn VerificationSwarm>,
}

impl SwarmGate {
    pub fn new(swarm: Arc<dyn VerificationSwarm>) -> Self {
        Self { swarm }
    }
}

#[async_trait]
impl Gate for SwarmGate {
    fn kind(&self) -> GateKind {
        GateKind::Swarm
    }

    async fn run(&self, ctx: &GateContext<'_>) -> Result<CheckResult> {
        let feature = FeatureUnderReview::from_request(ctx.request);
        let verdict = self.swarm.verify_feature(&feature, &ctx.files).await?;

        let details = if verdict.blockers.is_empty() {
            verdict.verdict.clone()
        } else {
            format!("{}: {}", verdict.verdict, summarize(&verdict.blockers))
        };
        let result = if verdict.all_passed {
            CheckResult::pass(details)
        } else {
            CheckResult::fail(details)
        };
        Ok(result.with_score(verdict.overall_score))
    }
}

/// Gate 2: anti-slop score against the configured threshold
pub struct AntiSlopGate {
    detector: Arc<dyn AntiSlopDetector>,
}

impl AntiSlopGate {
    pub fn new(detector: Arc<dyn AntiSlopDetector>) -> Self {
        Self { detector }
    }
}

#[async_trait]
impl Gate for AntiSlopGate {
    fn kind(&self) -> GateKind {
        GateKind::AntiSlop
    }

    async fn run(&self, ctx: &GateContext<'_>) -> Result<CheckResult> {
        let score = self.detector.analyze(&ctx.files).await?;
        let threshold = f64::from(ctx.config.anti_slop_threshold);
        let details = format!("Anti-slop score {:.1} (threshold {})", score.overall, threshold);

        let result = if score.overall >= threshold {
            CheckResult::pass(details)
        } else {
            CheckResult::fail(details)
        };
        Ok(result.with_score(score.overall))
    }
}

/// Gate 3: static scan for compiler suppressions and untyped code
pub struct BuildGate;

#[async_trait]
impl Gate for BuildGate {
    fn kind(&self) -> GateKind {
        GateKind::Build
    }

    async fn run(&self, ctx: &GateContext<'_>) -> Result<CheckResult> {
        let findings: Vec<String> = ctx
            .file_pairs()
            .flat_map(|(path, content)| scan_build_blockers(path, content))
            .collect();

        if findings.is_empty() {
            Ok(CheckResult::pass(format!("{} file(s) clean", ctx.files.len())))
        } else {
            Ok(CheckResult::fail(summarize(&findings)))
        }
    }
}

/// Gate 4: changes that could break other sandboxes' work
pub struct CompatibilityGate;

#[async_trait]
impl Gate for CompatibilityGate {
    fn kind(&self) -> GateKind {
        GateKind::Compatibility
    }

    async fn run(&self, ctx: &GateContext<'_>) -> Result<CheckResult> {
        let mut findings = Vec::new();
        let mut seen = HashSet::new();

        for change in &ctx.request.files {
            if change.action == FileAction::Delete {
                findings.push(format!("{}: deletes a file other features may use", change.path));
            }
            if !seen.insert(change.path.as_str()) {
                findings.push(format!("{}: changed more than once", change.path));
            }
        }

        if findings.is_empty() {
            Ok(CheckResult::pass("No destructive changes"))
        } else {
            Ok(CheckResult::fail(summarize(&findings)))
        }
    }
}

/// Gate 5: the change set must avoid the contract's anti-patterns
pub struct IntentGate;

#[async_trait]
impl Gate for IntentGate {
    fn kind(&self) -> GateKind {
        GateKind::Intent
    }

    async fn run(&self, ctx: &GateContext<'_>) -> Result<CheckResult> {
        let Some(contract) = &ctx.request.intent_contract else {
            return Ok(CheckResult::pass("No intent contract"));
        };

        let findings = scan_anti_patterns(contract, ctx.file_pairs());
        if findings.is_empty() {
            Ok(CheckResult::pass(format!("Intent contract {} satisfied", contract.id)))
        } else {
            Ok(CheckResult::fail(summarize(&findings)))
        }
    }
}

/// Gate 6: UI components must carry styling
pub struct VisualGate;

#[async_trait]
impl Gate for VisualGate {
    fn kind(&self) -> GateKind {
        GateKind::Visual
    }

    async fn run(&self, ctx: &GateContext<'_>) -> Result<CheckResult> {
        let unstyled = find_unstyled_components(ctx.file_pairs());
        if unstyled.is_empty() {
            Ok(CheckResult::pass("All UI components styled"))
        } else {
            Ok(CheckResult::fail(format!(
                "Unstyled components: {}",
                unstyled.join(", ")
            )))
        }
    }
}

/// Gate 7: replay the change set in an isolated clone of the target
pub struct MainTestGate {
    sandboxes: Arc<dyn TestSandboxProvider>,
}

impl MainTestGate {
    pub fn new(sandboxes: Arc<dyn TestSandboxProvider>) -> Self {
        Self { sandboxes }
    }
}

#[async_trait]
impl Gate for MainTestGate {
    fn kind(&self) -> GateKind {
        GateKind::MainTest
    }

    async fn run(&self, ctx: &GateContext<'_>) -> Result<CheckResult> {
        let sandbox_id = self.sandboxes.create(ctx.request).await?;
        ctx.record_test_sandbox(&sandbox_id);
        debug!("Replaying {} in test sandbox {}", ctx.request.id, sandbox_id);

        self.sandboxes
            .apply_changes(&sandbox_id, &ctx.request.files)
            .await?;
        let report = self.sandboxes.run_checks(&sandbox_id).await?;

        let details = if report.output.is_empty() {
            format!("Replayed in {}", sandbox_id)
        } else {
            format!("Replayed in {}: {}", sandbox_id, report.output)
        };
        if report.passed {
            Ok(CheckResult::pass(details))
        } else {
            Ok(CheckResult::fail(details))
        }
    }
}

/// The seven gates in pipeline order
pub fn standard_gates(
    swarm: Arc<dyn VerificationSwarm>,
    detector: Arc<dyn AntiSlopDetector>,
    sandboxes: Arc<dyn TestSandboxProvider>,
) -> Vec<Box<dyn Gate>> {
    vec![
        Box::new(SwarmGate::new(swarm)),
        Box::new(AntiSlopGate::new(detector)),
        Box::new(BuildGate),
        Box::new(CompatibilityGate),
        Box::new(IntentGate),
        Box::new(VisualGate),
        Box::new(MainTestGate::new(sandboxes)),
    ]
}
