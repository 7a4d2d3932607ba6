//! End-to-end merge pipeline scenarios

use async_trait::async_trait;
use hive_core::{
    EventBus, EventKind, FileChange, HiveError, IntentContract, MergeConfig, MergeRequest, Result,
};
use hive_merge::{
    AntiSlopDetector, AntiSlopScore, FeatureUnderReview, FileContents, GateKind,
    LocalDirectoryTarget, LocalSandboxProvider, MergeController, MergeResult, MergeState,
    MergeStatus, MergeStore, MergeTarget, SandboxCheckReport, SwarmVerdict, TestSandboxProvider,
    VerificationSwarm,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

enum SwarmMode {
    Pass,
    Error,
    Slow(Duration),
    Gated(Arc<Notify>),
}

struct FakeSwarm {
    mode: SwarmMode,
}

#[async_trait]
impl VerificationSwarm for FakeSwarm {
    async fn verify_feature(
        &self,
        _feature: &FeatureUnderReview,
        _files: &FileContents,
    ) -> Result<SwarmVerdict> {
        match &self.mode {
            SwarmMode::Pass => {}
            SwarmMode::Error => {
                return Err(HiveError::Verification("swarm unavailable".to_string()))
            }
            SwarmMode::Slow(delay) => tokio::time::sleep(*delay).await,
            SwarmMode::Gated(gate) => gate.notified().await,
        }
        Ok(SwarmVerdict {
            all_passed: true,
            verdict: "approved".to_string(),
            overall_score: 95.0,
            blockers: Vec::new(),
        })
    }
}

struct FixedScore(f64);

#[async_trait]
impl AntiSlopDetector for FixedScore {
    async fn analyze(&self, _files: &FileContents) -> Result<AntiSlopScore> {
        Ok(AntiSlopScore {
            overall: self.0,
            passes_threshold: self.0 >= 85.0,
        })
    }
}

#[derive(Default)]
struct FakeSandboxes {
    created: Mutex<Vec<String>>,
    destroyed: Mutex<Vec<String>>,
}

#[async_trait]
impl TestSandboxProvider for FakeSandboxes {
    async fn create(&self, request: &MergeRequest) -> Result<String> {
        let id = format!("test-{}", request.id);
        self.created.lock().unwrap().push(id.clone());
        Ok(id)
    }

    async fn apply_changes(&self, _sandbox_id: &str, _files: &[FileChange]) -> Result<()> {
        Ok(())
    }

    async fn run_checks(&self, _sandbox_id: &str) -> Result<SandboxCheckReport> {
        Ok(SandboxCheckReport {
            passed: true,
            output: String::new(),
        })
    }

    async fn destroy(&self, sandbox_id: &str) -> Result<()> {
        self.destroyed.lock().unwrap().push(sandbox_id.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct RecordingTarget {
    applied: Mutex<Vec<String>>,
    fail: bool,
}

#[async_trait]
impl MergeTarget for RecordingTarget {
    async fn apply(&self, request: &MergeRequest) -> Result<Vec<String>> {
        if self.fail {
            return Err(HiveError::MergeApply("target is read-only".to_string()));
        }
        let paths = request.paths();
        self.applied.lock().unwrap().extend(paths.clone());
        Ok(paths)
    }
}

#[derive(Default)]
struct RecordingStore {
    persisted: Mutex<Vec<(MergeState, bool)>>,
    fail: bool,
}

#[async_trait]
impl MergeStore for RecordingStore {
    async fn persist(&self, status: &MergeStatus, result: Option<&MergeResult>) -> Result<()> {
        if self.fail {
            return Err(HiveError::Other("database offline".to_string()));
        }
        self.persisted
            .lock()
            .unwrap()
            .push((status.status, result.is_some_and(|r| r.success)));
        Ok(())
    }
}

struct Harness {
    controller: Arc<MergeController>,
    sandboxes: Arc<FakeSandboxes>,
    target: Arc<RecordingTarget>,
}

fn harness_with(config: MergeConfig, swarm: SwarmMode, target: RecordingTarget) -> Harness {
    let sandboxes = Arc::new(FakeSandboxes::default());
    let target = Arc::new(target);
    let controller = MergeController::new(
        config,
        Arc::new(FakeSwarm { mode: swarm }),
        Arc::new(FixedScore(92.0)),
        sandboxes.clone(),
        target.clone(),
        EventBus::new(),
    );
    Harness {
        controller: Arc::new(controller),
        sandboxes,
        target,
    }
}

fn harness(config: MergeConfig) -> Harness {
    harness_with(config, SwarmMode::Pass, RecordingTarget::default())
}

fn clean_files() -> Vec<FileChange> {
    vec![
        FileChange::create("src/lib/sum.ts", "export const sum = (a: number, b: number): number => a + b;\n"),
        FileChange::create(
            "src/components/Total.tsx",
            "export const Total = ({ n }: { n: number }) => <span className=\"font-bold\">{n}</span>;\n",
        ),
    ]
}

fn request(id: &str, files: Vec<FileChange>) -> MergeRequest {
    MergeRequest::new(id, "sandbox-a", "task-1", files)
}

#[tokio::test]
async fn test_all_gates_pass_stops_at_approved() {
    let h = harness(MergeConfig::default());

    let result = h
        .controller
        .verify_and_merge(&request("mr-1", clean_files()))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.gates_passed, 7);
    assert_eq!(result.gates_succeeded, 7);
    assert_eq!(result.gates_total_count, 7);
    assert!(result.failed_checks.is_none());
    assert!(result.merged_files.is_empty());
    assert!(result.verification_results.all_passed());
    assert_eq!(result.main_test_sandbox_id.as_deref(), Some("test-mr-1"));

    let status = h.controller.get_merge_status("mr-1").await.unwrap();
    assert_eq!(status.status, MergeState::Approved);
    assert_eq!(status.gates_completed, 7);
    assert!(status.completed_at.is_none());

    assert!(h.target.applied.lock().unwrap().is_empty());
    assert_eq!(*h.sandboxes.destroyed.lock().unwrap(), vec!["test-mr-1"]);
    assert_eq!(
        h.controller.get_test_sandbox_id("mr-1").await.as_deref(),
        Some("test-mr-1")
    );
}

#[tokio::test]
async fn test_compatibility_failure_does_not_abort() {
    let h = harness(MergeConfig::default());
    let mut files = clean_files();
    files.push(FileChange::delete("src/legacy/api.ts"));

    let result = h
        .controller
        .verify_and_merge(&request("mr-2", files))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.gates_passed, 7);
    assert_eq!(result.gates_succeeded, 6);
    assert_eq!(
        result.failed_checks,
        Some(vec![GateKind::Compatibility.description().to_string()])
    );

    let status = h.controller.get_merge_status("mr-2").await.unwrap();
    assert_eq!(status.status, MergeState::Rejected);
    assert!(status.completed_at.is_some());
}

#[tokio::test]
async fn test_strict_build_failure_aborts() {
    let h = harness(MergeConfig::default());
    let files = vec![FileChange::create(
        "src/lib/sum.ts",
        "// @ts-ignore\nexport const sum = (a, b) => a + b;\n",
    )];

    let result = h
        .controller
        .verify_and_merge(&request("mr-3", files))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.gates_passed, 3);
    assert!(result.verification_results.maintest.is_none());
    assert_eq!(
        result.failed_checks,
        Some(vec![GateKind::Build.description().to_string()])
    );

    let status = h.controller.get_merge_status("mr-3").await.unwrap();
    assert_eq!(status.status, MergeState::Failed);
    assert!(status.gates_completed < 7);
    assert_eq!(status.current_gate, Some(GateKind::Build));
    assert!(status.error.unwrap().starts_with("Build check failed"));

    assert!(h.sandboxes.created.lock().unwrap().is_empty());
    assert_eq!(h.controller.get_merge_result("mr-3").await, Some(result));
}

#[tokio::test]
async fn test_strict_intent_violation_aborts_at_gate_five() {
    let h = harness(MergeConfig::default());
    let contract = IntentContract::new("ic-1", "Sessions stay server-side")
        .with_anti_patterns(vec!["localStorage".to_string()]);
    let files = vec![FileChange::create(
        "src/session.ts",
        "export const save = (t: string): void => localStorage.setItem('t', t);\n",
    )];

    let result = h
        .controller
        .verify_and_merge(&request("mr-4", files).with_intent_contract(contract))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.gates_passed, 5);
    assert!(!result.verification_results.passed(GateKind::Intent));
}

#[tokio::test]
async fn test_lenient_decision_uses_decisive_gates() {
    let config = MergeConfig::default()
        .with_strict_mode(false)
        .with_require_all_gates(false);
    let h = harness(config);
    let files = vec![
        FileChange::create("src/Card.tsx", "export const Card = () => <div>plain</div>;\n"),
        FileChange::delete("src/OldCard.tsx"),
    ];

    let result = h
        .controller
        .verify_and_merge(&request("mr-5", files))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.gates_succeeded, 5);
    assert!(!result.verification_results.passed(GateKind::Visual));
    assert!(!result.verification_results.passed(GateKind::Compatibility));
    assert_eq!(
        h.controller.get_merge_status("mr-5").await.unwrap().status,
        MergeState::Approved
    );
}

#[tokio::test]
async fn test_critical_gate_error_raises_after_recording() {
    let h = harness_with(
        MergeConfig::default(),
        SwarmMode::Error,
        RecordingTarget::default(),
    );

    let err = h
        .controller
        .verify_and_merge(&request("mr-6", clean_files()))
        .await
        .unwrap_err();

    match err {
        HiveError::GateAborted { gate, message } => {
            assert_eq!(gate, "swarm");
            assert!(message.contains("swarm unavailable"));
        }
        other => panic!("unexpected error {:?}", other),
    }

    let status = h.controller.get_merge_status("mr-6").await.unwrap();
    assert_eq!(status.status, MergeState::Failed);
    assert_eq!(status.gates_completed, 1);
    assert!(status.error.is_some());

    let result = h.controller.get_merge_result("mr-6").await.unwrap();
    let swarm = result.verification_results.swarm.unwrap();
    assert!(swarm.error.unwrap().contains("swarm unavailable"));
}

#[tokio::test]
async fn test_gate_error_is_recorded_when_not_strict() {
    let h = harness_with(
        MergeConfig::default().with_strict_mode(false),
        SwarmMode::Error,
        RecordingTarget::default(),
    );

    let result = h
        .controller
        .verify_and_merge(&request("mr-7", clean_files()))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.gates_passed, 7);
    assert_eq!(
        result.failed_checks,
        Some(vec![GateKind::Swarm.description().to_string()])
    );
    assert!(result.verification_results.swarm.unwrap().error.is_some());
}

#[tokio::test]
async fn test_gate_timeout_becomes_error() {
    let config = MergeConfig::default()
        .with_strict_mode(false)
        .with_gate_timeout(Duration::from_secs(1));
    let h = harness_with(
        config,
        SwarmMode::Slow(Duration::from_secs(30)),
        RecordingTarget::default(),
    );

    let result = h
        .controller
        .verify_and_merge(&request("mr-8", clean_files()))
        .await
        .unwrap();

    let swarm = result.verification_results.swarm.unwrap();
    assert!(!swarm.passed);
    assert!(swarm.error.unwrap().contains("timed out"));
    assert_eq!(result.gates_passed, 7);
}

#[tokio::test]
async fn test_auto_merge_completes() {
    let h = harness(MergeConfig::default().with_auto_merge(true));

    let result = h
        .controller
        .verify_and_merge(&request("mr-9", clean_files()))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(
        result.merged_files,
        vec!["src/lib/sum.ts", "src/components/Total.tsx"]
    );
    assert_eq!(*h.target.applied.lock().unwrap(), result.merged_files);

    let status = h.controller.get_merge_status("mr-9").await.unwrap();
    assert_eq!(status.status, MergeState::Completed);
    assert!(status.completed_at.is_some());
}

#[tokio::test]
async fn test_failed_apply_marks_run_failed() {
    let h = harness_with(
        MergeConfig::default().with_auto_merge(true),
        SwarmMode::Pass,
        RecordingTarget {
            fail: true,
            ..RecordingTarget::default()
        },
    );

    let err = h
        .controller
        .verify_and_merge(&request("mr-10", clean_files()))
        .await
        .unwrap_err();
    assert!(matches!(err, HiveError::MergeApply(_)));

    let status = h.controller.get_merge_status("mr-10").await.unwrap();
    assert_eq!(status.status, MergeState::Failed);
    assert!(status.error.unwrap().contains("read-only"));
    assert!(!h.controller.get_merge_result("mr-10").await.unwrap().success);
}

#[tokio::test]
async fn test_complete_merge_applies_approved_run() {
    let h = harness(MergeConfig::default());
    h.controller
        .verify_and_merge(&request("mr-11", clean_files()))
        .await
        .unwrap();

    let result = h.controller.complete_merge("mr-11").await.unwrap();
    assert!(result.success);
    assert_eq!(result.merged_files.len(), 2);
    assert_eq!(
        h.controller.get_merge_status("mr-11").await.unwrap().status,
        MergeState::Completed
    );

    let history = h.controller.get_merge_history("mr-11").await;
    assert_eq!(history, vec![result]);

    let err = h.controller.complete_merge("mr-11").await.unwrap_err();
    assert!(matches!(err, HiveError::InvalidTransition(_)));
    let err = h.controller.complete_merge("unknown").await.unwrap_err();
    assert!(matches!(err, HiveError::MergeNotFound(_)));
}

#[tokio::test]
async fn test_unknown_id_reads_are_none_and_stable() {
    let h = harness(MergeConfig::default());
    assert!(h.controller.get_merge_status("nope").await.is_none());
    assert!(h.controller.get_merge_result("nope").await.is_none());
    assert!(h.controller.get_test_sandbox_id("nope").await.is_none());
    assert!(h.controller.get_merge_history("nope").await.is_empty());

    h.controller
        .verify_and_merge(&request("mr-12", clean_files()))
        .await
        .unwrap();
    assert_eq!(
        h.controller.get_merge_status("mr-12").await,
        h.controller.get_merge_status("mr-12").await
    );
    assert_eq!(
        h.controller.get_merge_result("mr-12").await,
        h.controller.get_merge_result("mr-12").await
    );
}

#[tokio::test]
async fn test_history_keeps_every_run() {
    let h = harness(MergeConfig::default());
    let blocked = vec![FileChange::create("src/a.ts", "// @ts-nocheck\nexport {};\n")];

    h.controller
        .verify_and_merge(&request("mr-13", blocked))
        .await
        .unwrap();
    h.controller
        .verify_and_merge(&request("mr-13", clean_files()))
        .await
        .unwrap();

    let history = h.controller.get_merge_history("mr-13").await;
    assert_eq!(history.len(), 2);
    assert!(!history[0].success);
    assert!(history[1].success);
}

#[tokio::test]
async fn test_concurrent_run_for_same_id_is_rejected() {
    let gate = Arc::new(Notify::new());
    let h = harness_with(
        MergeConfig::default(),
        SwarmMode::Gated(Arc::clone(&gate)),
        RecordingTarget::default(),
    );

    let first = {
        let controller = Arc::clone(&h.controller);
        tokio::spawn(async move {
            controller
                .verify_and_merge(&request("mr-14", clean_files()))
                .await
        })
    };
    loop {
        let status = h.controller.get_merge_status("mr-14").await;
        if status.is_some_and(|s| s.status == MergeState::Verifying) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let err = h
        .controller
        .verify_and_merge(&request("mr-14", clean_files()))
        .await
        .unwrap_err();
    assert!(matches!(err, HiveError::MergeInProgress(_)));

    gate.notify_one();
    assert!(first.await.unwrap().unwrap().success);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_same_id_calls_admit_exactly_one() {
    for round in 0..200 {
        let gate = Arc::new(Notify::new());
        let h = harness_with(
            MergeConfig::default(),
            SwarmMode::Gated(Arc::clone(&gate)),
            RecordingTarget::default(),
        );
        let id = format!("mr-race-{}", round);

        let spawn_run = || {
            let controller = Arc::clone(&h.controller);
            let request = request(&id, clean_files());
            tokio::spawn(async move { controller.verify_and_merge(&request).await })
        };
        let (a, b) = (spawn_run(), spawn_run());

        while !a.is_finished() && !b.is_finished() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        gate.notify_one();

        let outcomes = [a.await.unwrap(), b.await.unwrap()];
        let admitted = outcomes.iter().filter(|r| r.is_ok()).count();
        let rejected = outcomes
            .iter()
            .filter(|r| matches!(r, Err(HiveError::MergeInProgress(_))))
            .count();
        assert_eq!((admitted, rejected), (1, 1), "round {}", round);
    }
}

#[tokio::test]
async fn test_event_sequence() {
    let h = harness(MergeConfig::default());
    let (_id, mut rx) = h.controller.events().channel();

    h.controller
        .verify_and_merge(&request("mr-15", clean_files()))
        .await
        .unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        assert_eq!(event.subject_id(), "mr-15");
        kinds.push(event.kind());
    }

    let mut expected = vec![EventKind::MergeStarted, EventKind::MergeStatusChanged];
    expected.extend(std::iter::repeat(EventKind::GateCompleted).take(7));
    expected.extend([EventKind::MergeStatusChanged, EventKind::MergeApproved]);
    assert_eq!(kinds, expected);
}

#[tokio::test]
async fn test_store_failures_do_not_change_outcome() {
    let store = Arc::new(RecordingStore::default());
    let h = harness(MergeConfig::default());
    let controller = MergeController::new(
        MergeConfig::default(),
        Arc::new(FakeSwarm {
            mode: SwarmMode::Pass,
        }),
        Arc::new(FixedScore(92.0)),
        h.sandboxes.clone(),
        h.target.clone(),
        EventBus::new(),
    )
    .with_store(store.clone());

    controller
        .verify_and_merge(&request("mr-16", clean_files()))
        .await
        .unwrap();
    assert_eq!(
        *store.persisted.lock().unwrap(),
        vec![(MergeState::Approved, true)]
    );

    let failing = Arc::new(RecordingStore {
        fail: true,
        ..RecordingStore::default()
    });
    let controller = MergeController::new(
        MergeConfig::default(),
        Arc::new(FakeSwarm {
            mode: SwarmMode::Pass,
        }),
        Arc::new(FixedScore(92.0)),
        h.sandboxes.clone(),
        h.target.clone(),
        EventBus::new(),
    )
    .with_store(failing);
    assert!(controller
        .verify_and_merge(&request("mr-17", clean_files()))
        .await
        .unwrap()
        .success);
}

#[tokio::test]
async fn test_low_anti_slop_score_aborts() {
    let controller = MergeController::new(
        MergeConfig::default(),
        Arc::new(FakeSwarm {
            mode: SwarmMode::Pass,
        }),
        Arc::new(FixedScore(60.0)),
        Arc::new(FakeSandboxes::default()),
        Arc::new(RecordingTarget::default()),
        EventBus::new(),
    );

    let result = controller
        .verify_and_merge(&request("mr-18", clean_files()))
        .await
        .unwrap();
    assert!(!result.success);
    assert_eq!(result.gates_passed, 2);
    assert_eq!(result.verification_results.antislop.unwrap().score, Some(60.0));
}

#[tokio::test]
async fn test_local_sandbox_and_target() {
    let project = TempDir::new().unwrap();
    std::fs::write(project.path().join("package.json"), "{}").unwrap();
    let scratch = TempDir::new().unwrap();

    let sandboxes = Arc::new(
        LocalSandboxProvider::new(
            Some(project.path().to_path_buf()),
            vec!["test -f package.json && test -f src/lib/sum.ts".to_string()],
        )
        .with_scratch_root(scratch.path()),
    );
    let controller = MergeController::new(
        MergeConfig::default().with_auto_merge(true),
        Arc::new(FakeSwarm {
            mode: SwarmMode::Pass,
        }),
        Arc::new(FixedScore(92.0)),
        sandboxes.clone(),
        Arc::new(LocalDirectoryTarget::new(project.path())),
        EventBus::new(),
    );

    let result = controller
        .verify_and_merge(&request("mr-19", clean_files()))
        .await
        .unwrap();

    assert!(result.success, "{:?}", result.verification_results.maintest);
    assert!(project.path().join("src/lib/sum.ts").exists());
    assert!(project.path().join("src/components/Total.tsx").exists());
    assert_eq!(sandboxes.active_count(), 0);
}
