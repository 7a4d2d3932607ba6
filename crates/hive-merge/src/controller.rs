//! Merge controller: runs the gate pipeline and owns merge records
//!
//! Each `verify_and_merge` call evaluates the gates strictly in order,
//! publishes progress on the event bus, decides, and (with `auto_merge`)
//! applies the change set. Records live in maps owned by the controller
//! instance and are queryable by request id.
//!
//! Precondition: callers must not run `verify_and_merge` or `complete_merge`
//! concurrently for the same request id. A second call that starts while a
//! run is verifying or merging is rejected with `MergeInProgress`.

use chrono::Utc;
use hive_core::fail_open::{fail_open, fail_open_with_retries};
use hive_core::{BuildEvent, EventBus, HiveError, MergeConfig, MergeRequest, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::gates::{standard_gates, Gate, GateContext};
use crate::services::{
    file_contents, AntiSlopDetector, MergeStore, MergeTarget, TestSandboxProvider,
    VerificationSwarm,
};
use crate::state_machine::{transition, MergeEvent};
use crate::types::{
    CheckResult, GateKind, MergeResult, MergeState, MergeStatus, VerificationChecklist,
    GATES_TOTAL,
};

/// Attempts made to tear down a test sandbox
const TEARDOWN_RETRIES: usize = 3;

/// A critical gate ended the run under strict mode
struct Abort {
    gate: GateKind,
    message: String,
    /// The gate raised or timed out rather than failing its check
    faulted: bool,
}

pub struct MergeController {
    config: MergeConfig,
    gates: Vec<Box<dyn Gate>>,
    sandboxes: Arc<dyn TestSandboxProvider>,
    target: Arc<dyn MergeTarget>,
    store: Option<Arc<dyn MergeStore>>,
    events: EventBus,
    statuses: RwLock<HashMap<String, MergeStatus>>,
    results: RwLock<HashMap<String, MergeResult>>,
    history: RwLock<HashMap<String, Vec<MergeResult>>>,
    test_sandboxes: RwLock<HashMap<String, String>>,
    /// Approved requests waiting for `complete_merge`
    pending: RwLock<HashMap<String, MergeRequest>>,
}

impl MergeController {
    pub fn new(
        config: MergeConfig,
        swarm: Arc<dyn VerificationSwarm>,
        detector: Arc<dyn AntiSlopDetector>,
        sandboxes: Arc<dyn TestSandboxProvider>,
        target: Arc<dyn MergeTarget>,
        events: EventBus,
    ) -> Self {
        let gates = standard_gates(swarm, detector, Arc::clone(&sandboxes));
        Self {
            config,
            gates,
            sandboxes,
            target,
            store: None,
            events,
            statuses: RwLock::new(HashMap::new()),
            results: RwLock::new(HashMap::new()),
            history: RwLock::new(HashMap::new()),
            test_sandboxes: RwLock::new(HashMap::new()),
            pending: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the gate pipeline; gates run in the given order
    pub fn with_gates(mut self, gates: Vec<Box<dyn Gate>>) -> Self {
        self.gates = gates;
        self
    }

    /// Persist every finished run through `store` (failures are logged only)
    pub fn with_store(mut self, store: Arc<dyn MergeStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Verify a change set through every gate and merge it when approved
    ///
    /// Returns `Ok` with `success == false` when the change set is rejected
    /// or a critical gate fails its check under strict mode. A critical gate
    /// that errors or times out under strict mode returns `GateAborted`
    /// after the failed status and result are recorded.
    #[instrument(skip_all, fields(request_id = %request.id))]
    pub async fn verify_and_merge(&self, request: &MergeRequest) -> Result<MergeResult> {
        self.begin(request).await?;
        let started = Instant::now();

        let ctx = GateContext::new(request, file_contents(&request.files), &self.config);
        let mut checklist = VerificationChecklist::default();
        let mut abort = None;

        for gate in &self.gates {
            let kind = gate.kind();
            self.update_status(&request.id, |s| s.current_gate = Some(kind))
                .await;

            let (result, fault) = self.run_gate(gate.as_ref(), &ctx).await;
            self.record_gate(&request.id, kind, &result).await;
            checklist.set(kind, result.clone());

            if self.config.strict_mode && gate.critical() && !result.passed {
                let message = fault
                    .clone()
                    .unwrap_or_else(|| format!("{}: {}", kind.description(), result.details));
                abort = Some(Abort {
                    gate: kind,
                    message,
                    faulted: fault.is_some(),
                });
                break;
            }
        }

        let test_sandbox_id = self.teardown_test_sandbox(&request.id, &ctx).await;
        let mut result = MergeResult {
            success: false,
            merged_files: Vec::new(),
            failed_checks: None,
            verification_results: checklist,
            merge_duration_ms: 0,
            gates_passed: 0,
            gates_succeeded: 0,
            gates_total_count: GATES_TOTAL,
            main_test_sandbox_id: test_sandbox_id,
        };
        result.gates_passed = result.verification_results.completed();
        result.gates_succeeded = result
            .verification_results
            .results()
            .filter(|(_, r)| r.passed)
            .count();

        if let Some(abort) = abort {
            return self.abort(request, result, abort, started).await;
        }

        let blocking: Vec<GateKind> = GateKind::ALL
            .into_iter()
            .filter(|kind| self.config.require_all_gates || kind.decisive())
            .filter(|kind| !result.verification_results.passed(*kind))
            .collect();

        if !blocking.is_empty() {
            let failed_checks: Vec<String> =
                blocking.iter().map(|k| k.description().to_string()).collect();
            warn!(
                "Merge {} rejected: {}",
                request.id,
                failed_checks.join("; ")
            );
            result.failed_checks = Some(failed_checks.clone());
            result.merge_duration_ms = started.elapsed().as_millis() as u64;

            self.transition(&request.id, MergeEvent::Reject).await?;
            self.events.publish(BuildEvent::MergeRejected {
                request_id: request.id.clone(),
                failed_checks,
            });
            self.finish(&request.id, result.clone(), false).await;
            return Ok(result);
        }

        result.success = true;
        self.transition(&request.id, MergeEvent::Approve).await?;
        info!(
            "Merge {} approved after {} gate(s)",
            request.id, result.gates_passed
        );
        self.events.publish(BuildEvent::MergeApproved {
            request_id: request.id.clone(),
            gates_passed: result.gates_passed,
        });

        if self.config.auto_merge {
            return self.apply(request, result, started, false).await;
        }

        result.merge_duration_ms = started.elapsed().as_millis() as u64;
        self.pending
            .write()
            .await
            .insert(request.id.clone(), request.clone());
        self.finish(&request.id, result.clone(), false).await;
        Ok(result)
    }

    /// Apply an approved change set that was held back by `auto_merge = false`
    #[instrument(skip(self))]
    pub async fn complete_merge(&self, request_id: &str) -> Result<MergeResult> {
        let status = self
            .get_merge_status(request_id)
            .await
            .ok_or_else(|| HiveError::MergeNotFound(request_id.to_string()))?;
        if status.status != MergeState::Approved {
            return Err(HiveError::InvalidTransition(format!(
                "merge {} is {}, not approved",
                request_id, status.status
            )));
        }

        let request = self
            .pending
            .write()
            .await
            .remove(request_id)
            .ok_or_else(|| HiveError::MergeNotFound(request_id.to_string()))?;
        let result = self
            .get_merge_result(request_id)
            .await
            .ok_or_else(|| HiveError::MergeNotFound(request_id.to_string()))?;

        self.apply(&request, result, Instant::now(), true).await
    }

    pub async fn get_merge_status(&self, request_id: &str) -> Option<MergeStatus> {
        self.statuses.read().await.get(request_id).cloned()
    }

    pub async fn get_merge_result(&self, request_id: &str) -> Option<MergeResult> {
        self.results.read().await.get(request_id).cloned()
    }

    /// Test sandbox used by the latest run's replay gate
    pub async fn get_test_sandbox_id(&self, request_id: &str) -> Option<String> {
        self.test_sandboxes.read().await.get(request_id).cloned()
    }

    /// Results of every finished run for this id, newest last
    pub async fn get_merge_history(&self, request_id: &str) -> Vec<MergeResult> {
        self.history
            .read()
            .await
            .get(request_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Claim the id and move it to verifying under one write lock, so a
    /// concurrent call for the same id always sees an active status
    async fn begin(&self, request: &MergeRequest) -> Result<()> {
        let (from, to) = {
            let mut statuses = self.statuses.write().await;
            if let Some(existing) = statuses.get(&request.id) {
                if existing.status.is_active() {
                    return Err(HiveError::MergeInProgress(format!(
                        "{} is {}",
                        request.id, existing.status
                    )));
                }
            }
            let mut status = MergeStatus::new(&request.id);
            let from = status.status;
            status.status = transition(from, &MergeEvent::StartVerification)?;
            let to = status.status;
            statuses.insert(request.id.clone(), status);
            (from, to)
        };
        self.pending.write().await.remove(&request.id);

        info!(
            "Starting merge {} for task {} ({} file(s))",
            request.id,
            request.task_id,
            request.files.len()
        );
        self.events.publish(BuildEvent::MergeStarted {
            request_id: request.id.clone(),
            task_id: request.task_id.clone(),
            file_count: request.files.len(),
        });
        info!("Merge {}: {} -> {}", request.id, from, to);
        self.events.publish(BuildEvent::MergeStatusChanged {
            request_id: request.id.clone(),
            from: from.to_string(),
            to: to.to_string(),
        });
        Ok(())
    }

    /// Run one gate under the configured timeout; returns the fault message
    /// when the gate raised or timed out
    async fn run_gate(
        &self,
        gate: &dyn Gate,
        ctx: &GateContext<'_>,
    ) -> (CheckResult, Option<String>) {
        let started = Instant::now();
        let timeout = self.config.gate_timeout();

        let (result, fault) = match tokio::time::timeout(timeout, gate.run(ctx)).await {
            Ok(Ok(result)) => (result, None),
            Ok(Err(e)) => {
                let message = format!("{} gate error: {}", gate.kind(), e);
                (CheckResult::errored(&message), Some(message))
            }
            Err(_) => {
                let message = format!(
                    "{} gate timed out after {}s",
                    gate.kind(),
                    timeout.as_secs()
                );
                (CheckResult::errored(&message), Some(message))
            }
        };
        (result.with_duration(started.elapsed()), fault)
    }

    async fn record_gate(&self, request_id: &str, kind: GateKind, result: &CheckResult) {
        self.update_status(request_id, |s| s.gates_completed += 1)
            .await;

        if result.passed {
            info!(
                "Gate {} ({}) passed for {}: {}",
                kind.number(),
                kind,
                request_id,
                result.details
            );
        } else {
            warn!(
                "Gate {} ({}) failed for {}: {}",
                kind.number(),
                kind,
                request_id,
                result.details
            );
        }

        self.events.publish(BuildEvent::GateCompleted {
            request_id: request_id.to_string(),
            gate: kind.to_string(),
            gate_number: kind.number(),
            passed: result.passed,
            score: result.score,
            details: result.details.clone(),
            error: result.error.clone(),
        });
    }

    async fn teardown_test_sandbox(&self, request_id: &str, ctx: &GateContext<'_>) -> Option<String> {
        let sandbox_id = ctx.test_sandbox_id()?;
        self.test_sandboxes
            .write()
            .await
            .insert(request_id.to_string(), sandbox_id.clone());

        let destroyed = fail_open_with_retries(
            "test_sandbox_teardown",
            || self.sandboxes.destroy(&sandbox_id),
            TEARDOWN_RETRIES,
        )
        .await;
        if destroyed.is_some() {
            debug!("Tore down test sandbox {} for {}", sandbox_id, request_id);
        }
        Some(sandbox_id)
    }

    async fn abort(
        &self,
        request: &MergeRequest,
        mut result: MergeResult,
        abort: Abort,
        started: Instant,
    ) -> Result<MergeResult> {
        error!(
            "Merge {} aborted at gate {} ({}): {}",
            request.id,
            abort.gate.number(),
            abort.gate,
            abort.message
        );

        let failed_checks: Vec<String> = result
            .verification_results
            .failed()
            .map(|k| k.description().to_string())
            .collect();
        result.failed_checks = Some(failed_checks);
        result.merge_duration_ms = started.elapsed().as_millis() as u64;

        let message = abort.message.clone();
        self.update_status(&request.id, |s| s.error = Some(message))
            .await;
        self.transition(
            &request.id,
            MergeEvent::Abort {
                reason: abort.message.clone(),
            },
        )
        .await?;
        self.events.publish(BuildEvent::MergeFailed {
            request_id: request.id.clone(),
            error: abort.message.clone(),
        });
        self.finish(&request.id, result.clone(), false).await;

        if abort.faulted {
            Err(HiveError::GateAborted {
                gate: abort.gate.to_string(),
                message: abort.message,
            })
        } else {
            Ok(result)
        }
    }

    /// Move an approved run through `merging` to its terminal state
    async fn apply(
        &self,
        request: &MergeRequest,
        mut result: MergeResult,
        started: Instant,
        replaces_last: bool,
    ) -> Result<MergeResult> {
        self.transition(&request.id, MergeEvent::StartMerge).await?;

        match self.target.apply(request).await {
            Ok(merged_files) => {
                info!("Merged {} file(s) for {}", merged_files.len(), request.id);
                result.merged_files = merged_files.clone();
                result.merge_duration_ms += started.elapsed().as_millis() as u64;

                self.transition(&request.id, MergeEvent::MergeSucceeded)
                    .await?;
                self.events.publish(BuildEvent::MergeCompleted {
                    request_id: request.id.clone(),
                    merged_files,
                });
                self.finish(&request.id, result.clone(), replaces_last).await;
                Ok(result)
            }
            Err(e) => {
                let message = e.to_string();
                error!("Applying merge {} failed: {}", request.id, message);
                result.success = false;
                result.merge_duration_ms += started.elapsed().as_millis() as u64;

                let reason = message.clone();
                self.update_status(&request.id, |s| s.error = Some(reason))
                    .await;
                self.transition(
                    &request.id,
                    MergeEvent::MergeFailed {
                        reason: message.clone(),
                    },
                )
                .await?;
                self.events.publish(BuildEvent::MergeFailed {
                    request_id: request.id.clone(),
                    error: message.clone(),
                });
                self.finish(&request.id, result, replaces_last).await;

                Err(match e {
                    HiveError::MergeApply(_) => e,
                    other => HiveError::MergeApply(other.to_string()),
                })
            }
        }
    }

    async fn update_status(&self, request_id: &str, f: impl FnOnce(&mut MergeStatus)) {
        if let Some(status) = self.statuses.write().await.get_mut(request_id) {
            f(status);
        }
    }

    async fn transition(&self, request_id: &str, event: MergeEvent) -> Result<()> {
        let (from, to) = {
            let mut statuses = self.statuses.write().await;
            let status = statuses
                .get_mut(request_id)
                .ok_or_else(|| HiveError::MergeNotFound(request_id.to_string()))?;

            let from = status.status;
            let to = transition(from, &event)?;
            status.status = to;
            if to.is_terminal() {
                status.completed_at = Some(Utc::now());
            }
            (from, to)
        };

        info!("Merge {}: {} -> {}", request_id, from, to);
        self.events.publish(BuildEvent::MergeStatusChanged {
            request_id: request_id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        });
        Ok(())
    }

    /// Store the run's result, append it to history and persist the record
    async fn finish(&self, request_id: &str, result: MergeResult, replaces_last: bool) {
        self.results
            .write()
            .await
            .insert(request_id.to_string(), result.clone());
        {
            let mut history = self.history.write().await;
            let runs = history.entry(request_id.to_string()).or_default();
            if replaces_last {
                runs.pop();
            }
            runs.push(result.clone());
        }

        let Some(store) = &self.store else {
            return;
        };
        let Some(status) = self.get_merge_status(request_id).await else {
            return;
        };
        fail_open("merge_store", || store.persist(&status, Some(&result))).await;
    }
}

impl std::fmt::Debug for MergeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let gates: Vec<GateKind> = self.gates.iter().map(|g| g.kind()).collect();
        f.debug_struct("MergeController")
            .field("config", &self.config)
            .field("gates", &gates)
            .field("persisted", &self.store.is_some())
            .finish()
    }
}
