//! Specialized worker
//!
//! A worker runs one task at a time: it prompts the generator with its
//! specialization, parses the reply into artifacts and validates each one.
//! A second `execute` while one is in flight fails fast with
//! `HiveError::WorkerBusy`; nothing is queued.

use hive_core::{Artifact, BuildEvent, EventBus, HiveError, Result, SharedContext, Task};
use hive_validation::validate_artifact;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

use crate::generation::{generate_with, ExecutionOptions, GenerationService};
use crate::parse::parse_artifacts;
use crate::prompt;
use crate::specialization::Specialization;

pub struct Worker {
    id: String,
    specialization: Specialization,
    generator: Arc<dyn GenerationService>,
    context: Arc<SharedContext>,
    events: EventBus,
    /// Single permit held for the whole execution
    slot: Semaphore,
}

impl Worker {
    pub fn new(
        specialization: Specialization,
        generator: Arc<dyn GenerationService>,
        context: Arc<SharedContext>,
        events: EventBus,
    ) -> Self {
        Self {
            id: format!("worker-{}", specialization),
            specialization,
            generator,
            context,
            events,
            slot: Semaphore::new(1),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn specialization(&self) -> Specialization {
        self.specialization
    }

    pub fn is_busy(&self) -> bool {
        self.slot.available_permits() == 0
    }

    pub async fn execute(&self, task: &Task) -> Result<Vec<Artifact>> {
        self.execute_with(task, &ExecutionOptions::default()).await
    }

    /// Execute a task under a caller-supplied cancellation token and deadline
    #[instrument(skip_all, fields(task_id = %task.id, worker = %self.id))]
    pub async fn execute_with(
        &self,
        task: &Task,
        options: &ExecutionOptions,
    ) -> Result<Vec<Artifact>> {
        let _permit = self.slot.try_acquire().map_err(|_| {
            warn!("Worker {} rejected task {}: busy", self.id, task.id);
            HiveError::WorkerBusy(format!("{} is already executing a task", self.id))
        })?;

        info!("Worker {} starting task {}", self.id, task.id);
        self.events.publish(BuildEvent::WorkerStarted {
            task_id: task.id.clone(),
            worker_id: self.id.clone(),
            specialization: self.specialization.to_string(),
        });

        let system_prompt = prompt::worker_system_prompt(self.specialization);
        let outcome = generate_artifacts(
            self.generator.as_ref(),
            &system_prompt,
            task,
            &self.context,
            options,
        )
        .await;

        match outcome {
            Ok(artifacts) => {
                let failed_validation = artifacts.iter().filter(|a| !a.validated).count();
                info!(
                    "Worker {} finished task {}: {} artifact(s), {} failed validation",
                    self.id,
                    task.id,
                    artifacts.len(),
                    failed_validation
                );
                self.events.publish(BuildEvent::WorkerCompleted {
                    task_id: task.id.clone(),
                    worker_id: self.id.clone(),
                    artifact_count: artifacts.len(),
                    failed_validation,
                });
                Ok(artifacts)
            }
            Err(e) => {
                warn!("Worker {} failed task {}: {}", self.id, task.id, e);
                self.events.publish(BuildEvent::WorkerFailed {
                    task_id: task.id.clone(),
                    worker_id: self.id.clone(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("specialization", &self.specialization)
            .field("busy", &self.is_busy())
            .finish()
    }
}

/// Generate, parse and validate artifacts for a task
///
/// Shared by workers and the queen's direct path; only the system prompt differs.
pub(crate) async fn generate_artifacts(
    generator: &dyn GenerationService,
    system_prompt: &str,
    task: &Task,
    context: &SharedContext,
    options: &ExecutionOptions,
) -> Result<Vec<Artifact>> {
    let user_prompt = prompt::task_prompt(task, context);
    let text = generate_with(generator, system_prompt, &user_prompt, options).await?;

    let mut artifacts = parse_artifacts(&task.id, &text);
    for artifact in &mut artifacts {
        let issues = validate_artifact(artifact);
        if !issues.is_empty() {
            let rules: Vec<&str> = issues.iter().map(|i| i.rule.as_str()).collect();
            warn!(
                "Task {}: {} failed validation ({})",
                task.id,
                artifact.path,
                rules.join(", ")
            );
        }
    }

    Ok(artifacts)
}
