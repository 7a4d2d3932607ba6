//! Queen: keyword router over a fixed pool of domain workers
//!
//! A queen owns one worker per specialization in its domain, created once and
//! reused. Tasks go to the worker with the strictly highest keyword score;
//! ties, zero scores and busy workers fall back to direct execution.

use hive_core::{Artifact, BuildEvent, EventBus, HiveError, Result, SharedContext, Task};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::generation::{ExecutionOptions, GenerationService};
use crate::prompt;
use crate::specialization::{select_specialization, QueenDomain};
use crate::worker::{generate_artifacts, Worker};

pub struct Queen {
    id: String,
    domain: QueenDomain,
    workers: Vec<Arc<Worker>>,
    generator: Arc<dyn GenerationService>,
    context: Arc<SharedContext>,
    events: EventBus,
}

impl Queen {
    pub fn new(
        domain: QueenDomain,
        generator: Arc<dyn GenerationService>,
        context: Arc<SharedContext>,
        events: EventBus,
    ) -> Self {
        let workers = domain
            .specializations()
            .into_iter()
            .map(|spec| {
                Arc::new(Worker::new(
                    spec,
                    Arc::clone(&generator),
                    Arc::clone(&context),
                    events.clone(),
                ))
            })
            .collect();

        Self {
            id: format!("queen-{}", domain),
            domain,
            workers,
            generator,
            context,
            events,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn domain(&self) -> QueenDomain {
        self.domain
    }

    pub fn workers(&self) -> &[Arc<Worker>] {
        &self.workers
    }

    /// Worker whose keywords best match the task, if one strictly wins
    pub fn select_worker(&self, task: &Task) -> Option<Arc<Worker>> {
        self.route(task).map(|(worker, _)| worker)
    }

    fn route(&self, task: &Task) -> Option<(Arc<Worker>, usize)> {
        let (spec, score) = select_specialization(self.domain, &task.routing_text())?;
        self.workers
            .iter()
            .find(|w| w.specialization() == spec)
            .map(|w| (Arc::clone(w), score))
    }

    pub async fn execute_task(&self, task: &Task) -> Result<Vec<Artifact>> {
        self.execute_task_with(task, &ExecutionOptions::default())
            .await
    }

    #[instrument(skip_all, fields(task_id = %task.id, queen = %self.id))]
    pub async fn execute_task_with(
        &self,
        task: &Task,
        options: &ExecutionOptions,
    ) -> Result<Vec<Artifact>> {
        let routed = self.route(task);
        self.events.publish(BuildEvent::TaskRouted {
            task_id: task.id.clone(),
            domain: self.domain.to_string(),
            worker: routed.as_ref().map(|(w, _)| w.id().to_string()),
            score: routed.as_ref().map_or(0, |(_, score)| *score),
        });

        let Some((worker, score)) = routed else {
            debug!("No single best worker for task {}; executing directly", task.id);
            return self.execute_directly_with(task, options).await;
        };

        info!(
            "Routing task {} to {} (score {})",
            task.id,
            worker.id(),
            score
        );
        match worker.execute_with(task, options).await {
            Err(HiveError::WorkerBusy(reason)) => {
                warn!("{}; executing task {} directly", reason, task.id);
                self.execute_directly_with(task, options).await
            }
            outcome => outcome,
        }
    }

    /// Execute without a specialist, using the generic production prompt
    pub async fn execute_directly(&self, task: &Task) -> Result<Vec<Artifact>> {
        self.execute_directly_with(task, &ExecutionOptions::default())
            .await
    }

    pub async fn execute_directly_with(
        &self,
        task: &Task,
        options: &ExecutionOptions,
    ) -> Result<Vec<Artifact>> {
        info!("Queen {} executing task {} directly", self.id, task.id);
        self.events.publish(BuildEvent::WorkerStarted {
            task_id: task.id.clone(),
            worker_id: self.id.clone(),
            specialization: "direct".to_string(),
        });

        let system_prompt = prompt::direct_system_prompt(self.domain);
        match generate_artifacts(
            self.generator.as_ref(),
            &system_prompt,
            task,
            &self.context,
            options,
        )
        .await
        {
            Ok(artifacts) => {
                self.events.publish(BuildEvent::WorkerCompleted {
                    task_id: task.id.clone(),
                    worker_id: self.id.clone(),
                    artifact_count: artifacts.len(),
                    failed_validation: artifacts.iter().filter(|a| !a.validated).count(),
                });
                Ok(artifacts)
            }
            Err(e) => {
                warn!("Queen {} failed task {}: {}", self.id, task.id, e);
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

impl std::fmt::Debug for Queen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queen")
            .field("id", &self.id)
            .field("workers", &self.workers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::specialization::Specialization;
    use crate::test_support::{ScriptedGenerator, CLEAN_RESPONSE};
    use hive_core::EventKind;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn queen(domain: QueenDomain, generator: Arc<ScriptedGenerator>) -> Queen {
        Queen::new(
            domain,
            generator,
            Arc::new(SharedContext::new("proj")),
            EventBus::new(),
        )
    }

    /// (domain, description, expected worker); each description hits a
    /// keyword unique to its specialization
    const ROUTING_FIXTURES: &[(QueenDomain, &str, Specialization)] = &[
        (QueenDomain::Infrastructure, "Add a migration", Specialization::DatabaseArchitect),
        (QueenDomain::Infrastructure, "Expose a graphql endpoint", Specialization::ApiEngineer),
        (QueenDomain::Infrastructure, "Implement oauth login", Specialization::AuthSpecialist),
        (QueenDomain::Infrastructure, "Connect stripe payment", Specialization::IntegrationEngineer),
        (QueenDomain::Development, "Build a react form", Specialization::FrontendEngineer),
        (QueenDomain::Development, "Write a cron handler", Specialization::BackendEngineer),
        (QueenDomain::Development, "Add a zustand store", Specialization::StateManager),
        (QueenDomain::Development, "Reduce latency", Specialization::PerformanceOptimizer),
        (QueenDomain::Design, "Pick a typography scale", Specialization::UiDesigner),
        (QueenDomain::Design, "Map the onboarding journey", Specialization::UxSpecialist),
        (QueenDomain::Design, "Add keyframe effects", Specialization::AnimationEngineer),
        (QueenDomain::Design, "Meet wcag rules", Specialization::AccessibilityExpert),
        (QueenDomain::Quality, "Raise jest coverage", Specialization::TestEngineer),
        (QueenDomain::Quality, "Refactor the module", Specialization::CodeReviewer),
        (QueenDomain::Quality, "Prevent xss", Specialization::SecurityAuditor),
        (QueenDomain::Quality, "Write the readme", Specialization::DocumentationWriter),
    ];

    #[test]
    fn test_select_worker_fixtures() {
        let generator = Arc::new(ScriptedGenerator::new("[]"));
        for (domain, description, expected) in ROUTING_FIXTURES {
            let queen = queen(*domain, Arc::clone(&generator));
            let task = Task::new("t", "task", *description);
            let worker = queen
                .select_worker(&task)
                .unwrap_or_else(|| panic!("no worker for {:?}", description));
            assert_eq!(worker.specialization(), *expected, "{}", description);
        }
    }

    #[test]
    fn test_unmatched_description_has_no_worker() {
        let generator = Arc::new(ScriptedGenerator::new("[]"));
        for domain in QueenDomain::ALL {
            let task = Task::new("t", "task", "Do something");
            assert!(queen(domain, Arc::clone(&generator)).select_worker(&task).is_none());
        }
    }

    #[test]
    fn test_pool_is_fixed() {
        let q = queen(QueenDomain::Design, Arc::new(ScriptedGenerator::new("[]")));
        assert_eq!(q.workers().len(), 4);
        assert_eq!(q.workers()[0].id(), "worker-ui-designer");
        assert_eq!(q.id(), "queen-design");
    }

    #[tokio::test]
    async fn test_routed_task_uses_worker_prompt() {
        let generator = Arc::new(ScriptedGenerator::new(CLEAN_RESPONSE));
        let q = queen(QueenDomain::Quality, Arc::clone(&generator));

        let artifacts = q
            .execute_task(&Task::new("t-1", "task", "Raise jest coverage"))
            .await
            .unwrap();

        assert_eq!(artifacts.len(), 1);
        assert!(generator.prompts()[0].starts_with("You are a test engineer"));
    }

    #[tokio::test]
    async fn test_unmatched_task_executes_directly() {
        let generator = Arc::new(ScriptedGenerator::new(CLEAN_RESPONSE));
        let events = EventBus::new();
        let routed = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&routed);
        events.subscribe(EventKind::TaskRouted, move |e| {
            *sink.lock().unwrap() = Some(e.clone());
        });

        let q = Queen::new(
            QueenDomain::Development,
            generator.clone(),
            Arc::new(SharedContext::new("proj")),
            events,
        );
        let artifacts = q
            .execute_task(&Task::new("t-2", "task", "Do something"))
            .await
            .unwrap();

        assert_eq!(artifacts.len(), 1);
        assert!(generator.prompts()[0].contains("senior full-stack engineer"));
        assert_eq!(
            routed.lock().unwrap().clone(),
            Some(BuildEvent::TaskRouted {
                task_id: "t-2".to_string(),
                domain: "development".to_string(),
                worker: None,
                score: 0,
            })
        );
    }

    #[tokio::test]
    async fn test_busy_worker_falls_back_to_direct() {
        let gate = Arc::new(Notify::new());
        let generator = Arc::new(ScriptedGenerator::gated(CLEAN_RESPONSE, Arc::clone(&gate)));
        let q = Arc::new(queen(QueenDomain::Development, Arc::clone(&generator)));
        let task = Task::new("t-3", "task", "Write a cron handler");

        let first = {
            let q = Arc::clone(&q);
            let task = task.clone();
            tokio::spawn(async move { q.execute_task(&task).await })
        };
        let backend = q.select_worker(&task).unwrap();
        while !backend.is_busy() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let artifacts = q.execute_task(&task).await.unwrap();
        assert_eq!(artifacts.len(), 1);

        gate.notify_one();
        first.await.unwrap().unwrap();

        let prompts = generator.prompts();
        assert!(prompts[0].starts_with("You are a backend engineer"));
        assert!(prompts[1].contains("senior full-stack engineer"));
    }
}
