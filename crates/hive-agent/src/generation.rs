//! Generation service seam
//!
//! Workers and queens only see [`GenerationService`]; the HTTP client is one
//! implementation and tests plug in scripted ones.

use async_trait::async_trait;
use hive_core::{HiveError, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Opaque text generator
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Produce text for a system/user prompt pair
    ///
    /// Implementations should stop waiting and return `HiveError::Cancelled`
    /// once `cancel` fires.
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String>;
}

/// Caller-supplied cancellation and deadline for one execution
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    pub cancel: CancellationToken,
    pub deadline: Option<Duration>,
}

impl ExecutionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Call a generator under the caller's cancellation token and deadline
pub async fn generate_with(
    service: &dyn GenerationService,
    system_prompt: &str,
    user_prompt: &str,
    options: &ExecutionOptions,
) -> Result<String> {
    if options.cancel.is_cancelled() {
        return Err(HiveError::Cancelled("generation cancelled before start".to_string()));
    }

    let call = async {
        tokio::select! {
            biased;
            _ = options.cancel.cancelled() => {
                Err(HiveError::Cancelled("generation cancelled".to_string()))
            }
            result = service.generate(system_prompt, user_prompt, &options.cancel) => result,
        }
    };

    match options.deadline {
        Some(deadline) => tokio::time::timeout(deadline, call).await.map_err(|_| {
            HiveError::Timeout(format!("generation exceeded {:?} deadline", deadline))
        })?,
        None => call.await,
    }
}
