//! Scripted generators shared by the worker and queen tests

use async_trait::async_trait;
use hive_core::{HiveError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::generation::GenerationService;

pub const CLEAN_RESPONSE: &str = "```json\n[{\"path\": \"src/lib/sum.ts\", \"type\": \"file\", \"language\": \"typescript\", \"content\": \"export const sum = (a: number, b: number): number => a + b;\\n\"}]\n```";

pub const TODO_RESPONSE: &str = "[{\"path\": \"src/api/users.ts\", \"content\": \"// TODO: validate input\\nexport const handler = () => null;\\n\"}, {\"path\": \"README.md\", \"content\": \"# Users\\n\"}]";

pub struct ScriptedGenerator {
    response: std::result::Result<String, String>,
    /// System prompt of every call, in order
    pub system_prompts: Mutex<Vec<String>>,
    /// When set, the first call parks until notified
    gate: Option<Arc<Notify>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(response: &str) -> Self {
        Self {
            response: Ok(response.to_string()),
            system_prompts: Mutex::new(Vec::new()),
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            response: Err(message.to_string()),
            ..Self::new("")
        }
    }

    pub fn gated(response: &str, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(response)
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.system_prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationService for ScriptedGenerator {
    async fn generate(
        &self,
        system_prompt: &str,
        _user_prompt: &str,
        _cancel: &CancellationToken,
    ) -> Result<String> {
        self.system_prompts
            .lock()
            .unwrap()
            .push(system_prompt.to_string());

        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let (0, Some(gate)) = (call, &self.gate) {
            gate.notified().await;
        }

        self.response.clone().map_err(HiveError::Api)
    }
}
