//! # hive-agent
//!
//! Task execution for Hive: queens route tasks to specialized workers, workers
//! turn generated text into validated artifacts.
//!
//! - [`GenerationService`] is the only seam to the model; [`AnthropicGenerator`]
//!   implements it over HTTP with retries and a per-instance circuit breaker.
//! - [`Worker`] runs one task at a time and rejects concurrent work.
//! - [`Queen`] owns a fixed pool of four workers for its [`QueenDomain`] and
//!   executes tasks directly when no single worker is the best match.

mod auth;
mod circuit_breaker;
mod client;
mod generation;
mod parse;
mod prompt;
mod queen;
mod specialization;
mod types;
mod worker;

#[cfg(test)]
mod test_support;

pub use auth::{api_key_from_env, resolve_api_key};
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use client::AnthropicGenerator;
pub use generation::{generate_with, ExecutionOptions, GenerationService};
pub use parse::parse_artifacts;
pub use prompt::{direct_system_prompt, task_prompt, worker_system_prompt};
pub use queen::Queen;
pub use specialization::{select_specialization, QueenDomain, Specialization};
pub use types::{AnthropicContent, AnthropicMessage, AnthropicRequest, AnthropicResponse, Usage};
pub use worker::Worker;
