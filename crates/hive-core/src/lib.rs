//! # hive-core
//!
//! Core types for the Hive build orchestrator.
//!
//! Hive decides how an AI code-generation run is parallelized, dispatches
//! generation tasks to specialized workers, and gates produced file changes
//! through a verification pipeline before they reach a project's main state.
//!
//! ## Core Paradigm
//!
//! - Tasks are immutable inputs supplied by an outer orchestrator
//! - Workers turn tasks into artifacts; validation is advisory metadata
//! - Change sets only merge after passing the gate pipeline
//! - Progress is observed through typed events, never by polling shared state

pub mod config;
mod error;
pub mod events;
pub mod fail_open;
mod types;

pub use config::{CostRates, GenerationConfig, HiveConfig, MergeConfig, SandboxConfig};
pub use error::{HiveError, Result};
pub use events::{BuildEvent, EventBus, EventHandler, EventKind, SubscriptionId};
pub use types::*;
