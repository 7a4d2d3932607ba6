//! # hive-merge
//!
//! Verification and merge of completed features.
//!
//! A [`MergeController`] runs seven gates over a [`MergeRequest`] in fixed
//! order, decides from the [`VerificationChecklist`] and applies approved
//! change sets to a [`MergeTarget`]. Merge states follow the pure
//! [`transition`] function; progress is published as `BuildEvent`s.
//!
//! [`MergeRequest`]: hive_core::MergeRequest

mod controller;
mod gates;
mod sandbox;
mod services;
mod state_machine;
mod types;

pub use controller::MergeController;
pub use gates::{
    standard_gates, AntiSlopGate, BuildGate, CompatibilityGate, Gate, GateContext, IntentGate,
    MainTestGate, SwarmGate, VisualGate,
};
pub use sandbox::{apply_file_changes, LocalDirectoryTarget, LocalSandboxProvider};
pub use services::{
    file_contents, AntiSlopDetector, AntiSlopScore, FeatureUnderReview, FileContents,
    MergeStore, MergeTarget, RuleBasedSlopDetector, RuleBasedSwarm, SandboxCheckReport,
    SwarmVerdict, TestSandboxProvider, VerificationSwarm,
};
pub use state_machine::{can_transition, transition, MergeEvent};
pub use types::{
    CheckResult, GateKind, MergeResult, MergeState, MergeStatus, VerificationChecklist,
    GATES_TOTAL,
};
