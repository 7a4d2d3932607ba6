//! # hive-validation
//!
//! Deterministic checks on generated code.
//!
//! This crate provides:
//! - Content rules that flag unfinished or unsafe-to-ship artifacts
//! - Artifact validation that records findings without dropping output
//! - Scanners used by the merge gates (build blockers, intent anti-patterns,
//!   unstyled UI components)

mod rules;
mod scanners;
mod validator;

pub use rules::{any_type_rule, content_rules, is_statically_typed, ContentRule};
pub use scanners::{
    find_unstyled_components, is_unstyled_component, scan_anti_patterns, scan_build_blockers,
};
pub use validator::{scan_content, validate_artifact, ValidationIssue};
