//! Artifact validation
//!
//! Validation is advisory: artifacts are never dropped, they only carry the
//! list of findings so the caller can decide whether to retry.

use hive_core::Artifact;
use serde::{Deserialize, Serialize};

use crate::rules::{any_type_rule, content_rules, is_statically_typed, ContentRule};

/// A single finding in an artifact's content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Name of the rule that fired
    pub rule: String,
    /// Human-readable message
    pub message: String,
    /// 1-based line of the first match
    pub line: usize,
}

impl ValidationIssue {
    fn from_rule(rule: &ContentRule, content: &str, offset: usize) -> Self {
        Self {
            rule: rule.name.to_string(),
            message: rule.message.to_string(),
            line: line_of(content, offset),
        }
    }

    /// Message recorded in `Artifact::validation_errors`
    pub fn display_message(&self) -> String {
        format!("{} (line {})", self.message, self.line)
    }
}

fn line_of(content: &str, offset: usize) -> usize {
    content[..offset].matches('\n').count() + 1
}

/// Scan content against every applicable rule
///
/// Returns at most one issue per rule, located at its first match.
pub fn scan_content(content: &str, language: &str) -> Vec<ValidationIssue> {
    let mut issues: Vec<ValidationIssue> = content_rules()
        .iter()
        .filter_map(|rule| {
            rule.first_match(content)
                .map(|offset| ValidationIssue::from_rule(rule, content, offset))
        })
        .collect();

    if is_statically_typed(language) {
        let rule = any_type_rule();
        if let Some(offset) = rule.first_match(content) {
            issues.push(ValidationIssue::from_rule(rule, content, offset));
        }
    }

    issues
}

/// Validate an artifact in place and return its findings
pub fn validate_artifact(artifact: &mut Artifact) -> Vec<ValidationIssue> {
    let issues = scan_content(&artifact.content, &artifact.language);
    artifact.record_validation(issues.iter().map(ValidationIssue::display_message).collect());

    if !issues.is_empty() {
        tracing::debug!(
            "Artifact {} ({}) has {} validation issue(s)",
            artifact.path,
            artifact.task_id,
            issues.len()
        );
    }

    issues
}
