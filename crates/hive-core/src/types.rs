//! Core type definitions for Hive orchestration

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Task identifier supplied by the calling orchestrator
pub type TaskId = String;

/// A unit of generation work
///
/// Created by the calling orchestrator and never mutated by Hive. Re-invoking
/// a worker with the same `id` keeps retries correlated in logs and events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            dependencies: Vec::new(),
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<TaskId>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Lowercased `name + " " + description`, the text keyword routing scores against
    pub fn routing_text(&self) -> String {
        format!("{} {}", self.name, self.description).to_lowercase()
    }
}

/// Kind of artifact produced by a worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactType {
    #[default]
    File,
    Config,
    Schema,
    Migration,
    Test,
    Documentation,
}

impl std::fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Config => write!(f, "config"),
            Self::Schema => write!(f, "schema"),
            Self::Migration => write!(f, "migration"),
            Self::Test => write!(f, "test"),
            Self::Documentation => write!(f, "documentation"),
        }
    }
}

impl std::str::FromStr for ArtifactType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "config" => Ok(Self::Config),
            "schema" => Ok(Self::Schema),
            "migration" => Ok(Self::Migration),
            "test" => Ok(Self::Test),
            "documentation" | "docs" => Ok(Self::Documentation),
            _ => Err(format!("Invalid artifact type: {}", s)),
        }
    }
}

/// Generated output of a task
///
/// Identity (`id`, `task_id`) is fixed at creation; validation flags are
/// filled in afterwards and are advisory only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub task_id: TaskId,
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
    pub path: String,
    pub content: String,
    pub language: String,
    pub validated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_errors: Option<Vec<String>>,
}

impl Artifact {
    pub fn new(
        task_id: impl Into<String>,
        artifact_type: ArtifactType,
        path: impl Into<String>,
        content: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.into(),
            artifact_type,
            path: path.into(),
            content: content.into(),
            language: language.into(),
            validated: false,
            validation_errors: None,
        }
    }

    /// Record validation findings; no findings means the artifact is validated
    pub fn record_validation(&mut self, errors: Vec<String>) {
        if errors.is_empty() {
            self.validated = true;
            self.validation_errors = None;
        } else {
            self.validated = false;
            self.validation_errors = Some(errors);
        }
    }

    /// Convert into a file change for a merge request
    pub fn to_file_change(&self) -> FileChange {
        FileChange::create(&self.path, &self.content)
    }
}

/// Infer a language tag from a file path's extension
pub fn language_from_path(path: &str) -> &'static str {
    let ext = path.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    match ext.to_lowercase().as_str() {
        "ts" | "tsx" | "mts" | "cts" => "typescript",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "rs" => "rust",
        "py" => "python",
        "css" | "scss" => "css",
        "html" => "html",
        "json" => "json",
        "sql" => "sql",
        "md" | "mdx" => "markdown",
        "yml" | "yaml" => "yaml",
        "toml" => "toml",
        _ => "text",
    }
}

/// What a file change does to its path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    Create,
    Modify,
    Delete,
}

impl std::fmt::Display for FileAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Modify => write!(f, "modify"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// A single file change in a merge request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    #[serde(default)]
    pub content: String,
    pub action: FileAction,
}

impl FileChange {
    pub fn create(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            action: FileAction::Create,
        }
    }

    pub fn modify(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            action: FileAction::Modify,
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: String::new(),
            action: FileAction::Delete,
        }
    }
}

/// Structured statement of what a feature must and must not do
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentContract {
    pub id: String,
    /// One-line statement of the feature's purpose
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub success_criteria: Vec<String>,
    /// Phrases that must not appear in produced files (case-insensitive)
    #[serde(default)]
    pub anti_patterns: Vec<String>,
}

impl IntentContract {
    pub fn new(id: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            summary: summary.into(),
            ..Self::default()
        }
    }

    pub fn with_anti_patterns(mut self, anti_patterns: Vec<String>) -> Self {
        self.anti_patterns = anti_patterns;
        self
    }

    pub fn with_success_criteria(mut self, criteria: Vec<String>) -> Self {
        self.success_criteria = criteria;
        self
    }
}

/// A candidate change set produced by one completed feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequest {
    pub id: String,
    pub sandbox_id: String,
    pub task_id: TaskId,
    pub files: Vec<FileChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_contract: Option<IntentContract>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_branch: Option<String>,
}

impl MergeRequest {
    pub fn new(
        id: impl Into<String>,
        sandbox_id: impl Into<String>,
        task_id: impl Into<String>,
        files: Vec<FileChange>,
    ) -> Self {
        Self {
            id: id.into(),
            sandbox_id: sandbox_id.into(),
            task_id: task_id.into(),
            files,
            intent_contract: None,
            target_branch: None,
        }
    }

    /// Build a request from worker artifacts, one `create` change per artifact
    pub fn from_artifacts(
        id: impl Into<String>,
        sandbox_id: impl Into<String>,
        task_id: impl Into<String>,
        artifacts: &[Artifact],
    ) -> Self {
        let files = artifacts.iter().map(Artifact::to_file_change).collect();
        Self::new(id, sandbox_id, task_id, files)
    }

    pub fn with_intent_contract(mut self, contract: IntentContract) -> Self {
        self.intent_contract = Some(contract);
        self
    }

    pub fn with_target_branch(mut self, branch: impl Into<String>) -> Self {
        self.target_branch = Some(branch.into());
        self
    }

    /// Paths touched by this request, in request order
    pub fn paths(&self) -> Vec<String> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }
}

/// Read-only context shared by every worker of a queen
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SharedContext {
    pub project_id: String,
    /// Framework / stack hint included in prompts (e.g. "Next.js 14 + Tailwind")
    #[serde(default)]
    pub framework: Option<String>,
    #[serde(default)]
    pub intent_contract: Option<IntentContract>,
    /// Free-form notes appended to every prompt
    #[serde(default)]
    pub notes: Vec<String>,
}

impl SharedContext {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            ..Self::default()
        }
    }

    pub fn with_framework(mut self, framework: impl Into<String>) -> Self {
        self.framework = Some(framework.into());
        self
    }

    pub fn with_intent_contract(mut self, contract: IntentContract) -> Self {
        self.intent_contract = Some(contract);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_text_is_lowercased() {
        let task = Task::new("t-1", "Build Login", "OAuth FLOW");
        assert_eq!(task.routing_text(), "build login oauth flow");
    }

    #[test]
    fn test_artifact_type_from_str() {
        assert_eq!("Schema".parse::<ArtifactType>().unwrap(), ArtifactType::Schema);
        assert_eq!("docs".parse::<ArtifactType>().unwrap(), ArtifactType::Documentation);
        assert!("binary".parse::<ArtifactType>().is_err());
    }

    #[test]
    fn test_artifact_record_validation() {
        let mut artifact = Artifact::new("t-1", ArtifactType::File, "a.ts", "x", "typescript");
        let id = artifact.id.clone();

        artifact.record_validation(vec!["Contains TODO comment".to_string()]);
        assert!(!artifact.validated);
        assert_eq!(artifact.validation_errors.as_ref().map(Vec::len), Some(1));

        artifact.record_validation(Vec::new());
        assert!(artifact.validated);
        assert!(artifact.validation_errors.is_none());
        assert_eq!(artifact.id, id);
    }

    #[test]
    fn test_artifact_serializes_type_field() {
        let artifact = Artifact::new("t-1", ArtifactType::Migration, "m.sql", "", "sql");
        let json = serde_json::to_value(&artifact).unwrap();
        assert_eq!(json["type"], "migration");
        assert!(json.get("validation_errors").is_none());
    }

    #[test]
    fn test_language_from_path() {
        assert_eq!(language_from_path("src/App.tsx"), "typescript");
        assert_eq!(language_from_path("lib/main.rs"), "rust");
        assert_eq!(language_from_path("Makefile"), "text");
    }

    #[test]
    fn test_merge_request_from_artifacts() {
        let artifacts = vec![
            Artifact::new("t-1", ArtifactType::File, "a.ts", "a", "typescript"),
            Artifact::new("t-1", ArtifactType::Test, "a.test.ts", "b", "typescript"),
        ];
        let request = MergeRequest::from_artifacts("m-1", "sb-1", "t-1", &artifacts);

        assert_eq!(request.paths(), vec!["a.ts", "a.test.ts"]);
        assert!(request.files.iter().all(|f| f.action == FileAction::Create));
    }
}
