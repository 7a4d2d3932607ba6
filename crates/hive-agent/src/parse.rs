//! Turning generated text into artifacts
//!
//! The model is asked for a JSON array of `{path, type, language, content}`.
//! It may wrap it in a ```json fence or return it bare. Unusable output is
//! logged and yields no artifacts; it is never an error.

use hive_core::{language_from_path, Artifact, ArtifactType};
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct GeneratedFile {
    path: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    language: Option<String>,
    content: String,
}

/// Body of the first ```json fence, then of any fence that holds an array
///
/// Only closed fences count; an unterminated trailing fence is ignored.
fn fenced_block(text: &str) -> Option<&str> {
    let mut candidates = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("```") {
        let after = &rest[start + 3..];
        let Some(nl) = after.find('\n') else {
            break;
        };
        let tag = after[..nl].trim();
        let body = &after[nl + 1..];
        let Some(end) = body.find("```") else {
            break;
        };
        candidates.push((tag.eq_ignore_ascii_case("json"), &body[..end]));
        rest = &body[end + 3..];
    }

    candidates
        .iter()
        .find(|(is_json, _)| *is_json)
        .or_else(|| candidates.iter().find(|(_, body)| body.trim_start().starts_with('[')))
        .map(|(_, body)| *body)
}

/// Outermost `[ ... ]` span
fn bare_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

fn to_artifact(task_id: &str, file: GeneratedFile) -> Artifact {
    let artifact_type = match file.kind.as_deref() {
        None | Some("") => ArtifactType::default(),
        Some(kind) => kind.parse().unwrap_or_else(|e: String| {
            warn!("{}; treating {} as a plain file", e, file.path);
            ArtifactType::default()
        }),
    };
    let language = file
        .language
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| language_from_path(&file.path).to_string());

    Artifact::new(task_id, artifact_type, file.path, file.content, language)
}

/// Parse generated text into artifacts for `task_id`
///
/// Entries that are not objects with string `path` and `content` are skipped.
pub fn parse_artifacts(task_id: &str, text: &str) -> Vec<Artifact> {
    let Some(json) = fenced_block(text).or_else(|| bare_array(text)) else {
        warn!("Task {}: response contained no JSON array", task_id);
        return Vec::new();
    };

    let entries: Vec<serde_json::Value> = match serde_json::from_str(json.trim()) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Task {}: failed to parse generated artifacts: {}", task_id, e);
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .enumerate()
        .filter_map(|(idx, entry)| match serde_json::from_value::<GeneratedFile>(entry) {
            Ok(file) => Some(to_artifact(task_id, file)),
            Err(e) => {
                warn!("Task {}: skipping artifact entry {}: {}", task_id, idx, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_json_block() {
        let text = "Here you go:\n```json\n[{\"path\": \"src/db.sql\", \"type\": \"migration\", \"content\": \"CREATE TABLE t();\"}]\n```\nDone.";
        let artifacts = parse_artifacts("task-1", text);

        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].task_id, "task-1");
        assert_eq!(artifacts[0].artifact_type, ArtifactType::Migration);
        assert_eq!(artifacts[0].language, "sql");
        assert!(!artifacts[0].id.is_empty());
    }

    #[test]
    fn test_fence_preferred_over_earlier_brackets() {
        let text = "Files [2]:\n```json\n[{\"path\": \"a.ts\", \"content\": \"x\"}]\n```";
        assert_eq!(parse_artifacts("t", text).len(), 1);
    }

    #[test]
    fn test_unclosed_trailing_fence_keeps_earlier_block() {
        let text = "```json\n[{\"path\": \"a.ts\", \"content\": \"x\"}]\n```\nAlso see [1]:\n```ts\nconst b = [2];\n";
        let artifacts = parse_artifacts("t", text);
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].path, "a.ts");

        let text = "```json\n[{\"path\": \"a.ts\", \"content\": \"x\"}]\n```\n```";
        assert_eq!(parse_artifacts("t", text).len(), 1);
    }

    #[test]
    fn test_bare_array() {
        let text = r#"[{"path": "src/App.tsx", "language": "typescript", "content": "export {}"}]"#;
        let artifacts = parse_artifacts("t", text);
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].artifact_type, ArtifactType::File);
        assert_eq!(artifacts[0].language, "typescript");
    }

    #[test]
    fn test_malformed_output_is_empty() {
        assert!(parse_artifacts("t", "I could not do that.").is_empty());
        assert!(parse_artifacts("t", "```json\n[{\"path\": \n```").is_empty());
    }

    #[test]
    fn test_bad_entries_are_skipped() {
        let text = r#"[{"path": "ok.md", "type": "docs", "content": "hi"}, {"path": 3}, "noise"]"#;
        let artifacts = parse_artifacts("t", text);
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].artifact_type, ArtifactType::Documentation);
        assert_eq!(artifacts[0].language, "markdown");
    }

    #[test]
    fn test_unknown_type_defaults_to_file() {
        let text = r#"[{"path": "x.bin", "type": "blob", "content": ""}]"#;
        let artifacts = parse_artifacts("t", text);
        assert_eq!(artifacts[0].artifact_type, ArtifactType::File);
        assert_eq!(artifacts[0].language, "text");
    }
}
