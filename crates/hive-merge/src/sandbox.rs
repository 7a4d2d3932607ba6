//! Local filesystem target and test sandboxes

use async_trait::async_trait;
use hive_core::{FileAction, FileChange, HiveError, MergeRequest, Result};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::services::{MergeTarget, SandboxCheckReport, TestSandboxProvider};

/// Output kept per stream when a check command fails
const MAX_OUTPUT: usize = 4000;

/// Directories never copied into a test sandbox
const SKIPPED_DIRS: &[&str] = &[".git", "node_modules", "target"];

fn checked_relative(path: &str) -> Result<PathBuf> {
    let relative = Path::new(path);
    let escapes = relative.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if path.trim().is_empty() || escapes {
        return Err(HiveError::MergeApply(format!(
            "refusing to write outside the target: {}",
            path
        )));
    }
    Ok(relative.to_path_buf())
}

/// Write or delete each change under `root`
///
/// Every path is checked before anything is touched, so a rejected change
/// set leaves the directory as it was.
pub async fn apply_file_changes(root: &Path, files: &[FileChange]) -> Result<Vec<String>> {
    let resolved = files
        .iter()
        .map(|change| checked_relative(&change.path).map(|rel| (root.join(rel), change)))
        .collect::<Result<Vec<_>>>()?;

    let mut applied = Vec::with_capacity(resolved.len());
    for (target, change) in resolved {
        match change.action {
            FileAction::Create | FileAction::Modify => {
                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&target, &change.content).await?;
            }
            FileAction::Delete => match tokio::fs::remove_file(&target).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("{} already absent", change.path);
                }
                Err(e) => return Err(e.into()),
            },
        }
        applied.push(change.path.clone());
    }
    Ok(applied)
}

/// Merge target backed by a local directory
#[derive(Debug, Clone)]
pub struct LocalDirectoryTarget {
    root: PathBuf,
}

impl LocalDirectoryTarget {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl MergeTarget for LocalDirectoryTarget {
    #[instrument(skip_all, fields(request_id = %request.id))]
    async fn apply(&self, request: &MergeRequest) -> Result<Vec<String>> {
        let applied = apply_file_changes(&self.root, &request.files)
            .await
            .map_err(|e| match e {
                HiveError::MergeApply(_) => e,
                other => HiveError::MergeApply(other.to_string()),
            })?;
        info!(
            "Applied {} change(s) to {}",
            applied.len(),
            self.root.display()
        );
        Ok(applied)
    }
}

fn copy_dir_sync(from: &Path, to: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let name = entry.file_name();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            if name.to_str().is_some_and(|n| SKIPPED_DIRS.contains(&n)) {
                continue;
            }
            copy_dir_sync(&entry.path(), &to.join(&name))?;
        } else if file_type.is_file() {
            std::fs::copy(entry.path(), to.join(&name))?;
        }
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...[truncated]", &s[..end])
}

async fn run_check(dir: &Path, command: &str) -> (bool, String) {
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(dir)
        .output()
        .await;

    match output {
        Ok(output) if output.status.success() => (true, String::new()),
        Ok(output) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            (
                false,
                format!(
                    "{} failed:\n\nSTDOUT:\n{}\n\nSTDERR:\n{}",
                    command,
                    truncate(stdout.trim(), MAX_OUTPUT),
                    truncate(stderr.trim(), MAX_OUTPUT)
                ),
            )
        }
        Err(e) => (false, format!("Failed to run {}: {}", command, e)),
    }
}

/// Undoes a half-built sandbox when `create` fails or is dropped mid-copy
///
/// The blocking copy keeps running after its future is dropped, so it also
/// checks `abandoned` when it finishes and removes whatever it wrote.
struct CreateGuard<'a> {
    sandboxes: &'a Mutex<HashMap<String, PathBuf>>,
    id: String,
    dir: PathBuf,
    abandoned: Arc<AtomicBool>,
    armed: bool,
}

impl<'a> CreateGuard<'a> {
    fn new(sandboxes: &'a Mutex<HashMap<String, PathBuf>>, id: &str, dir: &Path) -> Self {
        Self {
            sandboxes,
            id: id.to_string(),
            dir: dir.to_path_buf(),
            abandoned: Arc::new(AtomicBool::new(false)),
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CreateGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.abandoned.store(true, Ordering::SeqCst);
        if let Ok(mut sandboxes) = self.sandboxes.lock() {
            sandboxes.remove(&self.id);
        }
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", self.dir.display(), e),
        }
        debug!("Discarded unfinished test sandbox {}", self.id);
    }
}

/// Test sandboxes as scratch directories on the local machine
///
/// `create` copies the base directory (when set) into a fresh scratch
/// directory; `run_checks` runs each configured command there through
/// `sh -c`, stopping at the first failure.
#[derive(Debug)]
pub struct LocalSandboxProvider {
    base: Option<PathBuf>,
    scratch_root: PathBuf,
    check_commands: Vec<String>,
    sandboxes: Mutex<HashMap<String, PathBuf>>,
}

impl LocalSandboxProvider {
    pub fn new(base: Option<PathBuf>, check_commands: Vec<String>) -> Self {
        Self {
            base,
            scratch_root: std::env::temp_dir().join("hive-sandboxes"),
            check_commands,
            sandboxes: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = root.into();
        self
    }

    /// Directory backing a live sandbox
    pub fn sandbox_path(&self, sandbox_id: &str) -> Result<PathBuf> {
        let sandboxes = self
            .sandboxes
            .lock()
            .map_err(|e| HiveError::Sandbox(e.to_string()))?;
        sandboxes
            .get(sandbox_id)
            .cloned()
            .ok_or_else(|| HiveError::Sandbox(format!("unknown sandbox {}", sandbox_id)))
    }

    pub fn active_count(&self) -> usize {
        self.sandboxes.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl TestSandboxProvider for LocalSandboxProvider {
    #[instrument(skip_all, fields(request_id = %request.id))]
    async fn create(&self, request: &MergeRequest) -> Result<String> {
        let id = format!("test-{}", uuid::Uuid::new_v4().simple());
        let dir = self.scratch_root.join(&id);

        self.sandboxes
            .lock()
            .map_err(|e| HiveError::Sandbox(e.to_string()))?
            .insert(id.clone(), dir.clone());
        let guard = CreateGuard::new(&self.sandboxes, &id, &dir);

        let base = self.base.clone();
        let target = dir.clone();
        let abandoned = Arc::clone(&guard.abandoned);
        tokio::task::spawn_blocking(move || {
            let copied = match base {
                Some(base) => copy_dir_sync(&base, &target),
                None => std::fs::create_dir_all(&target),
            };
            if abandoned.load(Ordering::SeqCst) {
                let _ = std::fs::remove_dir_all(&target);
            }
            copied
        })
        .await
        .map_err(|e| HiveError::Sandbox(e.to_string()))?
        .map_err(|e| HiveError::Sandbox(format!("creating {}: {}", dir.display(), e)))?;

        guard.disarm();
        info!("Created test sandbox {} at {}", id, dir.display());
        Ok(id)
    }

    async fn apply_changes(&self, sandbox_id: &str, files: &[FileChange]) -> Result<()> {
        let dir = self.sandbox_path(sandbox_id)?;
        apply_file_changes(&dir, files).await?;
        Ok(())
    }

    async fn run_checks(&self, sandbox_id: &str) -> Result<SandboxCheckReport> {
        let dir = self.sandbox_path(sandbox_id)?;
        if self.check_commands.is_empty() {
            return Ok(SandboxCheckReport {
                passed: true,
                output: String::new(),
            });
        }

        for command in &self.check_commands {
            debug!("Sandbox {}: running {}", sandbox_id, command);
            let (passed, output) = run_check(&dir, command).await;
            if !passed {
                warn!("Sandbox {}: {} failed", sandbox_id, command);
                return Ok(SandboxCheckReport { passed, output });
            }
        }
        Ok(SandboxCheckReport {
            passed: true,
            output: format!("{} check(s) passed", self.check_commands.len()),
        })
    }

    async fn destroy(&self, sandbox_id: &str) -> Result<()> {
        let dir = self
            .sandboxes
            .lock()
            .map_err(|e| HiveError::Sandbox(e.to_string()))?
            .remove(sandbox_id)
            .ok_or_else(|| HiveError::Sandbox(format!("unknown sandbox {}", sandbox_id)))?;

        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(HiveError::Sandbox(format!("removing {}: {}", dir.display(), e))),
        }
        debug!("Destroyed test sandbox {}", sandbox_id);
        Ok(())
    }
}
