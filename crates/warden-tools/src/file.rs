//! Filesystem tool handlers: read, write, edit, glob, and grep.
//!
//! Every handler re-validates its path against the [`PathPolicy`] even though
//! the gateway already screened the call. A handler reached through some
//! future code path must still refuse to leave the boundary.

use std::path::{Path, PathBuf};
use std::pin::Pin;

use schemars::JsonSchema;
use serde::Deserialize;
use tracing::debug;

use crate::executor::{
    deserialize_params, ErrorKind, ToolError, ToolHandler, ToolResult,
};
use crate::registry::{TargetShape, ToolDescriptor};
use crate::security::PathPolicy;

/// Directories skipped by glob and grep.
const IGNORED_DIRS: &[&str] = &[
    ".git",
    "target",
    "node_modules",
    ".venv",
    "__pycache__",
    "dist",
    "build",
];

const MAX_GLOB_RESULTS: usize = 500;
const MAX_GREP_MATCHES: usize = 100;

/// Reject traversal and out-of-boundary paths, then resolve to absolute.
fn checked_path(policy: &PathPolicy, value: &str) -> Result<PathBuf, ToolError> {
    if policy.has_traversal_pattern(value) {
        return Err(ToolError::SandboxViolation {
            path: value.to_string(),
        });
    }
    let resolved = policy.resolve(value);
    if !policy.is_inside_boundary(&resolved) {
        return Err(ToolError::SandboxViolation {
            path: value.to_string(),
        });
    }
    Ok(resolved)
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadParams {
    /// Path to the file, relative to the workspace root or absolute within it.
    pub file_path: String,
    /// First line to return, 1-based.
    #[serde(default)]
    pub offset: Option<usize>,
    /// Maximum number of lines to return.
    #[serde(default)]
    pub limit: Option<usize>,
}

pub struct ReadFileHandler {
    policy: PathPolicy,
}

impl ReadFileHandler {
    #[must_use]
    pub fn new(policy: PathPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor {
            id: "read_file".to_string(),
            description: "Read a file, optionally a line range".to_string(),
            schema: schemars::schema_for!(ReadParams).to_value(),
            target_shape: TargetShape::Path("file_path"),
            requires_confirmation: false,
            truncatable: true,
            truncation_guidance: Some(
                "re-read with offset and limit to fetch a smaller range".to_string(),
            ),
        }
    }

    async fn execute(&self, params: ReadParams) -> Result<ToolResult, ToolError> {
        let path = checked_path(&self.policy, &params.file_path)?;
        let text = tokio::fs::read_to_string(&path).await?;
        let content = match (params.offset, params.limit) {
            (None, None) => text,
            (offset, limit) => {
                let skip = offset.unwrap_or(1).saturating_sub(1);
                let take = limit.unwrap_or(usize::MAX);
                text.lines()
                    .skip(skip)
                    .take(take)
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        };
        Ok(ToolResult::ok(content))
    }
}

impl ToolHandler for ReadFileHandler {
    fn run(
        &self,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Pin<Box<dyn Future<Output = Result<ToolResult, ToolError>> + Send + '_>> {
        Box::pin(async move {
            let params: ReadParams = deserialize_params(&arguments)?;
            self.execute(params).await
        })
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WriteParams {
    pub file_path: String,
    pub content: String,
}

pub struct WriteFileHandler {
    policy: PathPolicy,
}

impl WriteFileHandler {
    #[must_use]
    pub fn new(policy: PathPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor {
            id: "write_file".to_string(),
            description: "Create or overwrite a file with the given content".to_string(),
            schema: schemars::schema_for!(WriteParams).to_value(),
            target_shape: TargetShape::Path("file_path"),
            requires_confirmation: true,
            truncatable: true,
            truncation_guidance: None,
        }
    }

    async fn execute(&self, params: WriteParams) -> Result<ToolResult, ToolError> {
        let path = checked_path(&self.policy, &params.file_path)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &params.content).await?;
        debug!(path = %path.display(), bytes = params.content.len(), "wrote file");
        Ok(ToolResult::ok(format!(
            "wrote {} bytes to {}",
            params.content.len(),
            path.display()
        )))
    }
}

impl ToolHandler for WriteFileHandler {
    fn run(
        &self,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Pin<Box<dyn Future<Output = Result<ToolResult, ToolError>> + Send + '_>> {
        Box::pin(async move {
            let params: WriteParams = deserialize_params(&arguments)?;
            self.execute(params).await
        })
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EditParams {
    pub file_path: String,
    /// Exact text to replace; must appear in the file.
    pub old_string: String,
    pub new_string: String,
    /// Replace every occurrence instead of requiring a unique match.
    #[serde(default)]
    pub replace_all: bool,
}

pub struct EditFileHandler {
    policy: PathPolicy,
}

impl EditFileHandler {
    #[must_use]
    pub fn new(policy: PathPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor {
            id: "edit_file".to_string(),
            description: "Replace an exact string in a file".to_string(),
            schema: schemars::schema_for!(EditParams).to_value(),
            target_shape: TargetShape::Path("file_path"),
            requires_confirmation: true,
            truncatable: true,
            truncation_guidance: None,
        }
    }

    async fn execute(&self, params: EditParams) -> Result<ToolResult, ToolError> {
        if params.old_string.is_empty() {
            return Err(ToolError::InvalidParams {
                message: "old_string must not be empty".to_string(),
            });
        }
        if params.old_string == params.new_string {
            return Err(ToolError::InvalidParams {
                message: "old_string and new_string are identical".to_string(),
            });
        }
        let path = checked_path(&self.policy, &params.file_path)?;
        let text = tokio::fs::read_to_string(&path).await?;
        let occurrences = text.matches(&params.old_string).count();
        if occurrences == 0 {
            return Ok(ToolResult::failure(
                ErrorKind::UserError,
                format!("old_string not found in {}", path.display()),
            ));
        }
        if occurrences > 1 && !params.replace_all {
            return Ok(ToolResult::failure(
                ErrorKind::UserError,
                format!(
                    "old_string matches {occurrences} times in {}; \
                     make it unique or set replace_all",
                    path.display()
                ),
            ));
        }
        let replaced = if params.replace_all {
            text.replace(&params.old_string, &params.new_string)
        } else {
            text.replacen(&params.old_string, &params.new_string, 1)
        };
        tokio::fs::write(&path, replaced).await?;
        let count = if params.replace_all { occurrences } else { 1 };
        Ok(ToolResult::ok(format!(
            "replaced {count} occurrence(s) in {}",
            path.display()
        )))
    }
}

impl ToolHandler for EditFileHandler {
    fn run(
        &self,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Pin<Box<dyn Future<Output = Result<ToolResult, ToolError>> + Send + '_>> {
        Box::pin(async move {
            let params: EditParams = deserialize_params(&arguments)?;
            self.execute(params).await
        })
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GlobParams {
    /// Glob pattern, relative to the workspace root or absolute within it.
    pub pattern: String,
}

pub struct GlobHandler {
    policy: PathPolicy,
}

impl GlobHandler {
    #[must_use]
    pub fn new(policy: PathPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor {
            id: "glob".to_string(),
            description: "Find files matching a glob pattern".to_string(),
            schema: schemars::schema_for!(GlobParams).to_value(),
            target_shape: TargetShape::Path("pattern"),
            requires_confirmation: false,
            truncatable: true,
            truncation_guidance: Some("use a more specific pattern".to_string()),
        }
    }

    async fn execute(&self, params: GlobParams) -> Result<ToolResult, ToolError> {
        if self.policy.has_traversal_pattern(&params.pattern) {
            return Err(ToolError::SandboxViolation {
                path: params.pattern,
            });
        }
        let pattern = if params.pattern.starts_with('/') {
            params.pattern.clone()
        } else {
            self.policy
                .workspace_root()
                .join(&params.pattern)
                .to_string_lossy()
                .into_owned()
        };
        let root = self.policy.workspace_root().to_path_buf();
        let listing = tokio::task::spawn_blocking(move || glob_files(&pattern, &root))
            .await
            .map_err(|e| ToolError::Execution(std::io::Error::other(e)))??;
        Ok(ToolResult::ok(listing))
    }
}

fn glob_files(pattern: &str, root: &Path) -> Result<String, ToolError> {
    let paths = glob::glob(pattern).map_err(|e| ToolError::InvalidParams {
        message: format!("invalid glob pattern: {e}"),
    })?;
    let mut matches = Vec::new();
    for entry in paths.flatten() {
        if entry
            .components()
            .any(|c| IGNORED_DIRS.contains(&c.as_os_str().to_string_lossy().as_ref()))
        {
            continue;
        }
        let shown = entry.strip_prefix(root).unwrap_or(&entry);
        matches.push(shown.display().to_string());
        if matches.len() >= MAX_GLOB_RESULTS {
            break;
        }
    }
    if matches.is_empty() {
        return Ok("no files matched".to_string());
    }
    matches.sort();
    Ok(matches.join("\n"))
}

impl ToolHandler for GlobHandler {
    fn run(
        &self,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Pin<Box<dyn Future<Output = Result<ToolResult, ToolError>> + Send + '_>> {
        Box::pin(async move {
            let params: GlobParams = deserialize_params(&arguments)?;
            self.execute(params).await
        })
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GrepParams {
    /// Regular expression to search for.
    pub pattern: String,
    /// File or directory to search; defaults to the workspace root.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub case_sensitive: bool,
}

pub struct GrepHandler {
    policy: PathPolicy,
}

impl GrepHandler {
    #[must_use]
    pub fn new(policy: PathPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor {
            id: "grep".to_string(),
            description: "Search file contents with a regular expression".to_string(),
            schema: schemars::schema_for!(GrepParams).to_value(),
            target_shape: TargetShape::Path("path"),
            requires_confirmation: false,
            truncatable: true,
            truncation_guidance: Some(
                "narrow the pattern or search a subdirectory".to_string(),
            ),
        }
    }

    async fn execute(&self, params: GrepParams) -> Result<ToolResult, ToolError> {
        let root = match params.path.as_deref() {
            Some(path) => checked_path(&self.policy, path)?,
            None => self.policy.workspace_root().to_path_buf(),
        };
        let regex = regex::RegexBuilder::new(&params.pattern)
            .case_insensitive(!params.case_sensitive)
            .build()
            .map_err(|e| ToolError::InvalidParams {
                message: format!("invalid regex: {e}"),
            })?;
        let base = self.policy.workspace_root().to_path_buf();
        let listing =
            tokio::task::spawn_blocking(move || grep_tree(&root, &base, &regex))
                .await
                .map_err(|e| ToolError::Execution(std::io::Error::other(e)))??;
        Ok(ToolResult::ok(listing))
    }
}

fn grep_tree(root: &Path, base: &Path, regex: &regex::Regex) -> Result<String, ToolError> {
    let mut matches = Vec::new();
    grep_path(root, base, regex, &mut matches)?;
    if matches.is_empty() {
        return Ok("no matches".to_string());
    }
    let truncated = matches.len() >= MAX_GREP_MATCHES;
    let mut out = matches.join("\n");
    if truncated {
        out.push_str("\n[match limit reached]");
    }
    Ok(out)
}

fn grep_path(
    path: &Path,
    base: &Path,
    regex: &regex::Regex,
    matches: &mut Vec<String>,
) -> Result<(), ToolError> {
    if matches.len() >= MAX_GREP_MATCHES {
        return Ok(());
    }
    if path.is_dir() {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(path)?
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .is_none_or(|n| !IGNORED_DIRS.contains(&n.to_string_lossy().as_ref()))
            })
            .collect();
        entries.sort();
        for entry in entries {
            grep_path(&entry, base, regex, matches)?;
        }
        return Ok(());
    }
    // Non-text files fail to decode; skip them.
    let Ok(text) = std::fs::read_to_string(path) else {
        return Ok(());
    };
    let shown = path.strip_prefix(base).unwrap_or(path);
    for (number, line) in text.lines().enumerate() {
        if regex.is_match(line) {
            matches.push(format!("{}:{}:{line}", shown.display(), number + 1));
            if matches.len() >= MAX_GREP_MATCHES {
                return Ok(());
            }
        }
    }
    Ok(())
}

impl ToolHandler for GrepHandler {
    fn run(
        &self,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Pin<Box<dyn Future<Output = Result<ToolResult, ToolError>> + Send + '_>> {
        Box::pin(async move {
            let params: GrepParams = deserialize_params(&arguments)?;
            self.execute(params).await
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn args(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().cloned().unwrap()
    }

    fn setup() -> (TempDir, PathPolicy) {
        let dir = TempDir::new().unwrap();
        let policy = PathPolicy::new(dir.path().to_path_buf(), dir.path().join("tmp"));
        (dir, policy)
    }

    #[tokio::test]
    async fn write_then_read_round_trip() {
        let (dir, policy) = setup();
        let write = WriteFileHandler::new(policy.clone());
        let read = ReadFileHandler::new(policy);
        write
            .run(args(json!({"file_path": "notes.txt", "content": "line one\nline two\n"})))
            .await
            .unwrap();
        assert!(dir.path().join("notes.txt").is_file());
        let result = read
            .run(args(json!({"file_path": "notes.txt"})))
            .await
            .unwrap();
        assert_eq!(result.content.as_deref(), Some("line one\nline two\n"));
    }

    #[tokio::test]
    async fn read_with_offset_and_limit() {
        let (_dir, policy) = setup();
        let write = WriteFileHandler::new(policy.clone());
        let read = ReadFileHandler::new(policy);
        write
            .run(args(json!({"file_path": "n.txt", "content": "a\nb\nc\nd\n"})))
            .await
            .unwrap();
        let result = read
            .run(args(json!({"file_path": "n.txt", "offset": 2, "limit": 2})))
            .await
            .unwrap();
        assert_eq!(result.content.as_deref(), Some("b\nc"));
    }

    #[tokio::test]
    async fn read_missing_file_is_execution_error() {
        let (_dir, policy) = setup();
        let read = ReadFileHandler::new(policy);
        let err = read
            .run(args(json!({"file_path": "missing.txt"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Execution(_)));
    }

    #[tokio::test]
    async fn traversal_path_is_rejected() {
        let (_dir, policy) = setup();
        let read = ReadFileHandler::new(policy);
        let err = read
            .run(args(json!({"file_path": "../etc/passwd"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::SandboxViolation { .. }));
    }

    #[tokio::test]
    async fn absolute_path_outside_boundary_is_rejected() {
        let (_dir, policy) = setup();
        let write = WriteFileHandler::new(policy);
        let err = write
            .run(args(json!({"file_path": "/etc/cron.d/job", "content": "x"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::SandboxViolation { .. }));
    }

    #[tokio::test]
    async fn write_creates_parent_directories() {
        let (dir, policy) = setup();
        let write = WriteFileHandler::new(policy);
        write
            .run(args(json!({"file_path": "a/b/c.txt", "content": "deep"})))
            .await
            .unwrap();
        assert!(dir.path().join("a/b/c.txt").is_file());
    }

    #[tokio::test]
    async fn edit_replaces_unique_match() {
        let (dir, policy) = setup();
        let write = WriteFileHandler::new(policy.clone());
        let edit = EditFileHandler::new(policy);
        write
            .run(args(json!({"file_path": "f.txt", "content": "hello world"})))
            .await
            .unwrap();
        let result = edit
            .run(args(json!({
                "file_path": "f.txt",
                "old_string": "world",
                "new_string": "there"
            })))
            .await
            .unwrap();
        assert!(result.success);
        let text = std::fs::read_to_string(dir.path().join("f.txt")).unwrap();
        assert_eq!(text, "hello there");
    }

    #[tokio::test]
    async fn ambiguous_edit_fails_without_replace_all() {
        let (_dir, policy) = setup();
        let write = WriteFileHandler::new(policy.clone());
        let edit = EditFileHandler::new(policy);
        write
            .run(args(json!({"file_path": "f.txt", "content": "aa aa"})))
            .await
            .unwrap();
        let result = edit
            .run(args(json!({
                "file_path": "f.txt",
                "old_string": "aa",
                "new_string": "bb"
            })))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::UserError));
    }

    #[tokio::test]
    async fn replace_all_rewrites_every_match() {
        let (dir, policy) = setup();
        let write = WriteFileHandler::new(policy.clone());
        let edit = EditFileHandler::new(policy);
        write
            .run(args(json!({"file_path": "f.txt", "content": "aa aa"})))
            .await
            .unwrap();
        let result = edit
            .run(args(json!({
                "file_path": "f.txt",
                "old_string": "aa",
                "new_string": "bb",
                "replace_all": true
            })))
            .await
            .unwrap();
        assert!(result.success);
        let text = std::fs::read_to_string(dir.path().join("f.txt")).unwrap();
        assert_eq!(text, "bb bb");
    }

    #[tokio::test]
    async fn edit_missing_string_is_user_error() {
        let (_dir, policy) = setup();
        let write = WriteFileHandler::new(policy.clone());
        let edit = EditFileHandler::new(policy);
        write
            .run(args(json!({"file_path": "f.txt", "content": "abc"})))
            .await
            .unwrap();
        let result = edit
            .run(args(json!({
                "file_path": "f.txt",
                "old_string": "zzz",
                "new_string": "yyy"
            })))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::UserError));
    }

    #[tokio::test]
    async fn glob_lists_matching_files() {
        let (dir, policy) = setup();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/a.rs"), "").unwrap();
        std::fs::write(dir.path().join("src/b.rs"), "").unwrap();
        std::fs::write(dir.path().join("src/c.txt"), "").unwrap();
        let result = GlobHandler::new(policy)
            .run(args(json!({"pattern": "src/*.rs"})))
            .await
            .unwrap();
        assert_eq!(result.content.as_deref(), Some("src/a.rs\nsrc/b.rs"));
    }

    #[tokio::test]
    async fn glob_outside_boundary_is_rejected() {
        let (_dir, policy) = setup();
        let err = GlobHandler::new(policy)
            .run(args(json!({"pattern": "/etc/*.conf"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::SandboxViolation { .. }));
    }

    #[tokio::test]
    async fn grep_reports_file_line_and_text() {
        let (dir, policy) = setup();
        std::fs::write(dir.path().join("x.txt"), "alpha\nbeta\ngamma beta\n").unwrap();
        let result = GrepHandler::new(policy)
            .run(args(json!({"pattern": "beta"})))
            .await
            .unwrap();
        let content = result.content.unwrap();
        assert!(content.contains("x.txt:2:beta"));
        assert!(content.contains("x.txt:3:gamma beta"));
    }

    #[tokio::test]
    async fn grep_is_case_insensitive_by_default() {
        let (dir, policy) = setup();
        std::fs::write(dir.path().join("x.txt"), "Alpha\n").unwrap();
        let result = GrepHandler::new(policy.clone())
            .run(args(json!({"pattern": "alpha"})))
            .await
            .unwrap();
        assert!(result.content.unwrap().contains("x.txt:1:Alpha"));
        let result = GrepHandler::new(policy)
            .run(args(json!({"pattern": "alpha", "case_sensitive": true})))
            .await
            .unwrap();
        assert_eq!(result.content.as_deref(), Some("no matches"));
    }

    #[tokio::test]
    async fn grep_skips_ignored_directories() {
        let (dir, policy) = setup();
        std::fs::create_dir_all(dir.path().join("target")).unwrap();
        std::fs::write(dir.path().join("target/out.txt"), "needle\n").unwrap();
        std::fs::write(dir.path().join("keep.txt"), "needle\n").unwrap();
        let result = GrepHandler::new(policy)
            .run(args(json!({"pattern": "needle"})))
            .await
            .unwrap();
        let content = result.content.unwrap();
        assert!(content.contains("keep.txt:1:needle"));
        assert!(!content.contains("target"));
    }
}
