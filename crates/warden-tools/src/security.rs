//! Path traversal detection, directory containment, and command sensitivity.
//!
//! All checks are lexical: paths are normalized component-wise without
//! touching the filesystem, so results are deterministic for paths that do
//! not exist yet. Callers canonicalize the workspace root once at startup.

use std::path::{Component, Path, PathBuf};

/// How much harm a command can do, ordered from least to most.
/// Classification is monotonic: a match in the extremely-sensitive list is
/// never downgraded by a match in the sensitive list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SensitivityTier {
    Normal,
    Sensitive,
    ExtremelySensitive,
}

/// Checked first; any match short-circuits. Fixed order so earlier, broader
/// patterns dominate.
const EXTREMELY_SENSITIVE_PATTERNS: &[&str] = &[
    "rm -rf /",
    "rm -fr /",
    "rm -rf ~",
    "rm -rf *",
    ":(){", // fork bomb
    "mkfs",
    "dd if=",
    "of=/dev/",
    "/etc/passwd",
    "/etc/shadow",
    "/etc/sudoers",
    ".ssh/id_",
    ".aws/credentials",
    "sudo ",
    "doas ",
    "| sh",
    "| bash",
    "|sh",
    "|bash",
];

const SENSITIVE_PATTERNS: &[&str] = &[
    "rm ",
    "rmdir",
    "unlink",
    "mv ",
    "chmod",
    "chown",
    "truncate",
    "git push",
    "git reset --hard",
    "git clean",
    "npm publish",
    "cargo publish",
    "gem push",
    "npm install -g",
    "npm i -g",
    "pip install",
];

/// Shell/string markers that indicate traversal or command substitution.
const TRAVERSAL_MARKERS: &[&str] = &["..", "~/", "$HOME", "$(", "`", "${"];

/// Classify a command string by case-insensitive substring search over the
/// fixed pattern lists. Extremely-sensitive patterns are checked first and
/// short-circuit, keeping the tier monotonic.
#[must_use]
pub fn classify_sensitivity(command: &str) -> SensitivityTier {
    let normalized = command.to_lowercase();
    if EXTREMELY_SENSITIVE_PATTERNS
        .iter()
        .any(|p| normalized.contains(p))
    {
        return SensitivityTier::ExtremelySensitive;
    }
    if SENSITIVE_PATTERNS.iter().any(|p| normalized.contains(p)) {
        return SensitivityTier::Sensitive;
    }
    SensitivityTier::Normal
}

/// Tier for a command-shaped permission target. An explicit outside-cwd flag
/// escalates to the maximal tier regardless of pattern matches.
#[must_use]
pub fn command_tier(command: &str, outside_cwd: bool) -> SensitivityTier {
    if outside_cwd {
        return SensitivityTier::ExtremelySensitive;
    }
    classify_sensitivity(command)
}

/// Boundary-safe containment: `child == parent` or `child` has `parent` as a
/// leading component sequence. Component-wise comparison rules out bare
/// prefix matches (`/tmpfile` is not within `/tmp`).
#[must_use]
pub fn is_within_directory(child: &Path, parent: &Path) -> bool {
    normalize_lexical(child).starts_with(normalize_lexical(parent))
}

/// Filesystem boundary captured once at startup: the working directory plus
/// one explicitly configured temp directory. No other absolute path is ever
/// authorized implicitly.
#[derive(Debug, Clone)]
pub struct PathPolicy {
    workspace_root: PathBuf,
    temp_dir: PathBuf,
}

impl PathPolicy {
    #[must_use]
    pub fn new(workspace_root: PathBuf, temp_dir: PathBuf) -> Self {
        Self {
            workspace_root: normalize_lexical(&workspace_root),
            temp_dir: normalize_lexical(&temp_dir),
        }
    }

    #[must_use]
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    #[must_use]
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// True if the string looks like a traversal or escape attempt: it
    /// carries a traversal/substitution marker, or it is a path that resolves
    /// outside the boundary. Glob patterns are judged by their pre-wildcard
    /// base directory.
    #[must_use]
    pub fn has_traversal_pattern(&self, value: &str) -> bool {
        if TRAVERSAL_MARKERS.iter().any(|m| value.contains(m)) {
            return true;
        }
        if value.starts_with('/') {
            return !self.is_inside_boundary(Path::new(glob_base(value)));
        }
        // Relative values resolve against the workspace root; with `..`
        // already excluded above they cannot escape, but check anyway.
        let resolved = self.workspace_root.join(glob_base(value));
        !self.is_inside_boundary(&resolved)
    }

    /// True if the path falls within the workspace root or the temp dir.
    #[must_use]
    pub fn is_inside_boundary(&self, path: &Path) -> bool {
        is_within_directory(path, &self.workspace_root)
            || is_within_directory(path, &self.temp_dir)
    }

    /// Resolve a request path to an absolute, lexically normalized path.
    #[must_use]
    pub fn resolve(&self, value: &str) -> PathBuf {
        let path = Path::new(value);
        if path.is_absolute() {
            normalize_lexical(path)
        } else {
            normalize_lexical(&self.workspace_root.join(path))
        }
    }
}

/// Resolve `.` and `..` components without touching the filesystem.
fn normalize_lexical(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::RootDir | Component::Prefix(_) => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !out.has_root() {
                    out.push("..");
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// For glob patterns, the directory portion before the first wildcard; plain
/// paths come back unchanged.
fn glob_base(value: &str) -> &str {
    match value.find(['*', '?', '[']) {
        Some(idx) => {
            let prefix = &value[..idx];
            prefix.rfind('/').map_or("", |slash| &value[..=slash])
        }
        None => value,
    }
}
