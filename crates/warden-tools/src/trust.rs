//! Session-scoped trust grants for tool invocations.
//!
//! The store only answers "has the user already approved this?". It never
//! overrides security checks: traversal and boundary violations are rejected
//! before trust is consulted, so a grant can never launder a hostile path.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::security::is_within_directory;

/// What a durable grant covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustScope {
    /// Every target the tool can be invoked with.
    Global,
    /// One exact target string (a specific command line, a specific path).
    Target(String),
    /// Any path target under this directory prefix.
    Path(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustGrant {
    pub tool_id: String,
    pub scope: TrustScope,
}

/// In-memory trust state for one session. Durable grants persist until
/// [`TrustStore::reset`]; one-shot approvals are consumed by the first
/// matching lookup.
#[derive(Debug, Default)]
pub struct TrustStore {
    grants: Vec<TrustGrant>,
    one_shots: HashSet<(String, String)>,
}

impl TrustStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a durable grant. Duplicate grants are collapsed.
    pub fn grant(&mut self, tool_id: impl Into<String>, scope: TrustScope) {
        let grant = TrustGrant {
            tool_id: tool_id.into(),
            scope,
        };
        if !self.grants.contains(&grant) {
            self.grants.push(grant);
        }
    }

    /// Record a single-use approval for one exact (tool, target) pair.
    pub fn approve_once(&mut self, tool_id: &str, target: &str) {
        self.one_shots
            .insert((tool_id.to_string(), target.to_string()));
    }

    /// Whether this invocation is already approved. `path` carries the
    /// resolved path for path-shaped targets so directory-prefix grants can
    /// match; durable grants are checked first and a matching one-shot is
    /// consumed only when no durable grant applies.
    pub fn is_trusted(&mut self, tool_id: &str, target: &str, path: Option<&Path>) -> bool {
        let durable = self.grants.iter().any(|g| {
            g.tool_id == tool_id
                && match &g.scope {
                    TrustScope::Global => true,
                    TrustScope::Target(t) => t == target,
                    TrustScope::Path(prefix) => {
                        path.is_some_and(|p| is_within_directory(p, prefix))
                    }
                }
        });
        if durable {
            return true;
        }
        self.one_shots
            .remove(&(tool_id.to_string(), target.to_string()))
    }

    /// Drop every grant and pending one-shot.
    pub fn reset(&mut self) {
        self.grants.clear();
        self.one_shots.clear();
    }

    #[must_use]
    pub fn grants(&self) -> &[TrustGrant] {
        &self.grants
    }
}
