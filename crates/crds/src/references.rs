//! Object references used by the storage CRDs
//!
//! Schedules point at their source volume through a `SourceReference` and
//! summarize the backups they minted through `BackupReference`s.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to the `FileShare` a schedule backs up
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceReference {
    /// Name of the source FileShare
    pub name: String,

    /// Namespace of the source (defaults to the schedule's namespace)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl SourceReference {
    /// Namespace to resolve the reference in, given the referencing object's namespace
    pub fn namespace_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.namespace.as_deref().unwrap_or(default)
    }
}

/// Reference to a provider backup object created by a schedule
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct BackupReference {
    /// Kind of the backup (e.g., "AwsBackup")
    pub kind: String,

    /// Name of the backup
    pub name: String,

    /// Namespace of the backup
    pub namespace: String,
}

impl BackupReference {
    /// Create a reference
    pub fn new(kind: impl Into<String>, name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl std::fmt::Display for BackupReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}
