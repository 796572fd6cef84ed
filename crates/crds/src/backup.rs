//! Provider backup CRDs
//!
//! One backup kind per cloud provider. They share a status shape and differ
//! only in how the storage location is expressed. Each backup created by a
//! schedule carries the schedule label pair, which is the only link back to
//! the owning schedule.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::references::SourceReference;

/// Label carrying the owning schedule's name
pub const LABEL_SCHEDULE_NAME: &str = "schedule-name";

/// Label carrying the owning schedule's namespace
pub const LABEL_SCHEDULE_NAMESPACE: &str = "schedule-namespace";

/// Lifecycle state of a provider backup
///
/// Serializes as PascalCase ("Creating", "Ready", etc.).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "PascalCase")]
pub enum BackupState {
    /// Provider operation in flight
    #[default]
    Creating,
    /// Backup completed
    Ready,
    /// Backup failed
    Failed,
    /// Provider deletion in flight
    Deleting,
    /// Deleted at the provider
    Deleted,
}

/// Status shared by every provider backup kind
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderBackupStatus {
    /// Lifecycle state
    #[serde(default)]
    pub state: BackupState,

    /// Observed conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Identifier assigned by the cloud provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,

    /// Last provider message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "storage.microscaler.io",
    version = "v1alpha1",
    kind = "AwsBackup",
    namespaced,
    status = "ProviderBackupStatus",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AwsBackupSpec {
    /// FileShare being backed up
    pub source: SourceReference,

    /// AWS Backup vault name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_vault: Option<String>,
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "storage.microscaler.io",
    version = "v1alpha1",
    kind = "GcpBackup",
    namespaced,
    status = "ProviderBackupStatus",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GcpBackupSpec {
    /// FileShare being backed up
    pub source: SourceReference,

    /// GCP location for the backup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "storage.microscaler.io",
    version = "v1alpha1",
    kind = "AzureBackup",
    namespaced,
    status = "ProviderBackupStatus",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AzureBackupSpec {
    /// FileShare being backed up
    pub source: SourceReference,

    /// Recovery Services vault name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_vault: Option<String>,
}
