//! FileShare CRD
//!
//! The volume a BackupSchedule backs up. Only its conditions are read here;
//! the FileShare reconciler lives elsewhere.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::condition::{is_condition_true, Condition, CONDITION_READY};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "storage.microscaler.io",
    version = "v1alpha1",
    kind = "FileShare",
    namespaced,
    status = "FileShareStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct FileShareSpec {
    /// Provisioned capacity in GiB
    #[serde(default)]
    pub capacity_gib: u64,

    /// Provider tier (e.g., "standard", "premium")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileShareStatus {
    /// Observed conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Provider-assigned identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
}

impl FileShare {
    /// Whether the share reports `Ready=True`
    pub fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|s| is_condition_true(&s.conditions, CONDITION_READY))
    }
}
