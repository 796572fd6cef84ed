//! CloudScope CRD
//!
//! Cluster-scoped descriptor naming the cloud provider this operator instance targets.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "storage.microscaler.io",
    version = "v1alpha1",
    kind = "CloudScope"
)]
#[serde(rename_all = "camelCase")]
pub struct CloudScopeSpec {
    /// Cloud provider
    pub provider: CloudProvider,

    /// Provider region
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// Supported cloud providers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    /// Amazon Web Services
    Aws,
    /// Google Cloud
    Gcp,
    /// Microsoft Azure
    Azure,
    /// Any provider this operator has no backup adapter for
    #[serde(other)]
    Unsupported,
}

impl std::fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CloudProvider::Aws => "aws",
            CloudProvider::Gcp => "gcp",
            CloudProvider::Azure => "azure",
            CloudProvider::Unsupported => "unsupported",
        };
        f.write_str(s)
    }
}
