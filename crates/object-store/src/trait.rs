//! ResourceStore trait for mocking
//!
//! This trait abstracts typed access to the cluster object store so
//! reconcilers can run against the real API server or an in-memory mock.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::StoreError;

/// Typed object-store operations for one resource kind
///
/// `namespace` is ignored for cluster-scoped kinds. All async methods must be
/// `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ResourceStore<K>: Send + Sync
where
    K: Clone + Send + Sync + 'static,
{
    /// Fetch an object; `Ok(None)` when it does not exist
    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<Option<K>, StoreError>;

    /// List objects carrying every label in `labels` (all namespaces when `namespace` is `None`)
    async fn list(
        &self,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<K>, StoreError>;

    /// Create an object in its own namespace
    ///
    /// Fails with [`StoreError::AlreadyExists`] when the name is taken.
    async fn create(&self, object: &K) -> Result<K, StoreError>;

    /// Request deletion; an object that is already gone is not an error
    async fn delete(&self, namespace: Option<&str>, name: &str) -> Result<(), StoreError>;

    /// Apply a JSON merge patch to the object (metadata, labels, finalizers)
    ///
    /// A patch carrying `metadata.resourceVersion` fails with
    /// [`StoreError::Conflict`] when the stored version differs.
    async fn patch(&self, namespace: Option<&str>, name: &str, patch: &Value) -> Result<K, StoreError>;

    /// Apply a JSON merge patch to the status subresource
    ///
    /// Does not bump the object's generation. Conflict semantics match [`ResourceStore::patch`].
    async fn patch_status(
        &self,
        namespace: Option<&str>,
        name: &str,
        patch: &Value,
    ) -> Result<K, StoreError>;
}

/// Render a label map as a Kubernetes label selector (`k1=v1,k2=v2`)
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}
