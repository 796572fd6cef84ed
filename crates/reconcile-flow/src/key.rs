//! Object identity

use std::fmt;

use kube::{Resource, ResourceExt};

/// Namespace and name of a reconciled object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    /// Namespace (`None` for cluster-scoped objects)
    pub namespace: Option<String>,
    /// Object name
    pub name: String,
}

impl ObjectKey {
    /// Key for a namespaced object
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Key of an existing resource
    pub fn of<K: Resource>(resource: &K) -> Self {
        Self {
            namespace: resource.namespace(),
            name: resource.name_any(),
        }
    }

    /// Namespace as `&str`, empty for cluster-scoped objects
    pub fn namespace_str(&self) -> &str {
        self.namespace.as_deref().unwrap_or_default()
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}/{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;

    #[test]
    fn test_display_and_of() {
        assert_eq!(ObjectKey::new("team-a", "nightly").to_string(), "team-a/nightly");

        let mut cm = ConfigMap::default();
        cm.metadata.name = Some("cfg".to_string());
        let key = ObjectKey::of(&cm);
        assert_eq!(key.to_string(), "cfg");
        assert_eq!(key.namespace_str(), "");
    }
}
