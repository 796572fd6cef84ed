//! Controller-specific error types.
//!
//! Step failures travel through the pipeline as `anyhow::Error` inside
//! `Flow::Fatal`; [`ControllerError::from_flow_error`] recovers the typed
//! error so the error policy can tell permanent failures from retryable ones.

use kube::Error as KubeError;
use object_store::StoreError;
use thiserror::Error;

/// Errors that can occur in the BackupSchedule controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Object store error
    #[error("Object store error: {0}")]
    Store(#[from] StoreError),

    /// Status or patch (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configured cloud provider has no backup adapter
    #[error("Unsupported cloud provider: {0}")]
    UnsupportedProvider(String),

    /// Status write kept conflicting with concurrent writers
    #[error("Status update conflict: {0}")]
    StatusConflict(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Probe server I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reconciliation failed
    #[error("Reconciliation failed: {0}")]
    Reconciliation(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// Errors that retrying cannot fix; the error policy does not requeue them
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ControllerError::UnsupportedProvider(_) | ControllerError::InvalidConfig(_)
        )
    }

    /// Short label used for the `kind` metric dimension
    pub fn kind(&self) -> &'static str {
        match self {
            ControllerError::Kube(_) => "kube",
            ControllerError::Store(_) => "store",
            ControllerError::Serialization(_) => "serialization",
            ControllerError::InvalidConfig(_) => "config",
            ControllerError::UnsupportedProvider(_) => "unsupported_provider",
            ControllerError::StatusConflict(_) => "status_conflict",
            ControllerError::Metrics(_) => "metrics",
            ControllerError::Io(_) => "io",
            ControllerError::Reconciliation(_) => "reconciliation",
            ControllerError::Watch(_) => "watch",
        }
    }

    /// Recover a typed error from a pipeline `Fatal` payload
    pub fn from_flow_error(err: anyhow::Error) -> Self {
        match err.downcast::<ControllerError>() {
            Ok(e) => e,
            Err(other) => match other.downcast::<StoreError>() {
                Ok(e) => ControllerError::Store(e),
                Err(other) => ControllerError::Reconciliation(format!("{other:#}")),
            },
        }
    }
}
