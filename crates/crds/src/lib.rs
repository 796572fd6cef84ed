//! Storage Operator CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the storage operator controllers.

pub mod backup;
pub mod backup_schedule;
pub mod cloud_scope;
pub mod condition;
pub mod file_share;
pub mod references;
pub mod time;

pub use backup::*;
pub use backup_schedule::*;
pub use cloud_scope::*;
pub use condition::*;
pub use file_share::*;
pub use references::*;
