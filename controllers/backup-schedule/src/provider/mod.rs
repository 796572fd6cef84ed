//! Provider adapters
//!
//! The state machine never touches a provider backup kind directly. It goes
//! through [`BackupImpl`], selected once per invocation from the
//! `CloudScope` provider. Each provider module only says how to build its
//! backup object from a schedule and how to read its state back.

pub mod aws;
pub mod azure;
pub mod gcp;

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crds::time::to_chrono;
use crds::{
    AwsBackup, AzureBackup, BackupReference, BackupSchedule, BackupState, CloudProvider, GcpBackup,
    SourceReference, LABEL_SCHEDULE_NAME, LABEL_SCHEDULE_NAMESPACE,
};
use k8s_openapi::NamespaceResourceScope;
use kube::{Resource, ResourceExt};
use object_store::{ResourceStore, StoreError};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A provider backup as seen by the state machine
#[derive(Debug, Clone, PartialEq)]
pub struct BackupObject {
    pub reference: BackupReference,
    pub state: BackupState,
    /// Creation timestamp (retention age is measured from here)
    pub created_at: Option<DateTime<Utc>>,
    /// Deletion already requested
    pub deleting: bool,
}

impl BackupObject {
    fn of<K: ProviderBackup>(backup: &K) -> Self {
        Self {
            reference: BackupReference::new(
                K::KIND,
                backup.name_any(),
                backup.namespace().unwrap_or_default(),
            ),
            state: backup.backup_state(),
            created_at: backup.creation_timestamp().as_ref().and_then(to_chrono),
            deleting: backup.meta().deletion_timestamp.is_some(),
        }
    }

    pub fn name(&self) -> &str {
        &self.reference.name
    }

    /// Not yet being deleted, by us or anyone else
    pub fn is_live(&self) -> bool {
        !self.deleting && !matches!(self.state, BackupState::Deleting | BackupState::Deleted)
    }
}

/// Provider-agnostic backup operations for one schedule
#[async_trait]
pub trait BackupImpl: Send + Sync {
    /// Kind of the backups this adapter manages
    fn kind(&self) -> &'static str;

    /// Backups labelled with the schedule, oldest first
    async fn list_for(&self, schedule: &BackupSchedule) -> Result<Vec<BackupObject>, StoreError>;

    /// Create backup `name` for the schedule's source
    async fn create_for(
        &self,
        schedule: &BackupSchedule,
        name: &str,
    ) -> Result<BackupObject, StoreError>;

    /// Request deletion of a backup
    async fn delete(&self, backup: &BackupReference) -> Result<(), StoreError>;
}

/// A provider backup kind
pub trait ProviderBackup:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    const KIND: &'static str;

    /// New backup object named `name` for `source`, located per the schedule
    fn from_schedule(name: &str, schedule: &BackupSchedule, source: SourceReference) -> Self;

    /// Lifecycle state reported by the backup's own reconciler
    fn backup_state(&self) -> BackupState;
}

/// Labels linking a backup to its owning schedule
pub fn schedule_labels(schedule: &BackupSchedule) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_SCHEDULE_NAME.to_string(), schedule.name_any()),
        (
            LABEL_SCHEDULE_NAMESPACE.to_string(),
            schedule.namespace().unwrap_or_default(),
        ),
    ])
}

/// [`BackupImpl`] over a typed store of one provider backup kind
pub struct ProviderBackups<K: Clone + Send + Sync + 'static> {
    store: Arc<dyn ResourceStore<K>>,
}

impl<K: Clone + Send + Sync + 'static> ProviderBackups<K> {
    pub fn new(store: Arc<dyn ResourceStore<K>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<K: ProviderBackup> BackupImpl for ProviderBackups<K> {
    fn kind(&self) -> &'static str {
        K::KIND
    }

    async fn list_for(&self, schedule: &BackupSchedule) -> Result<Vec<BackupObject>, StoreError> {
        let namespace = schedule.namespace();
        let backups = self
            .store
            .list(namespace.as_deref(), &schedule_labels(schedule))
            .await?;
        let mut objects: Vec<BackupObject> = backups.iter().map(BackupObject::of).collect();
        objects.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.reference.name.cmp(&b.reference.name))
        });
        Ok(objects)
    }

    async fn create_for(
        &self,
        schedule: &BackupSchedule,
        name: &str,
    ) -> Result<BackupObject, StoreError> {
        let namespace = schedule.namespace().ok_or_else(|| {
            StoreError::InvalidObject(format!("schedule {} has no namespace", schedule.name_any()))
        })?;
        let source = SourceReference {
            name: schedule.spec.source.name.clone(),
            namespace: Some(schedule.spec.source.namespace_or(&namespace).to_string()),
        };

        let mut backup = K::from_schedule(name, schedule, source);
        let meta = backup.meta_mut();
        meta.namespace = Some(namespace);
        meta.labels = Some(schedule_labels(schedule));

        let created = self.store.create(&backup).await?;
        Ok(BackupObject::of(&created))
    }

    async fn delete(&self, backup: &BackupReference) -> Result<(), StoreError> {
        self.store.delete(Some(&backup.namespace), &backup.name).await
    }
}

/// One adapter per supported provider
#[derive(Clone)]
pub struct ProviderAdapters {
    aws: Arc<dyn BackupImpl>,
    gcp: Arc<dyn BackupImpl>,
    azure: Arc<dyn BackupImpl>,
}

impl ProviderAdapters {
    pub fn new(
        aws: Arc<dyn ResourceStore<AwsBackup>>,
        gcp: Arc<dyn ResourceStore<GcpBackup>>,
        azure: Arc<dyn ResourceStore<AzureBackup>>,
    ) -> Self {
        Self {
            aws: Arc::new(ProviderBackups::new(aws)),
            gcp: Arc::new(ProviderBackups::new(gcp)),
            azure: Arc::new(ProviderBackups::new(azure)),
        }
    }

    /// Adapter for `provider`; `None` when the provider has no backup support
    pub fn select(&self, provider: CloudProvider) -> Option<Arc<dyn BackupImpl>> {
        match provider {
            CloudProvider::Aws => Some(Arc::clone(&self.aws)),
            CloudProvider::Gcp => Some(Arc::clone(&self.gcp)),
            CloudProvider::Azure => Some(Arc::clone(&self.azure)),
            CloudProvider::Unsupported => None,
        }
    }
}
