//! Test utilities for unit testing the reconciler
//!
//! Fixtures for the CRDs involved and a harness running the real pipeline
//! over in-memory stores.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crds::time::from_chrono;
use crds::*;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use object_store::{MockStore, RecordingEventPublisher};
use reconcile_flow::{Flow, ObjectKey};
use tokio_util::sync::CancellationToken;

use crate::metrics::Metrics;
use crate::reconciler::{Context, Reconciler, Settings};

pub const TEST_NAMESPACE: &str = "team-a";

/// Parse an RFC3339 instant
pub fn at(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .unwrap()
        .with_timezone(&Utc)
}

/// Helper to create a test BackupSchedule backing up FileShare "data"
pub fn create_test_schedule(name: &str, namespace: &str, schedule: &str) -> BackupSchedule {
    BackupSchedule {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: BackupScheduleSpec {
            source: SourceReference {
                name: "data".to_string(),
                namespace: None,
            },
            location: None,
            schedule: schedule.to_string(),
            prefix: None,
            start_time: None,
            end_time: None,
            max_retention_days: 0,
            max_ready_backups: 0,
            max_failed_backups: 0,
            suspend: false,
            delete_cascade: false,
        },
        status: None,
    }
}

/// Helper to create a test FileShare, optionally reporting Ready=True
pub fn create_test_share(name: &str, namespace: &str, ready: bool) -> FileShare {
    let mut share = FileShare::new(
        name,
        FileShareSpec {
            capacity_gib: 100,
            tier: None,
        },
    );
    share.metadata.namespace = Some(namespace.to_string());
    let status = if ready {
        ConditionStatus::True
    } else {
        ConditionStatus::False
    };
    share.status = Some(FileShareStatus {
        conditions: vec![Condition::new(
            CONDITION_READY,
            status,
            "Provisioned",
            "",
            at("2024-01-01T00:00:00Z"),
        )],
        provider_id: None,
    });
    share
}

/// Helper to create a test CloudScope
pub fn create_test_scope(name: &str, provider: CloudProvider) -> CloudScope {
    CloudScope::new(
        name,
        CloudScopeSpec {
            provider,
            region: None,
        },
    )
}

/// Helper to create an AwsBackup already owned by `schedule`
pub fn create_test_backup(
    name: &str,
    schedule: &str,
    state: BackupState,
    created: &str,
) -> AwsBackup {
    let mut backup = AwsBackup::new(
        name,
        AwsBackupSpec {
            source: SourceReference {
                name: "data".to_string(),
                namespace: Some(TEST_NAMESPACE.to_string()),
            },
            backup_vault: None,
        },
    );
    backup.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    backup.metadata.labels = Some(BTreeMap::from([
        (LABEL_SCHEDULE_NAME.to_string(), schedule.to_string()),
        (LABEL_SCHEDULE_NAMESPACE.to_string(), TEST_NAMESPACE.to_string()),
    ]));
    backup.metadata.creation_timestamp = from_chrono(at(created));
    backup.status = Some(ProviderBackupStatus {
        state,
        ..Default::default()
    });
    backup
}

/// Settings used by the harness
pub fn test_settings() -> Settings {
    Settings {
        scope_name: "default".to_string(),
        dependency_retry: Duration::from_secs(30),
        cascade_poll: Duration::from_secs(5),
        tolerance: chrono::Duration::seconds(1),
    }
}

/// Reconciler over mock stores
///
/// Seeded with an AWS CloudScope named "default" and a Ready FileShare
/// `team-a/data`.
pub struct TestHarness {
    pub schedules: MockStore<BackupSchedule>,
    pub shares: MockStore<FileShare>,
    pub scopes: MockStore<CloudScope>,
    pub aws: MockStore<AwsBackup>,
    pub gcp: MockStore<GcpBackup>,
    pub azure: MockStore<AzureBackup>,
    pub events: RecordingEventPublisher,
    pub reconciler: Reconciler,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_provider(CloudProvider::Aws)
    }

    pub fn with_provider(provider: CloudProvider) -> Self {
        let schedules = MockStore::new();
        let shares = MockStore::new();
        let scopes = MockStore::new();
        let aws = MockStore::new();
        let gcp = MockStore::new();
        let azure = MockStore::new();
        let events = RecordingEventPublisher::new();

        scopes.insert(&create_test_scope("default", provider));
        shares.insert(&create_test_share("data", TEST_NAMESPACE, true));

        let ctx = Context::new(
            Arc::new(schedules.clone()),
            Arc::new(shares.clone()),
            Arc::new(scopes.clone()),
            Arc::new(aws.clone()),
            Arc::new(gcp.clone()),
            Arc::new(azure.clone()),
            Arc::new(events.clone()),
            Metrics::new().unwrap(),
            test_settings(),
        );

        Self {
            schedules,
            shares,
            scopes,
            aws,
            gcp,
            azure,
            events,
            reconciler: Reconciler::new(ctx),
        }
    }

    /// Store a schedule as if created at `created`
    pub fn add_schedule(&self, schedule: BackupSchedule, created: DateTime<Utc>) -> BackupSchedule {
        self.schedules.set_now(created);
        self.schedules.insert(&schedule)
    }

    /// Store an existing backup
    pub fn add_backup(&self, backup: AwsBackup) -> AwsBackup {
        self.aws.insert(&backup)
    }

    /// One invocation at `now`
    pub async fn reconcile(&self, name: &str, now: DateTime<Utc>) -> Flow {
        self.reconcile_with(name, now, &CancellationToken::new()).await
    }

    pub async fn reconcile_with(&self, name: &str, now: DateTime<Utc>, cancel: &CancellationToken) -> Flow {
        self.schedules.set_now(now);
        self.aws.set_now(now);
        self.gcp.set_now(now);
        self.azure.set_now(now);
        let key = ObjectKey::new(TEST_NAMESPACE, name);
        self.reconciler.reconcile_at(&key, now, cancel).await
    }

    /// Invoke repeatedly at `now` while the outcome is an immediate requeue
    pub async fn settle(&self, name: &str, now: DateTime<Utc>) -> Flow {
        for _ in 0..10 {
            let flow = self.reconcile(name, now).await;
            if !matches!(flow, Flow::RequeueNow) {
                return flow;
            }
        }
        panic!("schedule {name} did not settle");
    }

    pub fn schedule(&self, name: &str) -> Option<BackupSchedule> {
        self.schedules.get_object(Some(TEST_NAMESPACE), name)
    }

    pub fn status(&self, name: &str) -> BackupScheduleStatus {
        self.schedule(name)
            .and_then(|s| s.status)
            .unwrap_or_default()
    }

    /// Names of the stored AWS backups, sorted
    pub fn backup_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .aws
            .all()
            .into_iter()
            .filter_map(|b| b.metadata.name)
            .collect();
        names.sort();
        names
    }
}
