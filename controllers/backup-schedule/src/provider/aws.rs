//! AWS Backup adapter

use crds::{AwsBackup, AwsBackupSpec, BackupSchedule, BackupState, SourceReference};

use super::ProviderBackup;

impl ProviderBackup for AwsBackup {
    const KIND: &'static str = "AwsBackup";

    /// `spec.location` names the AWS Backup vault
    fn from_schedule(name: &str, schedule: &BackupSchedule, source: SourceReference) -> Self {
        AwsBackup::new(
            name,
            AwsBackupSpec {
                source,
                backup_vault: schedule.spec.location.clone(),
            },
        )
    }

    fn backup_state(&self) -> BackupState {
        self.status.as_ref().map(|s| s.state).unwrap_or_default()
    }
}
