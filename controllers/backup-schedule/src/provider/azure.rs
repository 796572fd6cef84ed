//! Azure Backup adapter

use crds::{AzureBackup, AzureBackupSpec, BackupSchedule, BackupState, SourceReference};

use super::ProviderBackup;

impl ProviderBackup for AzureBackup {
    const KIND: &'static str = "AzureBackup";

    /// `spec.location` names the Recovery Services vault
    fn from_schedule(name: &str, schedule: &BackupSchedule, source: SourceReference) -> Self {
        AzureBackup::new(
            name,
            AzureBackupSpec {
                source,
                recovery_vault: schedule.spec.location.clone(),
            },
        )
    }

    fn backup_state(&self) -> BackupState {
        self.status.as_ref().map(|s| s.state).unwrap_or_default()
    }
}
