//! GCP backup adapter

use crds::{BackupSchedule, BackupState, GcpBackup, GcpBackupSpec, SourceReference};

use super::ProviderBackup;

impl ProviderBackup for GcpBackup {
    const KIND: &'static str = "GcpBackup";

    fn from_schedule(name: &str, schedule: &BackupSchedule, source: SourceReference) -> Self {
        GcpBackup::new(
            name,
            GcpBackupSpec {
                source,
                location: schedule.spec.location.clone(),
            },
        )
    }

    fn backup_state(&self) -> BackupState {
        self.status.as_ref().map(|s| s.state).unwrap_or_default()
    }
}
