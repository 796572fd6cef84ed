//! BackupSchedule CRD
//!
//! Declares a recurring (cron) or one-shot backup policy for a FileShare,
//! together with age and count based retention.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::references::{BackupReference, SourceReference};

/// Finalizer placed on schedules so cascade deletion can run before removal
pub const BACKUP_SCHEDULE_FINALIZER: &str = "storage.microscaler.io/backup-schedule";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "storage.microscaler.io",
    version = "v1alpha1",
    kind = "BackupSchedule",
    namespaced,
    status = "BackupScheduleStatus",
    printcolumn = r#"{"name":"Schedule","type":"string","jsonPath":".spec.schedule"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Backups","type":"integer","jsonPath":".status.backupCount"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BackupScheduleSpec {
    /// FileShare to back up
    pub source: SourceReference,

    /// Provider-specific storage location (vault, bucket location, recovery vault)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Cron expression; empty means a single one-shot backup
    #[serde(default)]
    pub schedule: String,

    /// Name prefix for created backups (defaults to the schedule name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    /// No backup is taken before this instant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,

    /// No backup is taken after this instant; the schedule then completes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    /// Delete backups older than this many days (0 disables retention)
    #[serde(default)]
    pub max_retention_days: i32,

    /// Keep at most this many Ready backups (0 = unlimited)
    #[serde(default)]
    pub max_ready_backups: i32,

    /// Keep at most this many Failed backups (0 = unlimited)
    #[serde(default)]
    pub max_failed_backups: i32,

    /// Stop scheduling new backups
    #[serde(default)]
    pub suspend: bool,

    /// Delete every backup of this schedule when the schedule is deleted
    #[serde(default)]
    pub delete_cascade: bool,
}

impl BackupScheduleSpec {
    /// Whether this is a one-shot schedule
    pub fn is_one_shot(&self) -> bool {
        self.schedule.trim().is_empty()
    }
}

/// Lifecycle state of a BackupSchedule
///
/// Serializes as PascalCase ("Active", "Done", etc.).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum ScheduleState {
    /// Not yet evaluated
    #[default]
    Processing,
    /// Waiting for a future start time
    Pending,
    /// Runs are computed and backups are being taken
    Active,
    /// Suspended by the user
    Suspended,
    /// Schedule completed (end time passed or one-shot finished)
    Done,
    /// Requires user attention or a dependency is missing
    Error,
    /// Schedule is being deleted
    Deleting,
}

impl std::fmt::Display for ScheduleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScheduleState::Processing => "Processing",
            ScheduleState::Pending => "Pending",
            ScheduleState::Active => "Active",
            ScheduleState::Suspended => "Suspended",
            ScheduleState::Done => "Done",
            ScheduleState::Error => "Error",
            ScheduleState::Deleting => "Deleting",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupScheduleStatus {
    /// Lifecycle state
    #[serde(default)]
    pub state: ScheduleState,

    /// Ready / Error conditions (mutually exclusive)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Upcoming trigger instants (RFC3339, at most 3, increasing)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_run_times: Vec<String>,

    /// Backup name to computed expiry instant (RFC3339)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub next_delete_times: BTreeMap<String, String>,

    /// Tick for which a backup was last created (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_create_run: Option<String>,

    /// Tick for which retention last ran (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_delete_run: Option<String>,

    /// Most recently created backup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_created_backup: Option<BackupReference>,

    /// Backups deleted by the most recent retention pass that deleted anything
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub last_deleted_backups: Vec<BackupReference>,

    /// Cron expression the computed run times belong to
    #[serde(default)]
    pub active_schedule: String,

    /// Number of backups created so far (only increases)
    #[serde(default)]
    pub backup_index: u64,

    /// Number of live backups after the last retention pass
    #[serde(default)]
    pub backup_count: u32,

    /// Generation of the spec the status was computed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
