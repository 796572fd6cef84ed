//! Backup creation for the current tick

use async_trait::async_trait;
use crds::time::format_rfc3339;
use crds::{BackupReference, ScheduleState};
use kube::runtime::events::EventType;
use kube::ResourceExt;
use reconcile_flow::{Flow, Step};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::ControllerError;
use crate::reconciler::timing::backup_name;
use crate::reconciler::ReconcileState;

/// Creates this tick's backup and records the tick in `lastCreateRun`
///
/// A create that fails leaves the tick unrecorded, so the retry (after the
/// resource's backoff) uses the same name. "Already exists" means an earlier attempt
/// succeeded but its status write was lost, and counts as success.
pub struct CreateBackup;

#[async_trait]
impl Step<ReconcileState> for CreateBackup {
    fn name(&self) -> &str {
        "create-backup"
    }

    async fn run(&self, state: &mut ReconcileState, _cancel: &CancellationToken) -> Flow {
        let (Some(tick), Some(provider)) = (state.next_run_time, state.provider.clone()) else {
            return Flow::fatal(ControllerError::Reconciliation(
                "create reached without a due tick and provider".to_string(),
            ));
        };

        let base = state
            .schedule
            .spec
            .prefix
            .clone()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| state.schedule.name_any());
        let name = backup_name(&base, state.status.backup_index, tick);

        let reference = match provider.create_for(&state.schedule, &name).await {
            Ok(created) => {
                let reference = created.reference.clone();
                info!(schedule = %state.key, backup = %reference, "Backup created");
                state.ctx.metrics.backup_created();
                if !state.backups.iter().any(|b| b.name() == created.name()) {
                    state.backups.push(created);
                }
                reference
            }
            Err(e) if e.is_already_exists() => {
                info!(schedule = %state.key, backup = %name, "Backup already exists, adopting");
                BackupReference::new(provider.kind(), name.as_str(), state.namespace())
            }
            Err(e) => {
                let message = format!("failed to create {} {name}: {e}", provider.kind());
                return state
                    .retry_with_backoff("CreateBackupFailed", "CreateBackup", e, message)
                    .await;
            }
        };

        state.status.backup_index += 1;
        state.status.last_create_run = Some(format_rfc3339(tick));
        state.status.last_created_backup = Some(reference.clone());
        state.queue_event(
            EventType::Normal,
            "BackupCreated",
            "CreateBackup",
            format!("created {reference}"),
        );
        state.transition(ScheduleState::Active, "BackupCreated", format!("created {}", reference.name));
        state.create_run_completed = true;

        let next = if state.delete_run_completed {
            Flow::RequeueNow
        } else {
            Flow::Continue
        };
        state.commit(next).await
    }
}
