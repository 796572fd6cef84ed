//! Cascade deletion of a deleted schedule's backups

use async_trait::async_trait;
use crds::ScheduleState;
use kube::runtime::events::EventType;
use reconcile_flow::{Flow, Step};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ControllerError;
use crate::reconciler::ReconcileState;

/// Deletes every remaining backup and polls until none are left
///
/// Continues (to finalizer removal) only once the label query comes back
/// empty, so the schedule outlives every backup it owned.
pub struct CascadeDelete;

#[async_trait]
impl Step<ReconcileState> for CascadeDelete {
    fn name(&self) -> &str {
        "cascade-delete"
    }

    async fn run(&self, state: &mut ReconcileState, _cancel: &CancellationToken) -> Flow {
        if state.backups.is_empty() {
            debug!(schedule = %state.key, "No backups left");
            return Flow::Continue;
        }
        let Some(provider) = state.provider.clone() else {
            return Flow::fatal(ControllerError::Reconciliation(
                "cascade reached before a provider was selected".to_string(),
            ));
        };

        let pending: Vec<_> = state
            .backups
            .iter()
            .filter(|b| !b.deleting)
            .map(|b| b.reference.clone())
            .collect();
        let mut requested = 0;
        for reference in &pending {
            match provider.delete(reference).await {
                Ok(()) => requested += 1,
                Err(e) => {
                    warn!(schedule = %state.key, backup = %reference, error = %e, "Cascade delete failed");
                    state.queue_event(
                        EventType::Warning,
                        "CascadeDeleteFailed",
                        "DeleteBackup",
                        format!("failed to delete {reference}: {e}"),
                    );
                }
            }
        }
        if requested > 0 {
            info!(schedule = %state.key, requested, remaining = state.backups.len(), "Cascade deletion requested");
            state.ctx.metrics.backups_deleted("cascade", requested);
        }

        state.clear_schedule();
        state.transition(
            ScheduleState::Deleting,
            "CascadeDeleting",
            format!("waiting for {} backups to be deleted", state.backups.len()),
        );
        let poll = state.ctx.settings.cascade_poll;
        state.commit(Flow::RequeueAfter(poll)).await
    }
}
