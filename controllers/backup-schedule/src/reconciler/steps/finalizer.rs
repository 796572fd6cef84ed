//! Finalizer attach and removal

use async_trait::async_trait;
use crds::BACKUP_SCHEDULE_FINALIZER;
use kube::ResourceExt;
use reconcile_flow::{Flow, Step};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::ControllerError;
use crate::reconciler::ReconcileState;

/// Adds the schedule finalizer when it is missing
pub struct EnsureFinalizer;

#[async_trait]
impl Step<ReconcileState> for EnsureFinalizer {
    fn name(&self) -> &str {
        "ensure-finalizer"
    }

    async fn run(&self, state: &mut ReconcileState, _cancel: &CancellationToken) -> Flow {
        let mut finalizers = state.schedule.finalizers().to_vec();
        if finalizers.iter().any(|f| f == BACKUP_SCHEDULE_FINALIZER) {
            return Flow::Continue;
        }
        finalizers.push(BACKUP_SCHEDULE_FINALIZER.to_string());
        match state.set_finalizers(finalizers).await {
            Ok(()) => {
                debug!(schedule = %state.key, "Finalizer added");
                Flow::Continue
            }
            Err(e) => finalizer_failure(e),
        }
    }
}

/// Drops the schedule finalizer so the API server can remove the object
pub struct RemoveFinalizer;

#[async_trait]
impl Step<ReconcileState> for RemoveFinalizer {
    fn name(&self) -> &str {
        "remove-finalizer"
    }

    async fn run(&self, state: &mut ReconcileState, _cancel: &CancellationToken) -> Flow {
        let finalizers = state.schedule.finalizers();
        if !finalizers.iter().any(|f| f == BACKUP_SCHEDULE_FINALIZER) {
            state.released = true;
            return Flow::Forget;
        }
        let remaining: Vec<String> = finalizers
            .iter()
            .filter(|f| f.as_str() != BACKUP_SCHEDULE_FINALIZER)
            .cloned()
            .collect();
        match state.set_finalizers(remaining).await {
            Ok(()) => {
                info!(schedule = %state.key, "Finalizer removed");
                state.released = true;
                Flow::Forget
            }
            Err(e) => finalizer_failure(e),
        }
    }
}

/// A stale resourceVersion only means a newer copy exists; read it and retry
fn finalizer_failure(err: ControllerError) -> Flow {
    match err {
        ControllerError::Store(e) if e.is_conflict() => Flow::RequeueNow,
        other => Flow::fatal(other),
    }
}
