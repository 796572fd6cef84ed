//! Next-run evaluation
//!
//! Decides whether the first computed tick is due and which of its two
//! actions (create, retention) already ran. Idempotency is keyed on the
//! tick: a tick recorded in both `lastCreateRun` and `lastDeleteRun` is
//! never acted upon again.

use async_trait::async_trait;
use crds::time::{format_rfc3339, parse_rfc3339, truncate_to_seconds};
use reconcile_flow::{Flow, Step};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::reconciler::timing::{is_due, is_same_tick, until};
use crate::reconciler::ReconcileState;

/// Picks the due tick, or requeues until the first run arrives
pub struct EvaluateNextRun;

#[async_trait]
impl Step<ReconcileState> for EvaluateNextRun {
    fn name(&self) -> &str {
        "evaluate-next-run"
    }

    async fn run(&self, state: &mut ReconcileState, _cancel: &CancellationToken) -> Flow {
        let Some(first) = state.status.next_run_times.first().cloned() else {
            state.fail("MissingNextRun", "no next run time computed");
            return state.commit(Flow::Forget).await;
        };
        let Some(tick) = parse_rfc3339(&first).map(truncate_to_seconds) else {
            state.status.next_run_times.clear();
            state.fail("InvalidNextRun", format!("cannot parse next run time {first:?}"));
            return state.commit(Flow::Forget).await;
        };

        if !is_due(tick, state.now, state.tolerance()) {
            let delay = until(tick, state.now);
            debug!(schedule = %state.key, tick = %first, delay_secs = delay.as_secs(), "Next run not due");
            return Flow::RequeueAfter(delay);
        }

        let created = is_same_tick(state.status.last_create_run.as_deref(), tick);
        let deleted = is_same_tick(state.status.last_delete_run.as_deref(), tick);
        let (created, deleted) = match (created, deleted) {
            (Ok(created), Ok(deleted)) => (created, deleted),
            (Err(message), _) | (_, Err(message)) => {
                state.fail("InvalidLastRun", message);
                return state.commit(Flow::Forget).await;
            }
        };

        if created && deleted {
            debug!(schedule = %state.key, tick = %format_rfc3339(tick), "Tick complete, recomputing");
            state.status.next_run_times.clear();
            return state.commit(Flow::RequeueNow).await;
        }

        state.next_run_time = Some(tick);
        state.create_run_completed = created;
        state.delete_run_completed = deleted;
        Flow::Continue
    }
}
