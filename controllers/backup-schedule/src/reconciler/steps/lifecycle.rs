//! Completion and suspension guards

use async_trait::async_trait;
use crds::ScheduleState;
use reconcile_flow::{Flow, Step};
use tokio_util::sync::CancellationToken;

use crate::reconciler::ReconcileState;

/// Ends the schedule once it can never run again
///
/// A schedule is done when it is already `Done`, when its end time has
/// passed, or when it is a one-shot whose single tick both created and
/// retired.
pub struct CheckCompletion;

#[async_trait]
impl Step<ReconcileState> for CheckCompletion {
    fn name(&self) -> &str {
        "check-completion"
    }

    async fn run(&self, state: &mut ReconcileState, _cancel: &CancellationToken) -> Flow {
        if state.status.state == ScheduleState::Done {
            return Flow::Forget;
        }

        let spec = &state.schedule.spec;
        let reason = if spec.end_time.is_some_and(|end| state.now > end) {
            "EndTimeReached"
        } else if spec.is_one_shot() && one_shot_finished(state) {
            "OneShotCompleted"
        } else {
            return Flow::Continue;
        };

        state.status.next_run_times.clear();
        state.transition(ScheduleState::Done, reason, "schedule will not run again");
        state.commit(Flow::Forget).await
    }
}

fn one_shot_finished(state: &ReconcileState) -> bool {
    match (&state.status.last_create_run, &state.status.last_delete_run) {
        (Some(created), Some(deleted)) => created == deleted,
        _ => false,
    }
}

/// Clears computed times and parks the schedule while `spec.suspend` is set
pub struct CheckSuspended;

#[async_trait]
impl Step<ReconcileState> for CheckSuspended {
    fn name(&self) -> &str {
        "check-suspended"
    }

    async fn run(&self, state: &mut ReconcileState, _cancel: &CancellationToken) -> Flow {
        if !state.schedule.spec.suspend {
            return Flow::Continue;
        }
        state.clear_schedule();
        state.transition(ScheduleState::Suspended, "Suspended", "schedule is suspended");
        state.commit(Flow::Forget).await
    }
}
