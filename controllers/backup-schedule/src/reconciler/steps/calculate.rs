//! Next-run calculation for one-shot and recurring schedules

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crds::time::{format_rfc3339, parse_rfc3339, truncate_to_seconds};
use crds::ScheduleState;
use reconcile_flow::{Flow, Step};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::reconciler::timing::next_runs;
use crate::reconciler::ReconcileState;

/// One-shot schedule without a computed tick
pub fn needs_one_shot_calculation(state: &ReconcileState) -> bool {
    state.schedule.spec.is_one_shot() && state.status.next_run_times.is_empty()
}

/// Recurring schedule whose cron changed or whose run list ran out
pub fn needs_recurring_calculation(state: &ReconcileState) -> bool {
    let spec = &state.schedule.spec;
    !spec.is_one_shot()
        && (spec.schedule != state.status.active_schedule || state.status.next_run_times.is_empty())
}

/// `Pending` while the first run waits on a future start time
fn phase_for(state: &ReconcileState, first_run: DateTime<Utc>) -> ScheduleState {
    match state.schedule.spec.start_time {
        Some(start) if start > state.now && first_run >= truncate_to_seconds(start) => {
            ScheduleState::Pending
        }
        _ => ScheduleState::Active,
    }
}

/// Single tick at `startTime`, or now
///
/// A tick that already created a backup is reused, so clearing the run list
/// can never mint a second backup.
pub struct CalculateOneShot;

#[async_trait]
impl Step<ReconcileState> for CalculateOneShot {
    fn name(&self) -> &str {
        "calculate-one-shot"
    }

    async fn run(&self, state: &mut ReconcileState, _cancel: &CancellationToken) -> Flow {
        let tick = match &state.status.last_create_run {
            Some(recorded) => match parse_rfc3339(recorded) {
                Some(tick) => tick,
                None => {
                    let message = format!("cannot parse lastCreateRun {recorded:?}");
                    state.fail("InvalidLastRun", message);
                    return state.commit(Flow::Forget).await;
                }
            },
            None => state.schedule.spec.start_time.unwrap_or(state.now),
        };

        let tick = truncate_to_seconds(tick);
        info!(schedule = %state.key, tick = %format_rfc3339(tick), "One-shot run scheduled");
        let phase = phase_for(state, tick);
        state.status.next_run_times = vec![format_rfc3339(tick)];
        state.status.active_schedule.clear();
        state.transition(phase, "Scheduled", "one-shot backup scheduled");
        state.commit(Flow::RequeueNow).await
    }
}

/// Next runs of the cron expression within the time window
///
/// Runs are computed from now, or from the last tick acted upon when that
/// lies ahead of the clock.
pub struct CalculateRecurring;

#[async_trait]
impl Step<ReconcileState> for CalculateRecurring {
    fn name(&self) -> &str {
        "calculate-recurring"
    }

    async fn run(&self, state: &mut ReconcileState, _cancel: &CancellationToken) -> Flow {
        let Some(cron) = state.cron.as_ref() else {
            return Flow::Continue;
        };
        // A tick acted on within the tolerance, before the clock reached it,
        // must not come back as the next run
        let from = [&state.status.last_create_run, &state.status.last_delete_run]
            .into_iter()
            .flatten()
            .filter_map(|recorded| parse_rfc3339(recorded))
            .fold(state.now, std::cmp::max);
        let spec = &state.schedule.spec;
        let runs = next_runs(cron, from, spec.start_time, spec.end_time);

        let Some(first) = runs.first().copied() else {
            state.status.next_run_times.clear();
            state.transition(ScheduleState::Done, "EndTimeReached", "no run left before endTime");
            return state.commit(Flow::Forget).await;
        };

        info!(
            schedule = %state.key,
            cron = %spec.schedule,
            next = %format_rfc3339(first),
            "Recurring runs computed"
        );
        let phase = phase_for(state, first);
        state.status.active_schedule = state.schedule.spec.schedule.clone();
        state.status.next_run_times = runs.into_iter().map(format_rfc3339).collect();
        state.transition(phase, "Scheduled", "next runs computed");
        state.commit(Flow::RequeueNow).await
    }
}
