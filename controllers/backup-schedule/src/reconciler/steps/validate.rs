//! Spec validation: cron expression and time window
//!
//! Both are user errors: the schedule goes to `Error` and is not retried
//! until the spec changes. Computed run times are dropped so a fixed spec
//! always starts from a fresh calculation.

use async_trait::async_trait;
use crds::time::{format_rfc3339, to_chrono, truncate_to_seconds};
use kube::ResourceExt;
use reconcile_flow::{Flow, Step};
use tokio_util::sync::CancellationToken;

use crate::reconciler::timing::parse_cron;
use crate::reconciler::ReconcileState;

/// Parses `spec.schedule` into the state (one-shot schedules have none)
pub struct ValidateCron;

#[async_trait]
impl Step<ReconcileState> for ValidateCron {
    fn name(&self) -> &str {
        "validate-cron"
    }

    async fn run(&self, state: &mut ReconcileState, _cancel: &CancellationToken) -> Flow {
        if state.schedule.spec.is_one_shot() {
            state.cron = None;
            return Flow::Continue;
        }
        match parse_cron(&state.schedule.spec.schedule) {
            Ok(cron) => {
                state.cron = Some(cron);
                Flow::Continue
            }
            Err(message) => {
                state.clear_schedule();
                state.fail("InvalidSchedule", message);
                state.commit(Flow::Forget).await
            }
        }
    }
}

/// Start must not precede creation; end must not precede start (or creation)
pub struct ValidateWindow;

#[async_trait]
impl Step<ReconcileState> for ValidateWindow {
    fn name(&self) -> &str {
        "validate-window"
    }

    async fn run(&self, state: &mut ReconcileState, _cancel: &CancellationToken) -> Flow {
        let spec = &state.schedule.spec;
        let created = state
            .schedule
            .creation_timestamp()
            .as_ref()
            .and_then(to_chrono)
            .map(truncate_to_seconds);
        let start = spec.start_time.map(truncate_to_seconds);
        let end = spec.end_time.map(truncate_to_seconds);

        let violation = match (created, start, end) {
            (Some(created), Some(start), _) if start < created => Some((
                "InvalidStartTime",
                format!(
                    "startTime {} precedes creation time {}",
                    format_rfc3339(start),
                    format_rfc3339(created)
                ),
            )),
            (_, Some(start), Some(end)) if end < start => Some((
                "InvalidEndTime",
                format!(
                    "endTime {} precedes startTime {}",
                    format_rfc3339(end),
                    format_rfc3339(start)
                ),
            )),
            (Some(created), None, Some(end)) if end < created => Some((
                "InvalidEndTime",
                format!(
                    "endTime {} precedes creation time {}",
                    format_rfc3339(end),
                    format_rfc3339(created)
                ),
            )),
            _ => None,
        };

        match violation {
            None => Flow::Continue,
            Some((reason, message)) => {
                state.clear_schedule();
                state.fail(reason, message);
                state.commit(Flow::Forget).await
            }
        }
    }
}
