//! The backup-schedule pipeline
//!
//! ```text
//! backup-schedule
//!   attach-finalizer        (unless deleting)
//!   lifecycle
//!     teardown              (deleting)
//!       cascade             (deleteCascade: scope, backups, delete)
//!       remove-finalizer
//!     schedule              (otherwise)
//!       completion, suspension, cron, window
//!       calculate           (one-shot | recurring, when needed)
//!       next-run, scope, source, backups
//!       create              (tick not yet created)
//!       retention           (tick not yet retired)
//!   finish
//! ```

use reconcile_flow::{Finish, If, IfElse, IsDeleting, Not, Sequence, Switch};

use super::steps::*;
use super::ReconcileState;

/// Build the pipeline run for every BackupSchedule invocation
pub fn backup_schedule_pipeline() -> Sequence<ReconcileState> {
    Sequence::new("backup-schedule")
        .then(If::new(
            "attach-finalizer",
            Not(IsDeleting),
            Sequence::new("attach").then(EnsureFinalizer),
        ))
        .then(IfElse::new("lifecycle", IsDeleting, teardown(), schedule()))
        .then(Finish)
}

fn teardown() -> Sequence<ReconcileState> {
    Sequence::new("teardown")
        .then(If::new(
            "cascade",
            |s: &ReconcileState| s.schedule.spec.delete_cascade,
            Sequence::new("cascade")
                .then(LoadScope)
                .then(LoadBackups)
                .then(CascadeDelete),
        ))
        .then(RemoveFinalizer)
}

fn schedule() -> Sequence<ReconcileState> {
    Sequence::new("schedule")
        .then(CheckCompletion)
        .then(CheckSuspended)
        .then(ValidateCron)
        .then(ValidateWindow)
        .then(
            Switch::new("calculate")
                .case(
                    needs_one_shot_calculation,
                    Sequence::new("one-shot").then(CalculateOneShot),
                )
                .case(
                    needs_recurring_calculation,
                    Sequence::new("recurring").then(CalculateRecurring),
                ),
        )
        .then(EvaluateNextRun)
        .then(LoadScope)
        .then(LoadSource)
        .then(LoadBackups)
        .then(If::new(
            "create",
            |s: &ReconcileState| !s.create_run_completed,
            Sequence::new("create").then(CreateBackup),
        ))
        .then(If::new(
            "retention",
            |s: &ReconcileState| !s.delete_run_completed,
            Sequence::new("retention").then(DeleteBackups),
        ))
}
