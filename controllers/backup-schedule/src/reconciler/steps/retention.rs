//! Retention enforcement for the current tick
//!
//! Age-based retention runs first; count-based limits then apply separately
//! to the surviving `Ready` and `Failed` backups, evicting the oldest.
//! Backups already being deleted are ignored entirely.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use crds::time::format_rfc3339;
use crds::{BackupReference, BackupState};
use kube::runtime::events::EventType;
use reconcile_flow::{Flow, Step};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::ControllerError;
use crate::provider::BackupObject;
use crate::reconciler::timing::LOOKAHEAD;
use crate::reconciler::ReconcileState;

/// Retention knobs of a schedule
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub max_age: Duration,
    /// 0 = unlimited
    pub max_ready: usize,
    /// 0 = unlimited
    pub max_failed: usize,
}

/// Outcome of applying a policy to the loaded backups
#[derive(Debug, Default)]
pub struct RetentionPlan {
    /// Older than the maximum age
    pub expired: Vec<BackupReference>,
    /// Beyond a Ready/Failed count limit
    pub evicted: Vec<BackupReference>,
    /// Live backups that stay
    pub survivors: Vec<BackupObject>,
}

impl RetentionPlan {
    /// Survivor name to expiry, soonest first, at most [`LOOKAHEAD`] entries
    pub fn next_delete_times(&self, max_age: Duration) -> BTreeMap<String, String> {
        let mut expiries: Vec<(DateTime<Utc>, &str)> = self
            .survivors
            .iter()
            .filter_map(|b| b.created_at.map(|created| (created + max_age, b.name())))
            .collect();
        expiries.sort();
        expiries
            .into_iter()
            .take(LOOKAHEAD)
            .map(|(expiry, name)| (name.to_string(), format_rfc3339(expiry)))
            .collect()
    }
}

/// Decide which backups to delete; `backups` must be sorted oldest first
pub fn plan_retention(
    backups: &[BackupObject],
    policy: RetentionPolicy,
    now: DateTime<Utc>,
    tolerance: Duration,
) -> RetentionPlan {
    let mut plan = RetentionPlan::default();
    for backup in backups.iter().filter(|b| b.is_live()) {
        let expired = backup
            .created_at
            .is_some_and(|created| created + policy.max_age <= now + tolerance);
        if expired {
            plan.expired.push(backup.reference.clone());
        } else {
            plan.survivors.push(backup.clone());
        }
    }

    for (state, limit) in [
        (BackupState::Ready, policy.max_ready),
        (BackupState::Failed, policy.max_failed),
    ] {
        if limit == 0 {
            continue;
        }
        let matching = plan.survivors.iter().filter(|b| b.state == state).count();
        let mut excess = matching.saturating_sub(limit);
        plan.survivors.retain(|b| {
            if excess > 0 && b.state == state {
                excess -= 1;
                plan.evicted.push(b.reference.clone());
                false
            } else {
                true
            }
        });
    }
    plan
}

fn limit(value: i32) -> usize {
    usize::try_from(value).unwrap_or(0)
}

/// Applies retention once per tick and records it in `lastDeleteRun`
pub struct DeleteBackups;

#[async_trait]
impl Step<ReconcileState> for DeleteBackups {
    fn name(&self) -> &str {
        "delete-backups"
    }

    async fn run(&self, state: &mut ReconcileState, _cancel: &CancellationToken) -> Flow {
        let (Some(tick), Some(provider)) = (state.next_run_time, state.provider.clone()) else {
            return Flow::fatal(ControllerError::Reconciliation(
                "retention reached without a due tick and provider".to_string(),
            ));
        };
        let spec = &state.schedule.spec;

        if spec.max_retention_days <= 0 {
            state.status.backup_count = state.backups.iter().filter(|b| b.is_live()).count() as u32;
            state.status.next_delete_times.clear();
            state.status.last_delete_run = Some(format_rfc3339(tick));
            state.delete_run_completed = true;
            return state.commit(Flow::RequeueNow).await;
        }

        let policy = RetentionPolicy {
            max_age: Duration::days(i64::from(spec.max_retention_days)),
            max_ready: limit(spec.max_ready_backups),
            max_failed: limit(spec.max_failed_backups),
        };
        let plan = plan_retention(&state.backups, policy, state.now, state.tolerance());
        debug!(
            schedule = %state.key,
            expired = plan.expired.len(),
            evicted = plan.evicted.len(),
            kept = plan.survivors.len(),
            "Retention planned"
        );

        let mut deleted = Vec::new();
        for (reference, reason) in plan
            .expired
            .iter()
            .map(|r| (r, "age"))
            .chain(plan.evicted.iter().map(|r| (r, "count")))
        {
            if let Err(e) = provider.delete(reference).await {
                let message = format!("failed to delete {reference}: {e}");
                if !deleted.is_empty() {
                    state.status.last_deleted_backups = deleted;
                }
                return state
                    .retry_with_backoff("DeleteBackupFailed", "DeleteBackup", e, message)
                    .await;
            }
            info!(schedule = %state.key, backup = %reference, reason, "Backup deleted");
            state.ctx.metrics.backups_deleted(reason, 1);
            state.queue_event(
                EventType::Normal,
                "BackupDeleted",
                "DeleteBackup",
                format!("deleted {reference} ({reason} retention)"),
            );
            deleted.push(reference.clone());
        }

        if !deleted.is_empty() {
            state.status.last_deleted_backups = deleted;
        }
        state.status.next_delete_times = plan.next_delete_times(policy.max_age);
        state.status.backup_count = plan.survivors.len() as u32;
        state.status.last_delete_run = Some(format_rfc3339(tick));
        state.delete_run_completed = true;
        state.commit(Flow::RequeueNow).await
    }
}
