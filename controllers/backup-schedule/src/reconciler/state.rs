//! Per-invocation reconciliation state
//!
//! Built fresh for every invocation from the stored schedule and dropped at
//! the end; all durable state lives in the schedule's status.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use crds::{
    set_exclusive_condition, BackupSchedule, BackupScheduleStatus, CloudScope, Condition,
    ConditionStatus, FileShare, ScheduleState, CONDITION_ERROR, CONDITION_READY,
};
use kube::runtime::events::EventType;
use kube::Resource;
use object_store::{merge, StoreError};
use reconcile_flow::{Flow, HasObject, ObjectKey};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use super::Context;
use crate::error::ControllerError;
use crate::provider::{BackupImpl, BackupObject};

/// Attempts at writing status before giving up on repeated conflicts
const STATUS_WRITE_ATTEMPTS: usize = 3;

const EXCLUSIVE_CONDITIONS: &[&str] = &[CONDITION_READY, CONDITION_ERROR];

#[derive(Debug)]
struct PendingEvent {
    type_: EventType,
    reason: String,
    action: &'static str,
    note: String,
}

/// State threaded through the backup-schedule pipeline
pub struct ReconcileState {
    /// `namespace/name` of the schedule
    pub key: ObjectKey,
    /// Instant this invocation treats as the current time
    pub now: DateTime<Utc>,
    /// Shared stores, publisher, metrics and settings
    pub ctx: Arc<Context>,
    /// Schedule as loaded; metadata follows our own writes
    pub schedule: BackupSchedule,
    /// Working copy of the status, written by [`ReconcileState::persist_status`]
    pub status: BackupScheduleStatus,
    /// Last status known to be stored, as JSON
    persisted: Value,
    /// Parsed cron expression; `None` for one-shot schedules
    pub cron: Option<cron::Schedule>,
    /// Due tick selected by `EvaluateNextRun`
    pub next_run_time: Option<DateTime<Utc>>,
    /// The due tick already has its backup
    pub create_run_completed: bool,
    /// Retention already ran for the due tick
    pub delete_run_completed: bool,
    /// CloudScope resolved by `LoadScope`
    pub scope: Option<CloudScope>,
    /// Adapter for the scope's provider
    pub provider: Option<Arc<dyn BackupImpl>>,
    /// Ready source share resolved by `LoadSource`
    pub source: Option<FileShare>,
    /// The schedule's backups, oldest first
    pub backups: Vec<BackupObject>,
    /// Set once the finalizer is gone from a deleted schedule
    pub released: bool,
    events: Vec<PendingEvent>,
}

impl HasObject for ReconcileState {
    type Object = BackupSchedule;

    fn object(&self) -> &BackupSchedule {
        &self.schedule
    }
}

impl ReconcileState {
    /// Fresh state over a just-loaded schedule
    pub fn new(
        ctx: Arc<Context>,
        schedule: BackupSchedule,
        now: DateTime<Utc>,
    ) -> Result<Self, ControllerError> {
        let persisted = serde_json::to_value(&schedule.status)?;
        let status = schedule.status.clone().unwrap_or_default();
        Ok(Self {
            key: ObjectKey::of(&schedule),
            now,
            ctx,
            schedule,
            status,
            persisted,
            cron: None,
            next_run_time: None,
            create_run_completed: false,
            delete_run_completed: false,
            scope: None,
            provider: None,
            source: None,
            backups: Vec::new(),
            released: false,
            events: Vec::new(),
        })
    }

    /// Namespace of the schedule
    pub fn namespace(&self) -> &str {
        self.key.namespace_str()
    }

    /// Tolerance for "is it time yet" comparisons
    pub fn tolerance(&self) -> chrono::Duration {
        self.ctx.settings.tolerance
    }

    /// Move to a healthy lifecycle state with a `Ready` condition
    pub fn transition(&mut self, state: ScheduleState, reason: &str, message: impl Into<String>) {
        let message = message.into();
        if self.status.state != state {
            info!(schedule = %self.key, from = %self.status.state, to = %state, reason, "Schedule state changed");
            self.queue_event(EventType::Normal, reason, "Reconcile", message.clone());
        }
        self.status.state = state;
        self.set_condition(CONDITION_READY, reason, message);
    }

    /// Move to `Error` with an `Error` condition
    pub fn fail(&mut self, reason: &str, message: impl Into<String>) {
        let message = message.into();
        warn!(schedule = %self.key, reason, message = %message, "Schedule in error");
        self.queue_event(EventType::Warning, reason, "Reconcile", message.clone());
        self.status.state = ScheduleState::Error;
        self.set_condition(CONDITION_ERROR, reason, message);
    }

    /// Record an `Error` condition without changing the lifecycle state
    pub fn record_error(&mut self, reason: &str, action: &'static str, message: impl Into<String>) {
        let message = message.into();
        warn!(schedule = %self.key, reason, message = %message, "Transient failure");
        self.queue_event(EventType::Warning, reason, action, message.clone());
        self.set_condition(CONDITION_ERROR, reason, message);
    }

    /// Forget every computed run and expiry
    pub fn clear_schedule(&mut self) {
        self.status.next_run_times.clear();
        self.status.next_delete_times.clear();
    }

    /// Queue an event, published after the next successful status write
    pub fn queue_event(
        &mut self,
        type_: EventType,
        reason: &str,
        action: &'static str,
        note: impl Into<String>,
    ) {
        self.events.push(PendingEvent {
            type_,
            reason: reason.to_string(),
            action,
            note: note.into(),
        });
    }

    fn set_condition(&mut self, type_: &str, reason: &str, message: String) {
        let condition = Condition::new(type_, ConditionStatus::True, reason, message, self.now);
        set_exclusive_condition(&mut self.status.conditions, condition, EXCLUSIVE_CONDITIONS);
    }

    /// Persist the status, then end the step with `flow`
    ///
    /// A failed write turns the outcome into `Fatal` so the tick is retried
    /// rather than its decision being lost.
    pub async fn commit(&mut self, flow: Flow) -> Flow {
        match self.persist_status().await {
            Ok(()) => flow,
            Err(e) => {
                error!(schedule = %self.key, error = %e, "Failed to persist status");
                Flow::fatal(e)
            }
        }
    }

    /// Persist a transient failure, then hand it to the error policy
    ///
    /// The `Error` condition is written first. The failure itself ends the
    /// step as `Fatal`, so the resource's backoff advances rather than the
    /// invocation being requeued immediately.
    pub async fn retry_with_backoff(
        &mut self,
        reason: &str,
        action: &'static str,
        err: StoreError,
        message: String,
    ) -> Flow {
        self.record_error(reason, action, message);
        match self.persist_status().await {
            Ok(()) => Flow::fatal(ControllerError::Store(err)),
            Err(e) => {
                error!(schedule = %self.key, error = %e, "Failed to persist status");
                Flow::fatal(e)
            }
        }
    }

    /// Write the working status as a merge patch against the stored one
    ///
    /// Nothing is written when the status is unchanged. A conflicting write
    /// re-reads the schedule and re-applies the computed status.
    pub async fn persist_status(&mut self) -> Result<(), ControllerError> {
        self.status.observed_generation = self.schedule.metadata.generation;
        let desired = serde_json::to_value(&self.status)?;

        for attempt in 1..=STATUS_WRITE_ATTEMPTS {
            let diff = merge::diff(&self.persisted, &desired);
            if merge::is_empty(&diff) {
                debug!(schedule = %self.key, "Status unchanged");
                self.flush_events().await;
                return Ok(());
            }

            let patch = json!({
                "metadata": { "resourceVersion": self.schedule.metadata.resource_version },
                "status": diff,
            });
            match self
                .ctx
                .schedules
                .patch_status(self.key.namespace.as_deref(), &self.key.name, &patch)
                .await
            {
                Ok(updated) => {
                    self.schedule.metadata = updated.metadata;
                    self.persisted = desired;
                    self.flush_events().await;
                    return Ok(());
                }
                Err(e) if e.is_conflict() => {
                    if attempt == STATUS_WRITE_ATTEMPTS {
                        break;
                    }
                    debug!(schedule = %self.key, attempt, "Status write conflicted, re-reading");
                    let fresh = self
                        .ctx
                        .schedules
                        .get(self.key.namespace.as_deref(), &self.key.name)
                        .await?
                        .ok_or_else(|| StoreError::NotFound(self.key.to_string()))?;
                    self.persisted = serde_json::to_value(&fresh.status)?;
                    self.schedule.metadata = fresh.metadata;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ControllerError::StatusConflict(self.key.to_string()))
    }

    /// Replace the schedule's finalizers, guarded by its resourceVersion
    pub async fn set_finalizers(&mut self, finalizers: Vec<String>) -> Result<(), ControllerError> {
        let patch = json!({
            "metadata": {
                "resourceVersion": self.schedule.metadata.resource_version,
                "finalizers": finalizers,
            }
        });
        let updated = self
            .ctx
            .schedules
            .patch(self.key.namespace.as_deref(), &self.key.name, &patch)
            .await?;
        self.schedule.metadata = updated.metadata;
        Ok(())
    }

    async fn flush_events(&mut self) {
        if self.events.is_empty() {
            return;
        }
        let reference = self.schedule.object_ref(&());
        for event in std::mem::take(&mut self.events) {
            self.ctx
                .events
                .publish(&reference, event.type_, &event.reason, event.action, Some(event.note))
                .await;
        }
    }
}
