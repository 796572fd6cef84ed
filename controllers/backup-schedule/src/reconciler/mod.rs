//! BackupSchedule reconciliation.
//!
//! The state machine is a fixed pipeline of steps (see [`pipeline`]) run over
//! a fresh [`ReconcileState`] per invocation. Collaborators are reached only
//! through the object-store and event traits, so the whole machine runs
//! against in-memory mocks in tests.

pub mod pipeline;
pub mod state;
pub mod steps;
pub mod timing;

#[cfg(test)]
mod pipeline_test;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use crds::{AwsBackup, AzureBackup, BackupSchedule, CloudScope, FileShare, GcpBackup};
use kube::runtime::controller::Action;
use object_store::{EventPublisher, ResourceStore};
use reconcile_flow::{into_action, Flow, ObjectKey, Sequence, Step};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::backoff::FibonacciBackoff;
use crate::config::Config;
use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::provider::ProviderAdapters;

pub use state::ReconcileState;

/// Tunables the steps read
#[derive(Debug, Clone)]
pub struct Settings {
    /// Cluster-scoped CloudScope naming the provider
    pub scope_name: String,
    /// Requeue delay while scope or source are not usable
    pub dependency_retry: Duration,
    /// Requeue delay between cascade-delete polls
    pub cascade_poll: Duration,
    /// Clock-skew tolerance
    pub tolerance: chrono::Duration,
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            scope_name: config.scope_name.clone(),
            dependency_retry: config.dependency_retry,
            cascade_poll: config.cascade_poll,
            tolerance: chrono::Duration::from_std(config.schedule_tolerance)
                .unwrap_or_else(|_| chrono::Duration::seconds(1)),
        }
    }
}

/// Collaborators shared by every invocation
pub struct Context {
    /// BackupSchedule objects
    pub schedules: Arc<dyn ResourceStore<BackupSchedule>>,
    /// Source FileShares
    pub shares: Arc<dyn ResourceStore<FileShare>>,
    /// Cluster-scoped CloudScopes
    pub scopes: Arc<dyn ResourceStore<CloudScope>>,
    /// One backup adapter per supported provider
    pub providers: ProviderAdapters,
    /// Events recorded against schedules
    pub events: Arc<dyn EventPublisher>,
    /// Prometheus counters
    pub metrics: Metrics,
    /// Tunables from the process configuration
    pub settings: Settings,
}

impl Context {
    /// Context over one store per kind
    #[allow(clippy::too_many_arguments, reason = "one store per watched kind")]
    pub fn new(
        schedules: Arc<dyn ResourceStore<BackupSchedule>>,
        shares: Arc<dyn ResourceStore<FileShare>>,
        scopes: Arc<dyn ResourceStore<CloudScope>>,
        aws: Arc<dyn ResourceStore<AwsBackup>>,
        gcp: Arc<dyn ResourceStore<GcpBackup>>,
        azure: Arc<dyn ResourceStore<AzureBackup>>,
        events: Arc<dyn EventPublisher>,
        metrics: Metrics,
        settings: Settings,
    ) -> Self {
        Self {
            schedules,
            shares,
            scopes,
            providers: ProviderAdapters::new(aws, gcp, azure),
            events,
            metrics,
            settings,
        }
    }
}

/// Backoff state for a resource
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::new(5, 300), // 5 seconds min, 5 minutes max
            error_count: 0,
        }
    }

    fn increment_error(&mut self) {
        self.error_count += 1;
    }

    fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Reconciles BackupSchedule resources.
pub struct Reconciler {
    ctx: Arc<Context>,
    pipeline: Sequence<ReconcileState>,
    /// Error count tracking per resource (namespace/name -> BackoffState)
    backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl Reconciler {
    /// Reconciler running the backup-schedule pipeline over `ctx`
    pub fn new(ctx: Context) -> Self {
        Self {
            ctx: Arc::new(ctx),
            pipeline: pipeline::backup_schedule_pipeline(),
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Counters shared with the error policy
    pub fn metrics(&self) -> &Metrics {
        &self.ctx.metrics
    }

    /// Entry point for the watcher
    ///
    /// Runs one invocation at the current wall-clock time and bridges the
    /// outcome to a controller action. Successful invocations reset the
    /// resource's backoff.
    pub async fn reconcile_backup_schedule(
        &self,
        schedule: &BackupSchedule,
        cancel: &CancellationToken,
    ) -> Result<Action, ControllerError> {
        let key = ObjectKey::of(schedule);
        let flow = self.reconcile_at(&key, Utc::now(), cancel).await;
        let action = into_action(flow).map_err(ControllerError::from_flow_error)?;
        self.reset_error(&key.to_string());
        Ok(action)
    }

    /// Run the pipeline once for `key` as if the time were `now`
    ///
    /// The schedule is always re-read from the store; one that no longer
    /// exists ends the invocation with [`Flow::Forget`].
    pub async fn reconcile_at(
        &self,
        key: &ObjectKey,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Flow {
        let flow = self.run_pipeline(key, now, cancel).await;
        debug!(schedule = %key, outcome = %flow, "Reconciliation finished");
        self.ctx.metrics.record_outcome(flow.label());
        flow
    }

    async fn run_pipeline(
        &self,
        key: &ObjectKey,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Flow {
        let schedule = match self
            .ctx
            .schedules
            .get(key.namespace.as_deref(), &key.name)
            .await
        {
            Ok(Some(schedule)) => schedule,
            Ok(None) => {
                debug!(schedule = %key, "Schedule no longer exists");
                self.forget_resource(&key.to_string());
                return Flow::Forget;
            }
            Err(e) => {
                error!(schedule = %key, error = %e, "Failed to load schedule");
                return Flow::fatal(e);
            }
        };

        let mut state = match ReconcileState::new(Arc::clone(&self.ctx), schedule, now) {
            Ok(state) => state,
            Err(e) => return Flow::fatal(e),
        };
        let flow = self.pipeline.run(&mut state, cancel).await;
        if state.released {
            self.forget_resource(&key.to_string());
        }
        flow
    }

    /// Get the current backoff for a resource and advance its sequence
    ///
    /// Returns (backoff_seconds, error_count)
    pub fn get_backoff_for_resource(&self, resource_key: &str) -> (u64, u32) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states
                    .entry(resource_key.to_string())
                    .or_insert_with(BackoffState::new);
                (state.backoff.next_backoff_seconds(), state.error_count)
            }
            Err(e) => {
                warn!("Failed to lock backoff_states: {}, using default backoff", e);
                (30, 0)
            }
        }
    }

    /// Increment error count for a resource
    pub fn increment_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states
                .entry(resource_key.to_string())
                .or_insert_with(BackoffState::new)
                .increment_error();
        }
    }

    /// Drop all backoff state of a resource that is gone
    pub fn forget_resource(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(resource_key);
        }
    }

    /// Number of resources with backoff state
    pub fn tracked_resources(&self) -> usize {
        self.backoff_states.lock().map(|states| states.len()).unwrap_or(0)
    }

    /// Reset error count for a resource (on successful reconciliation)
    pub fn reset_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            if let Some(state) = states.get_mut(resource_key) {
                state.reset();
            }
        }
    }
}
