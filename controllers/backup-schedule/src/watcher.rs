//! Kubernetes resource watcher.
//!
//! Drives BackupSchedule reconciliation with `kube_runtime::Controller`,
//! which handles reconnection, debouncing and per-object serialization.
//! Each invocation gets a child of the process shutdown token that is also
//! cancelled when the per-invocation deadline elapses.

use std::sync::Arc;
use std::time::Duration;

use crds::BackupSchedule;
use futures::StreamExt;
use kube::Api;
use kube_runtime::{
    controller::{Action, Config as ControllerConfig},
    watcher, Controller,
};
use reconcile_flow::ObjectKey;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;

/// Shared by every reconcile and error-policy call
struct WatchContext {
    reconciler: Arc<Reconciler>,
    shutdown: CancellationToken,
    reconcile_timeout: Duration,
}

/// Watches BackupSchedule resources for changes.
pub struct Watcher {
    ctx: Arc<WatchContext>,
    api: Api<BackupSchedule>,
    debounce: Duration,
    concurrency: u16,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(
        reconciler: Arc<Reconciler>,
        api: Api<BackupSchedule>,
        config: &Config,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            ctx: Arc::new(WatchContext {
                reconciler,
                shutdown,
                reconcile_timeout: config.reconcile_timeout,
            }),
            api,
            debounce: config.debounce,
            concurrency: config.concurrency,
        }
    }

    /// Starts watching BackupSchedule resources.
    ///
    /// Returns once the shutdown token is cancelled and in-flight
    /// reconciliations have finished.
    pub async fn watch_backup_schedules(&self) -> Result<(), ControllerError> {
        info!(
            debounce_secs = self.debounce.as_secs(),
            concurrency = self.concurrency,
            "Starting BackupSchedule watcher"
        );

        let controller_config = ControllerConfig::default()
            .debounce(self.debounce)
            .concurrency(self.concurrency);

        Controller::new(self.api.clone(), watcher::Config::default())
            .with_config(controller_config)
            .graceful_shutdown_on(self.ctx.shutdown.clone().cancelled_owned())
            .run(reconcile, error_policy, Arc::clone(&self.ctx))
            .for_each(|res| async move {
                match res {
                    Ok((obj, action)) => debug!(schedule = %obj, ?action, "Reconciled"),
                    Err(e) => warn!(error = %e, "BackupSchedule controller error"),
                }
            })
            .await;

        info!("BackupSchedule watcher stopped");
        Ok(())
    }
}

async fn reconcile(
    schedule: Arc<BackupSchedule>,
    ctx: Arc<WatchContext>,
) -> Result<Action, ControllerError> {
    let cancel = ctx.shutdown.child_token();
    let deadline = {
        let cancel = cancel.clone();
        let timeout = ctx.reconcile_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            cancel.cancel();
        })
    };

    let result = ctx
        .reconciler
        .reconcile_backup_schedule(&schedule, &cancel)
        .await;
    deadline.abort();

    if cancel.is_cancelled() && !ctx.shutdown.is_cancelled() {
        warn!(
            schedule = %ObjectKey::of(schedule.as_ref()),
            timeout_secs = ctx.reconcile_timeout.as_secs(),
            "Reconciliation hit its deadline"
        );
    }
    result
}

/// Error policy: permanent failures wait for a spec change, everything else
/// is requeued with the resource's Fibonacci backoff
fn error_policy(schedule: Arc<BackupSchedule>, error: &ControllerError, ctx: Arc<WatchContext>) -> Action {
    let key = ObjectKey::of(schedule.as_ref()).to_string();
    ctx.reconciler.metrics().record_error(error.kind());

    if error.is_permanent() {
        error!(schedule = %key, error = %error, "Permanent reconciliation failure, waiting for a spec change");
        return Action::await_change();
    }

    ctx.reconciler.increment_error(&key);
    let (backoff_secs, error_count) = ctx.reconciler.get_backoff_for_resource(&key);
    error!(
        schedule = %key,
        error = %error,
        error_count,
        backoff_secs,
        "Reconciliation failed, requeueing"
    );
    Action::requeue(Duration::from_secs(backoff_secs))
}
