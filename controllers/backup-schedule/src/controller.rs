//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the stores,
//! reconciler, watcher and probe server together and runs them until a
//! shutdown signal arrives.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crds::{AwsBackup, AzureBackup, BackupSchedule, CloudScope, FileShare, GcpBackup};
use kube::{Api, Client};
use object_store::{KubeEventPublisher, KubeStore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::ControllerError;
use crate::metrics::{serve_probes, Metrics, ProbeState};
use crate::reconciler::{Context, Reconciler, Settings};
use crate::watcher::Watcher;

/// Name reported as the controller on published Events
const CONTROLLER_NAME: &str = "backup-schedule-controller";

/// Main controller for BackupSchedule resources.
pub struct Controller {
    config: Config,
    watcher: Arc<Watcher>,
    probes: ProbeState,
    shutdown: CancellationToken,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: Config) -> Result<Self, ControllerError> {
        info!("Initializing BackupSchedule Controller");

        let client = Client::try_default().await?;
        let metrics = Metrics::new()?;

        let ctx = Context::new(
            Arc::new(KubeStore::<BackupSchedule>::namespaced(client.clone())),
            Arc::new(KubeStore::<FileShare>::namespaced(client.clone())),
            Arc::new(KubeStore::<CloudScope>::cluster(client.clone())),
            Arc::new(KubeStore::<AwsBackup>::namespaced(client.clone())),
            Arc::new(KubeStore::<GcpBackup>::namespaced(client.clone())),
            Arc::new(KubeStore::<AzureBackup>::namespaced(client.clone())),
            Arc::new(KubeEventPublisher::new(
                client.clone(),
                CONTROLLER_NAME,
                config.pod_name.clone(),
            )),
            metrics.clone(),
            Settings::from(&config),
        );
        let reconciler = Arc::new(Reconciler::new(ctx));

        let api: Api<BackupSchedule> = match config.watch_namespace.as_deref() {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::all(client),
        };

        let shutdown = CancellationToken::new();
        let watcher = Arc::new(Watcher::new(reconciler, api, &config, shutdown.clone()));

        Ok(Self {
            config,
            watcher,
            probes: ProbeState {
                metrics,
                ready: Arc::new(AtomicBool::new(false)),
            },
            shutdown,
        })
    }

    /// Runs the controller until shutdown.
    ///
    /// Ctrl-C or SIGTERM cancels the shutdown token; the watcher then drains
    /// in-flight reconciliations and the probe server stops.
    pub async fn run(self) -> Result<(), ControllerError> {
        let mut watcher_task: JoinHandle<Result<(), ControllerError>> = {
            let watcher = Arc::clone(&self.watcher);
            tokio::spawn(async move { watcher.watch_backup_schedules().await })
        };
        let mut probe_task = tokio::spawn(serve_probes(
            self.config.probe_addr,
            self.probes.clone(),
            self.shutdown.clone(),
        ));
        self.probes.ready.store(true, Ordering::Relaxed);
        info!("BackupSchedule Controller running");

        let outcome = tokio::select! {
            result = &mut watcher_task => task_outcome("BackupSchedule watcher", result),
            result = &mut probe_task => task_outcome("probe server", result),
            () = shutdown_signal() => {
                info!("Shutdown signal received");
                Ok(())
            }
        };

        self.probes.ready.store(false, Ordering::Relaxed);
        self.shutdown.cancel();
        for (name, task) in [("BackupSchedule watcher", watcher_task), ("probe server", probe_task)] {
            if task.is_finished() {
                continue;
            }
            if let Err(e) = task_outcome(name, task.await) {
                warn!(task = name, error = %e, "Task failed during shutdown");
            }
        }

        info!("BackupSchedule Controller stopped");
        outcome
    }
}

fn task_outcome(
    name: &str,
    result: Result<Result<(), ControllerError>, tokio::task::JoinError>,
) -> Result<(), ControllerError> {
    result
        .map_err(|e| ControllerError::Watch(format!("{name} panicked: {e}")))?
        .map_err(|e| ControllerError::Watch(format!("{name} error: {e}")))
}

/// Resolves on Ctrl-C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
