//! BackupSchedule Controller
//!
//! Takes scheduled backups of FileShares:
//! - Cron and one-shot schedules with optional start and end times
//! - Provider backup objects (AwsBackup, GcpBackup, AzureBackup) chosen by
//!   the cluster's CloudScope
//! - Age and count based retention, and cascade deletion on schedule removal

mod backoff;
mod config;
mod controller;
mod error;
mod metrics;
mod provider;
mod reconciler;
mod watcher;
#[cfg(test)]
mod test_utils;

use controller::Controller;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::ControllerError;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("A rustls crypto provider was already installed");
    }

    info!("Starting BackupSchedule Controller");

    let config = Config::from_env()?;
    info!("Configuration:");
    info!("  Namespace: {}", config.watch_namespace.as_deref().unwrap_or("all namespaces"));
    info!("  CloudScope: {}", config.scope_name);
    info!("  Probe address: {}", config.probe_addr);
    info!("  Reconcile timeout: {}s", config.reconcile_timeout.as_secs());

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
