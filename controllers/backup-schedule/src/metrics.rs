//! Prometheus metrics and the probe endpoint.
//!
//! One registry per process, served together with liveness and readiness
//! probes on a small axum router.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::ControllerError;

/// Controller metrics
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    reconciliations: IntCounterVec,
    errors: IntCounterVec,
    backups_created: IntCounter,
    backups_deleted: IntCounterVec,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create and register every controller metric
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Arc::new(Registry::new());

        let reconciliations = IntCounterVec::new(
            Opts::new(
                "backup_schedule_reconciliations_total",
                "BackupSchedule reconciliations by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(reconciliations.clone()))?;

        let errors = IntCounterVec::new(
            Opts::new(
                "backup_schedule_errors_total",
                "Failed BackupSchedule reconciliations by error kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(errors.clone()))?;

        let backups_created = IntCounter::new(
            "backup_schedule_backups_created_total",
            "Provider backups created by schedules",
        )?;
        registry.register(Box::new(backups_created.clone()))?;

        let backups_deleted = IntCounterVec::new(
            Opts::new(
                "backup_schedule_backups_deleted_total",
                "Provider backups deleted by schedules, by reason",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(backups_deleted.clone()))?;

        Ok(Self {
            registry,
            reconciliations,
            errors,
            backups_created,
            backups_deleted,
        })
    }

    /// Count one finished invocation (`outcome` is the flow label)
    pub fn record_outcome(&self, outcome: &str) {
        self.reconciliations.with_label_values(&[outcome]).inc();
    }

    /// Count one failed invocation
    pub fn record_error(&self, kind: &str) {
        self.errors.with_label_values(&[kind]).inc();
    }

    /// Count one created backup
    pub fn backup_created(&self) {
        self.backups_created.inc();
    }

    /// Count deleted backups (`reason` is "age", "count" or "cascade")
    pub fn backups_deleted(&self, reason: &str, count: usize) {
        if count > 0 {
            self.backups_deleted
                .with_label_values(&[reason])
                .inc_by(count as u64);
        }
    }

    /// Text exposition of every registered metric
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared state of the probe router
#[derive(Debug, Clone)]
pub struct ProbeState {
    /// Served on `/metrics`
    pub metrics: Metrics,
    /// Set once the watcher is running
    pub ready: Arc<AtomicBool>,
}

/// Router serving `/healthz`, `/readyz` and `/metrics`
pub fn probe_router(state: ProbeState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(render_metrics))
        .with_state(state)
}

/// Serve the probe router until `shutdown` is cancelled
pub async fn serve_probes(
    addr: SocketAddr,
    state: ProbeState,
    shutdown: CancellationToken,
) -> Result<(), ControllerError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Serving probes and metrics");
    axum::serve(listener, probe_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<ProbeState>) -> (StatusCode, &'static str) {
    if state.ready.load(Ordering::Relaxed) {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "starting")
    }
}

async fn render_metrics(State(state): State<ProbeState>) -> Result<String, StatusCode> {
    state
        .metrics
        .render()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
