//! Dependency loading: provider scope, source share and existing backups
//!
//! Missing or unready dependencies are recorded on the schedule and retried
//! on a fixed delay, since they usually fix themselves.

use async_trait::async_trait;
use crds::ScheduleState;
use reconcile_flow::{Flow, Step};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::ControllerError;
use crate::reconciler::ReconcileState;

async fn dependency_not_ready(state: &mut ReconcileState, reason: &str, message: String) -> Flow {
    state.fail(reason, message);
    let retry = state.ctx.settings.dependency_retry;
    state.commit(Flow::RequeueAfter(retry)).await
}

/// Resolves the CloudScope and selects the provider adapter
pub struct LoadScope;

#[async_trait]
impl Step<ReconcileState> for LoadScope {
    fn name(&self) -> &str {
        "load-scope"
    }

    async fn run(&self, state: &mut ReconcileState, _cancel: &CancellationToken) -> Flow {
        let scope_name = state.ctx.settings.scope_name.clone();
        let scope = match state.ctx.scopes.get(None, &scope_name).await {
            Ok(Some(scope)) => scope,
            Ok(None) => {
                let message = format!("CloudScope {scope_name} not found");
                return dependency_not_ready(state, "ScopeNotFound", message).await;
            }
            Err(e) => {
                let message = format!("failed to read CloudScope {scope_name}: {e}");
                return dependency_not_ready(state, "ScopeUnavailable", message).await;
            }
        };

        let provider = scope.spec.provider;
        let Some(adapter) = state.ctx.providers.select(provider) else {
            error!(schedule = %state.key, %provider, "No backup adapter for provider");
            state.fail(
                "UnsupportedProvider",
                format!("CloudScope {scope_name} names a provider without backup support"),
            );
            return match state.persist_status().await {
                Ok(()) => Flow::fatal(ControllerError::UnsupportedProvider(provider.to_string())),
                Err(e) => Flow::fatal(e),
            };
        };

        debug!(schedule = %state.key, %provider, "Provider selected");
        state.scope = Some(scope);
        state.provider = Some(adapter);
        Flow::Continue
    }
}

/// Requires the source FileShare to exist and report `Ready=True`
pub struct LoadSource;

#[async_trait]
impl Step<ReconcileState> for LoadSource {
    fn name(&self) -> &str {
        "load-source"
    }

    async fn run(&self, state: &mut ReconcileState, _cancel: &CancellationToken) -> Flow {
        let source_ref = state.schedule.spec.source.clone();
        let namespace = source_ref.namespace_or(state.namespace()).to_string();

        let share = match state.ctx.shares.get(Some(&namespace), &source_ref.name).await {
            Ok(Some(share)) => share,
            Ok(None) => {
                let message = format!("FileShare {namespace}/{} not found", source_ref.name);
                return dependency_not_ready(state, "SourceNotFound", message).await;
            }
            Err(e) => {
                let message = format!("failed to read FileShare {namespace}/{}: {e}", source_ref.name);
                return dependency_not_ready(state, "SourceUnavailable", message).await;
            }
        };
        if !share.is_ready() {
            let message = format!("FileShare {namespace}/{} is not ready", source_ref.name);
            return dependency_not_ready(state, "SourceNotReady", message).await;
        }

        // Dependencies recovered; later steps persist the healthy state
        if state.status.state == ScheduleState::Error {
            state.transition(ScheduleState::Active, "DependenciesReady", "scope and source are ready");
        }
        state.source = Some(share);
        Flow::Continue
    }
}

/// Lists the schedule's backups by label, oldest first
pub struct LoadBackups;

#[async_trait]
impl Step<ReconcileState> for LoadBackups {
    fn name(&self) -> &str {
        "load-backups"
    }

    async fn run(&self, state: &mut ReconcileState, _cancel: &CancellationToken) -> Flow {
        let Some(provider) = state.provider.clone() else {
            return Flow::fatal(ControllerError::Reconciliation(
                "backups listed before a provider was selected".to_string(),
            ));
        };
        match provider.list_for(&state.schedule).await {
            Ok(backups) => {
                debug!(schedule = %state.key, count = backups.len(), kind = provider.kind(), "Backups loaded");
                state.backups = backups;
                Flow::Continue
            }
            Err(e) => {
                let message = format!("failed to list {}: {e}", provider.kind());
                state
                    .retry_with_backoff("ListBackupsFailed", "ListBackups", e, message)
                    .await
            }
        }
    }
}
