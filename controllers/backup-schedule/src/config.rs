//! Controller configuration.
//!
//! Read once at startup from environment variables. Parsing goes through an
//! injected lookup function so it can be tested without touching the process
//! environment.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ControllerError;

/// Runtime configuration of the BackupSchedule controller
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Restrict the watcher to one namespace (`None` = all namespaces)
    pub watch_namespace: Option<String>,
    /// Name of the cluster-scoped CloudScope this instance targets
    pub scope_name: String,
    /// Listen address for the probe and metrics endpoint
    pub probe_addr: SocketAddr,
    /// Fixed requeue delay while scope or source are missing or not ready
    pub dependency_retry: Duration,
    /// Delay between cascade-delete polls
    pub cascade_poll: Duration,
    /// Clock-skew tolerance for due ticks and expired backups
    pub schedule_tolerance: Duration,
    /// Per-invocation deadline
    pub reconcile_timeout: Duration,
    /// Maximum concurrent reconciliations
    pub concurrency: u16,
    /// Debounce window for bursts of watch events
    pub debounce: Duration,
    /// Reporter instance recorded on Events
    pub pod_name: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            scope_name: "default".to_string(),
            probe_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            dependency_retry: Duration::from_secs(30),
            cascade_poll: Duration::from_secs(5),
            schedule_tolerance: Duration::from_secs(1),
            reconcile_timeout: Duration::from_secs(120),
            concurrency: 3,
            debounce: Duration::from_secs(1),
            pod_name: None,
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    ///
    /// Unset or empty variables fall back to their defaults; values that do
    /// not parse fail with [`ControllerError::InvalidConfig`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Config::default();

        let concurrency = parse_or(
            get("CONTROLLER_CONCURRENCY"),
            "CONTROLLER_CONCURRENCY",
            defaults.concurrency,
        )?;
        if concurrency == 0 {
            return Err(ControllerError::InvalidConfig(
                "CONTROLLER_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            watch_namespace: get("WATCH_NAMESPACE"),
            scope_name: get("SCOPE_NAME").unwrap_or(defaults.scope_name),
            probe_addr: parse_or(get("PROBE_ADDR"), "PROBE_ADDR", defaults.probe_addr)?,
            dependency_retry: seconds_or(
                get("DEPENDENCY_RETRY_SECONDS"),
                "DEPENDENCY_RETRY_SECONDS",
                defaults.dependency_retry,
            )?,
            cascade_poll: seconds_or(
                get("CASCADE_POLL_SECONDS"),
                "CASCADE_POLL_SECONDS",
                defaults.cascade_poll,
            )?,
            schedule_tolerance: seconds_or(
                get("SCHEDULE_TOLERANCE_SECONDS"),
                "SCHEDULE_TOLERANCE_SECONDS",
                defaults.schedule_tolerance,
            )?,
            reconcile_timeout: seconds_or(
                get("RECONCILE_TIMEOUT_SECONDS"),
                "RECONCILE_TIMEOUT_SECONDS",
                defaults.reconcile_timeout,
            )?,
            concurrency,
            debounce: seconds_or(
                get("CONTROLLER_DEBOUNCE_SECONDS"),
                "CONTROLLER_DEBOUNCE_SECONDS",
                defaults.debounce,
            )?,
            pod_name: get("POD_NAME"),
        })
    }
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> Result<T, ControllerError>
where
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e| ControllerError::InvalidConfig(format!("{key}={raw:?}: {e}"))),
    }
}

fn seconds_or(value: Option<String>, key: &str, default: Duration) -> Result<Duration, ControllerError> {
    let secs = parse_or(value, key, default.as_secs())?;
    Ok(Duration::from_secs(secs))
}
