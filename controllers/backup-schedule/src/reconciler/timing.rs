//! Trigger time arithmetic
//!
//! Cron parsing, next-run computation and the whole-second tick comparisons
//! the state machine keys its idempotency on.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use crds::time::{parse_rfc3339, truncate_to_seconds};

/// Number of upcoming runs kept in `status.nextRunTimes`
pub const LOOKAHEAD: usize = 3;

/// Parse a cron expression
///
/// Classic five-field expressions get a zero seconds field prepended;
/// six/seven-field expressions and `@hourly`-style macros pass through.
pub fn parse_cron(expression: &str) -> Result<Schedule, String> {
    let trimmed = expression.trim();
    let normalized = if !trimmed.starts_with('@') && trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    };
    Schedule::from_str(&normalized).map_err(|e| format!("invalid cron expression {trimmed:?}: {e}"))
}

/// Up to [`LOOKAHEAD`] upcoming runs, strictly after `now` and not before
/// `start`, dropping anything after `end`
pub fn next_runs(
    schedule: &Schedule,
    now: DateTime<Utc>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Vec<DateTime<Utc>> {
    // `after` is exclusive, so step back one second to keep a start on a boundary
    let from = match start.map(truncate_to_seconds) {
        Some(start) if start > now => start - Duration::seconds(1),
        _ => now,
    };
    schedule
        .after(&from)
        .take_while(|run| end.is_none_or(|end| *run <= end))
        .take(LOOKAHEAD)
        .collect()
}

/// Whether `tick` has been reached, allowing `tolerance` of clock skew
pub fn is_due(tick: DateTime<Utc>, now: DateTime<Utc>, tolerance: Duration) -> bool {
    tick <= now + tolerance
}

/// Time until `tick`, rounded up to whole seconds (at least one)
pub fn until(tick: DateTime<Utc>, now: DateTime<Utc>) -> std::time::Duration {
    let millis = (tick - now).num_milliseconds().max(0);
    let secs = (millis as u64).div_ceil(1000).max(1);
    std::time::Duration::from_secs(secs)
}

/// Whether a recorded run (RFC3339) is the same tick, compared at whole seconds
///
/// Unparseable recorded values are an error, never silently treated as "not run".
pub fn is_same_tick(recorded: Option<&str>, tick: DateTime<Utc>) -> Result<bool, String> {
    match recorded {
        None => Ok(false),
        Some(value) => parse_rfc3339(value)
            .map(|run| truncate_to_seconds(run) == truncate_to_seconds(tick))
            .ok_or_else(|| format!("cannot parse recorded run time {value:?}")),
    }
}

/// Name of the backup minted for `tick`: `{base}-{index + 1}-{YYYYMMDDhhmmss}`
pub fn backup_name(base: &str, backup_index: u64, tick: DateTime<Utc>) -> String {
    format!("{base}-{}-{}", backup_index + 1, tick.format("%Y%m%d%H%M%S"))
}
