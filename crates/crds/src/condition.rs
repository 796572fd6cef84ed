//! Status conditions
//!
//! Kubernetes-style conditions shared by the storage CRDs.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type reported while a resource is healthy.
pub const CONDITION_READY: &str = "Ready";

/// Condition type reported while a resource is in error.
pub const CONDITION_ERROR: &str = "Error";

/// Truth value of a condition
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition holds
    True,
    /// Condition does not hold
    False,
    /// Condition could not be determined
    #[default]
    Unknown,
}

/// A single observed condition of a resource
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type (e.g., "Ready", "Error")
    #[serde(rename = "type")]
    pub type_: String,

    /// Whether the condition holds
    pub status: ConditionStatus,

    /// Machine-readable CamelCase reason
    #[serde(default)]
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// When the condition last changed status, reason or message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl Condition {
    /// Create a condition stamped with the given transition time
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Some(now),
        }
    }

    fn same_assertion(&self, other: &Condition) -> bool {
        self.type_ == other.type_
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}

/// Find a condition by type
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Whether the list carries `type_` with status `True`
pub fn is_condition_true(conditions: &[Condition], type_: &str) -> bool {
    find_condition(conditions, type_).is_some_and(|c| c.status == ConditionStatus::True)
}

/// Set `condition`, removing every condition whose type is listed in `exclusive`.
///
/// When an identical condition is already present its `lastTransitionTime`
/// is kept, so re-asserting a condition does not produce a status change.
pub fn set_exclusive_condition(
    conditions: &mut Vec<Condition>,
    mut condition: Condition,
    exclusive: &[&str],
) {
    if let Some(existing) = find_condition(conditions, &condition.type_) {
        if existing.same_assertion(&condition) {
            condition.last_transition_time = existing.last_transition_time;
        }
    }
    conditions.retain(|c| c.type_ != condition.type_ && !exclusive.contains(&c.type_.as_str()));
    conditions.push(condition);
}
