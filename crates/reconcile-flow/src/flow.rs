//! Flow-control signals
//!
//! Every step returns a `Flow` instead of a boolean or an overloaded error,
//! so "what happens next" is an inspectable value.

use std::fmt;
use std::time::Duration;

/// Outcome of a reconciliation step
#[derive(Debug)]
pub enum Flow {
    /// Run the next step
    Continue,
    /// Stop successfully; nothing to retry until the object changes
    Forget,
    /// Stop and run the whole pipeline again immediately
    RequeueNow,
    /// Stop and run the whole pipeline again after the delay
    RequeueAfter(Duration),
    /// Stopped because the invocation was cancelled before the next step
    Cancelled,
    /// Genuine failure; surfaced to the controller's error policy
    Fatal(anyhow::Error),
}

impl Flow {
    /// Wrap any error as a fatal outcome
    pub fn fatal(err: impl Into<anyhow::Error>) -> Self {
        Flow::Fatal(err.into())
    }

    /// Whether the pipeline should proceed to the next step
    pub fn is_continue(&self) -> bool {
        matches!(self, Flow::Continue)
    }

    /// Whether this outcome is a failure rather than a control decision
    pub fn is_fatal(&self) -> bool {
        matches!(self, Flow::Fatal(_))
    }

    /// Short label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Flow::Continue => "continue",
            Flow::Forget => "forget",
            Flow::RequeueNow => "requeue",
            Flow::RequeueAfter(_) => "requeue_after",
            Flow::Cancelled => "cancelled",
            Flow::Fatal(_) => "fatal",
        }
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flow::RequeueAfter(delay) => write!(f, "requeue_after({}s)", delay.as_secs()),
            Flow::Fatal(err) => write!(f, "fatal({err})"),
            other => f.write_str(other.label()),
        }
    }
}
