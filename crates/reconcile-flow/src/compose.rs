//! Sequential composition of steps

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::flow::Flow;
use crate::step::{BoxStep, Step};

/// Ordered list of steps run until one returns something other than `Continue`
///
/// Before each step the cancellation token is checked; a cancelled
/// invocation stops with [`Flow::Cancelled`] and the remaining steps never
/// run. A step that is already running is not interrupted.
pub struct Sequence<S> {
    name: String,
    steps: Vec<BoxStep<S>>,
}

impl<S> std::fmt::Debug for Sequence<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequence")
            .field("name", &self.name)
            .field("steps", &self.steps.iter().map(|s| s.name().to_string()).collect::<Vec<_>>())
            .finish()
    }
}

impl<S: Send> Sequence<S> {
    /// Empty sequence
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step (builder style)
    #[must_use]
    pub fn then(mut self, step: impl Step<S> + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Number of direct child steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the sequence has no steps
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[async_trait]
impl<S: Send> Step<S> for Sequence<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: &mut S, cancel: &CancellationToken) -> Flow {
        for step in &self.steps {
            if cancel.is_cancelled() {
                debug!(sequence = %self.name, next = step.name(), "Cancelled before step");
                return Flow::Cancelled;
            }
            let flow = step.run(state, cancel).await;
            trace!(sequence = %self.name, step = step.name(), outcome = %flow, "Step finished");
            if !flow.is_continue() {
                return flow;
            }
        }
        Flow::Continue
    }
}
