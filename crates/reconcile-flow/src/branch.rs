//! Branching steps
//!
//! `If`, `IfElse` and `Switch` pick a sub-sequence from predicates over the
//! state, keeping native conditionals out of business steps. `Finish` is the
//! terminal fallback that ends a pipeline successfully.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::compose::Sequence;
use crate::flow::Flow;
use crate::predicate::{BoxPredicate, Predicate};
use crate::step::Step;

/// Runs `then` when the predicate holds, otherwise continues
pub struct If<S, P> {
    name: String,
    predicate: P,
    then: Sequence<S>,
}

impl<S: Send, P: Predicate<S>> If<S, P> {
    /// Create a conditional step
    pub fn new(name: impl Into<String>, predicate: P, then: Sequence<S>) -> Self {
        Self {
            name: name.into(),
            predicate,
            then,
        }
    }
}

#[async_trait]
impl<S: Send, P: Predicate<S>> Step<S> for If<S, P> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: &mut S, cancel: &CancellationToken) -> Flow {
        if self.predicate.test(state) {
            trace!(branch = %self.name, "Condition holds");
            self.then.run(state, cancel).await
        } else {
            Flow::Continue
        }
    }
}

/// Runs `then` when the predicate holds, `otherwise` when it does not
pub struct IfElse<S, P> {
    name: String,
    predicate: P,
    then: Sequence<S>,
    otherwise: Sequence<S>,
}

impl<S: Send, P: Predicate<S>> IfElse<S, P> {
    /// Create a two-way branch
    pub fn new(
        name: impl Into<String>,
        predicate: P,
        then: Sequence<S>,
        otherwise: Sequence<S>,
    ) -> Self {
        Self {
            name: name.into(),
            predicate,
            then,
            otherwise,
        }
    }
}

#[async_trait]
impl<S: Send, P: Predicate<S>> Step<S> for IfElse<S, P> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: &mut S, cancel: &CancellationToken) -> Flow {
        if self.predicate.test(state) {
            self.then.run(state, cancel).await
        } else {
            self.otherwise.run(state, cancel).await
        }
    }
}

/// Multi-way branch: the first case whose predicate holds runs
///
/// With no matching case the default runs, or the switch continues when
/// there is none.
pub struct Switch<S> {
    name: String,
    cases: Vec<(BoxPredicate<S>, Sequence<S>)>,
    default: Option<Sequence<S>>,
}

impl<S: Send + 'static> Switch<S> {
    /// Empty switch
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cases: Vec::new(),
            default: None,
        }
    }

    /// Add a case (builder style)
    #[must_use]
    pub fn case(mut self, predicate: impl Predicate<S> + 'static, steps: Sequence<S>) -> Self {
        self.cases.push((Box::new(predicate), steps));
        self
    }

    /// Set the branch run when no case matches (builder style)
    #[must_use]
    pub fn otherwise(mut self, steps: Sequence<S>) -> Self {
        self.default = Some(steps);
        self
    }
}

#[async_trait]
impl<S: Send> Step<S> for Switch<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: &mut S, cancel: &CancellationToken) -> Flow {
        let current: &S = state;
        let selected = self
            .cases
            .iter()
            .find(|(predicate, _)| predicate.test(current))
            .map(|(_, steps)| steps)
            .or(self.default.as_ref());
        match selected {
            Some(steps) => {
                trace!(switch = %self.name, case = steps.name(), "Case selected");
                steps.run(state, cancel).await
            }
            None => Flow::Continue,
        }
    }
}

/// Terminal step: ends the pipeline with [`Flow::Forget`]
#[derive(Debug, Clone, Copy, Default)]
pub struct Finish;

#[async_trait]
impl<S: Send> Step<S> for Finish {
    fn name(&self) -> &str {
        "finish"
    }

    async fn run(&self, _state: &mut S, _cancel: &CancellationToken) -> Flow {
        Flow::Forget
    }
}
