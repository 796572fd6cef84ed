//! The `Step` trait and a closure adapter

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::flow::Flow;

/// One fallible, cancellable unit of reconciliation work over state `S`
///
/// Steps may read and mutate the state freely; later steps observe the
/// mutations of earlier ones. Cancellation is checked by the surrounding
/// [`Sequence`](crate::Sequence) between steps; a step only needs to look at
/// `cancel` if it loops internally.
#[async_trait]
pub trait Step<S>: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Run the step
    async fn run(&self, state: &mut S, cancel: &CancellationToken) -> Flow;
}

/// Boxed step
pub type BoxStep<S> = Box<dyn Step<S>>;

/// Step built from a synchronous closure
pub struct FnStep<F> {
    name: String,
    f: F,
}

impl<F> FnStep<F> {
    /// Wrap `f` as a step called `name`
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

impl<F> std::fmt::Debug for FnStep<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStep").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<S, F> Step<S> for FnStep<F>
where
    S: Send,
    F: Fn(&mut S) -> Flow + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: &mut S, _cancel: &CancellationToken) -> Flow {
        (self.f)(state)
    }
}
