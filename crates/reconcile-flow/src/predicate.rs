//! Boolean predicates over pipeline state

use kube::Resource;

/// Boolean-valued function over state `S`
///
/// Implemented for any `Fn(&S) -> bool`, so plain closures work as predicates.
pub trait Predicate<S>: Send + Sync {
    /// Evaluate against the current state
    fn test(&self, state: &S) -> bool;
}

impl<S, F> Predicate<S> for F
where
    F: Fn(&S) -> bool + Send + Sync,
{
    fn test(&self, state: &S) -> bool {
        self(state)
    }
}

/// Boxed predicate
pub type BoxPredicate<S> = Box<dyn Predicate<S>>;

/// Negation of a predicate
#[derive(Debug, Clone, Copy)]
pub struct Not<P>(pub P);

impl<S, P: Predicate<S>> Predicate<S> for Not<P> {
    fn test(&self, state: &S) -> bool {
        !self.0.test(state)
    }
}

/// Holds when every inner predicate holds (true when empty)
pub struct All<S>(pub Vec<BoxPredicate<S>>);

impl<S> Predicate<S> for All<S> {
    fn test(&self, state: &S) -> bool {
        self.0.iter().all(|p| p.test(state))
    }
}

/// Holds when at least one inner predicate holds (false when empty)
pub struct Any<S>(pub Vec<BoxPredicate<S>>);

impl<S> Predicate<S> for Any<S> {
    fn test(&self, state: &S) -> bool {
        self.0.iter().any(|p| p.test(state))
    }
}

/// State that carries the Kubernetes object being reconciled
pub trait HasObject {
    /// Object type
    type Object: Resource;

    /// The currently loaded object
    fn object(&self) -> &Self::Object;
}

/// Holds when the loaded object has a deletion timestamp
#[derive(Debug, Clone, Copy, Default)]
pub struct IsDeleting;

impl<S: HasObject> Predicate<S> for IsDeleting {
    fn test(&self, state: &S) -> bool {
        state.object().meta().deletion_timestamp.is_some()
    }
}
