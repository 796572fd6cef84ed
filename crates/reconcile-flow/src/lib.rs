//! Reconcile Flow
//!
//! A small engine for writing controller reconcilers as an ordered pipeline
//! of steps over a mutable per-invocation state.
//!
//! - Steps return a [`Flow`] signal (`Continue`, `Forget`, `RequeueNow`,
//!   `RequeueAfter`, `Cancelled`, `Fatal`) rather than booleans.
//! - [`Sequence`] runs steps in order, stops at the first non-`Continue`
//!   signal and checks a `CancellationToken` between steps.
//! - [`If`], [`IfElse`] and [`Switch`] select sub-sequences from
//!   [`Predicate`]s (`Not`, `All`, `Any`, `IsDeleting`).
//! - [`into_action`] turns the final signal into a kube-runtime `Action`.
//!
//! # Example
//!
//! ```
//! use reconcile_flow::{Finish, Flow, FnStep, If, Sequence, Step};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() {
//! let pipeline = Sequence::new("demo")
//!     .then(If::new(
//!         "when-odd",
//!         |n: &u32| n % 2 == 1,
//!         Sequence::new("bump").then(FnStep::new("bump", |n: &mut u32| {
//!             *n += 1;
//!             Flow::Continue
//!         })),
//!     ))
//!     .then(Finish);
//!
//! let mut n = 3;
//! let flow = pipeline.run(&mut n, &CancellationToken::new()).await;
//! assert!(matches!(flow, Flow::Forget));
//! assert_eq!(n, 4);
//! # }
//! ```

pub mod branch;
pub mod bridge;
pub mod compose;
pub mod flow;
pub mod key;
pub mod predicate;
pub mod step;

pub use branch::{Finish, If, IfElse, Switch};
pub use bridge::into_action;
pub use compose::Sequence;
pub use flow::Flow;
pub use key::ObjectKey;
pub use predicate::{All, Any, BoxPredicate, HasObject, IsDeleting, Not, Predicate};
pub use step::{BoxStep, FnStep, Step};
