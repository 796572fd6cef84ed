//! Result bridge to kube-runtime
//!
//! Maps the terminal `Flow` of a pipeline onto the requeue instruction
//! understood by `kube::runtime::Controller`.

use std::time::Duration;

use kube::runtime::controller::Action;

use crate::flow::Flow;

/// Translate a terminal pipeline outcome into a controller action
///
/// | Flow                            | Result                      |
/// |---------------------------------|-----------------------------|
/// | `Forget`, `Cancelled`, `Continue` | `Ok(Action::await_change())` |
/// | `RequeueNow`                    | `Ok(Action::requeue(0s))`   |
/// | `RequeueAfter(d)`               | `Ok(Action::requeue(d))`    |
/// | `Fatal(e)`                      | `Err(e)`                    |
///
/// A cancelled invocation finished its pass cleanly; the next watch event or
/// resync starts a fresh one.
pub fn into_action(flow: Flow) -> Result<Action, anyhow::Error> {
    match flow {
        Flow::Continue | Flow::Forget | Flow::Cancelled => Ok(Action::await_change()),
        Flow::RequeueNow => Ok(Action::requeue(Duration::ZERO)),
        Flow::RequeueAfter(delay) => Ok(Action::requeue(delay)),
        Flow::Fatal(err) => Err(err),
    }
}
