//! Stops children in disciplined, timeout-then-kill order.

use std::time::Duration;

use tokio::time::timeout;

use crate::child::{ChildRecord, ExitReason, ShutdownPolicy};

/// Stops children one at a time, in the order given, honoring each one's
/// [`ShutdownPolicy`].
///
/// A graceful stop cancels the child's [`CancellationToken`](tokio_util::sync::CancellationToken)
/// and waits up to the policy's deadline for its task to finish on its own;
/// only once that deadline elapses does the stopper escalate to
/// `JoinHandle::abort`. The child's own task body is responsible for
/// observing the token — `Stopper` has no way to force a cooperative exit,
/// only to ask for one and, failing that, kill.
pub struct Stopper;

impl Stopper {
    /// Stops every record in `records`, in order, returning each one paired
    /// with the reason it stopped for. Order matters: callers that need
    /// dependents stopped before what they depend on should already have
    /// sorted `records` accordingly (see
    /// [`State::pop_with_dependents`](crate::state::State::pop_with_dependents)).
    pub async fn stop_all(&self, records: Vec<ChildRecord>) -> Vec<(ChildRecord, ExitReason)> {
        let mut results = Vec::with_capacity(records.len());
        for mut record in records {
            let reason = self.stop_one(&mut record).await;
            results.push((record, reason));
        }
        results
    }

    /// Stops a single child according to its shutdown policy.
    pub async fn stop_one(&self, record: &mut ChildRecord) -> ExitReason {
        match record.spec.shutdown {
            ShutdownPolicy::ImmediateKill => {
                record.task.abort();
                let _ = (&mut record.task).await;
                ExitReason::Killed
            }
            ShutdownPolicy::Infinite => {
                record.token.cancel();
                let _ = (&mut record.task).await;
                ExitReason::Shutdown
            }
            ShutdownPolicy::Graceful(deadline) => self.stop_graceful(record, deadline).await,
        }
    }

    async fn stop_graceful(&self, record: &mut ChildRecord, deadline: Duration) -> ExitReason {
        record.token.cancel();
        match timeout(deadline, &mut record.task).await {
            Ok(_) => ExitReason::Shutdown,
            Err(_elapsed) => {
                tracing::warn!(
                    handle = %record.handle,
                    ?deadline,
                    "child missed its graceful shutdown deadline, escalating to kill"
                );
                record.task.abort();
                let _ = (&mut record.task).await;
                ExitReason::Killed
            }
        }
    }
}
