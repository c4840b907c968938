//! Starts a child task from a [`ChildSpec`].

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::child::{ChildHandle, ChildRecord, ChildSpec, StartOutcome};
use crate::dispatcher::Signal;
use crate::error::SpawnError;
use crate::restart_counter::RestartCounter;
use crate::state::State;

/// A background timer that posts [`Signal::ChildTimeout`] to the parent's
/// inbox if it is not cancelled first.
///
/// Cancellation is RAII: dropping a `TimeoutTimer` aborts its sleep task, so
/// removing a child from the registry cancels its timer for free without any
/// explicit "flush pending timeouts" step.
#[derive(Debug)]
pub struct TimeoutTimer {
    cancel: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

impl TimeoutTimer {
    fn arm(handle: ChildHandle, timeout: Duration, inbox: mpsc::Sender<Signal>) -> Self {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    let _ = inbox.send(Signal::ChildTimeout(handle)).await;
                }
                _ = cancel_rx => {}
            }
        });
        Self {
            cancel: Some(cancel_tx),
            task,
        }
    }
}

impl Drop for TimeoutTimer {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        self.task.abort();
    }
}

/// Outcome of [`Spawner::spawn`].
pub enum SpawnOutcome {
    Started(ChildRecord),
    /// The start descriptor declined to start a child.
    Ignored,
}

/// Spawns child tasks on behalf of a `Parent`, wiring each one up with a
/// fresh cooperative-cancellation token and, if the spec requests one, a
/// timeout timer that posts back into the parent's own inbox.
pub struct Spawner {
    inbox: mpsc::Sender<Signal>,
}

impl Spawner {
    pub fn new(inbox: mpsc::Sender<Signal>) -> Self {
        Self { inbox }
    }

    /// Invokes `spec.start`, handing the child task a [`CancellationToken`]
    /// it is expected to observe for cooperative shutdown. The token and the
    /// resulting `JoinHandle` are stored together on the returned
    /// [`ChildRecord`] so a `Stopper` can later cancel it and wait.
    pub async fn spawn(&self, spec: ChildSpec) -> Result<SpawnOutcome, SpawnError> {
        let token = CancellationToken::new();
        match spec.start.invoke(token.clone()).await {
            Ok(StartOutcome::Ignored) => {
                tracing::debug!(id = ?spec.id, "start descriptor declined to start a child");
                Ok(SpawnOutcome::Ignored)
            }
            Ok(StartOutcome::Started(task)) => {
                let handle = ChildHandle::next();
                let timer = spec
                    .timeout
                    .map(|timeout| TimeoutTimer::arm(handle, timeout, self.inbox.clone()));
                let restarts = RestartCounter::new(spec.restart_budget);

                tracing::debug!(%handle, id = ?spec.id, "child spawned");
                Ok(SpawnOutcome::Started(ChildRecord {
                    handle,
                    spec,
                    task,
                    token,
                    timer,
                    startup_index: 0,
                    restarts,
                }))
            }
            Err(err) => {
                tracing::warn!(id = ?spec.id, %err, "child failed to start");
                Err(err)
            }
        }
    }

    /// Spawns and immediately registers the child, returning its handle.
    pub async fn spawn_into(
        &self,
        spec: ChildSpec,
        state: &mut State,
    ) -> Result<Option<ChildHandle>, SpawnError> {
        match self.spawn(spec).await? {
            SpawnOutcome::Ignored => Ok(None),
            SpawnOutcome::Started(record) => {
                let handle = state
                    .register(record)
                    .map_err(|e| SpawnError::new(e.to_string()))?;
                Ok(Some(handle))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::child::{ChildSpec, RestartPolicy, ShutdownPolicy, StartSpec};

    #[tokio::test]
    async fn spawn_started_child_registers_successfully() {
        let (tx, _rx) = mpsc::channel(8);
        let spawner = Spawner::new(tx);

        let spec = ChildSpec::builder(StartSpec::callable(|_token| {
            Box::pin(async {
                let handle = tokio::spawn(async { crate::child::ExitReason::Normal });
                Ok(StartOutcome::Started(handle))
            })
        }))
        .restart(RestartPolicy::Permanent)
        .shutdown(ShutdownPolicy::Graceful(Duration::from_millis(50)))
        .build();

        let outcome = spawner.spawn(spec).await.unwrap();
        assert!(matches!(outcome, SpawnOutcome::Started(_)));
    }

    #[tokio::test]
    async fn spawn_ignored_descriptor_yields_none() {
        let (tx, _rx) = mpsc::channel(8);
        let spawner = Spawner::new(tx);

        let spec = ChildSpec::builder(StartSpec::callable(|_token| {
            Box::pin(async { Ok(StartOutcome::Ignored) })
        }))
        .build();

        let outcome = spawner.spawn(spec).await.unwrap();
        assert!(matches!(outcome, SpawnOutcome::Ignored));
    }

    #[tokio::test]
    async fn timeout_timer_posts_signal_on_elapse() {
        let (tx, mut rx) = mpsc::channel(8);
        let handle = ChildHandle::next();
        let _timer = TimeoutTimer::arm(handle, Duration::from_millis(10), tx);

        let signal = tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(signal, Signal::ChildTimeout(h) if h == handle));
    }

    #[tokio::test]
    async fn dropping_timer_cancels_it() {
        let (tx, mut rx) = mpsc::channel(8);
        let handle = ChildHandle::next();
        let timer = TimeoutTimer::arm(handle, Duration::from_millis(50), tx);
        drop(timer);

        let result = tokio::time::timeout(Duration::from_millis(150), rx.recv()).await;
        assert!(result.is_err(), "cancelled timer must not post a signal");
    }
}
