//! The public facade: `Parent`, the value a host task drives directly to
//! start, monitor, and coordinate a dynamic set of child tasks.
//!
//! `Parent` owns no background task of its own. A host feeds it every signal
//! its own event loop observes (a child's `JoinHandle` completing, a timer
//! firing, an introspection request from elsewhere) through
//! [`Parent::handle_message`], and calls the other inherent methods directly
//! wherever its own request handling needs to start, stop, or inspect a
//! child. This mirrors spec.md §5: the only suspension points are starting a
//! child, stopping one, and the host's own callbacks.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::child::{
    ChildHandle, ChildId, ChildModule, ChildRecord, ChildRef, ChildSpec, ExitReason, RestartPolicy,
};
use crate::dispatcher::{DispatchOutcome, Dispatcher, QueryOutcome, Signal};
use crate::error::{FatalError, ParentError};
use crate::monitoring::{Monitor, NoopMonitor, SupervisionEvent, SupervisionEventKind};
use crate::registry_external::ExternalRegistry;
use crate::restart_counter::{RestartBudget, RestartLimit, WindowLimit};
use crate::restart_engine::{PlanOptions, PlanOutcome, RestartEngine, RestartEvent, StoppedChild};
use crate::spawner::{SpawnOutcome, Spawner};
use crate::state::{Lookup, State};
use crate::stopper::Stopper;

/// Configuration for a [`Parent`] value itself (not the restart budgets —
/// those are [`InitOptions`], supplied to [`Parent::initialize`]).
#[derive(Debug, Clone)]
pub struct ParentConfig {
    /// Capacity of the self-message inbox (`child_timeout` and a deferred
    /// cascade's `resume_restart` both flow through it).
    pub inbox_capacity: usize,
}

impl Default for ParentConfig {
    fn default() -> Self {
        Self { inbox_capacity: 64 }
    }
}

impl ParentConfig {
    pub fn builder() -> ParentConfigBuilder {
        ParentConfigBuilder::default()
    }

    /// Rejects a configuration that could never deliver a signal.
    pub fn validate(&self) -> Result<(), FatalError> {
        if self.inbox_capacity == 0 {
            return Err(FatalError::Misuse("inbox_capacity must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Builder for [`ParentConfig`].
#[derive(Debug, Default)]
pub struct ParentConfigBuilder {
    config: ParentConfig,
}

impl ParentConfigBuilder {
    pub fn inbox_capacity(mut self, capacity: usize) -> Self {
        self.config.inbox_capacity = capacity;
        self
    }

    pub fn build(self) -> Result<ParentConfig, FatalError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Initialization options for [`Parent::initialize`]: the parent-wide
/// restart budget (spec.md §6 `max_restarts`/`max_seconds`, default 3/5s)
/// plus an optional external read-only lookup table.
#[derive(Clone)]
pub struct InitOptions {
    pub max_restarts: RestartLimit,
    pub max_seconds: WindowLimit,
    pub registry: Option<Arc<dyn ExternalRegistry>>,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            max_restarts: RestartLimit::Bounded(3),
            max_seconds: WindowLimit::Bounded(Duration::from_secs(5)),
            registry: None,
        }
    }
}

impl std::fmt::Debug for InitOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitOptions")
            .field("max_restarts", &self.max_restarts)
            .field("max_seconds", &self.max_seconds)
            .field("registry", &self.registry.is_some())
            .finish()
    }
}

/// Read-only view of one live child, synthesized for introspection. Never
/// lets a caller reach back into the registry to mutate it.
#[derive(Debug, Clone)]
pub struct ChildSummary {
    pub handle: ChildHandle,
    pub id: Option<ChildId>,
    pub meta: Value,
    pub restart: RestartPolicy,
}

/// Result of a `supervisor_count_children`-style introspection call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChildCounts {
    pub total: usize,
    pub permanent: usize,
    pub transient: usize,
    pub temporary: usize,
}

/// Outcome of [`Parent::start_child`], mirroring spec.md §6 exactly.
#[derive(Debug)]
pub enum StartChildOutcome {
    Started(ChildHandle),
    AlreadyStarted(ChildHandle),
    Ignored,
}

/// Outcome of [`Parent::handle_message`].
#[derive(Debug)]
pub enum HandleOutcome {
    /// A child exited (directly, or as the trigger of a cascade) and any
    /// restart it was due has already completed or been deferred. Reported
    /// exactly once per triggering signal, never once per dragged-down
    /// dependent (spec.md §5 ordering guarantee).
    Exited {
        handle: ChildHandle,
        id: Option<ChildId>,
        meta: Value,
        reason: ExitReason,
    },
    /// The message was consumed internally (an introspection reply, a
    /// resumed cascade, or a stale signal for an already-removed handle);
    /// nothing further for the host to do.
    Ignored,
    /// The signal does not belong to this parent's registry at all (e.g. an
    /// exit for a handle it never registered). The host should route it
    /// elsewhere.
    NotApplicable,
}

/// Outcome of [`Parent::await_child_termination`].
#[derive(Debug)]
pub enum AwaitOutcome {
    Terminated {
        handle: ChildHandle,
        meta: Value,
        reason: ExitReason,
    },
    TimedOut,
}

fn misuse_before_init() -> FatalError {
    FatalError::Misuse("parent used before initialize".to_string())
}

fn require_state(state: &Option<State>) -> Result<&State, FatalError> {
    state.as_ref().ok_or_else(misuse_before_init)
}

fn require_state_mut(state: &mut Option<State>) -> Result<&mut State, FatalError> {
    state.as_mut().ok_or_else(misuse_before_init)
}

fn describe_ref(reference: &ChildRef) -> String {
    match reference {
        ChildRef::Id(id) => id.to_string(),
        ChildRef::Handle(handle) => handle.to_string(),
    }
}

fn record_spec_binds_to(record: &ChildRecord) -> Vec<ChildRef> {
    record.spec.binds_to.clone()
}

/// Everything a `Parent` needs besides its own registry: how to start and
/// stop children, where to post self-signals, the optional external lookup
/// table, and the monitor. Split out from `Parent` itself so its fields sit
/// in a struct field disjoint from `state` — the restart engine borrows
/// `spawner`/`stopper` from here for the whole span of a restart while
/// `state` is borrowed mutably alongside it.
struct Runtime<M: Monitor<SupervisionEvent>> {
    spawner: Spawner,
    stopper: Stopper,
    inbox_tx: mpsc::Sender<Signal>,
    registry: Option<Arc<dyn ExternalRegistry>>,
    monitor: M,
    supervisor_id: String,
}

impl<M: Monitor<SupervisionEvent>> Runtime<M> {
    fn registry_insert(&self, id: &ChildId, handle: ChildHandle) {
        if let Some(registry) = &self.registry {
            registry.insert(id.clone(), handle);
        }
    }

    fn registry_remove(&self, id: &ChildId) {
        if let Some(registry) = &self.registry {
            registry.remove(id);
        }
    }

    async fn emit(&self, kind: SupervisionEventKind, child_id: Option<String>) {
        let event = SupervisionEvent {
            timestamp: chrono::Utc::now(),
            supervisor_id: self.supervisor_id.clone(),
            child_id,
            event_kind: kind,
            metadata: Default::default(),
        };
        if self.monitor.record(event).await.is_err() {
            tracing::warn!("failed to record supervision event");
        }
    }

    /// Translates the [`RestartEvent`]s a restart plan reports into
    /// [`SupervisionEvent`]s.
    async fn emit_restart_events(&self, events: Vec<RestartEvent>) {
        for event in events {
            match event {
                RestartEvent::ChildRestarted { child_id, restart_count } => {
                    self.emit(SupervisionEventKind::ChildRestarted { restart_count }, child_id).await;
                }
                RestartEvent::RestartLimitExceeded { child_id, restart_count, window } => {
                    self.emit(
                        SupervisionEventKind::RestartLimitExceeded { restart_count, window },
                        child_id,
                    )
                    .await;
                }
                RestartEvent::ShutdownGroupStopped { group, affected_count } => {
                    self.emit(SupervisionEventKind::ShutdownGroupStopped { group, affected_count }, None)
                        .await;
                }
                RestartEvent::EphemeralGivenUp { child_id } => {
                    self.emit(SupervisionEventKind::EphemeralGivenUp, child_id).await;
                }
            }
        }
    }

    /// If `result` is the fatal "parent budget exhausted" error, records it
    /// as a [`SupervisionEventKind::ParentRestartBudgetExhausted`] before the
    /// caller propagates it — this is the one fatal path a host's own
    /// monitor should see before the parent task itself terminates.
    async fn emit_if_budget_exhausted<T>(&self, result: &Result<T, FatalError>) {
        if let Err(FatalError::TooManyRestarts { restart_count, window }) = result {
            self.emit(
                SupervisionEventKind::ParentRestartBudgetExhausted {
                    restart_count: *restart_count,
                    window: *window,
                },
                None,
            )
            .await;
        }
    }

    /// Emits `ChildBound` for every dependency `spec.binds_to` resolves
    /// against the registry at spawn time.
    async fn emit_bindings(&self, child_id: Option<&ChildId>, state: &State, binds_to: &[ChildRef]) {
        for reference in binds_to {
            if let Lookup::Found(dep_handle) = state.resolve(reference) {
                let depends_on = state
                    .child_id(dep_handle)
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| dep_handle.to_string());
                self.emit(
                    SupervisionEventKind::ChildBound { depends_on },
                    child_id.map(ToString::to_string),
                )
                .await;
            }
        }
    }

    /// Emits `ChildUnbound` for every dependency a popped child had bound to.
    async fn emit_unbindings(&self, child_id: Option<&ChildId>, binds_to: &[ChildRef]) {
        for reference in binds_to {
            let depends_on = match reference {
                ChildRef::Id(id) => id.to_string(),
                ChildRef::Handle(handle) => handle.to_string(),
            };
            self.emit(
                SupervisionEventKind::ChildUnbound { depends_on },
                child_id.map(ToString::to_string),
            )
            .await;
        }
    }
}

/// An embeddable supervision engine: starts, monitors, and restarts a
/// dynamic set of child tasks on behalf of one host task.
///
/// `Parent` is deliberately driven through `&mut self`: its registry needs
/// no locking at all, because exactly one task is ever meant to hold and
/// call it (spec.md §5).
pub struct Parent<M: Monitor<SupervisionEvent> = NoopMonitor<SupervisionEvent>> {
    config: ParentConfig,
    state: Option<State>,
    runtime: Runtime<M>,
    inbox: mpsc::Receiver<Signal>,
}

impl Parent<NoopMonitor<SupervisionEvent>> {
    /// Builds a `Parent` with no monitoring (zero overhead). Use
    /// [`Parent::with_monitor`] to observe supervision events.
    pub fn new(config: ParentConfig) -> Self {
        Self::with_monitor(config, NoopMonitor::new())
    }
}

impl<M: Monitor<SupervisionEvent>> Parent<M> {
    pub fn with_monitor(config: ParentConfig, monitor: M) -> Self {
        let (inbox_tx, inbox) = mpsc::channel(config.inbox_capacity);
        Self {
            config,
            state: None,
            runtime: Runtime {
                spawner: Spawner::new(inbox_tx.clone()),
                stopper: Stopper,
                inbox_tx,
                registry: None,
                monitor,
                supervisor_id: format!("parent-{}", uuid::Uuid::new_v4()),
            },
            inbox,
        }
    }

    /// Arms this parent for use: installs the parent-wide restart budget and
    /// optional external registry. Must be called exactly once, before any
    /// other operation; calling it twice, or calling anything else first, is
    /// a misuse the host is expected to propagate and crash on (spec.md
    /// §7), surfaced here through `Result` rather than a panic so the host
    /// decides how its own task ends.
    #[tracing::instrument(skip(self, options))]
    pub fn initialize(&mut self, options: InitOptions) -> Result<(), FatalError> {
        if self.state.is_some() {
            return Err(FatalError::Misuse("parent already initialized".to_string()));
        }
        self.runtime.registry = options.registry;
        self.state = Some(State::new(RestartBudget {
            max_restarts: options.max_restarts,
            window: options.max_seconds,
        }));
        tracing::debug!(supervisor_id = %self.runtime.supervisor_id, "parent initialized");
        Ok(())
    }

    /// A sender clone a host may hand to whatever else needs to post a
    /// [`Signal`] into this parent's inbox.
    pub fn inbox_sender(&self) -> mpsc::Sender<Signal> {
        self.runtime.inbox_tx.clone()
    }

    /// Awaits the next signal posted to this parent's own inbox (child
    /// timeouts and deferred-restart continuations arrive here; a host
    /// normally feeds its own externally-observed child exits and
    /// introspection requests directly into
    /// [`handle_message`](Self::handle_message) instead).
    pub async fn recv_signal(&mut self) -> Option<Signal> {
        self.inbox.recv().await
    }

    /// Starts one child from `spec`. Returns `AlreadyStarted` rather than
    /// erroring when `spec.id` collides with a live child — spec.md §6
    /// lists it as a first-class outcome, not a failure the caller must
    /// branch around via `Result`.
    #[tracing::instrument(skip(self, spec), fields(id = ?spec.id))]
    pub async fn start_child(&mut self, spec: ChildSpec) -> Result<StartChildOutcome, ParentError> {
        if let Some(id) = &spec.id {
            if let Lookup::Found(existing) = require_state(&self.state)?.resolve(&ChildRef::Id(id.clone())) {
                return Ok(StartChildOutcome::AlreadyStarted(existing));
            }
        }

        let id = spec.id.clone();
        match self.runtime.spawner.spawn(spec).await {
            Ok(SpawnOutcome::Ignored) => Ok(StartChildOutcome::Ignored),
            Ok(SpawnOutcome::Started(record)) => {
                let handle = record.handle;
                let binds_to = record_spec_binds_to(&record);
                match require_state_mut(&mut self.state)?.register(record) {
                    Ok(_) => {
                        if let Some(id) = &id {
                            self.runtime.registry_insert(id, handle);
                        }
                        self.runtime
                            .emit(SupervisionEventKind::ChildStarted, id.as_ref().map(ToString::to_string))
                            .await;
                        self.runtime
                            .emit_bindings(id.as_ref(), require_state(&self.state)?, &binds_to)
                            .await;
                        tracing::debug!(%handle, "child started");
                        Ok(StartChildOutcome::Started(handle))
                    }
                    Err(_duplicate) => {
                        let existing = id
                            .as_ref()
                            .and_then(|i| require_state(&self.state).ok().and_then(|s| s.child_handle(i)))
                            .unwrap_or(handle);
                        Err(ParentError::AlreadyStarted {
                            id: id.map(|i| i.to_string()).unwrap_or_default(),
                            existing,
                        })
                    }
                }
            }
            Err(err) => Err(ParentError::SpawnFailed(err)),
        }
    }

    /// Starts a child named by a bare module reference or a `(module, arg)`
    /// pair rather than an explicit [`ChildSpec`] (spec.md §4.3's
    /// normalization). Pass `Value::Null` as `arg` for the bare-reference
    /// form. Equivalent to `start_child(ChildSpec::from_module(module, arg))`.
    pub async fn start_module(
        &mut self,
        module: std::sync::Arc<dyn ChildModule>,
        arg: Value,
    ) -> Result<StartChildOutcome, ParentError> {
        self.start_child(ChildSpec::from_module(module, arg)).await
    }

    /// Stops `reference` and every child transitively bound to it, in the
    /// order [`State::pop_with_dependents`] returns them.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown_child(&mut self, reference: ChildRef) -> Result<ExitReason, ParentError> {
        let state = require_state_mut(&mut self.state)?;
        let handle = match state.resolve(&reference) {
            Lookup::Found(handle) => handle,
            Lookup::NotFound => return Err(ParentError::UnknownChild(describe_ref(&reference))),
        };

        let popped = state.pop_with_dependents(handle);
        let mut triggering_reason = ExitReason::Shutdown;
        for mut record in popped {
            let this_handle = record.handle;
            if let Some(id) = &record.spec.id {
                self.runtime.registry_remove(id);
            }
            let reason = self.runtime.stopper.stop_one(&mut record).await;
            if this_handle == handle {
                triggering_reason = reason.clone();
            }
            self.runtime
                .emit(SupervisionEventKind::ChildStopped, record.spec.id.as_ref().map(ToString::to_string))
                .await;
            self.runtime
                .emit_unbindings(record.spec.id.as_ref(), &record.spec.binds_to)
                .await;
        }

        tracing::debug!(%handle, "child shut down");
        Ok(triggering_reason)
    }

    /// Explicitly restarts a live child and everything transitively bound to
    /// it. Unlike a restart triggered by `handle_message`, this is an
    /// operator action, not a recorded failure: no restart budget is
    /// charged (mirrors [`return_children`](Self::return_children)).
    #[tracing::instrument(skip(self))]
    pub async fn restart_child(&mut self, reference: ChildRef) -> Result<ChildHandle, ParentError> {
        let state = require_state_mut(&mut self.state)?;
        let handle = match state.resolve(&reference) {
            Lookup::Found(handle) => handle,
            Lookup::NotFound => return Err(ParentError::UnknownChild(describe_ref(&reference))),
        };

        let popped = state.pop_with_dependents(handle);
        let mut stopped = Vec::with_capacity(popped.len());
        for mut record in popped {
            if let Some(id) = &record.spec.id {
                self.runtime.registry_remove(id);
            }
            let startup_index = record.startup_index;
            let reason = self.runtime.stopper.stop_one(&mut record).await;
            stopped.push(StoppedChild {
                record,
                exit_reason: reason,
                startup_index,
                record_restart: false,
            });
        }

        let engine = RestartEngine::new(&self.runtime.spawner, &self.runtime.stopper);
        let result = engine
            .resume(
                require_state_mut(&mut self.state)?,
                stopped,
                PlanOptions { include_temporary: true },
            )
            .await;
        self.runtime.emit_if_budget_exhausted(&result).await;
        let outcome = result.map_err(ParentError::Fatal)?;

        match outcome {
            PlanOutcome::Completed { events, .. } => {
                self.runtime.emit_restart_events(events).await;
                match require_state(&self.state)?.resolve(&reference) {
                    Lookup::Found(new_handle) => Ok(new_handle),
                    Lookup::NotFound => Err(ParentError::UnknownChild(describe_ref(&reference))),
                }
            }
            PlanOutcome::Deferred { pending, events } => {
                self.runtime.emit_restart_events(events).await;
                let _ = self.runtime.inbox_tx.send(Signal::ResumeRestart(pending)).await;
                Err(ParentError::SpawnFailed(crate::error::SpawnError::new(
                    "restart deferred after a cascading spawn failure",
                )))
            }
        }
    }

    /// Stops every live child in strict reverse startup-index order
    /// (spec.md §5). Returns the stopped set so the host may pass it to
    /// [`return_children`](Self::return_children) to restore the registry.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown_all(&mut self, reason: ExitReason) -> Result<Vec<StoppedChild>, FatalError> {
        let mut records = require_state_mut(&mut self.state)?.drain_all();
        records.reverse();

        for record in &records {
            if let Some(id) = &record.spec.id {
                self.runtime.registry_remove(id);
            }
        }

        let mut stopped = Vec::with_capacity(records.len());
        for mut record in records {
            let startup_index = record.startup_index;
            let exit_reason = self.runtime.stopper.stop_one(&mut record).await;
            let exit_reason = if matches!(exit_reason, ExitReason::Shutdown) {
                reason.clone()
            } else {
                exit_reason
            };
            stopped.push(StoppedChild {
                record,
                exit_reason,
                startup_index,
                record_restart: false,
            });
        }
        tracing::info!(count = stopped.len(), "shutdown_all complete");
        Ok(stopped)
    }

    /// Re-inserts previously-stopped records (typically the result of
    /// [`shutdown_all`](Self::shutdown_all)), subject to the ordinary
    /// restart plan: every entry is offered a restart, including temporary
    /// children (this is a restore, not a failure), and none of it is
    /// charged against any restart budget.
    #[tracing::instrument(skip(self, stopped))]
    pub async fn return_children(&mut self, stopped: Vec<StoppedChild>) -> Result<Vec<ChildHandle>, FatalError> {
        let untagged = stopped
            .into_iter()
            .map(|entry| StoppedChild {
                record_restart: false,
                ..entry
            })
            .collect();

        let engine = RestartEngine::new(&self.runtime.spawner, &self.runtime.stopper);
        let result = engine
            .resume(
                require_state_mut(&mut self.state)?,
                untagged,
                PlanOptions { include_temporary: true },
            )
            .await;
        self.runtime.emit_if_budget_exhausted(&result).await;
        let outcome = result?;

        match outcome {
            PlanOutcome::Completed { ignored, events } => {
                self.runtime.emit_restart_events(events).await;
                Ok(ignored)
            }
            PlanOutcome::Deferred { pending, events } => {
                self.runtime.emit_restart_events(events).await;
                let _ = self.runtime.inbox_tx.send(Signal::ResumeRestart(pending)).await;
                Ok(Vec::new())
            }
        }
    }

    pub fn children(&self) -> Result<Vec<ChildSummary>, FatalError> {
        Ok(require_state(&self.state)?
            .children()
            .map(|record| ChildSummary {
                handle: record.handle,
                id: record.spec.id.clone(),
                meta: record.spec.meta.clone(),
                restart: record.spec.restart,
            })
            .collect())
    }

    pub fn num_children(&self) -> Result<usize, FatalError> {
        Ok(require_state(&self.state)?.num_children())
    }

    pub fn child(&self, reference: &ChildRef) -> Result<bool, FatalError> {
        Ok(matches!(require_state(&self.state)?.resolve(reference), Lookup::Found(_)))
    }

    pub fn child_id(&self, handle: ChildHandle) -> Result<Option<ChildId>, FatalError> {
        Ok(require_state(&self.state)?.child_id(handle))
    }

    /// Resolves an id to its current handle. Named `child_handle` rather
    /// than spec.md's `child_pid` — "pid" is rendered as the Rust-native
    /// `ChildHandle` throughout.
    pub fn child_handle(&self, id: &ChildId) -> Result<Option<ChildHandle>, FatalError> {
        Ok(require_state(&self.state)?.child_handle(id))
    }

    pub fn child_meta(&self, reference: &ChildRef) -> Result<Value, ParentError> {
        let state = require_state(&self.state)?;
        match state.resolve(reference) {
            Lookup::Found(handle) => Ok(state.child_meta(handle).unwrap_or(Value::Null)),
            Lookup::NotFound => Err(ParentError::UnknownChild(describe_ref(reference))),
        }
    }

    pub fn update_child_meta(
        &mut self,
        reference: &ChildRef,
        update: impl FnOnce(Value) -> Value,
    ) -> Result<(), ParentError> {
        let state = require_state_mut(&mut self.state)?;
        let handle = match state.resolve(reference) {
            Lookup::Found(handle) => handle,
            Lookup::NotFound => return Err(ParentError::UnknownChild(describe_ref(reference))),
        };
        let current = state.child_meta(handle).unwrap_or(Value::Null);
        state.update_meta(handle, update(current));
        Ok(())
    }

    /// Waits up to `timeout` for the child named by `id` to terminate on
    /// its own, returning its final meta and exit reason. A direct await on
    /// the live child's own task — one of the three suspension points
    /// spec.md §5 allows — not a `handle_message`-mediated path.
    #[tracing::instrument(skip(self))]
    pub async fn await_child_termination(
        &mut self,
        id: &ChildId,
        timeout: Duration,
    ) -> Result<AwaitOutcome, ParentError> {
        let state = require_state_mut(&mut self.state)?;
        let handle = state
            .child_handle(id)
            .ok_or_else(|| ParentError::UnknownChild(id.to_string()))?;
        let meta = state.child_meta(handle).unwrap_or(Value::Null);
        let record = state
            .lookup_handle_mut(handle)
            .ok_or_else(|| ParentError::UnknownChild(id.to_string()))?;

        let outcome = match tokio::time::timeout(timeout, &mut record.task).await {
            Ok(join_result) => Some(join_result.unwrap_or(ExitReason::Killed)),
            Err(_elapsed) => None,
        };

        match outcome {
            Some(reason) => {
                require_state_mut(&mut self.state)?.remove(handle);
                self.runtime.registry_remove(id);
                Ok(AwaitOutcome::Terminated { handle, meta, reason })
            }
            None => Ok(AwaitOutcome::TimedOut),
        }
    }

    pub fn supervisor_count_children(&self) -> Result<ChildCounts, FatalError> {
        let mut counts = ChildCounts::default();
        for record in require_state(&self.state)?.children() {
            counts.total += 1;
            match record.spec.restart {
                RestartPolicy::Permanent => counts.permanent += 1,
                RestartPolicy::Transient => counts.transient += 1,
                RestartPolicy::Temporary => counts.temporary += 1,
            }
        }
        Ok(counts)
    }

    pub fn supervisor_which_children(&self) -> Result<Vec<ChildSummary>, FatalError> {
        self.children()
    }

    /// The entry point the host feeds every signal through: classifies
    /// `signal` against the current registry and drives whatever restart,
    /// bookkeeping, or introspection reply it implies.
    #[tracing::instrument(skip(self, signal))]
    pub async fn handle_message(&mut self, signal: Signal) -> Result<HandleOutcome, ParentError> {
        let outcome = Dispatcher::handle_message(require_state(&self.state)?, signal);
        match outcome {
            DispatchOutcome::ChildExited { handle, reason } => {
                self.handle_exit(handle, reason, PlanOptions::default()).await
            }
            DispatchOutcome::ChildTimedOut { handle } => {
                if let Some(record) = require_state_mut(&mut self.state)?.lookup_handle_mut(handle) {
                    record.task.abort();
                    let _ = (&mut record.task).await;
                }
                self.handle_exit(handle, ExitReason::Timeout, PlanOptions::default()).await
            }
            DispatchOutcome::ResumeRestart(pending) => {
                let engine = RestartEngine::new(&self.runtime.spawner, &self.runtime.stopper);
                let result = engine
                    .resume(require_state_mut(&mut self.state)?, pending, PlanOptions::default())
                    .await;
                self.runtime.emit_if_budget_exhausted(&result).await;
                match result.map_err(ParentError::Fatal)? {
                    PlanOutcome::Completed { events, .. } => {
                        self.runtime.emit_restart_events(events).await;
                        Ok(HandleOutcome::Ignored)
                    }
                    PlanOutcome::Deferred { pending, events } => {
                        self.runtime.emit_restart_events(events).await;
                        let _ = self.runtime.inbox_tx.send(Signal::ResumeRestart(pending)).await;
                        Ok(HandleOutcome::Ignored)
                    }
                }
            }
            DispatchOutcome::Query(query) => {
                self.reply_query(query)?;
                Ok(HandleOutcome::Ignored)
            }
            DispatchOutcome::NotApplicable => Ok(HandleOutcome::NotApplicable),
        }
    }

    fn reply_query(&self, query: QueryOutcome) -> Result<(), FatalError> {
        match query {
            QueryOutcome::WhichChildren(tx) => {
                let _ = tx.send(self.children()?);
            }
            QueryOutcome::CountChildren(tx) => {
                let _ = tx.send(self.supervisor_count_children()?);
            }
        }
        Ok(())
    }

    async fn handle_exit(
        &mut self,
        handle: ChildHandle,
        reason: ExitReason,
        options: PlanOptions,
    ) -> Result<HandleOutcome, ParentError> {
        let (id, meta, binds_to, restart_count) = {
            let state = require_state(&self.state)?;
            (
                state.child_id(handle),
                state.child_meta(handle).unwrap_or(Value::Null),
                state
                    .lookup_handle(handle)
                    .map(|record| record.spec.binds_to.clone())
                    .unwrap_or_default(),
                state
                    .lookup_handle(handle)
                    .map(|record| record.restarts.restart_count())
                    .unwrap_or(0),
            )
        };

        if let Some(id) = &id {
            self.runtime.registry_remove(id);
        }

        self.runtime
            .emit(
                match &reason {
                    ExitReason::Normal | ExitReason::Shutdown => SupervisionEventKind::ChildStopped,
                    _ => SupervisionEventKind::ChildFailed {
                        error: format!("{reason:?}"),
                        restart_count,
                    },
                },
                id.as_ref().map(ToString::to_string),
            )
            .await;
        self.runtime.emit_unbindings(id.as_ref(), &binds_to).await;

        let engine = RestartEngine::new(&self.runtime.spawner, &self.runtime.stopper);
        let result = engine
            .plan(require_state_mut(&mut self.state)?, handle, options)
            .await;
        self.runtime.emit_if_budget_exhausted(&result).await;
        let plan_outcome = result.map_err(ParentError::Fatal)?;

        match plan_outcome {
            PlanOutcome::Completed { events, .. } => {
                self.runtime.emit_restart_events(events).await;
            }
            PlanOutcome::Deferred { pending, events } => {
                self.runtime.emit_restart_events(events).await;
                let _ = self.runtime.inbox_tx.send(Signal::ResumeRestart(pending)).await;
            }
        }

        Ok(HandleOutcome::Exited { handle, id, meta, reason })
    }
}
