//! Plans and carries out the restart of a bound sibling set after a child
//! fails.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use crate::child::{ChildHandle, ChildRecord, ChildRef, ExitReason, RestartPolicy};
use crate::error::{FatalError, SpawnError};
use crate::restart_counter::WindowLimit;
use crate::spawner::{SpawnOutcome, Spawner};
use crate::state::State;
use crate::stopper::Stopper;

/// Options governing one [`RestartEngine::plan`] call.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanOptions {
    /// When set, temporary children are restarted too. Used by
    /// `return_children`, which restarts everything in a stopped set
    /// without that set having actually failed.
    pub include_temporary: bool,
}

/// A child that has been stopped and is waiting on a restart decision, or
/// waiting for its turn to retry after a deferred cascade.
///
/// `record_restart` distinguishes the handle whose failure actually
/// triggered this cascade (charged against both restart budgets) from
/// siblings dragged down along with it (never charged — see spec.md §4.6
/// "budget fairness").
#[derive(Debug)]
pub struct StoppedChild {
    pub record: ChildRecord,
    pub exit_reason: ExitReason,
    pub startup_index: u64,
    pub record_restart: bool,
}

/// A notable occurrence during a restart plan, surfaced to the caller so it
/// can forward them to its monitor. `RestartEngine` has no monitor of its
/// own — it is a pure planner (spec.md §4.6) — so it only reports what
/// happened and leaves emission to the caller.
#[derive(Debug, Clone)]
pub enum RestartEvent {
    /// A child was actually respawned and re-registered under a new handle.
    ChildRestarted {
        child_id: Option<String>,
        restart_count: u32,
    },
    /// A child's own restart budget was exceeded; it is given up on.
    RestartLimitExceeded {
        child_id: Option<String>,
        restart_count: u32,
        window: Duration,
    },
    /// A shutdown-group could not be fully revived and was stopped as one
    /// atomic unit instead of being left half-present.
    ShutdownGroupStopped { group: String, affected_count: usize },
    /// An ephemeral child's shutdown-group was given up on; the ephemeral
    /// child is dropped rather than deferred for a later retry.
    EphemeralGivenUp { child_id: Option<String> },
}

/// Result of a completed restart plan.
#[derive(Debug)]
pub enum PlanOutcome {
    /// Every popped child was either restarted or permanently given up on.
    Completed {
        ignored: Vec<ChildHandle>,
        events: Vec<RestartEvent>,
    },
    /// A restart attempt itself failed partway through; the remaining
    /// siblings are returned so the caller can resubmit them as a new
    /// cascade (via `Signal::ResumeRestart`) instead of losing them.
    Deferred {
        pending: Vec<StoppedChild>,
        events: Vec<RestartEvent>,
    },
}

/// Plans and executes the restart of one failed child and every child
/// transitively bound to it.
pub struct RestartEngine<'a> {
    spawner: &'a Spawner,
    stopper: &'a Stopper,
}

impl<'a> RestartEngine<'a> {
    pub fn new(spawner: &'a Spawner, stopper: &'a Stopper) -> Self {
        Self { spawner, stopper }
    }

    /// Restarts `failed_handle` and its transitively-bound dependents.
    ///
    /// Steps, matching the registry-level algorithm this implements:
    /// 1. Pop the failed child and every child bound to it, dependents
    ///    first (idempotent: a handle no longer registered contributes
    ///    nothing).
    /// 2. Stop each popped child per its own shutdown policy, tagging only
    ///    `failed_handle` itself as a chargeable failure.
    /// 3. Hand the stopped set to [`resume`](Self::resume) for budget
    ///    charging, restart/ignore partitioning, and sequential restart.
    pub async fn plan(
        &self,
        state: &mut State,
        failed_handle: ChildHandle,
        options: PlanOptions,
    ) -> Result<PlanOutcome, FatalError> {
        let popped = state.pop_with_dependents(failed_handle);
        if popped.is_empty() {
            return Ok(PlanOutcome::Completed {
                ignored: Vec::new(),
                events: Vec::new(),
            });
        }

        let mut stopped = Vec::with_capacity(popped.len());
        for mut record in popped {
            let record_restart = record.handle == failed_handle;
            let startup_index = record.startup_index;
            let reason = self.stopper.stop_one(&mut record).await;
            stopped.push(StoppedChild {
                record,
                exit_reason: reason,
                startup_index,
                record_restart,
            });
        }

        self.resume(state, stopped, options).await
    }

    /// Continuation entry point for a cascade that was previously deferred,
    /// and the engine for `return_children` (every entry tagged
    /// `record_restart = false`, since re-insertion after an explicit
    /// `shutdown_all` is not itself a failure).
    ///
    /// Steps:
    /// 1. Charge the parent-wide budget once if any entry is tagged as a
    ///    genuine failure.
    /// 2. Split into to-restart / to-ignore by restart policy and exit
    ///    reason; charge each chargeable child's own budget as it is
    ///    accepted for restart.
    /// 3. Restart survivors in ascending startup-index order, rewriting
    ///    handle-based bindings as old handles are replaced by new ones.
    /// 4. On a restart failure partway through, roll back any shutdown-group
    ///    left half-revived and defer the remainder rather than dropping it.
    pub async fn resume(
        &self,
        state: &mut State,
        stopped: Vec<StoppedChild>,
        options: PlanOptions,
    ) -> Result<PlanOutcome, FatalError> {
        let now = chrono::Utc::now();
        let mut events: Vec<RestartEvent> = Vec::new();

        if stopped.iter().any(|c| c.record_restart) && state.record_restart(now).is_err() {
            let window = match state.restarts.budget().window {
                WindowLimit::Bounded(w) => w,
                WindowLimit::Infinite => Duration::from_secs(0),
            };
            let restart_count = state.restarts.restart_count();
            tracing::error!(
                restart_count,
                ?window,
                "parent-wide restart budget exhausted; parent task must terminate"
            );
            return Err(FatalError::TooManyRestarts {
                restart_count,
                window,
            });
        }

        let mut decisions: Vec<(StoppedChild, bool)> = Vec::new();
        for mut entry in stopped {
            let should_restart = match entry.record.spec.restart {
                RestartPolicy::Permanent => true,
                RestartPolicy::Transient => {
                    !matches!(entry.exit_reason, ExitReason::Normal | ExitReason::Shutdown)
                }
                RestartPolicy::Temporary => options.include_temporary,
            };

            if !should_restart {
                decisions.push((entry, false));
                continue;
            }

            if entry.record_restart && entry.record.restarts.record(now).is_err() {
                let restart_count = entry.record.restarts.restart_count();
                let window = match entry.record.restarts.budget().window {
                    WindowLimit::Bounded(w) => w,
                    WindowLimit::Infinite => Duration::from_secs(0),
                };
                let child_id = entry.record.spec.id.as_ref().map(ToString::to_string);
                tracing::warn!(
                    child_id = ?child_id,
                    restart_count,
                    "child's own restart budget exceeded, giving up"
                );
                events.push(RestartEvent::RestartLimitExceeded {
                    child_id,
                    restart_count,
                    window,
                });
                decisions.push((entry, false));
                continue;
            }

            decisions.push((entry, true));
        }

        // Shutdown-group atomicity: a group can never end up with some
        // members restarted and others given up (spec.md §4.6 step 6, §3
        // invariant 5). Any group with at least one given-up member has
        // every other member demoted from "restart" to "defer", even if
        // that member's own policy and budget would otherwise allow it.
        let given_up_groups: HashSet<String> = decisions
            .iter()
            .filter(|(_, restart)| !restart)
            .filter_map(|(entry, _)| entry.record.spec.shutdown_group.clone())
            .collect();

        for group in &given_up_groups {
            let affected_count = decisions
                .iter()
                .filter(|(entry, _)| entry.record.spec.shutdown_group.as_deref() == Some(group.as_str()))
                .count();
            tracing::warn!(%group, affected_count, "shutdown-group could not be fully revived, stopping as one unit");
            events.push(RestartEvent::ShutdownGroupStopped {
                group: group.clone(),
                affected_count,
            });
        }

        let mut to_restart: Vec<StoppedChild> = Vec::new();
        let mut ignored: Vec<ChildHandle> = Vec::new();
        let mut group_demoted: Vec<StoppedChild> = Vec::new();

        for (entry, restart) in decisions {
            let in_given_up_group = entry
                .record
                .spec
                .shutdown_group
                .as_ref()
                .is_some_and(|group| given_up_groups.contains(group));

            if !restart {
                ignored.push(entry.record.handle);
            } else if in_given_up_group {
                group_demoted.push(entry);
            } else {
                to_restart.push(entry);
            }
        }

        // A demoted member was never actually a restart failure; it is
        // resubmitted for a later retry rather than given up on for good,
        // unless its own policy already rules out a retry, or it is marked
        // `ephemeral` — an ephemeral child never re-enters a deferred
        // cascade once its group has been given up on (spec.md's "remove
        // from registry" governs the give-up path, see DESIGN.md).
        let mut deferred: Vec<StoppedChild> = Vec::with_capacity(group_demoted.len());
        for entry in group_demoted {
            if entry.record.spec.ephemeral {
                let child_id = entry.record.spec.id.as_ref().map(ToString::to_string);
                tracing::debug!(child_id = ?child_id, "ephemeral child dropped after its shutdown-group was given up on");
                events.push(RestartEvent::EphemeralGivenUp { child_id });
                continue;
            }
            if entry.record.spec.restart == RestartPolicy::Temporary {
                continue;
            }
            deferred.push(StoppedChild {
                exit_reason: ExitReason::Shutdown,
                record_restart: false,
                ..entry
            });
        }

        to_restart.sort_by_key(|c| c.startup_index);
        let mut remaining: VecDeque<StoppedChild> = to_restart.into();
        let mut handle_map: HashMap<ChildHandle, ChildHandle> = HashMap::new();

        while let Some(entry) = remaining.pop_front() {
            let StoppedChild {
                mut record,
                startup_index,
                ..
            } = entry;
            let old_handle = record.handle;
            for binding in record.spec.binds_to.iter_mut() {
                if let ChildRef::Handle(h) = binding {
                    if let Some(new_handle) = handle_map.get(h) {
                        *h = *new_handle;
                    }
                }
            }

            match self.spawner.spawn(record.spec.clone()).await {
                Ok(SpawnOutcome::Started(mut new_record)) => {
                    new_record.restarts = record.restarts;
                    let restart_count = new_record.restarts.restart_count();
                    let child_id = new_record.spec.id.as_ref().map(ToString::to_string);
                    let new_handle = state.re_register(new_record, startup_index);
                    handle_map.insert(old_handle, new_handle);
                    tracing::debug!(%new_handle, child_id = ?child_id, "child restarted");
                    events.push(RestartEvent::ChildRestarted {
                        child_id,
                        restart_count,
                    });
                }
                Ok(SpawnOutcome::Ignored) => {}
                Err(err) => {
                    return self
                        .cascade_rollback(state, record, startup_index, err, remaining, deferred, events)
                        .await;
                }
            }
        }

        if deferred.is_empty() {
            Ok(PlanOutcome::Completed { ignored, events })
        } else {
            // A child permanently given up on here (budget exhaustion, or a
            // policy that never restarts) stays given up even though its
            // group-mates are deferred for another pass; only the deferred
            // remainder needs a `resume_restart`.
            Ok(PlanOutcome::Deferred { pending: deferred, events })
        }
    }

    /// A spawn attempt failed partway through a restart cascade. Rolls back
    /// any shutdown-group that would otherwise be left with some members
    /// live and some never restarted (shutdown-group atomicity), then
    /// packages the remainder — the failing child, its unstarted siblings,
    /// any freshly-stopped group-mates, and whatever was already deferred by
    /// group atomicity earlier in this same `resume` call — for a deferred
    /// retry.
    async fn cascade_rollback(
        &self,
        state: &mut State,
        failing: ChildRecord,
        failing_startup_index: u64,
        err: SpawnError,
        remaining: VecDeque<StoppedChild>,
        extra_deferred: Vec<StoppedChild>,
        mut events: Vec<RestartEvent>,
    ) -> Result<PlanOutcome, FatalError> {
        tracing::warn!(
            handle = %failing.handle,
            %err,
            "spawn failed mid-cascade, rolling back affected shutdown-groups"
        );

        let groups: HashSet<String> = remaining
            .iter()
            .filter_map(|c| c.record.spec.shutdown_group.clone())
            .collect();

        let mut group_mates = Vec::new();
        for group in &groups {
            let members = state.children_in_group(group);
            if !members.is_empty() {
                tracing::warn!(%group, affected_count = members.len(), "shutdown-group rolled back after mid-cascade spawn failure");
                events.push(RestartEvent::ShutdownGroupStopped {
                    group: group.clone(),
                    affected_count: members.len(),
                });
            }
            for handle in members {
                if let Some(record) = state.remove(handle) {
                    group_mates.push(record);
                }
            }
        }
        let stopped_mates = self.stopper.stop_all(group_mates).await;

        let mut pending = Vec::with_capacity(remaining.len() + stopped_mates.len() + 1);
        pending.push(StoppedChild {
            startup_index: failing_startup_index,
            exit_reason: ExitReason::Error(err.to_string()),
            record_restart: true,
            record: failing,
        });

        for entry in remaining {
            pending.push(StoppedChild {
                exit_reason: ExitReason::Shutdown,
                record_restart: false,
                ..entry
            });
        }

        for (record, _reason) in stopped_mates {
            pending.push(StoppedChild {
                startup_index: record.startup_index,
                exit_reason: ExitReason::Shutdown,
                record_restart: false,
                record,
            });
        }

        // Temporary children caught up in the rollback never get a retry.
        // Ephemeral children are dropped (and reported) rather than
        // deferred; everything else becomes the deferred remainder the
        // dispatcher resubmits via `Signal::ResumeRestart`.
        let mut deferred = Vec::with_capacity(pending.len());
        for entry in pending {
            if entry.record.spec.ephemeral {
                let child_id = entry.record.spec.id.as_ref().map(ToString::to_string);
                events.push(RestartEvent::EphemeralGivenUp { child_id });
                continue;
            }
            if entry.record.spec.restart == RestartPolicy::Temporary {
                continue;
            }
            deferred.push(entry);
        }
        deferred.extend(extra_deferred);

        Ok(PlanOutcome::Deferred { pending: deferred, events })
    }
}
