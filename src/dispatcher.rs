//! Classification of inbound self-messages.
//!
//! A [`Parent`](crate::parent::Parent) feeds every message from its own
//! inbox through [`Dispatcher::handle_message`] before acting on it. The
//! dispatcher itself does not apply restart policy or touch the registry —
//! it only decides whether a message is still applicable against the
//! current state and, if so, what kind of work it represents.

use tokio::sync::oneshot;

use crate::child::{ChildHandle, ExitReason};
use crate::parent::{ChildCounts, ChildSummary};
use crate::restart_engine::StoppedChild;
use crate::state::State;

/// A message a `Parent` may receive from its own inbox.
pub enum Signal {
    /// A child task's `JoinHandle` completed.
    ChildExited {
        handle: ChildHandle,
        reason: ExitReason,
    },
    /// A child's start-up or shutdown timer elapsed.
    ChildTimeout(ChildHandle),
    /// A restart plan deferred by a cascading failure is ready to resume.
    ResumeRestart(Vec<StoppedChild>),
    WhichChildren(oneshot::Sender<Vec<ChildSummary>>),
    CountChildren(oneshot::Sender<ChildCounts>),
}

/// A classified, actionable outcome of dispatching one [`Signal`].
pub enum DispatchOutcome {
    ChildExited {
        handle: ChildHandle,
        reason: ExitReason,
    },
    ChildTimedOut {
        handle: ChildHandle,
    },
    ResumeRestart(Vec<StoppedChild>),
    Query(QueryOutcome),
    /// The message no longer applies to the current registry: its handle
    /// was already removed or replaced. A stale `child_timeout` for a
    /// handle that was since re-registered lands here naturally, since
    /// handles are never reused — no explicit draining is needed.
    NotApplicable,
}

pub enum QueryOutcome {
    WhichChildren(oneshot::Sender<Vec<ChildSummary>>),
    CountChildren(oneshot::Sender<ChildCounts>),
}

/// Stateless classifier for inbound [`Signal`]s.
pub struct Dispatcher;

impl Dispatcher {
    pub fn handle_message(state: &State, signal: Signal) -> DispatchOutcome {
        match signal {
            Signal::ChildExited { handle, reason } => {
                if state.lookup_handle(handle).is_some() {
                    DispatchOutcome::ChildExited { handle, reason }
                } else {
                    tracing::debug!(%handle, "exit signal for a handle no longer in the registry");
                    DispatchOutcome::NotApplicable
                }
            }
            Signal::ChildTimeout(handle) => {
                if state.lookup_handle(handle).is_some() {
                    DispatchOutcome::ChildTimedOut { handle }
                } else {
                    tracing::debug!(%handle, "timeout signal for a handle no longer in the registry");
                    DispatchOutcome::NotApplicable
                }
            }
            Signal::ResumeRestart(pending) => DispatchOutcome::ResumeRestart(pending),
            Signal::WhichChildren(tx) => DispatchOutcome::Query(QueryOutcome::WhichChildren(tx)),
            Signal::CountChildren(tx) => DispatchOutcome::Query(QueryOutcome::CountChildren(tx)),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::restart_counter::RestartBudget;

    use super::*;

    #[test]
    fn unknown_handle_exit_is_not_applicable() {
        let state = State::new(RestartBudget::default());
        let outcome = Dispatcher::handle_message(
            &state,
            Signal::ChildExited {
                handle: ChildHandle::next(),
                reason: ExitReason::Normal,
            },
        );
        assert!(matches!(outcome, DispatchOutcome::NotApplicable));
    }

    #[test]
    fn unknown_handle_timeout_is_not_applicable() {
        let state = State::new(RestartBudget::default());
        let outcome = Dispatcher::handle_message(&state, Signal::ChildTimeout(ChildHandle::next()));
        assert!(matches!(outcome, DispatchOutcome::NotApplicable));
    }

    #[test]
    fn resume_restart_always_applies() {
        let outcome = Dispatcher::handle_message(
            &State::new(RestartBudget::default()),
            Signal::ResumeRestart(Vec::new()),
        );
        assert!(matches!(outcome, DispatchOutcome::ResumeRestart(pending) if pending.is_empty()));
    }
}
