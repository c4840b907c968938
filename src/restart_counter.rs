//! Sliding-window restart budgets.
//!
//! Both the parent-wide budget and each child's own budget are tracked with
//! the same primitive: a bounded count of restarts observed within a
//! trailing time window.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound on the number of restarts a [`RestartCounter`] permits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestartLimit {
    Bounded(u32),
    Infinite,
}

/// Width of the trailing window a [`RestartCounter`] prunes against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowLimit {
    Bounded(#[serde(with = "crate::util::duration_serde")] Duration),
    Infinite,
}

/// A `(max restarts, window)` budget, e.g. "at most 3 restarts in 5 seconds".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartBudget {
    pub max_restarts: RestartLimit,
    pub window: WindowLimit,
}

impl RestartBudget {
    pub fn new(max_restarts: u32, window: Duration) -> Self {
        Self {
            max_restarts: RestartLimit::Bounded(max_restarts),
            window: WindowLimit::Bounded(window),
        }
    }

    /// A budget that never rejects a restart.
    pub fn unbounded() -> Self {
        Self {
            max_restarts: RestartLimit::Infinite,
            window: WindowLimit::Infinite,
        }
    }
}

impl Default for RestartBudget {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

/// Raised when a restart would exceed its [`RestartBudget`].
#[derive(Debug, Clone)]
pub struct BudgetExceeded {
    pub restart_count: u32,
    pub window: Duration,
}

/// Tracks restart timestamps within a trailing window and rejects a restart
/// once the budget would be exceeded.
///
/// Pruning happens lazily on every [`record`](Self::record) call: entries
/// older than `now - window` are dropped before the remaining count is
/// compared against the limit, so a counter that has gone quiet for longer
/// than its window resets itself without needing an explicit timer.
#[derive(Debug, Clone)]
pub struct RestartCounter {
    budget: RestartBudget,
    timestamps: VecDeque<DateTime<Utc>>,
}

impl RestartCounter {
    pub fn new(budget: RestartBudget) -> Self {
        Self {
            budget,
            timestamps: VecDeque::new(),
        }
    }

    /// Prunes timestamps outside the window, then records `now` as a new
    /// restart if the budget permits it.
    pub fn record(&mut self, now: DateTime<Utc>) -> Result<(), BudgetExceeded> {
        if let RestartLimit::Infinite = self.budget.max_restarts {
            self.timestamps.push_back(now);
            return Ok(());
        }

        let max = match self.budget.max_restarts {
            RestartLimit::Bounded(max) => max,
            RestartLimit::Infinite => unreachable!("handled above"),
        };

        let window = match self.budget.window {
            WindowLimit::Bounded(window) => {
                let cutoff = now
                    - chrono::Duration::from_std(window).unwrap_or(chrono::Duration::zero());
                while matches!(self.timestamps.front(), Some(ts) if *ts < cutoff) {
                    self.timestamps.pop_front();
                }
                window
            }
            WindowLimit::Infinite => Duration::MAX,
        };

        if self.timestamps.len() as u32 >= max {
            let restart_count = self.timestamps.len() as u32;
            tracing::warn!(restart_count, ?window, "restart budget exceeded");
            return Err(BudgetExceeded {
                restart_count,
                window,
            });
        }

        self.timestamps.push_back(now);
        Ok(())
    }

    /// Number of restarts currently counted within the window (as of the
    /// last [`record`](Self::record) call — does not prune on its own).
    pub fn restart_count(&self) -> u32 {
        self.timestamps.len() as u32
    }

    pub fn budget(&self) -> RestartBudget {
        self.budget
    }
}
