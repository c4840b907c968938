//! # parentcore - embeddable child-task supervision core
//!
//! `parentcore` is an Erlang/OTP-supervisor-inspired engine a long-running host
//! task embeds to manage a dynamic set of child tasks: starting them, tracking
//! dependency bindings between them, grouping some into shutdown-groups that
//! stop and restart atomically, enforcing restart budgets at both the parent
//! and per-child scope, and restarting a transitively-closed set of bound
//! siblings when one of them fails.
//!
//! Unlike a classic Erlang supervisor, `parentcore` is not a message-passing
//! process of its own: a host task drives a [`Parent`](parent::Parent) value
//! directly via `&mut self` methods and feeds it [`Signal`](dispatcher::Signal)s
//! as its own event loop observes them. A thin dispatch wrapper that turns an
//! inbound request protocol into `Parent` calls is an external collaborator,
//! deliberately out of scope here.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use parentcore::{Parent, ParentConfig, ChildSpec, StartSpec, RestartPolicy, ShutdownPolicy};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut parent = Parent::new(ParentConfig::builder().build()?);
//!     parent.initialize(Default::default());
//!
//!     let spec = ChildSpec::builder(StartSpec::callable(|| Box::pin(async {
//!         Ok(tokio::spawn(async { /* child body */ }))
//!     })))
//!     .restart(RestartPolicy::Permanent)
//!     .shutdown(ShutdownPolicy::graceful(std::time::Duration::from_secs(5)))
//!     .build();
//!
//!     parent.start_child(spec).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Design
//!
//! ## Concurrency model
//! [`Parent`](parent::Parent) is deliberately `!Sync`: it is a single-threaded
//! cooperative actor driven by one task, so `state::State` needs no interior
//! mutability or locking at all. Child tasks themselves are plain
//! `tokio::task::JoinHandle`s.
//!
//! ## Zero-cost where possible, confined `dyn` where necessary
//! Most of this crate follows the no-`dyn`, generic-constraint style its
//! teacher favors. The one deliberate exception is
//! [`StartSpec`](child::StartSpec): the registry must hold children started
//! from callables, module+arg pairs, or MFA-like descriptors simultaneously,
//! so `StartSpec` is a closed enum wrapping boxed `Send` async factories.
//! Everything downstream of it — handles, records, the registry itself — is
//! concrete.
//!
//! # Module organization
//!
//! ## Data model
//! - [`child`] - `ChildId`, `ChildSpec`, `StartSpec`, `ChildRecord`, `ChildHandle`,
//!   `RestartPolicy`, `ShutdownPolicy`
//! - [`restart_counter`] - sliding-window restart budgets
//! - [`state`] - the pure in-memory child registry
//!
//! ## Engine
//! - [`spawner`] - starts a child task from a `ChildSpec`
//! - [`stopper`] - stops children in disciplined, timeout-then-kill order
//! - [`restart_engine`] - plans restarts of a bound sibling set after a failure
//! - [`dispatcher`] - `handle_message`, the `Signal` entry point
//! - [`parent`] - the public `Parent` facade tying the above together
//!
//! ## Supporting
//! - [`registry_external`] - the optional read-only lookup table a host may wire in
//! - [`error`] - `ParentError`/`FatalError`
//! - [`monitoring`] - generic event observation (`Monitor<E>`, `SupervisionEvent`)
//! - [`util`] - small shared helpers (duration serde)
//!
//! # Non-goals
//!
//! Distribution across hosts, persistence of state across parent restarts,
//! cross-parent dependency graphs, hot code upgrade, and a generic pub/sub
//! messaging layer are all out of scope for this crate.

pub mod child;
pub mod dispatcher;
pub mod error;
pub mod monitoring;
pub mod parent;
pub mod registry_external;
pub mod restart_counter;
pub mod restart_engine;
pub mod spawner;
pub mod state;
pub mod stopper;
pub mod util;

pub use child::{
    ChildHandle, ChildId, ChildModule, ChildRecord, ChildSpec, ChildSpecTemplate, RestartPolicy,
    ShutdownPolicy, StartSpec,
};
pub use dispatcher::{Dispatcher, Signal};
pub use error::{FatalError, ParentError};
pub use monitoring::{
    EventSeverity, InMemoryMonitor, Monitor, MonitoringConfig, MonitoringError, MonitoringEvent,
    MonitoringSnapshot, NoopMonitor, SupervisionEvent, SupervisionEventKind,
};
pub use parent::{ChildCounts, ChildSummary, InitOptions, Parent, ParentConfig};
pub use registry_external::{DashMapRegistry, ExternalRegistry};
pub use restart_counter::{RestartBudget, RestartCounter};
pub use restart_engine::RestartEngine;
pub use spawner::Spawner;
pub use state::State;
pub use stopper::Stopper;
