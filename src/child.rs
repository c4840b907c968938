//! Child data model: identity, declarative spec, start descriptors, and the
//! runtime record the registry keeps for a live child.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::SpawnError;
use crate::restart_counter::{RestartBudget, RestartCounter};

/// Opaque host-supplied identity, unique among live children.
///
/// A `ChildId` is never minted by this crate: a host hands one in, or leaves
/// it absent for an anonymous child that is only reachable by its
/// [`ChildHandle`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChildId(Arc<str>);

impl ChildId {
    /// Wraps `id` as a `ChildId`.
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChildId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ChildId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Stable reference to one running child task, assigned when it is spawned
/// and never reused: a random v4 UUID, not a counter, so handles minted by
/// different `State` instances (or across a process restart) never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChildHandle(Uuid);

impl ChildHandle {
    pub(crate) fn next() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ChildHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "child-{}", self.0)
    }
}

/// A binding target: either a stable id, or a handle for an anonymous child.
///
/// Id-based bindings stay valid across a restart without help (the id is
/// re-resolved to whatever handle is currently live); handle-based bindings
/// are rewritten by the restart engine as the children they name come back
/// up under new handles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChildRef {
    Id(ChildId),
    Handle(ChildHandle),
}

impl From<ChildId> for ChildRef {
    fn from(id: ChildId) -> Self {
        Self::Id(id)
    }
}

impl From<ChildHandle> for ChildRef {
    fn from(handle: ChildHandle) -> Self {
        Self::Handle(handle)
    }
}

/// Per-child restart rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestartPolicy {
    /// Always restart, regardless of exit reason.
    Permanent,
    /// Restart only on abnormal exit.
    Transient,
    /// Never restart.
    Temporary,
}

/// How a child is asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutdownPolicy {
    /// Cancel cooperatively, escalating to a hard kill after the deadline.
    Graceful(#[serde(with = "crate::util::duration_serde")] Duration),
    /// Kill immediately, no grace period.
    ImmediateKill,
    /// Wait indefinitely for a cooperative exit.
    Infinite,
}

impl ShutdownPolicy {
    /// The default graceful deadline a normalized `ChildSpec` uses: 5000ms.
    pub fn default_graceful() -> Self {
        Self::Graceful(Duration::from_millis(5000))
    }
}

impl Default for ShutdownPolicy {
    fn default() -> Self {
        Self::default_graceful()
    }
}

/// Why a child task ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExitReason {
    Normal,
    Error(String),
    Killed,
    Shutdown,
    Timeout,
}

/// Future returned by a start descriptor.
pub type StartFuture = Pin<Box<dyn Future<Output = Result<StartOutcome, SpawnError>> + Send>>;

/// A callable start descriptor: spawns the child task and returns its
/// handle, given a [`CancellationToken`] the task body should observe for
/// cooperative shutdown.
pub type StartFn = Arc<dyn Fn(CancellationToken) -> StartFuture + Send + Sync>;

/// Outcome of invoking a start descriptor.
pub enum StartOutcome {
    /// The child was started; here is its running task.
    Started(tokio::task::JoinHandle<ExitReason>),
    /// The descriptor chose not to start a child (e.g. conditionally disabled).
    Ignored,
}

/// Host-implemented resolver for the symbolic (`module`, `arg`) and MFA-like
/// start descriptor shapes. A bare `Callable` needs no such indirection;
/// this trait exists for hosts that want to name a start routine by module
/// rather than close over a function pointer directly.
pub trait ChildModule: Send + Sync + fmt::Debug {
    fn start(&self, arg: Value, token: CancellationToken) -> StartFuture;

    fn call(&self, function: &str, args: Vec<Value>, token: CancellationToken) -> StartFuture;

    /// The policies a bare module reference or `(module, arg)` pair expands
    /// to once normalized into a full [`ChildSpec`] (spec.md §4.3's "module's
    /// own `child_spec/1`-equivalent"). The default mirrors §4.3's own
    /// defaults; a module whose children should, say, restart as `Transient`
    /// by default overrides this instead of making every caller repeat it.
    fn child_spec(&self, _arg: &Value) -> ChildSpecTemplate {
        ChildSpecTemplate::default()
    }
}

/// The overridable half of a normalized [`ChildSpec`] — everything except
/// the start descriptor itself, which normalization always fills in as
/// `StartSpec::ModuleArg`. See [`ChildModule::child_spec`] and
/// [`ChildSpec::from_module`].
#[derive(Debug, Clone)]
pub struct ChildSpecTemplate {
    pub meta: Value,
    pub shutdown: ShutdownPolicy,
    pub restart: RestartPolicy,
    pub timeout: Option<Duration>,
    pub restart_budget: RestartBudget,
    pub shutdown_group: Option<String>,
    pub ephemeral: bool,
}

impl Default for ChildSpecTemplate {
    fn default() -> Self {
        Self {
            meta: Value::Null,
            shutdown: ShutdownPolicy::default_graceful(),
            restart: RestartPolicy::Permanent,
            timeout: None,
            restart_budget: RestartBudget::default(),
            shutdown_group: None,
            ephemeral: false,
        }
    }
}

/// How to start one child: a closure, or a symbolic module reference.
///
/// This is the one deliberate exception to this crate's otherwise
/// generic-constraint, no-`dyn` style: the registry holds children started
/// from all three shapes in the same map, so the start descriptor itself
/// must be type-erased. Everything downstream of it — handles, records, the
/// registry — stays concrete.
#[derive(Clone)]
pub enum StartSpec {
    Callable(StartFn),
    ModuleArg {
        module: Arc<dyn ChildModule>,
        arg: Value,
    },
    Mfa {
        module: Arc<dyn ChildModule>,
        function: Arc<str>,
        args: Vec<Value>,
    },
}

impl StartSpec {
    pub fn callable<F>(f: F) -> Self
    where
        F: Fn(CancellationToken) -> StartFuture + Send + Sync + 'static,
    {
        Self::Callable(Arc::new(f))
    }

    pub fn module_arg(module: Arc<dyn ChildModule>, arg: Value) -> Self {
        Self::ModuleArg { module, arg }
    }

    pub fn mfa(module: Arc<dyn ChildModule>, function: impl Into<Arc<str>>, args: Vec<Value>) -> Self {
        Self::Mfa {
            module,
            function: function.into(),
            args,
        }
    }

    pub(crate) fn invoke(&self, token: CancellationToken) -> StartFuture {
        match self {
            Self::Callable(f) => f(token),
            Self::ModuleArg { module, arg } => module.start(arg.clone(), token),
            Self::Mfa {
                module,
                function,
                args,
            } => module.call(function, args.clone(), token),
        }
    }
}

impl fmt::Debug for StartSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Callable(_) => f.write_str("StartSpec::Callable(..)"),
            Self::ModuleArg { module, .. } => {
                f.debug_struct("StartSpec::ModuleArg").field("module", module).finish()
            }
            Self::Mfa { module, function, .. } => f
                .debug_struct("StartSpec::Mfa")
                .field("module", module)
                .field("function", function)
                .finish(),
        }
    }
}

/// Declarative description of one child.
#[derive(Debug, Clone)]
pub struct ChildSpec {
    pub id: Option<ChildId>,
    pub start: StartSpec,
    pub meta: Value,
    pub shutdown: ShutdownPolicy,
    pub restart: RestartPolicy,
    pub timeout: Option<Duration>,
    pub restart_budget: RestartBudget,
    pub binds_to: Vec<ChildRef>,
    pub shutdown_group: Option<String>,
    pub ephemeral: bool,
}

impl ChildSpec {
    /// Normalizes a bare module reference (`arg = Value::Null`) or a
    /// `(module, arg)` pair into a full `ChildSpec`, per spec.md §4.3.
    /// Policies come from the module's own [`ChildModule::child_spec`];
    /// the start descriptor is always `StartSpec::ModuleArg`, since that is
    /// the one thing the module cannot supply for itself.
    pub fn from_module(module: Arc<dyn ChildModule>, arg: Value) -> ChildSpec {
        let template = module.child_spec(&arg);
        ChildSpec {
            id: None,
            start: StartSpec::module_arg(module, arg),
            meta: template.meta,
            shutdown: template.shutdown,
            restart: template.restart,
            timeout: template.timeout,
            restart_budget: template.restart_budget,
            binds_to: Vec::new(),
            shutdown_group: template.shutdown_group,
            ephemeral: template.ephemeral,
        }
    }

    pub fn builder(start: StartSpec) -> ChildSpecBuilder {
        ChildSpecBuilder {
            spec: ChildSpec {
                id: None,
                start,
                meta: Value::Null,
                shutdown: ShutdownPolicy::default_graceful(),
                restart: RestartPolicy::Permanent,
                timeout: None,
                restart_budget: RestartBudget::default(),
                binds_to: Vec::new(),
                shutdown_group: None,
                ephemeral: false,
            },
        }
    }
}

/// Builder for [`ChildSpec`], defaulting every optional field exactly as a
/// normalized spec would: `shutdown = 5000ms`, `restart = permanent`,
/// `timeout = infinite`, `max_restarts = 3/5s`, `meta = null`.
pub struct ChildSpecBuilder {
    spec: ChildSpec,
}

impl ChildSpecBuilder {
    pub fn id(mut self, id: impl Into<ChildId>) -> Self {
        self.spec.id = Some(id.into());
        self
    }

    pub fn meta(mut self, meta: Value) -> Self {
        self.spec.meta = meta;
        self
    }

    pub fn shutdown(mut self, policy: ShutdownPolicy) -> Self {
        self.spec.shutdown = policy;
        self
    }

    pub fn restart(mut self, policy: RestartPolicy) -> Self {
        self.spec.restart = policy;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.spec.timeout = Some(timeout);
        self
    }

    pub fn restart_budget(mut self, budget: RestartBudget) -> Self {
        self.spec.restart_budget = budget;
        self
    }

    pub fn binds_to(mut self, refs: impl IntoIterator<Item = ChildRef>) -> Self {
        self.spec.binds_to = refs.into_iter().collect();
        self
    }

    pub fn shutdown_group(mut self, group: impl Into<String>) -> Self {
        self.spec.shutdown_group = Some(group.into());
        self
    }

    pub fn ephemeral(mut self, ephemeral: bool) -> Self {
        self.spec.ephemeral = ephemeral;
        self
    }

    pub fn build(self) -> ChildSpec {
        self.spec
    }
}

/// Snapshot of a spec plus the runtime attributes the registry tracks for a
/// live child.
#[derive(Debug)]
pub struct ChildRecord {
    pub handle: ChildHandle,
    pub spec: ChildSpec,
    pub(crate) task: tokio::task::JoinHandle<ExitReason>,
    pub(crate) token: CancellationToken,
    pub(crate) timer: Option<crate::spawner::TimeoutTimer>,
    pub startup_index: u64,
    pub restarts: RestartCounter,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct EchoModule;

    impl ChildModule for EchoModule {
        fn start(&self, _arg: Value, _token: CancellationToken) -> StartFuture {
            Box::pin(async {
                let handle = tokio::spawn(async { ExitReason::Normal });
                Ok(StartOutcome::Started(handle))
            })
        }

        fn call(&self, _function: &str, _args: Vec<Value>, _token: CancellationToken) -> StartFuture {
            self.start(Value::Null, CancellationToken::new())
        }
    }

    #[derive(Debug)]
    struct TransientModule;

    impl ChildModule for TransientModule {
        fn start(&self, _arg: Value, _token: CancellationToken) -> StartFuture {
            Box::pin(async {
                let handle = tokio::spawn(async { ExitReason::Normal });
                Ok(StartOutcome::Started(handle))
            })
        }

        fn call(&self, _function: &str, _args: Vec<Value>, _token: CancellationToken) -> StartFuture {
            self.start(Value::Null, CancellationToken::new())
        }

        fn child_spec(&self, _arg: &Value) -> ChildSpecTemplate {
            ChildSpecTemplate {
                restart: RestartPolicy::Transient,
                ..ChildSpecTemplate::default()
            }
        }
    }

    #[test]
    fn bare_module_reference_normalizes_to_spec_defaults() {
        let spec = ChildSpec::from_module(Arc::new(EchoModule), Value::Null);
        assert_eq!(spec.restart, RestartPolicy::Permanent);
        assert_eq!(spec.timeout, None);
        assert!(matches!(spec.start, StartSpec::ModuleArg { .. }));
    }

    #[test]
    fn module_arg_pair_normalizes_with_arg_preserved() {
        let spec = ChildSpec::from_module(Arc::new(EchoModule), serde_json::json!({"port": 8080}));
        match spec.start {
            StartSpec::ModuleArg { arg, .. } => assert_eq!(arg, serde_json::json!({"port": 8080})),
            _ => panic!("expected ModuleArg"),
        }
    }

    #[test]
    fn module_overrides_its_own_default_restart_policy() {
        let spec = ChildSpec::from_module(Arc::new(TransientModule), Value::Null);
        assert_eq!(spec.restart, RestartPolicy::Transient);
    }
}
