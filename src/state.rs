//! The pure in-memory child registry.
//!
//! `State` holds no tasks and does no I/O: it is the bookkeeping a
//! [`Parent`](crate::parent::Parent) consults and mutates around every
//! operation. Keeping it synchronous and side-effect free is what lets the
//! restart engine reason about a consistent snapshot without interleaving.

use std::collections::{HashMap, HashSet};

use crate::child::{ChildHandle, ChildId, ChildRecord, ChildRef};
use crate::restart_counter::{RestartBudget, RestartCounter};

/// Result of resolving a [`ChildRef`] or id/handle against the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Found(ChildHandle),
    NotFound,
}

/// Errors raised by registry operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StateError {
    #[error("id {0} is already registered")]
    DuplicateId(String),
}

/// The live child registry: records, id/dependent indexes, shutdown-groups,
/// and the parent-wide restart counter.
///
/// # Invariants
///
/// 1. Every handle in `ids` and every handle appearing in a `groups` entry
///    also has an entry in `children`.
/// 2. `dependents[h]` contains exactly the handles `h2` such that some
///    `children[h2].spec.binds_to` entry resolves to `h`.
/// 3. `startup_index` values are assigned once, monotonically, and never
///    reused by this `State` value's lifetime.
#[derive(Debug)]
pub struct State {
    children: HashMap<ChildHandle, ChildRecord>,
    ids: HashMap<ChildId, ChildHandle>,
    dependents: HashMap<ChildHandle, HashSet<ChildHandle>>,
    groups: HashMap<String, HashSet<ChildHandle>>,
    pub(crate) restarts: RestartCounter,
    next_startup_index: u64,
}

impl State {
    pub fn new(parent_budget: RestartBudget) -> Self {
        Self {
            children: HashMap::new(),
            ids: HashMap::new(),
            dependents: HashMap::new(),
            groups: HashMap::new(),
            restarts: RestartCounter::new(parent_budget),
            next_startup_index: 0,
        }
    }

    pub(crate) fn next_startup_index(&mut self) -> u64 {
        let index = self.next_startup_index;
        self.next_startup_index += 1;
        index
    }

    /// Resolves a [`ChildRef`] to a live handle, if one exists.
    pub fn resolve(&self, reference: &ChildRef) -> Lookup {
        match reference {
            ChildRef::Id(id) => match self.ids.get(id) {
                Some(handle) => Lookup::Found(*handle),
                None => Lookup::NotFound,
            },
            ChildRef::Handle(handle) => {
                if self.children.contains_key(handle) {
                    Lookup::Found(*handle)
                } else {
                    Lookup::NotFound
                }
            }
        }
    }

    /// Adds `record` to every index: `ids` (if it has one), `dependents` for
    /// each resolvable `binds_to` entry, and `groups` (if it names one).
    fn install_indexes(&mut self, handle: ChildHandle) {
        let record = match self.children.get(&handle) {
            Some(r) => r,
            None => return,
        };

        if let Some(id) = record.spec.id.clone() {
            self.ids.insert(id, handle);
        }

        if let Some(group) = record.spec.shutdown_group.clone() {
            self.groups.entry(group).or_default().insert(handle);
        }

        for reference in record.spec.binds_to.clone() {
            if let Lookup::Found(dep_handle) = self.resolve(&reference) {
                self.dependents.entry(dep_handle).or_default().insert(handle);
            }
        }
    }

    /// Removes `handle` from every index without touching `children` itself.
    fn remove_indexes(&mut self, handle: ChildHandle) {
        if let Some(record) = self.children.get(&handle) {
            if let Some(id) = &record.spec.id {
                self.ids.remove(id);
            }
            if let Some(group) = &record.spec.shutdown_group {
                if let Some(members) = self.groups.get_mut(group) {
                    members.remove(&handle);
                    if members.is_empty() {
                        self.groups.remove(group);
                    }
                }
            }
        }
        self.dependents.remove(&handle);
        for deps in self.dependents.values_mut() {
            deps.remove(&handle);
        }
    }

    /// Registers a freshly spawned child, rejecting a duplicate id.
    pub fn register(&mut self, mut record: ChildRecord) -> Result<ChildHandle, StateError> {
        if let Some(id) = &record.spec.id {
            if self.ids.contains_key(id) {
                return Err(StateError::DuplicateId(id.as_str().to_string()));
            }
        }

        record.startup_index = self.next_startup_index();
        let handle = record.handle;
        self.children.insert(handle, record);
        self.install_indexes(handle);
        Ok(handle)
    }

    /// Re-registers a child under a new handle after a restart, preserving
    /// its original id and startup index so ordering and id-based bindings
    /// survive the substitution.
    pub fn re_register(
        &mut self,
        mut record: ChildRecord,
        startup_index: u64,
    ) -> ChildHandle {
        record.startup_index = startup_index;
        let handle = record.handle;
        self.children.insert(handle, record);
        self.install_indexes(handle);
        handle
    }

    pub fn lookup(&self, id: &ChildId) -> Option<&ChildRecord> {
        self.ids.get(id).and_then(|h| self.children.get(h))
    }

    pub fn lookup_handle(&self, handle: ChildHandle) -> Option<&ChildRecord> {
        self.children.get(&handle)
    }

    pub fn lookup_handle_mut(&mut self, handle: ChildHandle) -> Option<&mut ChildRecord> {
        self.children.get_mut(&handle)
    }

    /// Removes `handle` and its full transitive closure — every child bound
    /// to it (reverse-dependency edges) and every fellow member of any
    /// shutdown-group it belongs to — returning them in an order safe to
    /// stop (dependents before the handle itself). Cycle-safe: a visited set
    /// prevents infinite recursion through a binding cycle or a shared
    /// group.
    pub fn pop_with_dependents(&mut self, handle: ChildHandle) -> Vec<ChildRecord> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        self.collect_dependents(handle, &mut visited, &mut order);

        let mut popped = Vec::with_capacity(order.len());
        for h in order {
            self.remove_indexes(h);
            if let Some(record) = self.children.remove(&h) {
                popped.push(record);
            }
        }
        popped
    }

    fn collect_dependents(
        &self,
        handle: ChildHandle,
        visited: &mut HashSet<ChildHandle>,
        order: &mut Vec<ChildHandle>,
    ) {
        if !visited.insert(handle) {
            return;
        }
        if let Some(deps) = self.dependents.get(&handle) {
            for dep in deps.clone() {
                self.collect_dependents(dep, visited, order);
            }
        }
        if let Some(record) = self.children.get(&handle) {
            if let Some(group) = record.spec.shutdown_group.clone() {
                for mate in self.children_in_group(&group) {
                    self.collect_dependents(mate, visited, order);
                }
            }
        }
        order.push(handle);
    }

    /// Removes a single child with no dependent handling, for callers that
    /// have already resolved the full stop-set themselves.
    pub fn remove(&mut self, handle: ChildHandle) -> Option<ChildRecord> {
        self.remove_indexes(handle);
        self.children.remove(&handle)
    }

    pub fn children_in_group(&self, group: &str) -> Vec<ChildHandle> {
        self.groups
            .get(group)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn num_children(&self) -> usize {
        self.children.len()
    }

    pub fn child_id(&self, handle: ChildHandle) -> Option<ChildId> {
        self.children.get(&handle).and_then(|r| r.spec.id.clone())
    }

    pub fn child_handle(&self, id: &ChildId) -> Option<ChildHandle> {
        self.ids.get(id).copied()
    }

    pub fn child_meta(&self, handle: ChildHandle) -> Option<serde_json::Value> {
        self.children.get(&handle).map(|r| r.spec.meta.clone())
    }

    pub fn update_meta(&mut self, handle: ChildHandle, meta: serde_json::Value) -> bool {
        match self.children.get_mut(&handle) {
            Some(record) => {
                record.spec.meta = meta;
                true
            }
            None => false,
        }
    }

    pub fn record_restart(&mut self, now: chrono::DateTime<chrono::Utc>) -> Result<(), crate::restart_counter::BudgetExceeded> {
        self.restarts.record(now)
    }

    pub fn children(&self) -> impl Iterator<Item = &ChildRecord> {
        self.children.values()
    }

    /// Removes every child from the registry, returning them in ascending
    /// startup-index order. The startup-index sequence itself is preserved
    /// so anything restarted afterward never collides with an index already
    /// handed out, and the parent-wide restart counter is left untouched:
    /// draining the child set is not itself a restart.
    pub fn drain_all(&mut self) -> Vec<ChildRecord> {
        let mut records: Vec<ChildRecord> = self.children.drain().map(|(_, r)| r).collect();
        records.sort_by_key(|r| r.startup_index);
        self.ids.clear();
        self.dependents.clear();
        self.groups.clear();
        records
    }
}
