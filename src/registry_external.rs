//! The optional read-only lookup table a host may wire in to resolve a
//! [`ChildId`] to a [`ChildHandle`] without going through `Parent` itself —
//! useful when some other part of the host application needs to address a
//! child directly (e.g. to hand it a mailbox sender) without contending with
//! the parent's own single-threaded event loop.
//!
//! `parentcore` never reads from this table itself: `Parent` is the source
//! of truth for which children exist. A registry implementation here is
//! purely a convenience a host keeps in sync on the side.

use dashmap::DashMap;

use crate::child::{ChildHandle, ChildId};

/// Read-mostly `ChildId -> ChildHandle` lookup table a host may keep
/// alongside a `Parent` for external address resolution.
pub trait ExternalRegistry: Send + Sync {
    fn insert(&self, id: ChildId, handle: ChildHandle);
    fn remove(&self, id: &ChildId) -> Option<ChildHandle>;
    fn get(&self, id: &ChildId) -> Option<ChildHandle>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lock-free [`ExternalRegistry`] backed by [`DashMap`].
#[derive(Debug, Default)]
pub struct DashMapRegistry {
    table: DashMap<ChildId, ChildHandle>,
}

impl DashMapRegistry {
    pub fn new() -> Self {
        Self {
            table: DashMap::new(),
        }
    }
}

impl ExternalRegistry for DashMapRegistry {
    fn insert(&self, id: ChildId, handle: ChildHandle) {
        self.table.insert(id, handle);
    }

    fn remove(&self, id: &ChildId) -> Option<ChildHandle> {
        self.table.remove(id).map(|(_, handle)| handle)
    }

    fn get(&self, id: &ChildId) -> Option<ChildHandle> {
        self.table.get(id).map(|entry| *entry.value())
    }

    fn len(&self) -> usize {
        self.table.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get_resolves() {
        let registry = DashMapRegistry::new();
        let id = ChildId::new("worker-1");
        let handle = ChildHandle::next();

        registry.insert(id.clone(), handle);
        assert_eq!(registry.get(&id), Some(handle));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_clears_entry() {
        let registry = DashMapRegistry::new();
        let id = ChildId::new("worker-1");
        registry.insert(id.clone(), ChildHandle::next());

        assert!(registry.remove(&id).is_some());
        assert!(registry.get(&id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn unknown_id_resolves_to_none() {
        let registry = DashMapRegistry::new();
        assert_eq!(registry.get(&ChildId::new("missing")), None);
    }
}
