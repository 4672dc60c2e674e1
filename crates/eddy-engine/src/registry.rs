//! Shared engine state: the metastore and the live query registry.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::metastore::MetaStore;
use crate::query::{QueryHandle, QueryKind};
use crate::query_id::QueryId;
use crate::services::TopicAdmin;

/// Live queries in registration order.
#[derive(Debug, Default)]
pub(crate) struct QueryRegistry {
    queries: Vec<QueryHandle>,
}

impl QueryRegistry {
    pub(crate) fn register(&mut self, handle: QueryHandle) {
        self.queries.push(handle);
    }

    pub(crate) fn remove(&mut self, id: &QueryId) -> Option<QueryHandle> {
        let pos = self.queries.iter().position(|q| q.id() == id)?;
        Some(self.queries.remove(pos))
    }

    pub(crate) fn get(&self, id: &QueryId) -> Option<&QueryHandle> {
        self.queries.iter().find(|q| q.id() == id)
    }

    pub(crate) fn all(&self) -> Vec<QueryHandle> {
        self.queries.clone()
    }

    pub(crate) fn persistent(&self) -> impl Iterator<Item = &QueryHandle> {
        self.queries
            .iter()
            .filter(|q| q.kind() == QueryKind::Persistent)
    }

    pub(crate) fn len(&self) -> usize {
        self.queries.len()
    }
}

/// State shared between an engine and the handles of its queries.
///
/// Lock order is metastore before registry.
#[derive(Debug, Default)]
pub(crate) struct EngineState {
    pub(crate) metastore: RwLock<MetaStore>,
    pub(crate) queries: Mutex<QueryRegistry>,
}

impl EngineState {
    /// Removes a closed query and, for persistent ones, its catalog edges.
    pub(crate) fn deregister(&self, id: &QueryId) {
        let removed = self.queries.lock().remove(id);
        if let Some(handle) = removed {
            if handle.kind() == QueryKind::Persistent {
                self.metastore.write().remove_persistent_query(id);
            }
        }
    }

    /// Deep copy for a sandbox: a cloned metastore and detached copies of
    /// the persistent queries, bound to the new state.
    pub(crate) fn sandbox_copy(&self, topic_admin: &Arc<dyn TopicAdmin>) -> Arc<Self> {
        let (metastore, persistent) = {
            let metastore = self.metastore.read();
            let persistent: Vec<QueryHandle> =
                self.queries.lock().persistent().cloned().collect();
            (metastore.clone(), persistent)
        };

        Arc::new_cyclic(|weak: &Weak<EngineState>| {
            let copies = persistent
                .iter()
                .map(|q| q.detached_copy(Arc::clone(topic_admin), weak.clone()))
                .collect();
            EngineState {
                metastore: RwLock::new(metastore),
                queries: Mutex::new(QueryRegistry { queries: copies }),
            }
        })
    }
}
