//! Node lookup collaborator.
//!
//! The navigator only ever needs point lookups and child counts, so that is
//! the whole contract. [`crate::db::SqlStore`] backs it with libsql;
//! [`MemoryStore`] keeps rows in a map.

use std::collections::BTreeMap;
use std::future::Future;

use crate::Result;
use crate::node::{Node, NodeId};

/// Read access to the node table.
pub trait NodeStore: Send + Sync {
    /// Fetch a node by id, `None` if no such row exists.
    fn get_by_id(&self, id: NodeId) -> impl Future<Output = Result<Option<Node>>> + Send;

    /// Number of nodes whose parent is `pid`.
    fn count_children(&self, pid: NodeId) -> impl Future<Output = Result<u64>> + Send;
}

/// Map-backed store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    nodes: BTreeMap<NodeId, Node>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: Node) {
        self.nodes.insert(node.id, node);
    }

    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        self.nodes.remove(&id)
    }
}

impl FromIterator<Node> for MemoryStore {
    fn from_iter<I: IntoIterator<Item = Node>>(iter: I) -> Self {
        Self {
            nodes: iter.into_iter().map(|n| (n.id, n)).collect(),
        }
    }
}

impl NodeStore for MemoryStore {
    async fn get_by_id(&self, id: NodeId) -> Result<Option<Node>> {
        Ok(self.nodes.get(&id).cloned())
    }

    async fn count_children(&self, pid: NodeId) -> Result<u64> {
        Ok(self.nodes.values().filter(|n| n.pid == pid).count() as u64)
    }
}
