//! Parent-pointer walks over the node table.

use std::collections::HashSet;

use crate::Result;
use crate::node::{Node, NodeId, ROOT_ID};
use crate::store::NodeStore;

/// Why a walk stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkEnd {
    /// Reached a top-level node.
    Root,
    /// The boundary predicate matched the last collected node.
    Boundary,
    /// The starting node does not exist; nothing was collected.
    StartMissing,
    /// An ancestor with this id is missing.
    Broken(NodeId),
    /// The parent chain loops back to this id.
    Cycle(NodeId),
}

/// Nodes collected from the start node upward.
#[derive(Debug, Clone)]
pub struct Walk {
    pub nodes: Vec<Node>,
    pub end: WalkEnd,
}

impl Walk {
    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.id).collect()
    }

    /// Collected nodes ordered from the top down.
    pub fn top_down(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().rev()
    }
}

/// Walk parent pointers from `start` until a top-level node, a missing
/// ancestor, a revisited id, or a node for which `boundary` returns true.
///
/// Every node is visited at most once, so a walk takes at most
/// `depth(start) + 1` lookups.
pub async fn walk_up<S, F>(store: &S, start: NodeId, mut boundary: F) -> Result<Walk>
where
    S: NodeStore,
    F: FnMut(&Node) -> bool,
{
    let mut nodes = Vec::new();
    let mut visited = HashSet::new();
    let mut id = start;

    let end = loop {
        if id == ROOT_ID {
            break WalkEnd::Root;
        }
        if !visited.insert(id) {
            tracing::debug!(start, id, "parent chain loops, stopping walk");
            break WalkEnd::Cycle(id);
        }

        let Some(node) = store.get_by_id(id).await? else {
            if nodes.is_empty() {
                break WalkEnd::StartMissing;
            }
            tracing::debug!(start, id, "ancestor missing, stopping walk");
            break WalkEnd::Broken(id);
        };

        let stop_here = boundary(&node);
        let top = node.is_top_level();
        id = node.pid;
        nodes.push(node);

        if stop_here {
            break WalkEnd::Boundary;
        }
        if top {
            break WalkEnd::Root;
        }
    };

    Ok(Walk { nodes, end })
}
