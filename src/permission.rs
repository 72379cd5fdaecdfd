//! Permission gate for the node tree.
//!
//! A user is either an admin, who may do anything anywhere, or a regular user
//! holding a set of [`Capabilities`] and a list of mounted root ids. Regular
//! users only see the subtrees below their mounts. A session may widen the
//! mounts with nodes the user created themselves (see
//! [`PermissionGate::grant`]).

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::node::NodeId;
use crate::store::NodeStore;
use crate::tree::{WalkEnd, walk_up};
use crate::{Error, Result};

bitflags! {
    /// Per-user capability flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u8 {
        const CREATE = 1;
        const EDIT = 1 << 1;
        const DELETE = 1 << 2;
        /// Manage top-level nodes.
        const ROOT = 1 << 3;
        /// Manage the content attached to nodes.
        const CONTENT = 1 << 4;
    }
}

impl Capabilities {
    /// Parse a comma separated list such as `create,edit,root`.
    pub fn from_list(raw: &str) -> Result<Self> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .try_fold(Capabilities::empty(), |acc, name| {
                Capabilities::from_name(&name.to_ascii_uppercase())
                    .map(|flag| acc | flag)
                    .ok_or_else(|| Error::Internal(format!("Unknown node permission: {name}")))
            })
    }

    /// Inverse of [`Capabilities::from_list`].
    pub fn to_list(self) -> String {
        self.iter_names()
            .map(|(name, _)| name.to_ascii_lowercase())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Host-supplied mount oracle.
pub trait MountAccess: Send + Sync {
    fn is_admin(&self) -> bool;

    /// True if any of `ids` is a mount point of the user.
    fn has_access(&self, ids: &[NodeId]) -> bool;
}

/// What a user may do, as read from the permission provider.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PermissionSet {
    pub admin: bool,
    pub capabilities: Capabilities,
    pub mounts: BTreeSet<NodeId>,
}

impl PermissionSet {
    pub fn admin() -> Self {
        Self {
            admin: true,
            capabilities: Capabilities::all(),
            mounts: BTreeSet::new(),
        }
    }

    pub fn user(capabilities: Capabilities, mounts: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            admin: false,
            capabilities,
            mounts: mounts.into_iter().collect(),
        }
    }

    pub fn has(&self, capability: Capabilities) -> bool {
        self.admin || self.capabilities.contains(capability)
    }

    /// Mounted roots, `None` when unrestricted.
    pub fn allowed_root_ids(&self) -> Option<&BTreeSet<NodeId>> {
        (!self.admin).then_some(&self.mounts)
    }
}

impl MountAccess for PermissionSet {
    fn is_admin(&self) -> bool {
        self.admin
    }

    fn has_access(&self, ids: &[NodeId]) -> bool {
        self.admin || ids.iter().any(|id| self.mounts.contains(id))
    }
}

/// Record-editor actions, as carried by the `act` request parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Create,
    Edit,
    Copy,
    Cut,
    Delete,
    Show,
    Paste,
    EditAll,
    DeleteAll,
    OverrideAll,
    CutAll,
    CopyAll,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Edit => "edit",
            Action::Copy => "copy",
            Action::Cut => "cut",
            Action::Delete => "delete",
            Action::Show => "show",
            Action::Paste => "paste",
            Action::EditAll => "editAll",
            Action::DeleteAll => "deleteAll",
            Action::OverrideAll => "overrideAll",
            Action::CutAll => "cutAll",
            Action::CopyAll => "copyAll",
        }
    }

    /// Capability a regular user needs for this action, if any.
    pub fn capability(self) -> Option<Capabilities> {
        match self {
            Action::Create | Action::Copy | Action::CopyAll => Some(Capabilities::CREATE),
            Action::Edit | Action::EditAll | Action::OverrideAll => Some(Capabilities::EDIT),
            Action::Delete | Action::DeleteAll => Some(Capabilities::DELETE),
            Action::Cut | Action::CutAll | Action::Show | Action::Paste => None,
        }
    }

    /// Actions applied to the session's working id set.
    pub fn is_bulk(self) -> bool {
        matches!(
            self,
            Action::EditAll | Action::DeleteAll | Action::OverrideAll | Action::CutAll | Action::CopyAll
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| Error::BadRequest(format!("Unknown action: {s}")))
    }
}

/// Table-level flags derived from a user's permissions, applied by the caller
/// to the tree view it renders.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TreeViewPolicy {
    /// No new records may be created.
    pub closed: bool,
    pub not_copyable: bool,
    pub not_editable: bool,
    pub not_deletable: bool,
    /// Records may be pasted at the top level.
    pub root_paste: bool,
    /// Roots the tree is limited to, `None` for the whole tree.
    pub roots: Option<Vec<NodeId>>,
    /// Open the content editor instead of the node form after saving.
    pub switch_to_edit: bool,
}

/// Decides what the current user may see and touch.
#[derive(Debug, Clone)]
pub struct PermissionGate {
    permissions: PermissionSet,
    granted: BTreeSet<NodeId>,
}

impl PermissionGate {
    pub fn new(permissions: PermissionSet) -> Self {
        Self {
            permissions,
            granted: BTreeSet::new(),
        }
    }

    /// Restore grants held by the session.
    pub fn with_grants(mut self, granted: impl IntoIterator<Item = NodeId>) -> Self {
        self.granted.extend(granted);
        self
    }

    pub fn is_admin(&self) -> bool {
        self.permissions.admin
    }

    pub fn has(&self, capability: Capabilities) -> bool {
        self.permissions.has(capability)
    }

    /// Mounted roots plus session grants, `None` for admins.
    pub fn allowed_roots(&self) -> Option<BTreeSet<NodeId>> {
        self.permissions
            .allowed_root_ids()
            .map(|mounts| mounts.union(&self.granted).copied().collect())
    }

    /// Temporarily allow `id` for the rest of the session.
    ///
    /// Returns false if it was already granted.
    pub fn grant(&mut self, id: NodeId) -> bool {
        if self.is_admin() {
            return false;
        }
        let added = self.granted.insert(id);
        if added {
            tracing::debug!(node = id, "granted node for this session");
        }
        added
    }

    pub fn grants(&self) -> &BTreeSet<NodeId> {
        &self.granted
    }

    /// Whether `id` lies inside one of the user's subtrees, or is a top-level
    /// node and the user manages roots.
    pub async fn is_allowed_node<S: NodeStore>(&self, store: &S, id: NodeId) -> Result<bool> {
        let Some(roots) = self.allowed_roots() else {
            return Ok(true);
        };
        if roots.contains(&id) {
            return Ok(true);
        }

        let walk = walk_up(store, id, |node| roots.contains(&node.id)).await?;
        if walk.end == WalkEnd::Boundary {
            return Ok(true);
        }

        let top_level = walk.nodes.first().is_some_and(|node| node.is_top_level());
        Ok(top_level && self.has(Capabilities::ROOT))
    }

    /// Whether the user may perform `action` on node `id`.
    pub async fn is_allowed<S: NodeStore>(
        &self,
        store: &S,
        id: NodeId,
        action: Action,
    ) -> Result<bool> {
        if self.is_admin() {
            return Ok(true);
        }
        if let Some(capability) = action.capability()
            && !self.has(capability)
        {
            return Ok(false);
        }
        self.is_allowed_node(store, id).await
    }

    /// Keep the ids of `ids` the user may perform `action` on, in input order
    /// and without duplicates.
    pub async fn filter_allowed<S: NodeStore>(
        &self,
        store: &S,
        ids: &[NodeId],
        action: Action,
    ) -> Result<Vec<NodeId>> {
        let mut kept = Vec::with_capacity(ids.len());
        for &id in ids {
            if !kept.contains(&id) && self.is_allowed(store, id, action).await? {
                kept.push(id);
            }
        }
        Ok(kept)
    }

    /// Table flags for this user.
    pub fn tree_view_policy(&self) -> TreeViewPolicy {
        if self.is_admin() {
            return TreeViewPolicy {
                root_paste: true,
                ..TreeViewPolicy::default()
            };
        }

        let can_create = self.has(Capabilities::CREATE);
        TreeViewPolicy {
            closed: !can_create,
            not_copyable: !can_create,
            not_editable: !self.has(Capabilities::EDIT),
            not_deletable: !self.has(Capabilities::DELETE),
            root_paste: self.has(Capabilities::ROOT),
            roots: self.allowed_roots().map(|roots| roots.into_iter().collect()),
            switch_to_edit: false,
        }
    }
}
