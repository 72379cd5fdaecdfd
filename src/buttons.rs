//! Which record buttons are active for a node.
//!
//! Each check is a pure function of the node, the clipboard, the permission
//! gate and the table flags. Queries (child counts) are the caller's job.

use serde::{Deserialize, Serialize};

use crate::node::{Node, NodeId, NodeType};
use crate::permission::{Capabilities, PermissionGate};

/// How the clipboard content got there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClipboardMode {
    Cut,
    CutAll,
    Copy,
    CopyAll,
}

/// Records waiting to be pasted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clipboard {
    pub mode: ClipboardMode,
    pub ids: Vec<NodeId>,
}

impl Clipboard {
    pub fn cut(id: NodeId) -> Self {
        Self {
            mode: ClipboardMode::Cut,
            ids: vec![id],
        }
    }

    pub fn cut_all(ids: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            mode: ClipboardMode::CutAll,
            ids: ids.into_iter().collect(),
        }
    }

    /// Whether pasting next to or into `node` would move a record into
    /// itself. `circular` is set by the tree renderer for descendants of a
    /// cut record.
    pub fn would_cycle(&self, node: NodeId, circular: bool) -> bool {
        match self.mode {
            ClipboardMode::Cut | ClipboardMode::CutAll => circular || self.ids.contains(&node),
            ClipboardMode::Copy | ClipboardMode::CopyAll => false,
        }
    }
}

/// Paste targets relative to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PasteButtons {
    pub after: bool,
    pub into: bool,
}

/// Every button of a node row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ButtonSet {
    pub paste_after: bool,
    pub paste_into: bool,
    pub edit: bool,
    pub edit_header: bool,
    pub copy: bool,
    pub copy_children: bool,
    pub delete: bool,
}

/// Button rules for one user and table.
#[derive(Debug, Clone, Copy)]
pub struct ButtonPolicy<'a> {
    gate: &'a PermissionGate,
    closed: bool,
    roots: &'a [NodeId],
}

impl<'a> ButtonPolicy<'a> {
    /// `roots` are the roots the tree is currently rendered from.
    pub fn new(gate: &'a PermissionGate, closed: bool, roots: &'a [NodeId]) -> Self {
        Self {
            gate,
            closed,
            roots,
        }
    }

    fn is_root(&self, node: &Node) -> bool {
        node.is_top_level() || self.roots.contains(&node.id)
    }

    pub fn paste(&self, node: &Node, clipboard: Option<&Clipboard>, circular: bool) -> PasteButtons {
        let mut buttons = PasteButtons {
            after: node.id > 0,
            into: true,
        };

        if clipboard.is_some_and(|c| c.would_cycle(node.id, circular)) {
            buttons.after = false;
            buttons.into = false;
        }

        if !node.accepts_children() {
            buttons.into = false;
        }

        if !self.gate.has(Capabilities::ROOT) {
            // Pasting after a root creates another root.
            if self.is_root(node) {
                buttons.after = false;
            }
            if node.kind == NodeType::Root {
                buttons.into = false;
            }
        }

        buttons
    }

    /// Content editor; folders carry no content.
    pub fn edit(&self, node: &Node) -> bool {
        node.kind != NodeType::Folder && self.gate.has(Capabilities::CONTENT)
    }

    pub fn edit_header(&self) -> bool {
        self.gate.has(Capabilities::EDIT)
    }

    pub fn copy(&self) -> bool {
        !self.closed && self.gate.has(Capabilities::CREATE)
    }

    pub fn copy_children(&self, node: &Node, child_count: u64) -> bool {
        self.copy() && node.accepts_children() && child_count > 0
    }

    pub fn delete(&self, node: &Node) -> bool {
        if self.gate.is_admin() {
            return true;
        }
        self.gate.has(Capabilities::DELETE)
            && (!self.is_root(node) || self.gate.has(Capabilities::ROOT))
    }

    pub fn evaluate(
        &self,
        node: &Node,
        clipboard: Option<&Clipboard>,
        circular: bool,
        child_count: u64,
    ) -> ButtonSet {
        let paste = self.paste(node, clipboard, circular);
        ButtonSet {
            paste_after: paste.after,
            paste_into: paste.into,
            edit: self.edit(node),
            edit_header: self.edit_header(),
            copy: self.copy(),
            copy_children: self.copy_children(node, child_count),
            delete: self.delete(node),
        }
    }
}
