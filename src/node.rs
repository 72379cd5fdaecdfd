//! Node records of the category tree.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Primary key of a node row. `0` is the synthetic root every top-level node
/// hangs from; it never exists as a row.
pub type NodeId = i64;

/// Id of the synthetic root.
pub const ROOT_ID: NodeId = 0;

/// Kind of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Folder,
    Content,
    Root,
}

impl NodeType {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Folder => "folder",
            NodeType::Content => "content",
            NodeType::Root => "root",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "folder" => Ok(NodeType::Folder),
            "content" => Ok(NodeType::Content),
            "root" => Ok(NodeType::Root),
            other => Err(crate::Error::Internal(format!("Unknown node type: {other}"))),
        }
    }
}

/// A row of the node table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Parent id, [`ROOT_ID`] for top-level nodes.
    pub pid: NodeId,
    #[serde(rename = "type")]
    pub kind: NodeType,
    pub name: String,
    #[serde(default)]
    pub languages: BTreeSet<String>,
}

impl Node {
    pub fn new(id: NodeId, pid: NodeId, kind: NodeType, name: impl Into<String>) -> Self {
        Self {
            id,
            pid,
            kind,
            name: name.into(),
            languages: BTreeSet::new(),
        }
    }

    pub fn with_languages<I, L>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        self.languages = languages.into_iter().map(Into::into).collect();
        self
    }

    /// Top of a subtree: attached to the synthetic root or typed as root.
    pub fn is_top_level(&self) -> bool {
        self.pid == ROOT_ID || self.kind == NodeType::Root
    }

    /// Content nodes are leaves.
    pub fn accepts_children(&self) -> bool {
        self.kind != NodeType::Content
    }

    pub fn icon(&self) -> &'static str {
        match self.kind {
            NodeType::Content => "articles.svg",
            NodeType::Folder | NodeType::Root => "folderC.svg",
        }
    }

    /// Label shown in tree listings; `link` is the select target.
    pub fn label(&self) -> Label {
        Label {
            id: self.id,
            icon: self.icon().to_string(),
            name: self.name.clone(),
            languages: self.languages.iter().cloned().collect(),
            link: Some(self.id),
        }
    }
}

/// Display data for a node row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Label {
    pub id: NodeId,
    pub icon: String,
    pub name: String,
    pub languages: Vec<String>,
    pub link: Option<NodeId>,
}

/// Split a comma separated language column, trimming blanks.
pub fn parse_languages(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Inverse of [`parse_languages`].
pub fn join_languages(languages: &BTreeSet<String>) -> String {
    languages.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}
