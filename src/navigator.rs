//! Session-backed position in the node tree.
//!
//! The navigator remembers which node a user is browsing, turns that position
//! into a breadcrumb trail, and applies the permission gate to the action the
//! request carries. It owns the request's [`SessionContext`]; callers must
//! save [`Navigator::into_session`] back to the store whatever the outcome,
//! since failed walks reset the stored position.

use serde::Serialize;

use crate::config;
use crate::node::{Node, NodeId, NodeType};
use crate::permission::{Action, Capabilities, MountAccess, PermissionGate, TreeViewPolicy};
use crate::session::SessionContext;
use crate::store::NodeStore;
use crate::tree::{WalkEnd, walk_up};
use crate::validator::is_insecure_path;
use crate::{Error, Result};

/// Where the user currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigatorState {
    Unset,
    Positioned(NodeId),
    /// The stored token is not a node id and will be reset.
    Invalid(String),
}

impl NavigatorState {
    fn from_token(token: Option<&str>) -> Self {
        let Some(token) = token else {
            return NavigatorState::Unset;
        };
        match token.trim().parse::<NodeId>() {
            Ok(id) if id > 0 => NavigatorState::Positioned(id),
            Ok(_) => NavigatorState::Unset,
            Err(_) => NavigatorState::Invalid(token.to_string()),
        }
    }
}

/// One step of a breadcrumb trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Crumb {
    /// `None` for the leading "all nodes" entry.
    pub id: Option<NodeId>,
    pub label: String,
    pub icon: String,
    /// Node to select when following the entry; the active node has none.
    pub link: Option<NodeId>,
}

/// Path from the top of the user's view down to the current node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breadcrumb {
    pub node: NodeId,
    pub crumbs: Vec<Crumb>,
}

impl Breadcrumb {
    pub fn labels(&self) -> Vec<&str> {
        self.crumbs.iter().map(|c| c.label.as_str()).collect()
    }
}

/// Request parameters the load hook reacts to.
#[derive(Debug, Clone, Default)]
pub struct LoadRequest<'a> {
    /// Request URI, path and query.
    pub uri: &'a str,
    /// Raw value of the select parameter, if present.
    pub select: Option<&'a str>,
    pub action: Option<Action>,
    /// Record the action targets.
    pub id: Option<NodeId>,
}

/// Result of the load hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoadOutcome {
    /// A node was selected; reload without the select parameter.
    Redirect { location: String },
    Ready {
        breadcrumb: Option<Breadcrumb>,
        policy: TreeViewPolicy,
    },
}

/// Per-request navigator over a node store.
pub struct Navigator<'a, S, M> {
    store: &'a S,
    mounts: M,
    gate: PermissionGate,
    session: SessionContext,
    config: &'a config::Navigator,
}

impl<'a, S, M> Navigator<'a, S, M>
where
    S: NodeStore,
    M: MountAccess,
{
    pub fn new(
        store: &'a S,
        gate: PermissionGate,
        mounts: M,
        session: SessionContext,
        config: &'a config::Navigator,
    ) -> Self {
        let gate = gate.with_grants(session.granted_nodes());
        Self {
            store,
            mounts,
            gate,
            session,
            config,
        }
    }

    pub fn gate(&self) -> &PermissionGate {
        &self.gate
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionContext {
        &mut self.session
    }

    pub fn into_session(self) -> SessionContext {
        self.session
    }

    pub fn state(&self) -> NavigatorState {
        NavigatorState::from_token(self.session.position_token().as_deref())
    }

    /// Store a new position from a raw request token. Empty tokens and ids
    /// below 1 clear the position.
    pub fn select(&mut self, raw: &str) -> Result<NavigatorState> {
        if is_insecure_path(raw) {
            return Err(Error::InsecurePath(raw.to_string()));
        }
        let raw = raw.trim();
        let id: NodeId = if raw.is_empty() {
            0
        } else {
            raw.parse()
                .map_err(|_| Error::BadRequest(format!("Invalid node ID {raw}")))?
        };

        if id > 0 {
            self.session.set_position_token(&id.to_string())?;
        } else {
            self.session.reset_position()?;
        }
        tracing::debug!(node = id, table = self.session.table(), "selected node");
        Ok(self.state())
    }

    /// Build the trail to the current node.
    ///
    /// Returns `None` when nothing is selected, or when the selected node no
    /// longer exists (the position is reset). Fails with
    /// [`Error::NotMounted`] if the trail never touches one of the user's
    /// mounts, also resetting the position.
    pub async fn breadcrumb(&mut self) -> Result<Option<Breadcrumb>> {
        if let Some(token) = self.session.position_token()
            && is_insecure_path(&token)
        {
            return Err(Error::InsecurePath(token));
        }

        let current = match self.state() {
            NavigatorState::Unset => return Ok(None),
            NavigatorState::Invalid(token) => {
                tracing::warn!(token, "stored node position is not an id, resetting");
                self.session.reset_position()?;
                return Ok(None);
            }
            NavigatorState::Positioned(id) => id,
        };

        let admin = self.mounts.is_admin();
        let walk = walk_up(self.store, current, |node| {
            !admin && self.is_mounted(&[node.id])
        })
        .await?;

        if walk.end == WalkEnd::StartMissing {
            tracing::warn!(node = current, "selected node does not exist, resetting position");
            self.session.reset_position()?;
            return Ok(None);
        }

        if !self.is_mounted(&walk.ids()) {
            tracing::warn!(node = current, "selected node is not mounted, resetting position");
            self.session.reset_position()?;
            return Err(Error::NotMounted(current));
        }

        let mut crumbs = Vec::with_capacity(walk.nodes.len() + 1);
        crumbs.push(Crumb {
            id: None,
            label: self.config.all_nodes_label.clone(),
            icon: self.config.tree_icon.clone(),
            link: Some(0),
        });
        crumbs.extend(walk.top_down().map(|node| Crumb {
            id: Some(node.id),
            label: node.name.clone(),
            icon: node.icon().to_string(),
            link: (node.id != current).then_some(node.id),
        }));

        Ok(Some(Breadcrumb {
            node: current,
            crumbs,
        }))
    }

    /// Mount check widened by the nodes granted in this session.
    fn is_mounted(&self, ids: &[NodeId]) -> bool {
        self.mounts.has_access(ids) || ids.iter().any(|id| self.gate.grants().contains(id))
    }

    /// Apply the permission gate to the request's action.
    ///
    /// Scrubs the session's working id set, may grant a node created in
    /// this session, and rejects single-record actions outside the user's
    /// subtrees with [`Error::AccessDenied`].
    pub async fn authorize(
        &mut self,
        action: Option<Action>,
        id: Option<NodeId>,
    ) -> Result<TreeViewPolicy> {
        if self.gate.is_admin() {
            return Ok(self.gate.tree_view_policy());
        }

        let scrub = if action == Some(Action::DeleteAll) {
            Action::Delete
        } else {
            Action::Edit
        };
        self.scrub_current_ids(scrub).await?;

        match action {
            None | Some(Action::Paste) => {}
            Some(action @ (Action::Edit | Action::Copy | Action::Delete | Action::Show)) => {
                let id = id.ok_or_else(|| Error::BadRequest(format!("Missing node ID to {action}")))?;
                if action == Action::Edit {
                    self.grant_if_new(id).await?;
                }
                if !self.gate.is_allowed(self.store, id, action).await? {
                    tracing::warn!(%action, node = id, "node outside permitted scope");
                    return Err(Error::AccessDenied(format!(
                        "Not enough permissions to {action} node ID {id}."
                    )));
                }
            }
            Some(action) if action.is_bulk() => self.scrub_current_ids(action).await?,
            Some(_) => {}
        }

        Ok(self.gate.tree_view_policy())
    }

    async fn scrub_current_ids(&mut self, action: Action) -> Result<()> {
        if let Some(ids) = self.session.current_ids() {
            let kept = self.gate.filter_allowed(self.store, &ids, action).await?;
            self.session.set_current_ids(&kept)?;
        }
        Ok(())
    }

    async fn grant_if_new(&mut self, id: NodeId) -> Result<()> {
        if !self.config.grant_new_records
            || !self.session.new_records().contains(&id)
            || self.gate.is_allowed_node(self.store, id).await?
        {
            return Ok(());
        }
        if self.gate.grant(id) {
            self.session.set_granted_nodes(self.gate.grants().iter().copied())?;
        }
        Ok(())
    }

    /// Whether saving record `id` should switch to its content editor.
    pub async fn switch_to_edit(&self, id: Option<NodeId>) -> Result<bool> {
        let Some(id) = id.filter(|id| *id > 0) else {
            return Ok(false);
        };
        if !self.gate.has(Capabilities::CONTENT) {
            return Ok(false);
        }
        let node: Option<Node> = self.store.get_by_id(id).await?;
        Ok(node.is_some_and(|n| n.kind == NodeType::Content))
    }

    /// Per-request hook: selection, breadcrumb, authorization, edit switch.
    pub async fn load(&mut self, request: &LoadRequest<'_>) -> Result<LoadOutcome> {
        if let Some(raw) = request.select {
            self.select(raw)?;
            return Ok(LoadOutcome::Redirect {
                location: strip_query_param(request.uri, &self.config.select_param),
            });
        }

        let breadcrumb = self.breadcrumb().await?;
        let mut policy = self.authorize(request.action, request.id).await?;
        if let Some(trail) = &breadcrumb {
            policy.roots = Some(vec![trail.node]);
        }
        policy.switch_to_edit = self.switch_to_edit(request.id).await?;

        Ok(LoadOutcome::Ready { breadcrumb, policy })
    }
}

/// Remove every occurrence of query parameter `param` from `uri`.
pub fn strip_query_param(uri: &str, param: &str) -> String {
    let Some((path, query)) = uri.split_once('?') else {
        return uri.to_string();
    };

    let kept: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
        .filter(|(key, _)| &**key != param)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    if kept.is_empty() {
        return path.to_string();
    }
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(kept)
        .finish();
    format!("{path}?{query}")
}
