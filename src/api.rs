//! JSON endpoints over the node navigator.
//!
//! Every route needs a bearer token and a database. The session named by the
//! token holds the navigator state and is saved after each request, including
//! failed ones.

use serde::{Deserialize, Serialize};

use crate::auth::Identity;
use crate::buttons::{ButtonPolicy, Clipboard, ClipboardMode};
use crate::db::SqlStore;
use crate::module::Module;
use crate::navigator::{LoadOutcome, LoadRequest, Navigator, NavigatorState};
use crate::node::{Node, NodeId};
use crate::permission::{Action, PermissionGate, PermissionSet};
use crate::picker::{self, PickerRequest};
use crate::response::{self, HttpResponse};
use crate::router::{Context, Router};
use crate::session::SessionContext;
use crate::store::NodeStore;
use crate::{Error, Result};

/// Registers the node routes.
pub struct NodeModule;

impl Module for NodeModule {
    fn name(&self) -> &'static str {
        "nodes"
    }

    fn routes(&self, router: &mut Router) {
        router.get("/nodes", load);
        router.put("/nodes/selection", replace_selection);
        router.post("/nodes/picker", reload_picker);
        router.get("/nodes/{id}/buttons", buttons);
        router.get("/nodes/{id}/label", label);
    }
}

/// Per-request collaborators.
struct Scope {
    identity: Identity,
    store: SqlStore,
    permissions: PermissionSet,
}

impl Scope {
    /// Authenticate the caller and load their permissions and session.
    async fn open(ctx: &Context) -> Result<(Self, SessionContext)> {
        let identity = ctx.require_identity()?;
        let nav = &ctx.config.navigator;
        let store = SqlStore::open(ctx.require_db()?, &nav.table)?;
        let permissions = store
            .load_permissions(&identity.user_id)
            .await?
            .ok_or(Error::Unauthorized)?;
        let session = SessionContext::new(
            ctx.sessions.load(&identity.session_id),
            &nav.table,
            &nav.session_key,
        );
        let scope = Self {
            identity,
            store,
            permissions,
        };
        Ok((scope, session))
    }

    fn navigator<'a>(
        &'a self,
        ctx: &'a Context,
        session: SessionContext,
    ) -> Navigator<'a, SqlStore, PermissionSet> {
        Navigator::new(
            &self.store,
            PermissionGate::new(self.permissions.clone()),
            self.permissions.clone(),
            session,
            &ctx.config.navigator,
        )
    }

    fn save(&self, ctx: &Context, session: SessionContext) {
        ctx.sessions
            .save(&self.identity.session_id, session.into_session());
    }
}

fn parse_id(raw: &str) -> Result<NodeId> {
    raw.trim()
        .parse()
        .map_err(|_| Error::BadRequest(format!("Invalid node ID {raw}")))
}

fn path_id(ctx: &Context) -> Result<NodeId> {
    parse_id(ctx.require_param("id")?)
}

fn flag(raw: Option<&str>) -> bool {
    matches!(raw, Some("1" | "true"))
}

async fn load(ctx: Context) -> Result<HttpResponse> {
    let (scope, session) = Scope::open(&ctx).await?;
    let config = &ctx.config.navigator;

    let action = ctx
        .query("act")
        .filter(|act| !act.is_empty())
        .map(str::parse::<Action>)
        .transpose()?;
    let id = ctx.query("id").map(parse_id).transpose()?;
    let request = LoadRequest {
        uri: ctx.path_and_query(),
        select: ctx.query(&config.select_param),
        action,
        id,
    };

    let mut nav = scope.navigator(&ctx, session);
    let outcome = nav.load(&request).await;
    let session = nav.into_session();
    scope.save(&ctx, session);

    match outcome? {
        LoadOutcome::Redirect { location } => response::redirect(&location),
        ready => response::ok(&ready),
    }
}

#[derive(Debug, Deserialize)]
struct SelectionBody {
    ids: Vec<NodeId>,
}

#[derive(Debug, Serialize)]
struct SelectionResponse {
    ids: Vec<NodeId>,
}

async fn replace_selection(ctx: Context) -> Result<HttpResponse> {
    let (scope, mut session) = Scope::open(&ctx).await?;
    let body: SelectionBody = ctx.json()?;
    session.set_current_ids(&body.ids)?;

    let mut nav = scope.navigator(&ctx, session);
    let result = nav.authorize(None, None).await;
    let session = nav.into_session();
    let ids = session.current_ids().unwrap_or_default();
    scope.save(&ctx, session);

    result?;
    response::ok(&SelectionResponse { ids })
}

async fn visible_node(store: &SqlStore, gate: &PermissionGate, id: NodeId) -> Result<Node> {
    let node = store
        .get_by_id(id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Node {id}")))?;
    if !gate.is_allowed(store, id, Action::Show).await? {
        return Err(Error::AccessDenied(format!(
            "Not enough permissions to show node ID {id}."
        )));
    }
    Ok(node)
}

async fn label(ctx: Context) -> Result<HttpResponse> {
    let id = path_id(&ctx)?;
    let (scope, session) = Scope::open(&ctx).await?;
    let nav = scope.navigator(&ctx, session);
    let node = visible_node(&scope.store, nav.gate(), id).await?;
    response::ok(&node.label())
}

fn clipboard(ctx: &Context) -> Result<Option<Clipboard>> {
    let Some(mode) = ctx.query("mode").filter(|m| !m.is_empty()) else {
        return Ok(None);
    };
    let mode: ClipboardMode = serde_json::from_value(serde_json::Value::String(mode.to_string()))
        .map_err(|_| Error::BadRequest(format!("Unknown clipboard mode: {mode}")))?;
    let ids = ctx
        .query("clipboard")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_id)
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(Clipboard { mode, ids }))
}

async fn buttons(ctx: Context) -> Result<HttpResponse> {
    let id = path_id(&ctx)?;
    let clipboard = clipboard(&ctx)?;
    let circular = flag(ctx.query("cr"));
    let (scope, session) = Scope::open(&ctx).await?;

    let nav = scope.navigator(&ctx, session);
    let gate = nav.gate();
    let node = visible_node(&scope.store, gate, id).await?;

    let policy = gate.tree_view_policy();
    let roots = match nav.state() {
        NavigatorState::Positioned(current) => vec![current],
        _ => policy.roots.clone().unwrap_or_default(),
    };
    let buttons = ButtonPolicy::new(gate, policy.closed, &roots);

    let child_count = if buttons.copy() && node.accepts_children() {
        scope.store.count_children(node.id).await?
    } else {
        0
    };

    response::ok(&buttons.evaluate(&node, clipboard.as_ref(), circular, child_count))
}

async fn reload_picker(ctx: Context) -> Result<HttpResponse> {
    let (scope, session) = Scope::open(&ctx).await?;
    let request: PickerRequest = ctx.json()?;
    let nav = scope.navigator(&ctx, session);
    let state = picker::reload(&ctx.config.navigator, &scope.store, nav.gate(), &request).await?;
    response::ok(&state)
}
