//! Node picker reloads.
//!
//! A form field configured as a node picker asks for its current selection
//! to be re-resolved after the user changed it. The field and the record it
//! belongs to must both exist; anything else is a bad request.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::config;
use crate::db::SqlStore;
use crate::node::{Label, NodeId};
use crate::permission::{Action, PermissionGate};
use crate::store::NodeStore;
use crate::{Error, Result};

/// Existence checks on arbitrary records.
pub trait RecordLookup: Send + Sync {
    fn table_exists(&self, table: &str) -> impl Future<Output = Result<bool>> + Send;

    fn record_exists(&self, table: &str, id: i64) -> impl Future<Output = Result<bool>> + Send;
}

impl RecordLookup for SqlStore {
    async fn table_exists(&self, table: &str) -> Result<bool> {
        SqlStore::table_exists(self, table).await
    }

    async fn record_exists(&self, table: &str, id: i64) -> Result<bool> {
        SqlStore::record_exists(self, table, id).await
    }
}

/// Picker reload parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PickerRequest {
    /// Table of the record holding the field.
    pub table: String,
    /// Input name; in `editAll` mode suffixed with `_<id>`.
    pub name: String,
    #[serde(default)]
    pub act: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    /// Tab separated node ids.
    #[serde(default)]
    pub value: String,
}

/// Resolved picker contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PickerState {
    pub table: String,
    pub field: String,
    pub record: Option<i64>,
    pub selected: Vec<Label>,
}

/// Split `field_12` into `("field", "12")` for edit-multiple inputs.
fn split_multi_edit(name: &str) -> Option<(&str, &str)> {
    let (field, id) = name.rsplit_once('_')?;
    let valid = !field.is_empty() && !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then_some((field, id))
}

fn parse_selection(value: &str) -> Result<Vec<NodeId>> {
    value
        .split('\t')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<NodeId>()
                .map_err(|_| Error::BadRequest(format!("Invalid node ID {s}")))
        })
        .collect()
}

/// Validate a reload request and resolve the selected nodes the user may see.
pub async fn reload<S>(
    config: &config::Navigator,
    store: &S,
    gate: &PermissionGate,
    request: &PickerRequest,
) -> Result<PickerState>
where
    S: NodeStore + RecordLookup,
{
    let act = request.act.as_deref();
    let (field, id) = match act {
        Some("editAll") => split_multi_edit(&request.name)
            .map(|(field, id)| (field, Some(id)))
            .unwrap_or((request.name.as_str(), None)),
        _ => (request.name.as_str(), request.id.as_deref()),
    };
    let table = request.table.as_str();

    if config.picker_field(table, field).is_none() {
        tracing::error!(field, table, "picker field does not exist");
        return Err(Error::BadRequest("Bad request".into()));
    }

    let record = match id.and_then(|id| id.parse::<i64>().ok()) {
        Some(id) if id > 0 && act != Some("overrideAll") => {
            if !store.table_exists(table).await? {
                tracing::debug!(table, "picker table does not exist, skipping record check");
                None
            } else if !store.record_exists(table, id).await? {
                tracing::error!(id, table, "picker record does not exist");
                return Err(Error::BadRequest("Bad request".into()));
            } else {
                Some(id)
            }
        }
        _ => None,
    };

    let mut selected = Vec::new();
    for node_id in parse_selection(&request.value)? {
        if !gate.is_allowed(store, node_id, Action::Show).await? {
            continue;
        }
        if let Some(node) = store.get_by_id(node_id).await? {
            selected.push(node.label());
        }
    }

    Ok(PickerState {
        table: table.to_string(),
        field: field.to_string(),
        record,
        selected,
    })
}
