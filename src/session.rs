//! Session storage.
//!
//! A [`Session`] is a flat key-value bag of JSON values. Handlers never touch
//! it directly: they open a [`SessionContext`] scoped to one node table for the
//! duration of a request and save it back when done.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::node::NodeId;

/// Key of the working id set shared with bulk actions.
const CURRENT_IDS_KEY: &str = "CURRENT.IDS";

/// Key prefix of the ids created in this session, per table.
const NEW_RECORDS_KEY: &str = "new_records";

/// Key prefix of the ids granted in this session, per table.
const GRANTED_KEY: &str = "granted_nodes";

/// A user session's attribute bag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    attributes: HashMap<String, serde_json::Value>,
}

impl Session {
    /// Read a typed value; values of the wrong shape read as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Raw JSON value under `key`.
    pub fn get_raw(&self, key: &str) -> Option<&serde_json::Value> {
        self.attributes.get(key)
    }

    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> crate::Result<()> {
        self.attributes
            .insert(key.to_string(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.attributes.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// Backing store for sessions, keyed by session id.
pub trait SessionStore: Send + Sync {
    /// Load a session, or a fresh one if none is stored.
    fn load(&self, session_id: &str) -> Session;

    fn save(&self, session_id: &str, session: Session);

    fn destroy(&self, session_id: &str);
}

/// Process-local session store.
#[derive(Debug, Default)]
pub struct MemorySessions {
    sessions: Mutex<HashMap<String, Session>>,
}

impl MemorySessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SessionStore for MemorySessions {
    fn load(&self, session_id: &str) -> Session {
        self.lock().get(session_id).cloned().unwrap_or_default()
    }

    fn save(&self, session_id: &str, session: Session) {
        self.lock().insert(session_id.to_string(), session);
    }

    fn destroy(&self, session_id: &str) {
        self.lock().remove(session_id);
    }
}

/// One request's view of a session, scoped to a node table.
#[derive(Debug, Clone)]
pub struct SessionContext {
    session: Session,
    table: String,
    position_key: String,
}

impl SessionContext {
    /// `position_key` is the attribute holding the current node token.
    pub fn new(session: Session, table: impl Into<String>, position_key: impl Into<String>) -> Self {
        Self {
            session,
            table: table.into(),
            position_key: position_key.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Raw token of the current node as stored, numbers rendered as text.
    pub fn position_token(&self) -> Option<String> {
        match self.session.get_raw(&self.position_key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    pub fn set_position_token(&mut self, token: &str) -> crate::Result<()> {
        self.session.set(&self.position_key, token)
    }

    pub fn reset_position(&mut self) -> crate::Result<()> {
        self.session.set(&self.position_key, 0)
    }

    /// The working id set of bulk actions, if one is stored.
    pub fn current_ids(&self) -> Option<Vec<NodeId>> {
        self.session.get(CURRENT_IDS_KEY)
    }

    pub fn set_current_ids(&mut self, ids: &[NodeId]) -> crate::Result<()> {
        self.session.set(CURRENT_IDS_KEY, ids)
    }

    /// Ids created in this session in this table.
    pub fn new_records(&self) -> Vec<NodeId> {
        self.session.get(&self.scoped(NEW_RECORDS_KEY)).unwrap_or_default()
    }

    pub fn add_new_record(&mut self, id: NodeId) -> crate::Result<()> {
        let mut records = self.new_records();
        if !records.contains(&id) {
            records.push(id);
        }
        let key = self.scoped(NEW_RECORDS_KEY);
        self.session.set(&key, records)
    }

    /// Ids granted to the user for the rest of the session.
    pub fn granted_nodes(&self) -> Vec<NodeId> {
        self.session.get(&self.scoped(GRANTED_KEY)).unwrap_or_default()
    }

    pub fn set_granted_nodes(&mut self, ids: impl IntoIterator<Item = NodeId>) -> crate::Result<()> {
        let ids: Vec<NodeId> = ids.into_iter().collect();
        let key = self.scoped(GRANTED_KEY);
        self.session.set(&key, ids)
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    fn scoped(&self, key: &str) -> String {
        format!("{key}.{}", self.table)
    }
}
