//! libsql persistence for nodes and node permissions.
//!
//! Supports multiple backends:
//! - Local SQLite file: `path/to/db.sqlite` or `file:path` or `sqlite://path`
//! - In-memory: `:memory:`
//! - Remote Turso: `libsql://...` or `https://...` (requires TURSO_AUTH_TOKEN env var)
//!
//! Each `:memory:` connection sees its own database, so callers sharing one
//! in-memory store must share one [`SqlStore`].

use std::sync::Arc;

use libsql::{Builder, Connection, Database, params};

use crate::config::is_identifier;
use crate::node::{Node, NodeId, join_languages, parse_languages};
use crate::permission::{Capabilities, PermissionSet};
use crate::store::NodeStore;
use crate::{Error, Result};

/// Shared database handle.
pub type Handle = Arc<Database>;

/// Open the database at `url`.
pub async fn connect(url: &str) -> Result<Database> {
    let db = if url.starts_with("libsql://") || url.starts_with("https://") {
        let token = std::env::var("TURSO_AUTH_TOKEN")
            .map_err(|_| Error::Config("TURSO_AUTH_TOKEN not set for remote database".into()))?;
        Builder::new_remote(url.to_string(), token).build().await?
    } else {
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("file:"))
            .unwrap_or(url);
        Builder::new_local(path).build().await?
    };

    Ok(db)
}

/// Node table plus the `node_user` permission table.
#[derive(Clone)]
pub struct SqlStore {
    conn: Connection,
    table: String,
}

impl SqlStore {
    /// Wrap a connection; `table` must be a plain identifier since it is
    /// spliced into queries.
    pub fn new(conn: Connection, table: &str) -> Result<Self> {
        if !is_identifier(table) {
            return Err(Error::Config(format!("Invalid node table name: {table:?}")));
        }
        Ok(Self {
            conn,
            table: table.to_string(),
        })
    }

    /// Connect to `db` and wrap the new connection.
    pub fn open(db: &Database, table: &str) -> Result<Self> {
        Self::new(db.connect()?, table)
    }

    /// Create the node and permission tables if missing.
    pub async fn migrate(&self) -> Result<()> {
        let table = &self.table;
        self.conn
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY,
                    pid INTEGER NOT NULL DEFAULT 0,
                    sorting INTEGER NOT NULL DEFAULT 0,
                    type TEXT NOT NULL DEFAULT 'folder',
                    name TEXT NOT NULL DEFAULT '',
                    languages TEXT NOT NULL DEFAULT ''
                );
                CREATE INDEX IF NOT EXISTS {table}_pid ON {table} (pid);
                CREATE TABLE IF NOT EXISTS node_user (
                    id TEXT PRIMARY KEY,
                    admin INTEGER NOT NULL DEFAULT 0,
                    permissions TEXT NOT NULL DEFAULT '',
                    node_mounts TEXT NOT NULL DEFAULT ''
                );"
            ))
            .await?;
        Ok(())
    }

    /// Insert or replace a node row.
    pub async fn save_node(&self, node: &Node) -> Result<()> {
        self.conn
            .execute(
                &format!(
                    "INSERT OR REPLACE INTO {} (id, pid, type, name, languages) VALUES (?1, ?2, ?3, ?4, ?5)",
                    self.table
                ),
                params![
                    node.id,
                    node.pid,
                    node.kind.as_str(),
                    node.name.as_str(),
                    join_languages(&node.languages)
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn delete_node(&self, id: NodeId) -> Result<()> {
        self.conn
            .execute(&format!("DELETE FROM {} WHERE id = ?1", self.table), params![id])
            .await?;
        Ok(())
    }

    /// Insert or replace a user's node permissions.
    pub async fn save_user(&self, user_id: &str, permissions: &PermissionSet) -> Result<()> {
        let mounts = permissions
            .mounts
            .iter()
            .map(NodeId::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.conn
            .execute(
                "INSERT OR REPLACE INTO node_user (id, admin, permissions, node_mounts) VALUES (?1, ?2, ?3, ?4)",
                params![
                    user_id,
                    i64::from(permissions.admin),
                    permissions.capabilities.to_list(),
                    mounts
                ],
            )
            .await?;
        Ok(())
    }

    /// Load a user's node permissions, `None` for unknown users.
    pub async fn load_permissions(&self, user_id: &str) -> Result<Option<PermissionSet>> {
        let mut rows = self
            .conn
            .query(
                "SELECT admin, permissions, node_mounts FROM node_user WHERE id = ?1",
                params![user_id],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };

        let admin: i64 = row.get(0)?;
        let permissions: String = row.get(1)?;
        let mounts: String = row.get(2)?;

        if admin != 0 {
            return Ok(Some(PermissionSet::admin()));
        }

        let mounts = mounts
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<NodeId>()
                    .map_err(|_| Error::Internal(format!("Invalid node mount {s:?} for user {user_id}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(PermissionSet::user(
            Capabilities::from_list(&permissions)?,
            mounts,
        )))
    }

    /// Whether a table named `table` exists.
    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
            )
            .await?;
        Ok(rows.next().await?.is_some())
    }

    /// Whether `table` holds a row with `id`. `table` must be a plain
    /// identifier.
    pub async fn record_exists(&self, table: &str, id: i64) -> Result<bool> {
        if !is_identifier(table) {
            return Err(Error::BadRequest(format!("Invalid table name: {table}")));
        }
        let mut rows = self
            .conn
            .query(&format!("SELECT 1 FROM {table} WHERE id = ?1"), params![id])
            .await?;
        Ok(rows.next().await?.is_some())
    }
}

impl NodeStore for SqlStore {
    async fn get_by_id(&self, id: NodeId) -> Result<Option<Node>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT id, pid, type, name, languages FROM {} WHERE id = ?1",
                    self.table
                ),
                params![id],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };

        let kind: String = row.get(2)?;
        let languages: String = row.get(4)?;
        Ok(Some(Node {
            id: row.get(0)?,
            pid: row.get(1)?,
            kind: kind.parse()?,
            name: row.get(3)?,
            languages: parse_languages(&languages),
        }))
    }

    async fn count_children(&self, pid: NodeId) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT COUNT(*) FROM {} WHERE pid = ?1", self.table),
                params![pid],
            )
            .await?;

        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(count.max(0) as u64)
    }
}
