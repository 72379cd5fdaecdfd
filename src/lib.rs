//! Canopy - scoped navigation over a hierarchical node tree.
//!
//! Users browse a tree of folders and content nodes but may only see the
//! subtrees mounted for them. Canopy provides:
//!
//! - **Navigator**: session-backed current node, breadcrumb trails, action checks
//! - **Permission**: capability flags, mount access, the per-user permission gate
//! - **Buttons**: paste/edit/copy/delete button states for a node row
//! - **Picker**: node picker reloads
//! - **Db**: libsql storage for nodes and user permissions
//! - **Server**: a hyper JSON API over the above, with JWT auth
//!
//! # Example
//!
//! ```ignore
//! use canopy::{ConfigLoader, Router, api::NodeModule, module, session::MemorySessions};
//!
//! #[tokio::main]
//! async fn main() -> canopy::Result<()> {
//!     let config = ConfigLoader::new("CANOPY").load(None, Default::default())?;
//!
//!     let db = canopy::db::connect(&config.database.url).await?;
//!     canopy::db::SqlStore::open(&db, &config.navigator.table)?
//!         .migrate()
//!         .await?;
//!
//!     let mut router = Router::new();
//!     module::register(&mut router, &[&NodeModule]);
//!
//!     canopy::server::run(
//!         config,
//!         Some(std::sync::Arc::new(db)),
//!         router.into_handle(),
//!         MemorySessions::shared(),
//!     )
//!     .await
//! }
//! ```

pub mod api;
pub mod auth;
pub mod buttons;
pub mod config;
pub mod db;
pub mod error;
pub mod module;
pub mod navigator;
pub mod node;
pub mod permission;
pub mod picker;
pub mod response;
pub mod router;
pub mod server;
pub mod session;
pub mod store;
pub mod tree;
pub mod validator;

// Re-export main types at crate root
pub use config::{Config, ConfigLoader};
pub use db::Handle as DbHandle;
pub use error::{Error, Result};
pub use module::Module;
pub use navigator::{Breadcrumb, LoadOutcome, LoadRequest, Navigator, NavigatorState};
pub use node::{Node, NodeId, NodeType};
pub use permission::{Action, Capabilities, MountAccess, PermissionGate, PermissionSet};
pub use router::{Context, Router};
pub use store::NodeStore;

// Re-export commonly used dependencies for convenience
pub use hyper::Method;
pub use serde_json::json;
