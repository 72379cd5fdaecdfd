//! Configuration loading with layered overrides.
//!
//! Config is loaded in order (each layer overrides the previous):
//! 1. Default values
//! 2. Config file (TOML)
//! 3. Environment variables
//! 4. CLI arguments
//!
//! JWT secret is never read from config files - it must come from
//! environment variable or CLI argument.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Configuration shared by every request.
pub type SharedConfig = Arc<Config>;

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub database: Database,
    #[serde(default)]
    pub auth: Auth,
    #[serde(default)]
    pub navigator: Navigator,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Database {
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for Database {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data.db".to_string()
}

/// Authentication settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Auth {
    /// Must be provided via environment variable or CLI - never from config file.
    #[serde(default)]
    pub jwt_secret: String,

    #[serde(default = "default_token_expiry_days")]
    pub token_expiry_days: u32,
}

impl Default for Auth {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_expiry_days: default_token_expiry_days(),
        }
    }
}

fn default_token_expiry_days() -> u32 {
    30
}

/// A `table.field` pair that may host a node picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickerField {
    pub table: String,
    pub field: String,
}

/// Tree navigation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Navigator {
    /// Node table name.
    #[serde(default = "default_table")]
    pub table: String,

    /// Session attribute holding the current node.
    #[serde(default = "default_session_key")]
    pub session_key: String,

    /// Query parameter selecting a node.
    #[serde(default = "default_select_param")]
    pub select_param: String,

    /// Let users edit nodes they created outside their mounts for the rest
    /// of the session.
    #[serde(default = "default_grant_new_records")]
    pub grant_new_records: bool,

    #[serde(default = "default_all_nodes_label")]
    pub all_nodes_label: String,

    #[serde(default = "default_tree_icon")]
    pub tree_icon: String,

    #[serde(default)]
    pub picker_fields: Vec<PickerField>,
}

impl Default for Navigator {
    fn default() -> Self {
        Self {
            table: default_table(),
            session_key: default_session_key(),
            select_param: default_select_param(),
            grant_new_records: default_grant_new_records(),
            all_nodes_label: default_all_nodes_label(),
            tree_icon: default_tree_icon(),
            picker_fields: Vec::new(),
        }
    }
}

impl Navigator {
    /// The picker field registered for `table` and `field`, if any.
    pub fn picker_field(&self, table: &str, field: &str) -> Option<&PickerField> {
        self.picker_fields
            .iter()
            .find(|p| p.table == table && p.field == field)
    }

    fn validate(&self) -> crate::Result<()> {
        let identifiers = std::iter::once(self.table.as_str()).chain(
            self.picker_fields
                .iter()
                .flat_map(|p| [p.table.as_str(), p.field.as_str()]),
        );
        for name in identifiers {
            if !is_identifier(name) {
                return Err(Error::Config(format!("Invalid SQL identifier: {name:?}")));
            }
        }
        if self.select_param.is_empty() {
            return Err(Error::Config("select_param must not be empty".into()));
        }
        Ok(())
    }
}

fn default_table() -> String {
    "tl_node".to_string()
}

fn default_session_key() -> String {
    "tl_node_node".to_string()
}

fn default_select_param() -> String {
    "nn".to_string()
}

fn default_grant_new_records() -> bool {
    true
}

fn default_all_nodes_label() -> String {
    "All nodes".to_string()
}

fn default_tree_icon() -> String {
    "folderC.svg".to_string()
}

/// Plain SQL identifier: ASCII letters, digits and underscores, not
/// starting with a digit.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Command line overrides, applied last.
#[derive(Debug, Clone, Default)]
pub struct Overrides<'a> {
    pub host: Option<&'a str>,
    pub port: Option<u16>,
    pub database_url: Option<&'a str>,
    pub jwt_secret: Option<&'a str>,
    pub node_table: Option<&'a str>,
}

/// Builder for loading configuration with customizable options.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Environment variable prefix (e.g., "MYAPP" -> MYAPP_HOST, MYAPP_PORT)
    pub env_prefix: String,
    /// Name of the JWT secret environment variable (without prefix)
    pub jwt_secret_env: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self {
            env_prefix: "CANOPY".to_string(),
            jwt_secret_env: "JWT_SECRET".to_string(),
        }
    }
}

impl ConfigLoader {
    /// Create a new config loader with the given environment prefix.
    pub fn new(env_prefix: impl Into<String>) -> Self {
        Self {
            env_prefix: env_prefix.into(),
            ..Default::default()
        }
    }

    /// Load configuration from file, environment, and CLI arguments.
    pub fn load(&self, config_path: Option<&Path>, cli: Overrides<'_>) -> crate::Result<Config> {
        let mut config: Config = match config_path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;
                toml::from_str(&content)
                    .map_err(|e| Error::Config(format!("Failed to parse config: {e}")))?
            }
            None => Config::default(),
        };

        config.auth.jwt_secret = String::new();

        let prefix = &self.env_prefix;

        if let Ok(host) = std::env::var(format!("{prefix}_HOST")) {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var(format!("{prefix}_PORT"))
            && let Ok(p) = port.parse()
        {
            config.server.port = p;
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database.url = url;
        }
        if let Ok(secret) = std::env::var(format!("{}_{}", prefix, self.jwt_secret_env)) {
            config.auth.jwt_secret = secret;
        }
        if let Ok(table) = std::env::var(format!("{prefix}_NODE_TABLE")) {
            config.navigator.table = table;
        }

        if let Some(host) = cli.host {
            config.server.host = host.to_string();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }
        if let Some(url) = cli.database_url {
            config.database.url = url.to_string();
        }
        if let Some(secret) = cli.jwt_secret {
            config.auth.jwt_secret = secret.to_string();
        }
        if let Some(table) = cli.node_table {
            config.navigator.table = table.to_string();
        }

        if config.auth.jwt_secret.is_empty() {
            return Err(Error::Config(format!(
                "{}_{} must be set via environment variable or --jwt-secret flag",
                prefix, self.jwt_secret_env
            )));
        }
        config.navigator.validate()?;

        Ok(config)
    }
}
