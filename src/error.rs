//! Error types with HTTP status code mapping.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

use crate::node::NodeId;

/// Error type for canopy operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Auth errors
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Token expired")]
    TokenExpired,

    // Navigation and permission errors
    #[error("Insecure path {0}")]
    InsecurePath(String),

    #[error("Node ID {0} is not mounted.")]
    NotMounted(NodeId),

    #[error("{0}")]
    AccessDenied(String),

    // Data errors
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    // System errors
    #[error("Invalid address: {0}")]
    AddrParse(#[from] std::net::AddrParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] libsql::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map error to HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthorized | Error::TokenExpired => StatusCode::UNAUTHORIZED,
            Error::NotMounted(_) | Error::AccessDenied(_) => StatusCode::FORBIDDEN,

            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InsecurePath(_) | Error::BadRequest(_) | Error::AddrParse(_) => {
                StatusCode::BAD_REQUEST
            }

            Error::Config(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::Database(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this error belongs to the access-denied class.
    pub fn is_access_denied(&self) -> bool {
        self.status_code() == StatusCode::FORBIDDEN
    }

    /// Convert error into HTTP response.
    pub fn into_response(self) -> Response<Full<Bytes>> {
        let status = self.status_code();
        let message = if status.is_server_error() {
            tracing::error!("Internal error: {self}");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        crate::response::error_body(status, &message)
    }
}

/// Result type alias using canopy's Error.
pub type Result<T> = std::result::Result<T, Error>;
