//! Error types for the HTTP server.

use thiserror::Error;

use crate::parser::Error as ParserError;
use crate::server::response::StatusCode;

/// Errors that can occur during HTTP server operation.
#[derive(Debug, Error)]
pub enum Error {
    /// Error parsing an HTTP request.
    #[error("Parse error: {0}")]
    ParseError(#[from] ParserError),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The request target is not an absolute path.
    #[error("Bad request path: {0}")]
    BadRequest(String),

    /// The request target tries to leave the served root.
    #[error("Forbidden path: {0}")]
    Forbidden(String),

    /// Requested resource not found, or not a file or directory.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The proxy target could not be resolved or connected to.
    #[error("Upstream {target} unreachable: {reason}")]
    UpstreamUnreachable { target: String, reason: String },

    /// A relay thread could not be started.
    #[error("Failed to spawn {0} thread: {1}")]
    Spawn(&'static str, std::io::Error),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Status reported to the client for this error, if one is sent at all.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Error::ParseError(_) | Error::BadRequest(_) => Some(StatusCode::BadRequest),
            Error::Forbidden(_) => Some(StatusCode::Forbidden),
            Error::NotFound(_) => Some(StatusCode::NotFound),
            Error::UpstreamUnreachable { .. } => Some(StatusCode::BadGateway),
            Error::IoError(_) | Error::Spawn(..) | Error::Config(_) => None,
        }
    }
}
