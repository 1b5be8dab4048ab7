//! Error types for the HTTP parser.

use thiserror::Error;

/// Reasons a request head is rejected. The server answers all of them with 400.
#[derive(Debug, Error)]
pub enum Error {
    /// Method token is not one we know.
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// Request line is not `METHOD TARGET VERSION`, or not UTF-8.
    #[error("Malformed request line: {0}")]
    MalformedRequestLine(String),

    /// Only HTTP/1.0 and HTTP/1.1 are spoken.
    #[error("Invalid HTTP version: {0}")]
    InvalidVersion(String),

    #[error("Required header is missing: {0}")]
    MissingHeader(String),

    /// Header line without a colon, or with an empty name.
    #[error("Invalid header format")]
    InvalidHeaderFormat,

    /// Nothing but blank lines (or nothing at all) before the connection ended.
    #[error("Empty request")]
    EmptyRequest,

    /// The request head could not be read from the stream.
    #[error("Failed to read request: {0}")]
    Io(#[from] std::io::Error),
}
