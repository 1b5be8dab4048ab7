//! HTTP parser module.
//!
//! The request framing side of the server: reads a request head off a stream
//! and parses the request line and headers. Bodies are never interpreted.

mod error;
mod head;
mod request;

// Re-export public items
pub use error::Error;
pub use head::{read_request, read_request_head};
pub use request::{HttpRequest, HttpVersion, Method, parse_request};
