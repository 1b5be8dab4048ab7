//! A small threaded HTTP server.
//!
//! The server either serves files from a directory or relays every
//! connection, byte for byte, to one upstream host. Accepted connections go
//! through a blocking queue to a fixed pool of worker threads; with zero
//! workers each connection is handled on the accept loop itself.
//!
//! # Features
//!
//! - Static files with MIME types, `index.html` lookup and directory listings
//! - Rejection of relative and `..` paths before the filesystem is touched
//! - Reverse proxying with one relay thread per direction, torn down as soon
//!   as either direction ends
//! - Configurable port, worker count and listen backlog, from code, CLI or a
//!   JSON file
//!
//! # Examples
//!
//! ## Serving a directory
//!
//! ```no_run
//! use microserve_rs::{HttpServer, ServerConfig};
//!
//! # async fn run() -> Result<(), microserve_rs::ServerError> {
//! let config = ServerConfig::files("/tmp/site")
//!     .with_port(9000)
//!     .with_num_threads(4);
//!
//! HttpServer::new(config).start().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Proxying to an upstream
//!
//! ```no_run
//! use microserve_rs::{HttpServer, ServerConfig};
//!
//! # async fn run() -> Result<(), microserve_rs::ServerError> {
//! let config = ServerConfig::proxy("backend.internal", 8080).with_num_threads(8);
//! HttpServer::new(config).start().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Parsing a request head
//!
//! ```
//! use microserve_rs::{parse_request, Method};
//!
//! let request = parse_request(b"GET /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n").unwrap();
//! assert_eq!(request.method, Method::GET);
//! assert_eq!(request.path, "/index.html");
//! ```

// Export the parser module
pub mod parser;

// Export the server module
pub mod server;

// Re-export commonly used items for convenience
pub use parser::{Error as ParserError, HttpRequest, HttpVersion, Method, parse_request};
pub use server::{
    Error as ServerError, HttpResponse, HttpServer, ProxyTarget, ServeMode, ServerConfig, StatusCode,
};
