//! HTTP server implementation for microserve-rs.
//!
//! An accept loop feeding a fixed pool of worker threads through a blocking
//! queue. Each worker runs the request handler chosen at startup: static
//! files from a directory, or a byte relay to one upstream host.

mod config;
mod error;
mod handler;
mod http_server;
mod pool;
mod proxy;
mod queue;
mod response;
mod static_files;

// Re-export public items
pub use config::{DEFAULT_PROXY_PORT, ProxyTarget, ServeMode, ServerConfig};
pub use error::Error;
pub use handler::RequestHandler;
pub use http_server::{HttpServer, ShutdownHandle};
pub use pool::{JobHandler, WorkerPool};
pub use proxy::{Direction, ProxySession, ReverseProxy, SessionSummary};
pub use queue::ConnectionQueue;
pub use response::{HttpResponse, StatusCode, mime_type_for};
pub use static_files::{INDEX_FILE, StaticFiles, render_listing, validate_request_path};
