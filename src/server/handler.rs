//! Request dispatch: the one strategy chosen at startup.

use std::net::TcpStream;

use log::{debug, error, info, warn};

use crate::server::config::{ServeMode, ServerConfig};
use crate::server::error::Error;
use crate::server::proxy::ReverseProxy;
use crate::server::response::StatusCode;
use crate::server::static_files::StaticFiles;

/// What every worker runs on every connection.
#[derive(Debug, Clone)]
pub enum RequestHandler {
    StaticFiles(StaticFiles),
    Proxy(ReverseProxy),
}

impl RequestHandler {
    pub fn from_config(config: &ServerConfig) -> Self {
        match &config.mode {
            ServeMode::Files { root } => {
                RequestHandler::StaticFiles(StaticFiles::new(root.clone(), config.read_buffer_size))
            }
            ServeMode::Proxy(target) => {
                RequestHandler::Proxy(ReverseProxy::new(target.clone(), config.read_buffer_size))
            }
        }
    }

    /// Handle one connection. The stream is closed when this returns.
    pub fn handle(&self, mut stream: TcpStream) -> Result<(), Error> {
        match self {
            RequestHandler::StaticFiles(files) => files.handle(&mut stream),
            RequestHandler::Proxy(proxy) => proxy.handle(stream).map(|summary| {
                debug!(
                    "Relayed {} bytes up, {} bytes down",
                    summary.forwarded, summary.returned
                );
            }),
        }
    }

    /// Handle one connection and log the outcome; never fails.
    pub fn dispatch(&self, stream: TcpStream) {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown peer".to_string());

        if let Err(e) = self.handle(stream) {
            match e.status_code() {
                Some(StatusCode::BadGateway) => warn!("{peer}: {e}"),
                Some(status) => info!("{peer}: answered {} ({e})", status.as_u16()),
                None => error!("{peer}: {e}"),
            }
        }
    }
}
