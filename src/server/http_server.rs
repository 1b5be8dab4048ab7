//! HTTP server implementation.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, error, info};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::server::config::ServerConfig;
use crate::server::error::Error;
use crate::server::handler::RequestHandler;
use crate::server::pool::{JobHandler, WorkerPool};
use crate::server::queue::ConnectionQueue;

/// Stops a running server from anywhere: another task, a signal handler, a test.
#[derive(Clone)]
pub struct ShutdownHandle {
    signal: Arc<watch::Sender<bool>>,
    queue: Arc<ConnectionQueue<std::net::TcpStream>>,
}

impl ShutdownHandle {
    /// Stop accepting, close the listener, and release idle workers.
    ///
    /// Connections already being handled run to completion on their own;
    /// connections still queued are closed unserved.
    pub fn trigger(&self) {
        self.signal.send_replace(true);
        self.queue.close();
    }

    pub fn is_triggered(&self) -> bool {
        *self.signal.borrow()
    }
}

/// An HTTP server.
pub struct HttpServer {
    /// The server configuration.
    pub config: ServerConfig,
    handler: Arc<RequestHandler>,
    queue: Arc<ConnectionQueue<std::net::TcpStream>>,
    shutdown: ShutdownHandle,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ServerConfig) -> Self {
        let handler = Arc::new(RequestHandler::from_config(&config));
        let queue = Arc::new(ConnectionQueue::new());
        let (signal, _) = watch::channel(false);
        let shutdown = ShutdownHandle {
            signal: Arc::new(signal),
            queue: queue.clone(),
        };

        Self {
            config,
            handler,
            queue,
            shutdown,
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Stop the server. See [`ShutdownHandle::trigger`].
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    /// Log what this server is about to do.
    fn display_server_info(&self, listener: &TcpListener) {
        let port = listener
            .local_addr()
            .map(|addr| addr.port())
            .unwrap_or(self.config.port);
        info!("Listening on port {port}...");
        info!("Serving {}", self.config.mode);
        match self.config.num_threads {
            0 => info!("No worker threads, handling connections on the accept loop"),
            n => info!("Using {n} worker threads"),
        }
    }

    /// Bind `0.0.0.0:port` with address reuse and the configured backlog.
    ///
    /// Must be called from within a tokio runtime.
    pub fn setup_listener(&self) -> Result<TcpListener, Error> {
        let socket = TcpSocket::new_v4()?;
        socket.set_reuseaddr(true)?;
        socket.bind(self.config.bind_addr())?;
        let listener = socket.listen(self.config.backlog)?;
        Ok(listener)
    }

    /// Set up a Ctrl+C handler that shuts the server down.
    fn setup_ctrl_c_handler(shutdown: ShutdownHandle) -> JoinHandle<()> {
        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C, closing the listening socket");
                    shutdown.trigger();
                }
                Err(e) => {
                    error!("Error setting up Ctrl+C handler: {e}");
                }
            }
        })
    }

    fn start_workers(&self) -> Result<WorkerPool<std::net::TcpStream>, Error> {
        let handler = self.handler.clone();
        let job: JobHandler<std::net::TcpStream> =
            Arc::new(move |stream: std::net::TcpStream| handler.dispatch(stream));
        WorkerPool::spawn(self.config.num_threads, self.queue.clone(), job)
            .map_err(|e| Error::Spawn("worker", e))
    }

    /// Hand a new connection to the workers, or handle it right here in
    /// synchronous mode.
    async fn handle_new_connection(
        &self,
        socket: TcpStream,
        addr: SocketAddr,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) {
        info!("Accepted connection from {} on port {}", addr.ip(), addr.port());

        let stream = match into_blocking(socket) {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to hand off connection from {addr}: {e}");
                return;
            }
        };

        if self.config.num_threads == 0 {
            let handler = self.handler.clone();
            let task = tokio::task::spawn_blocking(move || handler.dispatch(stream));
            // Nothing else is accepted until this connection is done, unless
            // the server is told to stop.
            tokio::select! {
                result = task => {
                    if let Err(e) = result {
                        error!("Handler for {addr} panicked: {e}");
                    }
                }
                _ = stopped(shutdown_rx) => {
                    debug!("Shutdown requested while handling {addr}");
                }
            }
        } else if self.queue.push(stream).is_err() {
            debug!("Queue closed, dropping connection from {addr}");
        }
    }

    /// Handle connection errors.
    async fn handle_connection_error(e: io::Error) {
        error!("Error accepting connection: {e}");
        // Back off briefly so a persistent failure (e.g. out of descriptors)
        // does not spin.
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }

    /// Bind, then accept connections until shut down.
    pub async fn start(&self) -> Result<(), Error> {
        self.config.validate()?;

        let listener = self.setup_listener().map_err(|e| {
            error!("Failed to listen on {}: {e}", self.config.bind_addr());
            e
        })?;
        self.display_server_info(&listener);

        let ctrl_c = Self::setup_ctrl_c_handler(self.shutdown_handle());
        let result = self.serve(listener).await;
        ctrl_c.abort();
        result
    }

    /// Accept connections from `listener` until shut down.
    ///
    /// The listener is closed when this returns. Workers still busy with a
    /// connection are left to finish on their own.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), Error> {
        let pool = match self.config.num_threads {
            0 => None,
            _ => Some(self.start_workers()?),
        };

        let mut shutdown_rx = self.shutdown.signal.subscribe();

        loop {
            tokio::select! {
                // Check for shutdown signal
                _ = stopped(&mut shutdown_rx) => {
                    info!("Shutting down server...");
                    break;
                }

                // Accept new connections
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((socket, addr)) => {
                            self.handle_new_connection(socket, addr, &mut shutdown_rx).await;
                        }
                        Err(e) => Self::handle_connection_error(e).await,
                    }
                }
            }
        }

        drop(listener);
        self.shutdown.trigger();
        if let Some(pool) = pool {
            debug!("Detaching {} workers", pool.size());
        }

        Ok(())
    }
}

/// Resolves once shutdown has been triggered, including before the call.
async fn stopped(shutdown_rx: &mut watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|stopped| *stopped).await;
}

/// Turn an accepted async socket into a blocking one for the worker threads.
fn into_blocking(socket: TcpStream) -> io::Result<std::net::TcpStream> {
    let stream = socket.into_std()?;
    stream.set_nonblocking(false)?;
    Ok(stream)
}
