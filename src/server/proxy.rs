//! Byte-transparent relaying between a client and the fixed upstream host.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use log::debug;

use crate::parser::read_request_head;
use crate::server::config::ProxyTarget;
use crate::server::error::Error;
use crate::server::response::{HttpResponse, StatusCode};

/// Which way a relay copies bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to upstream.
    Forward,
    /// Upstream to client.
    Return,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => f.write_str("client -> upstream"),
            Direction::Return => f.write_str("upstream -> client"),
        }
    }
}

/// What a finished session moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    /// The relay whose source reached end-of-stream first.
    pub first_finished: Direction,
    /// Bytes copied client to upstream.
    pub forwarded: u64,
    /// Bytes copied upstream to client.
    pub returned: u64,
}

/// Request handler for proxy mode.
#[derive(Debug, Clone)]
pub struct ReverseProxy {
    target: ProxyTarget,
    read_buffer_size: usize,
}

impl ReverseProxy {
    pub fn new(target: ProxyTarget, read_buffer_size: usize) -> Self {
        Self {
            target,
            read_buffer_size,
        }
    }

    /// Relay `client` to the upstream until either side finishes.
    ///
    /// If the upstream cannot be reached the client gets a 502 and the error
    /// is returned.
    pub fn handle(&self, mut client: TcpStream) -> Result<SessionSummary, Error> {
        let upstream = match self.connect() {
            Ok(upstream) => upstream,
            Err(e) => {
                if let Err(write_err) = self.reject(&mut client) {
                    debug!("Failed to send 502 to client: {write_err}");
                }
                return Err(e);
            }
        };

        ProxySession::new(client, upstream, self.read_buffer_size).run()
    }

    fn unreachable(&self, reason: impl fmt::Display) -> Error {
        Error::UpstreamUnreachable {
            target: self.target.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Resolve the target (again, for every connection) and connect to it.
    fn connect(&self) -> Result<TcpStream, Error> {
        let addrs: Vec<SocketAddr> = (self.target.host.as_str(), self.target.port)
            .to_socket_addrs()
            .map_err(|e| self.unreachable(format!("cannot resolve host: {e}")))?
            .collect();
        if addrs.is_empty() {
            return Err(self.unreachable("host resolved to no addresses"));
        }

        let upstream = TcpStream::connect(&addrs[..])
            .map_err(|e| self.unreachable(format!("connect failed: {e}")))?;
        debug!("Connected to upstream {}", self.target);
        Ok(upstream)
    }

    /// Consume the pending request head, then answer 502.
    fn reject(&self, client: &mut TcpStream) -> io::Result<()> {
        read_request_head(client, self.read_buffer_size)?;
        HttpResponse::error_page(StatusCode::BadGateway).write_to(client)
    }
}

/// One proxied connection: the client, its upstream, and the two relays
/// between them.
///
/// Both streams are owned here and closed when the session is dropped at the
/// end of [`ProxySession::run`].
pub struct ProxySession {
    client: TcpStream,
    upstream: TcpStream,
    buffer_size: usize,
}

impl ProxySession {
    pub fn new(client: TcpStream, upstream: TcpStream, buffer_size: usize) -> Self {
        Self {
            client,
            upstream,
            buffer_size,
        }
    }

    /// Run both relays, tear the session down as soon as either one ends,
    /// and wait for both.
    pub fn run(self) -> Result<SessionSummary, Error> {
        let (done_tx, done_rx) = mpsc::channel();

        let forward = self.start_relay(Direction::Forward, done_tx.clone())?;
        let returning = match self.start_relay(Direction::Return, done_tx) {
            Ok(handle) => handle,
            Err(e) => {
                self.teardown();
                let _ = forward.join();
                return Err(e);
            }
        };

        // Each relay sends exactly once, even on error. A closed channel
        // means both panicked before sending.
        let first_finished = done_rx.recv().unwrap_or(Direction::Forward);
        debug!("Relay {first_finished} finished first, closing session");
        self.teardown();

        let forwarded = forward.join().unwrap_or(0);
        let returned = returning.join().unwrap_or(0);
        debug!("Proxy session done: {forwarded} bytes forwarded, {returned} bytes returned");

        Ok(SessionSummary {
            first_finished,
            forwarded,
            returned,
        })
    }

    fn start_relay(&self, direction: Direction, done: Sender<Direction>) -> Result<JoinHandle<u64>, Error> {
        let (from, to, name) = match direction {
            Direction::Forward => (&self.client, &self.upstream, "relay-forward"),
            Direction::Return => (&self.upstream, &self.client, "relay-return"),
        };
        let from = from.try_clone()?;
        let to = to.try_clone()?;
        let buffer_size = self.buffer_size;

        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let copied = relay(from, to, buffer_size, direction);
                let _ = done.send(direction);
                copied
            })
            .map_err(|e| Error::Spawn(name, e))
    }

    /// Shut both sockets down so whichever relay is still blocked wakes up.
    fn teardown(&self) {
        for (side, stream) in [("client", &self.client), ("upstream", &self.upstream)] {
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                if e.kind() != io::ErrorKind::NotConnected {
                    debug!("Shutdown of {side} socket failed: {e}");
                }
            }
        }
    }
}

/// Copy `from` into `to` until `from` reaches end-of-stream or either side
/// fails. Returns the number of bytes copied.
fn relay(mut from: TcpStream, mut to: TcpStream, buffer_size: usize, direction: Direction) -> u64 {
    let mut buffer = vec![0u8; buffer_size];
    let mut copied = 0u64;

    loop {
        let n = match from.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("Relay {direction} read failed: {e}");
                break;
            }
        };
        if let Err(e) = to.write_all(&buffer[..n]) {
            debug!("Relay {direction} write failed: {e}");
            break;
        }
        copied += n as u64;
    }

    copied
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{Shutdown, TcpListener, TcpStream};
    use std::thread;
    use std::time::Duration;

    use super::*;

    /// A connected (server side, client side) pair of loopback sockets.
    fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (server, client)
    }

    #[test]
    fn test_relay_copies_until_eof() {
        let (mut src_writer, src_reader) = socket_pair();
        let (dst_writer, mut dst_reader) = socket_pair();

        let payload: Vec<u8> = (0..50_000u32).map(|i| (i % 256) as u8).collect();
        let sent = payload.clone();
        let writer = thread::spawn(move || {
            src_writer.write_all(&sent).unwrap();
            // Dropping closes the stream: the relay sees EOF.
        });

        let copied = relay(src_reader, dst_writer, 1024, Direction::Forward);
        writer.join().unwrap();
        assert_eq!(copied, payload.len() as u64);

        let mut received = Vec::new();
        dst_reader.read_to_end(&mut received).unwrap();
        assert_eq!(received, payload);
    }

    #[test]
    fn test_session_ends_when_upstream_closes() {
        let (proxy_client_side, mut client) = socket_pair();
        let (proxy_upstream_side, mut upstream) = socket_pair();

        let session = thread::spawn(move || {
            ProxySession::new(proxy_client_side, proxy_upstream_side, 4096).run()
        });

        client.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        upstream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        upstream.write_all(b"pong").unwrap();
        upstream.shutdown(Shutdown::Both).unwrap();

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).unwrap();
        assert_eq!(reply, b"pong");

        let summary = session.join().unwrap().unwrap();
        assert_eq!(summary.first_finished, Direction::Return);
        assert_eq!(summary.forwarded, 4);
        assert_eq!(summary.returned, 4);
    }

    #[test]
    fn test_session_ends_when_client_closes() {
        let (proxy_client_side, client) = socket_pair();
        let (proxy_upstream_side, mut upstream) = socket_pair();

        let session = thread::spawn(move || {
            ProxySession::new(proxy_client_side, proxy_upstream_side, 4096).run()
        });

        client.shutdown(Shutdown::Write).unwrap();

        // The upstream is torn down even though it never closed its side.
        let mut rest = Vec::new();
        upstream.read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty());

        let summary = session.join().unwrap().unwrap();
        assert_eq!(summary.first_finished, Direction::Forward);
        drop(client);
    }

    #[test]
    fn test_unreachable_upstream_gets_502() {
        // Grab a free port, then close it so nothing is listening there.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let proxy = ReverseProxy::new(
            ProxyTarget {
                host: "127.0.0.1".to_string(),
                port,
            },
            8192,
        );

        let (proxy_side, mut client) = socket_pair();
        client.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

        let result = proxy.handle(proxy_side);
        assert!(matches!(result, Err(Error::UpstreamUnreachable { .. })));

        let mut response = String::new();
        client.read_to_string(&mut response).unwrap();
        assert!(response.starts_with("HTTP/1.1 502 Bad Gateway\r\n"));
        assert!(response.contains("<center><h1>502 Bad Gateway</h1><hr></center>"));
    }

    #[test]
    fn test_unresolvable_host_gets_502() {
        let proxy = ReverseProxy::new(
            ProxyTarget {
                host: "no-such-host.invalid".to_string(),
                port: 80,
            },
            8192,
        );

        let (proxy_side, mut client) = socket_pair();
        client.write_all(b"GET / HTTP/1.0\r\n\r\n").unwrap();

        let result = proxy.handle(proxy_side);
        assert!(matches!(result, Err(Error::UpstreamUnreachable { .. })));

        let mut response = String::new();
        client.read_to_string(&mut response).unwrap();
        assert!(response.starts_with("HTTP/1.1 502 Bad Gateway\r\n"));
    }
}
