//! Server configuration.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::server::error::Error;

/// Port used for a proxy target given without one.
pub const DEFAULT_PROXY_PORT: u16 = 80;

fn default_port() -> u16 {
    8000
}

fn default_backlog() -> u32 {
    1024
}

fn default_read_buffer_size() -> usize {
    8192
}

/// What the server does with each accepted connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServeMode {
    /// Serve files below `root`.
    Files { root: PathBuf },
    /// Relay every connection to a single upstream host.
    Proxy(ProxyTarget),
}

impl fmt::Display for ServeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServeMode::Files { root } => write!(f, "files from {}", root.display()),
            ServeMode::Proxy(target) => write!(f, "proxy to {target}"),
        }
    }
}

/// Upstream host and port for proxy mode.
///
/// The host is resolved again for every proxied connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyTarget {
    pub host: String,
    #[serde(default = "default_proxy_port")]
    pub port: u16,
}

fn default_proxy_port() -> u16 {
    DEFAULT_PROXY_PORT
}

impl FromStr for ProxyTarget {
    type Err = Error;

    /// Parse `host[:port]`; the port defaults to 80.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = match s.split_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| Error::Config(format!("Invalid proxy port in '{s}'")))?;
                (host, port)
            }
            None => (s, DEFAULT_PROXY_PORT),
        };

        if host.is_empty() {
            return Err(Error::Config(format!("Missing proxy host in '{s}'")));
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for ProxyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// HTTP server configuration. Immutable once the server is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to listen on, on all interfaces. 0 picks an ephemeral port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Worker threads; 0 handles each connection on the accept loop.
    #[serde(default)]
    pub num_threads: usize,
    /// Pending-connection backlog passed to `listen`.
    #[serde(default = "default_backlog")]
    pub backlog: u32,
    /// Chunk size for file streaming and relaying, and the request head limit.
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    pub mode: ServeMode,
}

impl ServerConfig {
    /// A configuration with default tuning for the given mode.
    pub fn new(mode: ServeMode) -> Self {
        Self {
            port: default_port(),
            num_threads: 0,
            backlog: default_backlog(),
            read_buffer_size: default_read_buffer_size(),
            mode,
        }
    }

    pub fn files(root: impl Into<PathBuf>) -> Self {
        Self::new(ServeMode::Files { root: root.into() })
    }

    pub fn proxy(host: impl Into<String>, port: u16) -> Self {
        Self::new(ServeMode::Proxy(ProxyTarget {
            host: host.into(),
            port,
        }))
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn with_backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Address the listener binds to.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }

    /// Load a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {e}", path.display())))?;
        let config: ServerConfig = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid config file {}: {e}", path.display())))?;
        Ok(config)
    }

    /// Reject configurations the server cannot run with.
    pub fn validate(&self) -> Result<(), Error> {
        match &self.mode {
            ServeMode::Files { root } if root.as_os_str().is_empty() => {
                return Err(Error::Config("Files root must not be empty".to_string()));
            }
            ServeMode::Proxy(target) if target.host.is_empty() => {
                return Err(Error::Config("Proxy host must not be empty".to_string()));
            }
            _ => {}
        }

        if self.read_buffer_size == 0 {
            return Err(Error::Config("Read buffer size must be positive".to_string()));
        }
        if self.backlog == 0 {
            return Err(Error::Config("Backlog must be positive".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_target_parsing() {
        let target: ProxyTarget = "example.com:8080".parse().unwrap();
        assert_eq!(target.host, "example.com");
        assert_eq!(target.port, 8080);

        let target: ProxyTarget = "example.com".parse().unwrap();
        assert_eq!(target.port, DEFAULT_PROXY_PORT);

        assert!("example.com:http".parse::<ProxyTarget>().is_err());
        assert!(":8080".parse::<ProxyTarget>().is_err());
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::files("/srv/www");
        assert_eq!(config.port, 8000);
        assert_eq!(config.num_threads, 0);
        assert_eq!(config.backlog, 1024);
        assert_eq!(config.read_buffer_size, 8192);
        assert_eq!(config.bind_addr().to_string(), "0.0.0.0:8000");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_targets() {
        assert!(ServerConfig::files("").validate().is_err());
        assert!(ServerConfig::proxy("", 80).validate().is_err());
        assert!(ServerConfig::files("/srv").with_backlog(0).validate().is_err());
    }

    #[test]
    fn test_from_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.json");
        std::fs::write(&path, r#"{"num_threads": 4, "mode": {"proxy": {"host": "backend"}}}"#).unwrap();

        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.num_threads, 4);
        assert_eq!(config.port, 8000);
        assert_eq!(config.backlog, 1024);
        assert_eq!(config.mode, ServeMode::Proxy(ProxyTarget {
            host: "backend".to_string(),
            port: 80,
        }));
    }

    #[test]
    fn test_from_file_files_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.json");
        std::fs::write(&path, r#"{"port": 9000, "mode": {"files": {"root": "/tmp/site"}}}"#).unwrap();

        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.mode, ServeMode::Files { root: PathBuf::from("/tmp/site") });
    }

    #[test]
    fn test_from_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ServerConfig::from_file(dir.path().join("missing.json")),
            Err(Error::Config(_))
        ));

        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"port": 9000}"#).unwrap();
        assert!(matches!(ServerConfig::from_file(&path), Err(Error::Config(_))));
    }
}
