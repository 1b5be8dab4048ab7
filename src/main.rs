use std::path::PathBuf;

use clap::Parser;
use log::{error, info};
use microserve_rs::{HttpServer, ProxyTarget, ServeMode, ServerConfig};

#[derive(Parser, Debug)]
#[clap(
    version,
    about = "Serve a directory over HTTP, or relay connections to one upstream host",
    after_help = "Examples:\n  microserve --files www_directory/ --port 8000 --num-threads 5\n  microserve --proxy inst.eecs.berkeley.edu:80 --port 8000 --num-threads 5"
)]
struct Args {
    #[clap(long, value_name = "DIR", conflicts_with = "proxy", help = "Serve files from this directory")]
    files: Option<PathBuf>,

    #[clap(long, value_name = "HOST[:PORT]", help = "Relay connections to this host (port defaults to 80)")]
    proxy: Option<String>,

    #[clap(long, value_name = "PORT", help = "Port to listen on [default: 8000]")]
    port: Option<u16>,

    #[clap(long, value_name = "N", value_parser = parse_positive, help = "Number of worker threads [default: handle connections on the accept loop]")]
    num_threads: Option<usize>,

    #[clap(long, value_name = "N", help = "Listen backlog [default: 1024]")]
    backlog: Option<u32>,

    #[clap(short, long, value_name = "FILE", help = "JSON configuration file; other flags override its values")]
    config: Option<PathBuf>,
}

fn parse_positive(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err("expected a positive integer".to_string()),
    }
}

fn build_config(args: &Args) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mode = match (&args.files, &args.proxy) {
        (Some(root), _) => Some(ServeMode::Files { root: root.clone() }),
        (None, Some(target)) => Some(ServeMode::Proxy(target.parse::<ProxyTarget>()?)),
        (None, None) => None,
    };

    let file_config = match &args.config {
        Some(path) => Some(ServerConfig::from_file(path)?),
        None => None,
    };

    let mut config = match (file_config, mode) {
        (Some(mut config), Some(mode)) => {
            config.mode = mode;
            config
        }
        (Some(config), None) => config,
        (None, Some(mode)) => ServerConfig::new(mode),
        (None, None) => {
            return Err("Please specify either \"--files [DIRECTORY]\" or \"--proxy [HOSTNAME:PORT]\"".into());
        }
    };

    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(num_threads) = args.num_threads {
        config.num_threads = num_threads;
    }
    if let Some(backlog) = args.backlog {
        config.backlog = backlog;
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let server = HttpServer::new(config);
    if let Err(e) = server.start().await {
        error!("{e}");
        std::process::exit(1);
    }

    // Workers may still be inside a connection; they are not waited for.
    info!("Server stopped");
    std::process::exit(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("microserve").chain(args.iter().copied()))
    }

    #[test]
    fn test_files_mode_with_defaults() {
        let args = parse(&["--files", "/tmp/site"]).unwrap();
        let config = build_config(&args).unwrap();
        assert_eq!(config.mode, ServeMode::Files { root: PathBuf::from("/tmp/site") });
        assert_eq!(config.port, 8000);
        assert_eq!(config.num_threads, 0);
        assert_eq!(config.backlog, 1024);
    }

    #[test]
    fn test_proxy_mode_with_overrides() {
        let args = parse(&["--proxy", "example.com", "--port", "9000", "--num-threads", "5"]).unwrap();
        let config = build_config(&args).unwrap();
        assert_eq!(config.mode, ServeMode::Proxy(ProxyTarget {
            host: "example.com".to_string(),
            port: 80,
        }));
        assert_eq!(config.port, 9000);
        assert_eq!(config.num_threads, 5);
    }

    #[test]
    fn test_files_and_proxy_conflict() {
        assert!(parse(&["--files", "/tmp", "--proxy", "example.com"]).is_err());
    }

    #[test]
    fn test_num_threads_must_be_positive() {
        assert!(parse(&["--files", "/tmp", "--num-threads", "0"]).is_err());
        assert!(parse(&["--files", "/tmp", "--num-threads", "many"]).is_err());
    }

    #[test]
    fn test_mode_is_required() {
        let args = parse(&["--port", "9000"]).unwrap();
        assert!(build_config(&args).is_err());
    }

    #[test]
    fn test_bad_proxy_port() {
        let args = parse(&["--proxy", "example.com:eighty"]).unwrap();
        assert!(build_config(&args).is_err());
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.json");
        std::fs::write(&path, r#"{"port": 7000, "num_threads": 2, "mode": {"files": {"root": "/srv"}}}"#).unwrap();

        let args = parse(&["--config", path.to_str().unwrap(), "--num-threads", "6"]).unwrap();
        let config = build_config(&args).unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.num_threads, 6);
        assert_eq!(config.mode, ServeMode::Files { root: PathBuf::from("/srv") });
    }
}
