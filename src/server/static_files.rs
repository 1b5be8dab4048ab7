//! Serving files and directory listings from a root directory.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use log::debug;

use crate::parser::read_request;
use crate::server::error::Error;
use crate::server::response::{HttpResponse, StatusCode, mime_type_for};

/// Name looked up inside a requested directory before falling back to a
/// generated listing.
pub const INDEX_FILE: &str = "index.html";

/// Check a request target before it gets anywhere near the filesystem.
///
/// The target must be absolute and must not contain `..` anywhere.
pub fn validate_request_path(path: &str) -> Result<(), Error> {
    if !path.starts_with('/') {
        return Err(Error::BadRequest(path.to_string()));
    }
    if path.contains("..") {
        return Err(Error::Forbidden(path.to_string()));
    }
    Ok(())
}

/// Request handler for files mode.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
    read_buffer_size: usize,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>, read_buffer_size: usize) -> Self {
        Self {
            root: root.into(),
            read_buffer_size,
        }
    }

    /// Answer one request read from `stream`.
    ///
    /// Client errors are answered with the matching error page and then
    /// returned so the caller can log them.
    pub fn handle<S: Read + Write>(&self, stream: &mut S) -> Result<(), Error> {
        let result = self.respond(stream);
        if let Err(e) = &result {
            if let Some(status) = e.status_code() {
                debug!("Answering {} for error: {e}", status.as_u16());
                HttpResponse::error_page(status).write_to(stream)?;
            }
        }
        result
    }

    fn respond<S: Read + Write>(&self, stream: &mut S) -> Result<(), Error> {
        let request = read_request(stream, self.read_buffer_size)?;
        validate_request_path(&request.path)?;

        let path = self.resolve(&request.path);
        let metadata = fs::metadata(&path).map_err(|_| Error::NotFound(request.path.clone()))?;

        if metadata.is_file() {
            self.serve_file(stream, &path, metadata.len())?;
        } else if metadata.is_dir() {
            let index = path.join(INDEX_FILE);
            match fs::metadata(&index) {
                Ok(index_meta) if index_meta.is_file() => {
                    self.serve_file(stream, &index, index_meta.len())?;
                }
                _ => self.serve_listing(stream, &path)?,
            }
        } else {
            return Err(Error::NotFound(request.path));
        }

        debug!("{} {} -> 200", request.method, request.path);
        Ok(())
    }

    /// Root joined with the request target by plain concatenation.
    fn resolve(&self, request_path: &str) -> PathBuf {
        let mut full = OsString::from(self.root.as_os_str());
        full.push(request_path);
        PathBuf::from(full)
    }

    fn serve_file<W: Write>(&self, stream: &mut W, path: &Path, size: u64) -> Result<(), Error> {
        let mut file = File::open(path)
            .map_err(|_| Error::NotFound(path.display().to_string()))?;

        HttpResponse::new(StatusCode::Ok)
            .with_content_type(mime_type_for(path))
            .with_content_length(size)
            .write_head(stream)?;

        let mut buffer = vec![0u8; self.read_buffer_size];
        loop {
            let n = file.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            stream.write_all(&buffer[..n])?;
        }
        stream.flush()?;
        Ok(())
    }

    fn serve_listing<W: Write>(&self, stream: &mut W, dir: &Path) -> Result<(), Error> {
        let body = render_listing(dir)?;
        HttpResponse::new(StatusCode::Ok)
            .with_content_type("text/html")
            .write_head(stream)?;
        stream.write_all(body.as_bytes())?;
        stream.flush()?;
        Ok(())
    }
}

/// One anchor per directory entry, in enumeration order.
///
/// `read_dir` never yields `.` and `..`, so they are listed first.
pub fn render_listing(dir: &Path) -> Result<String, Error> {
    let mut names = vec![".".to_string(), "..".to_string()];
    for entry in fs::read_dir(dir)? {
        names.push(entry?.file_name().to_string_lossy().into_owned());
    }

    let mut html = String::with_capacity(names.len() * 48);
    for name in &names {
        html.push_str(&format!("<a href=\"./{name}\">{name}</a><br>\n"));
    }
    Ok(html)
}
