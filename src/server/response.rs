//! HTTP response framing: status line, headers, and bodies.

use std::io::{self, Write};
use std::path::Path;

/// HTTP status codes with their standard reason phrases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok = 200,
    BadRequest = 400,
    Forbidden = 403,
    NotFound = 404,
    BadGateway = 502,
}

impl StatusCode {
    /// Get the reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::BadGateway => "Bad Gateway",
        }
    }

    pub fn as_u16(&self) -> u16 {
        *self as u16
    }
}

/// MIME type for a file, by extension. Unknown extensions are `text/plain`.
pub fn mime_type_for(path: &Path) -> String {
    mime_guess::from_path(path).first_or_text_plain().to_string()
}

/// An HTTP response head with an optional in-memory body.
///
/// Large bodies (files, directory listings) are streamed by the caller after
/// [`HttpResponse::write_head`]; small ones go through the `with_body_*`
/// helpers, which also set `Content-Length`.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// The HTTP status code
    pub status: StatusCode,
    /// The HTTP headers, in the order they are written
    pub headers: Vec<(String, String)>,
    /// The response body
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Create a new HTTP response with the given status code.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: vec![("Server".to_string(), "microserve-rs".to_string())],
            body: Vec::new(),
        }
    }

    /// The canned page used for every error status.
    pub fn error_page(status: StatusCode) -> Self {
        let page = format!(
            "<center><h1>{code} {reason}</h1><hr></center>",
            code = status.as_u16(),
            reason = status.reason_phrase()
        );
        Self::new(status)
            .with_content_type("text/html")
            .with_body_string(page)
    }

    /// Set the response body with a string.
    pub fn with_body_string(self, body: impl Into<String>) -> Self {
        self.with_body_bytes(body.into().into_bytes())
    }

    /// Set the response body with bytes.
    pub fn with_body_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        let content_length = self.body.len() as u64;
        self.with_content_length(content_length)
    }

    /// Add or replace a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&name)) {
            Some(slot) => slot.1 = value,
            None => self.headers.push((name, value)),
        }
        self
    }

    /// Set the content type.
    pub fn with_content_type(self, content_type: impl Into<String>) -> Self {
        self.with_header("Content-Type", content_type)
    }

    /// Declare the body length without buffering the body.
    pub fn with_content_length(self, length: u64) -> Self {
        self.with_header("Content-Length", length.to_string())
    }

    /// Get a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Write the status line, headers, and the blank line that ends them.
    pub fn write_head<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let mut head = format!(
            "HTTP/1.1 {} {}\r\n",
            self.status.as_u16(),
            self.status.reason_phrase()
        );
        for (name, value) in &self.headers {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        head.push_str("\r\n");
        writer.write_all(head.as_bytes())
    }

    /// Write the head followed by the buffered body.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.write_head(writer)?;
        writer.write_all(&self.body)?;
        writer.flush()
    }

    /// Convert the response to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_to(&mut bytes);
        bytes
    }
}
