//! Reading a request head off a blocking stream.

use std::io::{self, Read};

use crate::parser::error::Error;
use crate::parser::request::{HttpRequest, parse_request};

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Read bytes from `reader` until the blank line that ends the header block,
/// end-of-stream, or `limit` bytes, whichever comes first.
///
/// Bytes after the terminator that arrived in the same read are kept in the
/// returned buffer; the parser ignores them.
pub fn read_request_head<R: Read>(reader: &mut R, limit: usize) -> io::Result<Vec<u8>> {
    let mut head = Vec::with_capacity(limit.min(1024));
    let mut chunk = [0u8; 1024];

    while head.len() < limit {
        let want = (limit - head.len()).min(chunk.len());
        let n = match reader.read(&mut chunk[..want]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        // Only the tail can newly complete the terminator.
        let scan_from = head.len().saturating_sub(HEAD_TERMINATOR.len() - 1);
        head.extend_from_slice(&chunk[..n]);
        if head[scan_from..].windows(HEAD_TERMINATOR.len()).any(|w| w == HEAD_TERMINATOR) {
            break;
        }
    }

    Ok(head)
}

/// Read and parse one request head from `reader`.
pub fn read_request<R: Read>(reader: &mut R, limit: usize) -> Result<HttpRequest, Error> {
    let head = read_request_head(reader, limit)?;
    parse_request(&head)
}
