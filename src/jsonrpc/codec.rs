//! `Content-Length` framing for JSON-RPC bodies (LSP style).
//!
//! ```text
//! Content-Length: 52\r\n
//! \r\n
//! {"jsonrpc":"2.0","id":1,"method":"ping","params":{}}
//! ```

use std::io;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const HEADER_END: &[u8] = b"\r\n\r\n";

/// Largest body accepted by default
pub const DEFAULT_MAX_FRAME: usize = 64 * 1024 * 1024;

/// Codec yielding each frame body as a UTF-8 string
#[derive(Debug, Clone)]
pub struct ContentLengthCodec {
    max_frame: usize,
    /// Body length of a frame whose header has been consumed
    pending_body: Option<usize>,
}

impl ContentLengthCodec {
    pub fn new() -> Self {
        Self::with_max_frame(DEFAULT_MAX_FRAME)
    }

    pub fn with_max_frame(max_frame: usize) -> Self {
        Self {
            max_frame,
            pending_body: None,
        }
    }

    fn parse_header(&self, header: &[u8]) -> io::Result<usize> {
        let header = std::str::from_utf8(header)
            .map_err(|_| invalid("frame header is not UTF-8"))?;

        let mut length = None;
        for line in header.split("\r\n") {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            if name.trim().eq_ignore_ascii_case("content-length") {
                let parsed = value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| invalid(format!("invalid Content-Length '{}'", value.trim())))?;
                length = Some(parsed);
            }
        }

        let length = length.ok_or_else(|| invalid("missing Content-Length header"))?;
        if length > self.max_frame {
            return Err(invalid(format!(
                "frame of {} bytes exceeds limit of {} bytes",
                length, self.max_frame
            )));
        }
        Ok(length)
    }
}

impl Default for ContentLengthCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

impl Decoder for ContentLengthCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<String>> {
        let length = match self.pending_body {
            Some(length) => length,
            None => {
                let Some(pos) = src.windows(HEADER_END.len()).position(|w| w == HEADER_END) else {
                    return Ok(None);
                };
                let length = self.parse_header(&src[..pos])?;
                src.advance(pos + HEADER_END.len());
                self.pending_body = Some(length);
                length
            }
        };

        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        self.pending_body = None;
        let body = src.split_to(length);
        String::from_utf8(body.to_vec())
            .map(Some)
            .map_err(|_| invalid("frame body is not UTF-8"))
    }
}

impl Encoder<String> for ContentLengthCodec {
    type Error = io::Error;

    fn encode(&mut self, body: String, dst: &mut BytesMut) -> io::Result<()> {
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        dst.reserve(header.len() + body.len());
        dst.put_slice(header.as_bytes());
        dst.put_slice(body.as_bytes());
        Ok(())
    }
}
