//! Frame header encoding and decoding.
//!
//! Every request and response starts with a 10-byte header:
//!
//! ```text
//! [8 bytes BE: payload length]
//! [1 byte: command]
//! [1 byte: status]
//! ```
//!
//! Fixed-width string fields inside payloads are zero-padded on the right
//! and truncated to their width when encoding; on decode they end at the
//! first zero byte.

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::types::{cmd, FdfsError, Header, Result, HEADER_LEN};

impl Header {
    /// Encode into the 10-byte wire form
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        BigEndian::write_u64(&mut buf[..8], self.payload_len);
        buf[8] = self.cmd;
        buf[9] = self.status;
        buf
    }

    /// Decode the wire form without checking the status byte
    pub fn from_bytes(buf: &[u8; HEADER_LEN]) -> Self {
        Self {
            payload_len: BigEndian::read_u64(&buf[..8]),
            cmd: buf[8],
            status: buf[9],
        }
    }

    /// Append the wire form to a buffer
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.to_bytes());
    }
}

/// Writes a header to the stream.
pub async fn write_header<W: AsyncWrite + Unpin>(writer: &mut W, header: &Header) -> Result<()> {
    writer.write_all(&header.to_bytes()).await?;
    Ok(())
}

/// Reads a header from the stream.
///
/// Fails with [`FdfsError::Status`] when the status byte is nonzero, and with
/// an I/O error when the stream ends before 10 bytes arrive.
pub async fn read_header<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Header> {
    let mut buf = [0u8; HEADER_LEN];
    reader.read_exact(&mut buf).await?;
    let header = Header::from_bytes(&buf);
    if header.status != 0 {
        return Err(FdfsError::Status(header.status));
    }
    Ok(header)
}

/// Reads a header and requires it to be a successful response frame.
pub async fn read_response_header<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Header> {
    let header = read_header(reader).await?;
    if header.cmd != cmd::RESP {
        return Err(FdfsError::UnexpectedCommand(header.cmd));
    }
    Ok(header)
}

/// Writes `value` into a zero-padded field of `width` bytes, truncating if needed.
pub fn put_fixed(buf: &mut BytesMut, value: &[u8], width: usize) {
    let n = value.len().min(width);
    buf.put_slice(&value[..n]);
    buf.put_bytes(0, width - n);
}

/// Reads a fixed-width field, stopping at the first zero byte.
pub fn get_fixed_str(field: &[u8]) -> Result<String> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8(field[..end].to_vec())
        .map_err(|e| FdfsError::Protocol(format!("invalid UTF-8 in string field: {e}")))
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a character.
pub(crate) fn truncate_str(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
