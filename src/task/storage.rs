//! Storage node tasks: upload, download and delete.
//!
//! Request payloads:
//!
//! ```text
//! UPLOAD   (cmd 11): [1 byte: store path index]
//!                    [8 bytes BE: file size]
//!                    [6 bytes: extension, zero padded]
//!                    [file size bytes: file data]
//!
//! DOWNLOAD (cmd 14): [8 bytes BE: offset]
//!                    [8 bytes BE: byte count, 0 = to end of file]
//!                    [16 bytes: group name, zero padded]
//!                    [n bytes: remote filename]
//!
//! DELETE   (cmd 12): [16 bytes: group name, zero padded]
//!                    [n bytes: remote filename]
//! ```
//!
//! An upload answers with the group name (16 bytes) followed by the assigned
//! remote filename. A download answers with the file bytes. A delete answers
//! with a bare header.

use std::path::{Path, PathBuf};

use bytes::{BufMut, BytesMut};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::frame::{get_fixed_str, put_fixed, read_response_header};
use crate::source::UploadSource;
use crate::task::Task;
use crate::types::{
    cmd, FdfsError, FileId, Header, Result, FILE_EXT_NAME_MAX_LEN, GROUP_NAME_MAX_LEN,
    HEADER_LEN, MAX_FILE_ID_RESPONSE_LEN,
};

/// Store path index + file size + extension
const UPLOAD_FIXED_LEN: u64 = 1 + 8 + FILE_EXT_NAME_MAX_LEN as u64;

/// Offset + byte count + group name
const DOWNLOAD_FIXED_LEN: u64 = 8 + 8 + GROUP_NAME_MAX_LEN as u64;

/// Cap on up-front allocation for downloads into a fresh buffer
const MAX_PREALLOC: u64 = 16 * 1024 * 1024;

fn short_read(got: u64, want: u64) -> FdfsError {
    FdfsError::Io(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        format!("connection closed after {got} of {want} bytes"),
    ))
}

/// Upload a file to a storage node
#[derive(Debug)]
pub struct UploadTask {
    source: UploadSource,
    store_path_index: u8,
}

impl UploadTask {
    pub fn new(source: UploadSource, store_path_index: u8) -> Self {
        Self {
            source,
            store_path_index,
        }
    }
}

impl Task for UploadTask {
    type Output = FileId;

    async fn send_request<W>(&mut self, conn: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let size = self.source.size();
        let header = Header::new(cmd::STORAGE_UPLOAD_FILE, size + UPLOAD_FIXED_LEN);

        let mut buf = BytesMut::with_capacity(HEADER_LEN + UPLOAD_FIXED_LEN as usize);
        header.encode(&mut buf);
        buf.put_u8(self.store_path_index);
        buf.put_u64(size);
        put_fixed(
            &mut buf,
            self.source.ext_name().as_bytes(),
            FILE_EXT_NAME_MAX_LEN,
        );
        conn.write_all(&buf).await?;
        self.source.write_body(conn).await?;
        conn.flush().await?;
        Ok(())
    }

    async fn recv_response<R>(&mut self, conn: &mut R) -> Result<FileId>
    where
        R: AsyncRead + Unpin + Send,
    {
        let header = read_response_header(conn).await?;
        let len = header.payload_len;
        if len <= GROUP_NAME_MAX_LEN as u64 {
            return Err(FdfsError::Protocol(format!(
                "upload response length {len} leaves no room for a filename"
            )));
        }
        if len > MAX_FILE_ID_RESPONSE_LEN {
            return Err(FdfsError::Protocol(format!(
                "upload response length {len} exceeds {MAX_FILE_ID_RESPONSE_LEN}"
            )));
        }

        let mut body = vec![0u8; len as usize];
        conn.read_exact(&mut body).await?;
        let group_name = get_fixed_str(&body[..GROUP_NAME_MAX_LEN])?;
        let remote_filename = get_fixed_str(&body[GROUP_NAME_MAX_LEN..])?;
        Ok(FileId::new(group_name, remote_filename))
    }
}

/// Where downloaded bytes go
#[derive(Debug)]
pub enum DownloadTarget<'a> {
    /// Create (or truncate) a local file
    File(PathBuf),
    /// Fill the front of a caller-owned buffer
    Buffer(&'a mut [u8]),
    /// Allocate a buffer sized to the response
    Allocate,
}

/// Download all or part of a file from a storage node
#[derive(Debug)]
pub struct DownloadTask<'a> {
    file_id: FileId,
    offset: u64,
    length: u64,
    target: DownloadTarget<'a>,
    received: Vec<u8>,
}

impl<'a> DownloadTask<'a> {
    /// `length` 0 asks for everything from `offset` to the end of the file
    pub fn new(file_id: FileId, offset: u64, length: u64, target: DownloadTarget<'a>) -> Self {
        Self {
            file_id,
            offset,
            length,
            target,
            received: Vec::new(),
        }
    }

    /// Bytes received into an allocated buffer; empty for other targets
    pub fn into_bytes(self) -> Vec<u8> {
        self.received
    }
}

impl Task for DownloadTask<'_> {
    /// Number of bytes received
    type Output = u64;

    async fn send_request<W>(&mut self, conn: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let remote = self.file_id.remote_filename.as_bytes();
        let header = Header::new(
            cmd::STORAGE_DOWNLOAD_FILE,
            DOWNLOAD_FIXED_LEN + remote.len() as u64,
        );

        let mut buf = BytesMut::with_capacity(HEADER_LEN + header.payload_len as usize);
        header.encode(&mut buf);
        buf.put_u64(self.offset);
        buf.put_u64(self.length);
        put_fixed(
            &mut buf,
            self.file_id.group_name.as_bytes(),
            GROUP_NAME_MAX_LEN,
        );
        buf.put_slice(remote);
        conn.write_all(&buf).await?;
        conn.flush().await?;
        Ok(())
    }

    async fn recv_response<R>(&mut self, conn: &mut R) -> Result<u64>
    where
        R: AsyncRead + Unpin + Send,
    {
        let header = read_response_header(conn).await?;
        let len = header.payload_len;

        match &mut self.target {
            DownloadTarget::File(path) => recv_file(conn, path, len).await,
            DownloadTarget::Buffer(buffer) => {
                if (buffer.len() as u64) < len {
                    return Err(FdfsError::BufferTooSmall {
                        needed: len,
                        available: buffer.len(),
                    });
                }
                conn.read_exact(&mut buffer[..len as usize]).await?;
                Ok(len)
            }
            DownloadTarget::Allocate => {
                let mut data = Vec::with_capacity(len.min(MAX_PREALLOC) as usize);
                let got = (&mut *conn).take(len).read_to_end(&mut data).await? as u64;
                if got != len {
                    return Err(short_read(got, len));
                }
                self.received = data;
                Ok(len)
            }
        }
    }
}

/// Stream `len` bytes into a new local file, removing it again if receiving
/// fails. A file that could not be created is left alone.
async fn recv_file<R>(conn: &mut R, path: &Path, len: u64) -> Result<u64>
where
    R: AsyncRead + Unpin + Send,
{
    let mut writer = BufWriter::new(File::create(path).await?);
    let result: Result<u64> = async {
        let copied = tokio::io::copy(&mut (&mut *conn).take(len), &mut writer).await?;
        if copied != len {
            return Err(short_read(copied, len));
        }
        writer.flush().await?;
        Ok(copied)
    }
    .await;

    if result.is_err() {
        debug!(path = %path.display(), "removing partial download");
        let _ = tokio::fs::remove_file(path).await;
    }
    result
}

/// Delete a file from a storage node
#[derive(Debug, Clone)]
pub struct DeleteTask {
    file_id: FileId,
}

impl DeleteTask {
    pub fn new(file_id: FileId) -> Self {
        Self { file_id }
    }
}

impl Task for DeleteTask {
    type Output = ();

    async fn send_request<W>(&mut self, conn: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let remote = self.file_id.remote_filename.as_bytes();
        let header = Header::new(
            cmd::STORAGE_DELETE_FILE,
            (GROUP_NAME_MAX_LEN + remote.len()) as u64,
        );

        let mut buf = BytesMut::with_capacity(HEADER_LEN + header.payload_len as usize);
        header.encode(&mut buf);
        put_fixed(
            &mut buf,
            self.file_id.group_name.as_bytes(),
            GROUP_NAME_MAX_LEN,
        );
        buf.put_slice(remote);
        conn.write_all(&buf).await?;
        conn.flush().await?;
        Ok(())
    }

    async fn recv_response<R>(&mut self, conn: &mut R) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let header = read_response_header(conn).await?;
        if header.payload_len != 0 {
            return Err(FdfsError::Protocol(format!(
                "delete response carries {} unexpected bytes",
                header.payload_len
            )));
        }
        Ok(())
    }
}
