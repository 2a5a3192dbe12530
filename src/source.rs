//! Upload sources: a local file or an in-memory buffer, tagged with a file
//! extension that the storage node appends to the name it assigns.

use std::path::Path;

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::frame::truncate_str;
use crate::types::{FdfsError, Result, FILE_EXT_NAME_MAX_LEN};

/// Bytes to upload together with their length and extension tag
#[derive(Debug)]
pub struct UploadSource {
    size: u64,
    ext_name: String,
    body: Body,
}

#[derive(Debug)]
enum Body {
    File(File),
    Buffer(Bytes),
}

impl UploadSource {
    /// Open a local file. The extension is the text after the last `.` in the file name.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).await?;
        let size = file.metadata().await?.len();
        if size == 0 {
            return Err(FdfsError::EmptyFile(path.to_path_buf()));
        }

        let ext_name = path
            .extension()
            .map(|ext| truncate_str(&ext.to_string_lossy(), FILE_EXT_NAME_MAX_LEN).to_string())
            .unwrap_or_default();

        Ok(Self {
            size,
            ext_name,
            body: Body::File(file),
        })
    }

    /// Wrap an in-memory buffer
    pub fn from_buffer(buffer: impl Into<Bytes>, ext_name: &str) -> Self {
        let buffer = buffer.into();
        Self {
            size: buffer.len() as u64,
            ext_name: truncate_str(ext_name, FILE_EXT_NAME_MAX_LEN).to_string(),
            body: Body::Buffer(buffer),
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Extension tag, at most six bytes
    pub fn ext_name(&self) -> &str {
        &self.ext_name
    }

    /// Stream exactly `size` bytes of the body to `writer`.
    pub(crate) async fn write_body<W: AsyncWrite + Unpin>(&mut self, writer: &mut W) -> Result<()> {
        match &mut self.body {
            Body::Buffer(buffer) => {
                writer.write_all(&buffer[..]).await?;
            }
            Body::File(file) => {
                let copied = tokio::io::copy(&mut (&mut *file).take(self.size), writer).await?;
                if copied != self.size {
                    return Err(FdfsError::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        format!("local file shrank: sent {copied} of {} bytes", self.size),
                    )));
                }
            }
        }
        Ok(())
    }
}
