//! Protocol tasks.
//!
//! A task is one request/response exchange. The client calls
//! [`Task::send_request`] and then [`Task::recv_response`], once each, on the
//! same connection.

use std::future::Future;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::types::Result;

pub mod storage;
pub mod tracker;

pub use storage::{DeleteTask, DownloadTarget, DownloadTask, UploadTask};
pub use tracker::TrackerTask;

/// One request/response exchange with a tracker or storage node
pub trait Task: Send {
    /// Value produced by a successful response
    type Output: Send;

    /// Write the full request frame
    fn send_request<W>(&mut self, conn: &mut W) -> impl Future<Output = Result<()>> + Send
    where
        W: AsyncWrite + Unpin + Send;

    /// Read and interpret the response frame
    fn recv_response<R>(&mut self, conn: &mut R) -> impl Future<Output = Result<Self::Output>> + Send
    where
        R: AsyncRead + Unpin + Send;
}
