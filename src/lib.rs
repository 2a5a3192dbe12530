//! # fdfs - async FastDFS client
//!
//! A client for the FastDFS distributed file system: upload, download and
//! delete files stored on a cluster of tracker nodes (which route requests)
//! and storage nodes (which hold file bytes).
//!
//! ## Quick Start
//!
//! ```no_run
//! use fdfs::{Client, Config};
//!
//! # async fn demo() -> Result<(), fdfs::FdfsError> {
//! let client = Client::new(Config::new(["192.168.1.100:22122"])).await?;
//!
//! let file_id = client.upload_buffer(b"Hello, FastDFS!".to_vec(), "txt").await?;
//! let data = client.download_file(&file_id).await?;
//! assert_eq!(data, b"Hello, FastDFS!");
//! client.delete_file(&file_id).await?;
//!
//! client.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Protocol Overview
//!
//! Every request and response is a 10-byte header followed by a payload:
//!
//! - PAY_LEN (8B BE): Payload length
//! - CMD (1B): Command code
//! - STATUS (1B): 0 on success; anything else fails the operation
//!
//! Each operation first asks a tracker which storage node to use, then
//! talks to that storage node.
//!
//! | Code | Command                          | Sent to |
//! |------|----------------------------------|---------|
//! | 101  | QUERY_STORE_WITHOUT_GROUP_ONE    | tracker |
//! | 102  | QUERY_FETCH_ONE                  | tracker |
//! | 11   | UPLOAD_FILE                      | storage |
//! | 12   | DELETE_FILE                      | storage |
//! | 14   | DOWNLOAD_FILE                    | storage |
//! | 111  | ACTIVE_TEST                      | both    |
//! | 100  | RESP                             | (reply) |
//!
//! ## Connections
//!
//! Connections are pooled per remote address (see [`pool`]). Pools never make
//! a caller wait: an exhausted pool fails the operation immediately.

pub mod client;
pub mod config;
pub mod frame;
pub mod pool;
pub mod source;
pub mod task;
pub mod types;

#[cfg(test)]
mod testutil;

// Re-export main types for convenience
pub use client::Client;
pub use config::Config;
pub use pool::{ConnPool, PoolStats, PooledConn};
pub use source::UploadSource;
pub use types::{cmd, FdfsError, FileId, Header, Result, StorageLocation};
