//! FastDFS client.
//!
//! Every operation runs in two phases: a tracker query that names a storage
//! node, then the operation itself against that node. Tracker connections
//! come from one pool per configured tracker; storage pools are created the
//! first time a tracker points at a new storage address.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::pool::{ConnPool, PooledConn};
use crate::source::UploadSource;
use crate::task::{DeleteTask, DownloadTarget, DownloadTask, Task, TrackerTask, UploadTask};
use crate::types::{FdfsError, FileId, Result, StorageLocation};

/// Async FastDFS client
pub struct Client {
    config: Config,
    tracker_pools: Vec<ConnPool>,
    /// One pool per storage address, created on first use
    storage_pools: Mutex<HashMap<String, Arc<OnceCell<ConnPool>>>>,
}

impl Client {
    /// Validate the configuration and open a pool to every tracker.
    ///
    /// Fails if any tracker pool cannot be created.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let mut tracker_pools = Vec::with_capacity(config.tracker_addrs.len());
        for addr in &config.tracker_addrs {
            tracker_pools.push(ConnPool::new(addr.as_str(), &config).await?);
        }

        info!(trackers = tracker_pools.len(), "FastDFS client ready");
        Ok(Self {
            config,
            tracker_pools,
            storage_pools: Mutex::new(HashMap::new()),
        })
    }

    /// Build a client from a JSON configuration file
    pub async fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        let config = Config::from_json_file(path).await?;
        Self::new(config).await
    }

    /// Upload a local file; returns its file id
    pub async fn upload_file(&self, path: impl AsRef<Path>) -> Result<String> {
        let source = UploadSource::from_path(path).await?;
        self.upload(source).await
    }

    /// Upload an in-memory buffer; returns its file id
    pub async fn upload_buffer(&self, buffer: impl Into<Bytes>, ext_name: &str) -> Result<String> {
        self.upload(UploadSource::from_buffer(buffer, ext_name)).await
    }

    async fn upload(&self, source: UploadSource) -> Result<String> {
        let location = self.query_storage(TrackerTask::query_store()).await?;
        debug!(
            storage = %location.addr,
            size = source.size(),
            "uploading"
        );
        let mut task = UploadTask::new(source, location.store_path_index);
        let file_id = self.do_storage(&location, &mut task).await?;
        Ok(file_id.to_string())
    }

    /// Download `length` bytes from `offset` into a new local file.
    ///
    /// A `length` of 0 downloads to the end of the file. Returns the number
    /// of bytes written.
    pub async fn download_to_file(
        &self,
        file_id: &str,
        local_path: impl AsRef<Path>,
        offset: u64,
        length: u64,
    ) -> Result<u64> {
        let target = DownloadTarget::File(local_path.as_ref().to_path_buf());
        let (_, received) = self.download(file_id, offset, length, target).await?;
        Ok(received)
    }

    /// Download `length` bytes from `offset` into a new buffer
    pub async fn download_to_buffer(
        &self,
        file_id: &str,
        offset: u64,
        length: u64,
    ) -> Result<Vec<u8>> {
        let (task, _) = self
            .download(file_id, offset, length, DownloadTarget::Allocate)
            .await?;
        Ok(task.into_bytes())
    }

    /// Download into a caller-allocated buffer.
    ///
    /// Fails with [`FdfsError::BufferTooSmall`] before writing anything if the
    /// response does not fit. Returns the number of bytes written.
    pub async fn download_to_allocated_buffer(
        &self,
        file_id: &str,
        buffer: &mut [u8],
        offset: u64,
        length: u64,
    ) -> Result<usize> {
        let (_, received) = self
            .download(file_id, offset, length, DownloadTarget::Buffer(buffer))
            .await?;
        Ok(received as usize)
    }

    /// Download a whole file into memory
    pub async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        self.download_to_buffer(file_id, 0, 0).await
    }

    async fn download<'a>(
        &self,
        file_id: &str,
        offset: u64,
        length: u64,
        target: DownloadTarget<'a>,
    ) -> Result<(DownloadTask<'a>, u64)> {
        let file_id: FileId = file_id.parse()?;
        let location = self
            .query_storage(TrackerTask::query_fetch(&file_id))
            .await?;
        debug!(storage = %location.addr, %file_id, offset, length, "downloading");

        let mut task = DownloadTask::new(file_id, offset, length, target);
        let received = self.do_storage(&location, &mut task).await?;
        Ok((task, received))
    }

    /// Delete a stored file
    pub async fn delete_file(&self, file_id: &str) -> Result<()> {
        let file_id: FileId = file_id.parse()?;
        let location = self
            .query_storage(TrackerTask::query_fetch(&file_id))
            .await?;
        debug!(storage = %location.addr, %file_id, "deleting");

        let mut task = DeleteTask::new(file_id);
        self.do_storage(&location, &mut task).await
    }

    /// Close every tracker and storage pool. Calling it again does nothing.
    pub async fn close(&self) {
        for pool in &self.tracker_pools {
            pool.close().await;
        }
        let storage_pools = self.storage_pools.lock().await;
        for cell in storage_pools.values() {
            if let Some(pool) = cell.get() {
                pool.close().await;
            }
        }
    }

    /// Number of storage pools created so far
    pub async fn storage_pool_count(&self) -> usize {
        let storage_pools = self.storage_pools.lock().await;
        storage_pools.values().filter(|cell| cell.initialized()).count()
    }

    async fn query_storage(&self, mut task: TrackerTask) -> Result<StorageLocation> {
        let result: Result<StorageLocation> = async {
            let mut conn = self.tracker_conn().await?;
            let location = run(&mut conn, &mut task).await?;
            conn.release().await;
            Ok(location)
        }
        .await;
        result.map_err(|e| {
            warn!(error = %e, "tracker query failed");
            FdfsError::Tracker(Box::new(e))
        })
    }

    async fn do_storage<T: Task>(
        &self,
        location: &StorageLocation,
        task: &mut T,
    ) -> Result<T::Output> {
        let result: Result<T::Output> = async {
            let mut conn = self.storage_conn(location).await?;
            let output = run(&mut conn, task).await?;
            conn.release().await;
            Ok(output)
        }
        .await;
        result.map_err(|e| {
            warn!(storage = %location.addr, error = %e, "storage operation failed");
            FdfsError::Storage {
                addr: location.addr.clone(),
                source: Box::new(e),
            }
        })
    }

    /// First connection any tracker pool will give us, in configuration order.
    async fn tracker_conn(&self) -> Result<PooledConn> {
        let mut last_err = None;
        for pool in &self.tracker_pools {
            match pool.acquire().await {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    debug!(tracker = %pool.addr(), error = %e, "tracker pool unavailable");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or(FdfsError::NoUsablePool))
    }

    async fn storage_conn(&self, location: &StorageLocation) -> Result<PooledConn> {
        let cell = {
            let mut storage_pools = self.storage_pools.lock().await;
            storage_pools
                .entry(location.addr.clone())
                .or_default()
                .clone()
        };
        let pool = cell
            .get_or_try_init(|| ConnPool::new(location.addr.as_str(), &self.config))
            .await?;
        pool.acquire().await
    }
}

/// Send a task's request and read its response on one connection.
///
/// Any error, a nonzero response status included, leaves the connection with
/// the caller, who drops it instead of returning it to the pool. A clean
/// status-only reply therefore still costs a reconnect on the next request.
async fn run<T: Task>(conn: &mut PooledConn, task: &mut T) -> Result<T::Output> {
    task.send_request(&mut **conn).await?;
    task.recv_response(&mut **conn).await
}
