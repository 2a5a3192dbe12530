//! Core protocol types: command codes, the frame header, storage locations,
//! file identifiers and the crate error type.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Size of the fixed frame header in bytes
pub const HEADER_LEN: usize = 10;

/// Width of the zero-padded group name field
pub const GROUP_NAME_MAX_LEN: usize = 16;

/// Width of the zero-padded IP address field in tracker responses
pub const IP_ADDRESS_LEN: usize = 15;

/// Width of the zero-padded file extension field in upload requests
pub const FILE_EXT_NAME_MAX_LEN: usize = 6;

/// Tracker response body without a storage path index
pub const TRACKER_RESPONSE_LEN: u64 = (GROUP_NAME_MAX_LEN + IP_ADDRESS_LEN + 8) as u64;

/// Upper bound on an upload response (group name + remote filename)
pub const MAX_FILE_ID_RESPONSE_LEN: u64 = 100;

/// Wire command codes.
pub mod cmd {
    /// Response command used by trackers and storage nodes alike
    pub const RESP: u8 = 100;
    /// Ask a tracker for any storage node able to take an upload
    pub const TRACKER_QUERY_STORE_WITHOUT_GROUP_ONE: u8 = 101;
    /// Ask a tracker which storage node holds a file
    pub const TRACKER_QUERY_FETCH_ONE: u8 = 102;
    pub const STORAGE_UPLOAD_FILE: u8 = 11;
    pub const STORAGE_DELETE_FILE: u8 = 12;
    pub const STORAGE_DOWNLOAD_FILE: u8 = 14;
    /// Zero-payload liveness probe
    pub const ACTIVE_TEST: u8 = 111;
}

/// The 10-byte header that prefixes every request and response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    /// Number of payload bytes following the header
    pub payload_len: u64,
    pub cmd: u8,
    pub status: u8,
}

impl Header {
    /// Create a request header with a zero status
    pub fn new(cmd: u8, payload_len: u64) -> Self {
        Self {
            payload_len,
            cmd,
            status: 0,
        }
    }
}

/// Where a tracker told us to go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLocation {
    pub group_name: String,
    /// `host:port` of the storage node
    pub addr: String,
    /// Storage volume selected for uploads (0 when the tracker omits it)
    pub store_path_index: u8,
}

/// A stored file's identifier, `<group>/<remote filename>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileId {
    pub group_name: String,
    pub remote_filename: String,
}

impl FileId {
    pub fn new(group_name: impl Into<String>, remote_filename: impl Into<String>) -> Self {
        Self {
            group_name: group_name.into(),
            remote_filename: remote_filename.into(),
        }
    }
}

impl FromStr for FileId {
    type Err = FdfsError;

    /// Split on the first `/`; both halves must be non-empty.
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((group, remote)) if !group.is_empty() && !remote.is_empty() => {
                Ok(FileId::new(group, remote))
            }
            _ => Err(FdfsError::InvalidFileId(s.to_string())),
        }
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group_name, self.remote_filename)
    }
}

/// Error types for the FastDFS client
#[derive(Error, Debug)]
pub enum FdfsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connecting to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("protocol error: response status {0} != 0")]
    Status(u8),

    #[error("protocol error: unexpected response command {0}")]
    UnexpectedCommand(u8),

    #[error("connection pool for {addr} exhausted ({max_conns} connections in use)")]
    PoolExhausted { addr: String, max_conns: usize },

    #[error("connection pool for {0} is closed")]
    PoolClosed(String),

    #[error("buffer too small: response has {needed} bytes, buffer holds {available}")]
    BufferTooSmall { needed: u64, available: usize },

    #[error("invalid file id {0:?}: expected <group>/<remote filename>")]
    InvalidFileId(String),

    #[error("file {0:?} is empty")]
    EmptyFile(PathBuf),

    #[error("no tracker connection pool is usable")]
    NoUsablePool,

    #[error("tracker query failed: {0}")]
    Tracker(#[source] Box<FdfsError>),

    #[error("storage operation on {addr} failed: {source}")]
    Storage {
        addr: String,
        #[source]
        source: Box<FdfsError>,
    },
}

impl FdfsError {
    /// The underlying error with tracker/storage phase context removed.
    pub fn root_cause(&self) -> &FdfsError {
        match self {
            FdfsError::Tracker(inner) => inner.root_cause(),
            FdfsError::Storage { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, FdfsError>;
