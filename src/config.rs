//! Client configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::types::{FdfsError, Result};

/// Minimum number of connections a pool keeps open; also the lowest allowed capacity
pub const MIN_CONNS: usize = 5;

/// Default pool capacity
pub const DEFAULT_MAX_CONNS: usize = 100;

/// Default TCP connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval between liveness sweeps of idle connections
pub const DEFAULT_ACTIVE_TEST_INTERVAL: Duration = Duration::from_secs(20);

/// Endpoint configuration and connection pool tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tracker addresses as `host:port`
    pub tracker_addrs: Vec<String>,
    /// Capacity of every connection pool
    pub max_conns: usize,
    /// Connections opened eagerly when a pool is created
    pub min_conns: usize,
    pub connect_timeout_ms: u64,
    pub active_test_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tracker_addrs: Vec::new(),
            max_conns: DEFAULT_MAX_CONNS,
            min_conns: MIN_CONNS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
            active_test_interval_ms: DEFAULT_ACTIVE_TEST_INTERVAL.as_millis() as u64,
        }
    }
}

impl Config {
    /// Create a configuration for the given trackers with default pool settings
    pub fn new<I, S>(tracker_addrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tracker_addrs: tracker_addrs.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_max_conns(mut self, max_conns: usize) -> Self {
        self.max_conns = max_conns;
        self
    }

    pub fn with_min_conns(mut self, min_conns: usize) -> Self {
        self.min_conns = min_conns;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_active_test_interval(mut self, interval: Duration) -> Self {
        self.active_test_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn active_test_interval(&self) -> Duration {
        Duration::from_millis(self.active_test_interval_ms)
    }

    /// Parse a JSON configuration; absent fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| FdfsError::Config(format!("invalid JSON: {e}")))
    }

    /// Load a JSON configuration file
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            FdfsError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    /// Reject configurations no client can be built from
    pub fn validate(&self) -> Result<()> {
        if self.tracker_addrs.is_empty() {
            return Err(FdfsError::Config("no tracker addresses configured".into()));
        }
        if self.min_conns == 0 {
            return Err(FdfsError::Config("min_conns must be at least 1".into()));
        }
        if self.active_test_interval_ms == 0 {
            return Err(FdfsError::Config("active_test_interval_ms must be nonzero".into()));
        }
        if self.max_conns < self.min_conns {
            return Err(FdfsError::Config(format!(
                "too few max_conns: {} < {}",
                self.max_conns, self.min_conns
            )));
        }
        Ok(())
    }
}
