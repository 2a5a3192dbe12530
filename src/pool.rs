//! Per-address pool of TCP connections.
//!
//! A pool opens `min_conns` connections up front and grows on demand up to
//! `max_conns`. Acquisition never waits: with no idle connection and the pool
//! at capacity it fails with [`FdfsError::PoolExhausted`].
//!
//! Handles are returned with [`PooledConn::release`]. A handle dropped without
//! being released is assumed to be in an unknown protocol state, so its
//! transport is closed and the pool forgets it.
//!
//! A background task probes idle connections with an active-test frame on a
//! fixed interval and evicts the ones that do not answer. Checked-out
//! connections are never probed.

use std::collections::VecDeque;
use std::io;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::frame::{read_response_header, write_header};
use crate::types::{cmd, FdfsError, Header, Result};

/// Connection pool for one remote address
pub struct ConnPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    addr: String,
    max_conns: usize,
    connect_timeout: Duration,
    /// Idle connections, oldest first
    idle: Mutex<VecDeque<TcpStream>>,
    /// Idle plus checked-out connections. Only incremented while `idle` is locked.
    live: AtomicUsize,
    shutdown: CancellationToken,
}

/// Point-in-time pool counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub idle: usize,
    pub live: usize,
    pub capacity: usize,
}

impl ConnPool {
    /// Create a pool and open its initial connections.
    ///
    /// Fails if the capacity is below the floor or if any initial connection
    /// cannot be opened; connections opened before the failure are closed.
    pub async fn new(addr: impl Into<String>, config: &Config) -> Result<Self> {
        let addr = addr.into();
        if config.min_conns == 0 || config.max_conns < config.min_conns {
            return Err(FdfsError::Config(format!(
                "too few max_conns for {}: {} < {}",
                addr, config.max_conns, config.min_conns
            )));
        }
        if config.active_test_interval().is_zero() {
            return Err(FdfsError::Config(
                "active_test_interval_ms must be nonzero".into(),
            ));
        }

        let inner = Arc::new(PoolInner {
            addr,
            max_conns: config.max_conns,
            connect_timeout: config.connect_timeout(),
            idle: Mutex::new(VecDeque::with_capacity(config.max_conns)),
            live: AtomicUsize::new(0),
            shutdown: CancellationToken::new(),
        });

        {
            let mut idle = inner.idle.lock().await;
            for _ in 0..config.min_conns {
                let stream = inner.connect().await?;
                idle.push_back(stream);
                inner.live.fetch_add(1, Ordering::AcqRel);
            }
        }

        tokio::spawn(active_test_loop(
            Arc::downgrade(&inner),
            inner.shutdown.clone(),
            config.active_test_interval(),
        ));

        info!(
            addr = %inner.addr,
            min_conns = config.min_conns,
            max_conns = config.max_conns,
            "connection pool created"
        );
        Ok(Self { inner })
    }

    /// Take an idle connection, or open a new one if below capacity.
    pub async fn acquire(&self) -> Result<PooledConn> {
        let inner = &self.inner;
        if inner.shutdown.is_cancelled() {
            return Err(FdfsError::PoolClosed(inner.addr.clone()));
        }

        let mut idle = inner.idle.lock().await;
        if let Some(stream) = idle.pop_front() {
            debug!(addr = %inner.addr, "reusing idle connection");
            return Ok(PooledConn::new(stream, inner.clone()));
        }

        if inner.live.load(Ordering::Acquire) >= inner.max_conns {
            return Err(FdfsError::PoolExhausted {
                addr: inner.addr.clone(),
                max_conns: inner.max_conns,
            });
        }

        let stream = inner.connect().await?;
        inner.live.fetch_add(1, Ordering::AcqRel);
        Ok(PooledConn::new(stream, inner.clone()))
    }

    /// Stop the liveness sweep and close every idle connection.
    ///
    /// Checked-out connections stay open until their holders release or drop
    /// them; releasing into a closed pool closes the transport.
    pub async fn close(&self) {
        self.inner.shutdown.cancel();
        let mut idle = self.inner.idle.lock().await;
        let closed = idle.len();
        idle.clear();
        self.inner.live.fetch_sub(closed, Ordering::AcqRel);
        info!(addr = %self.inner.addr, closed, "connection pool closed");
    }

    pub async fn stats(&self) -> PoolStats {
        let idle = self.inner.idle.lock().await;
        PoolStats {
            idle: idle.len(),
            live: self.inner.live.load(Ordering::Acquire),
            capacity: self.inner.max_conns,
        }
    }

    /// Remote address this pool connects to
    pub fn addr(&self) -> &str {
        &self.inner.addr
    }
}

impl Drop for ConnPool {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

impl PoolInner {
    async fn connect(&self) -> Result<TcpStream> {
        let stream = match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.addr))
            .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(FdfsError::Connect {
                    addr: self.addr.clone(),
                    source: e,
                })
            }
            Err(_) => {
                return Err(FdfsError::ConnectTimeout {
                    addr: self.addr.clone(),
                    timeout: self.connect_timeout,
                })
            }
        };
        stream.set_nodelay(true)?;
        debug!(addr = %self.addr, "opened connection");
        Ok(stream)
    }

    async fn put(&self, stream: TcpStream) {
        let mut idle = self.idle.lock().await;
        if self.shutdown.is_cancelled() {
            self.live.fetch_sub(1, Ordering::AcqRel);
            debug!(addr = %self.addr, "pool closed, dropping released connection");
            return;
        }
        idle.push_back(stream);
    }

    /// Probe every idle connection once, evicting those that fail.
    async fn check_idle(&self) {
        let mut idle = self.idle.lock().await;
        let mut alive = VecDeque::with_capacity(idle.len());
        while let Some(mut stream) = idle.pop_front() {
            match self.active_test(&mut stream).await {
                Ok(()) => alive.push_back(stream),
                Err(e) => {
                    self.live.fetch_sub(1, Ordering::AcqRel);
                    warn!(addr = %self.addr, error = %e, "evicting idle connection");
                }
            }
        }
        *idle = alive;
    }

    async fn active_test(&self, stream: &mut TcpStream) -> Result<()> {
        match tokio::time::timeout(self.connect_timeout, active_test_exchange(stream)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "active test timed out").into()),
        }
    }
}

async fn active_test_exchange(stream: &mut TcpStream) -> Result<()> {
    write_header(&mut *stream, &Header::new(cmd::ACTIVE_TEST, 0)).await?;
    let header = read_response_header(&mut *stream).await?;
    if header.payload_len != 0 {
        return Err(FdfsError::Protocol(format!(
            "active test response carries {} payload bytes",
            header.payload_len
        )));
    }
    Ok(())
}

async fn active_test_loop(weak: Weak<PoolInner>, shutdown: CancellationToken, every: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let Some(pool) = weak.upgrade() else { break };
                pool.check_idle().await;
            }
        }
    }
    debug!("active test loop stopped");
}

/// A connection checked out of a [`ConnPool`]
pub struct PooledConn {
    // Only taken by `release` and `Drop`, both of which end the handle's life
    stream: Option<TcpStream>,
    pool: Arc<PoolInner>,
}

impl PooledConn {
    fn new(stream: TcpStream, pool: Arc<PoolInner>) -> Self {
        Self {
            stream: Some(stream),
            pool,
        }
    }

    /// Return the connection to its pool's idle list without closing it
    pub async fn release(mut self) {
        if let Some(stream) = self.stream.take() {
            self.pool.put(stream).await;
        }
    }

    /// Remote address of the owning pool
    pub fn addr(&self) -> &str {
        &self.pool.addr
    }
}

impl Deref for PooledConn {
    type Target = TcpStream;

    fn deref(&self) -> &TcpStream {
        // `release` consumes the handle, so the stream is always present here
        self.stream.as_ref().expect("connection used after release")
    }
}

impl DerefMut for PooledConn {
    fn deref_mut(&mut self) -> &mut TcpStream {
        self.stream.as_mut().expect("connection used after release")
    }
}

impl Drop for PooledConn {
    fn drop(&mut self) {
        if self.stream.take().is_some() {
            self.pool.live.fetch_sub(1, Ordering::AcqRel);
            debug!(addr = %self.pool.addr, "discarding unreleased connection");
        }
    }
}
