//! Connection pool implementation.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;

use fourd_client::{Config, Connection, Params, ResultSet};

use crate::config::PoolConfig;
use crate::error::PoolError;

/// A connection pool for a 4D SQL server.
///
/// Connections are created lazily up to the configured maximum. A
/// connection handed back on drop is kept idle for reuse; connections
/// that went dead in use are discarded instead of being reissued.
pub struct Pool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    connection_config: Config,
    config: PoolConfig,
    /// Caps live connections (in use plus being established) at
    /// `max_connections`.
    semaphore: Arc<Semaphore>,
    idle: Mutex<Vec<Connection>>,
    closed: Mutex<bool>,
}

impl Pool {
    /// Create a pool over the given connection configuration.
    ///
    /// No connections are established up front.
    #[must_use]
    pub fn new(connection_config: Config, config: PoolConfig) -> Self {
        let permits = config.max_connections as usize;
        Self {
            inner: Arc::new(PoolInner {
                connection_config,
                config,
                semaphore: Arc::new(Semaphore::new(permits)),
                idle: Mutex::new(Vec::new()),
                closed: Mutex::new(false),
            }),
        }
    }

    /// Get a connection from the pool.
    ///
    /// Returns an idle connection when one is available, otherwise logs in
    /// a new one if the pool is under capacity. At capacity, waits until a
    /// connection is returned or the acquisition timeout elapses.
    pub async fn get(&self) -> Result<PooledConnection, PoolError> {
        if *self.inner.closed.lock() {
            return Err(PoolError::PoolClosed);
        }

        tracing::trace!("acquiring connection from pool");
        let acquire_timeout = self.inner.config.acquire_timeout;
        let permit = timeout(
            acquire_timeout,
            Arc::clone(&self.inner.semaphore).acquire_owned(),
        )
        .await
        .map_err(|_| PoolError::AcquisitionTimeout(acquire_timeout))?
        .map_err(|_| PoolError::PoolClosed)?;

        let reused = loop {
            match self.inner.idle.lock().pop() {
                None => break None,
                Some(connection) if connection.is_connected() => break Some(connection),
                Some(_stale) => tracing::debug!("discarding stale idle connection"),
            }
        };
        let connection = match reused {
            Some(connection) => connection,
            None => Connection::connect(self.inner.connection_config.clone())
                .await
                .map_err(PoolError::ConnectionCreation)?,
        };

        Ok(PooledConnection {
            connection: Some(connection),
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    /// Execute a statement on a pooled connection.
    ///
    /// Leases a connection, runs the query, and returns the connection to
    /// the pool.
    pub async fn query(&self, sql: &str, params: &Params) -> Result<ResultSet, PoolError> {
        let mut connection = self.get().await?;
        Ok(connection.query(sql, params).await?)
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let max = self.inner.config.max_connections;
        let available = self.inner.idle.lock().len() as u32;
        let in_use = max.saturating_sub(self.inner.semaphore.available_permits() as u32);
        PoolStatus {
            available,
            in_use,
            total: available + in_use,
            max,
        }
    }

    /// Close the pool, logging out and dropping all idle connections.
    ///
    /// Connections currently in use are dropped when their handles are.
    pub async fn close(&self) {
        *self.inner.closed.lock() = true;
        self.inner.semaphore.close();

        let idle: Vec<Connection> = std::mem::take(&mut *self.inner.idle.lock());
        for connection in idle {
            if let Err(error) = connection.close().await {
                tracing::debug!(%error, "error closing pooled connection");
            }
        }
        tracing::info!("connection pool closed");
    }

    /// Check if the pool is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.inner.closed.lock()
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }
}

impl Clone for Pool {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.status();
        f.debug_struct("Pool")
            .field("available", &status.available)
            .field("in_use", &status.in_use)
            .field("max", &status.max)
            .finish()
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy)]
pub struct PoolStatus {
    /// Number of idle connections available.
    pub available: u32,
    /// Number of connections currently in use.
    pub in_use: u32,
    /// Total number of connections.
    pub total: u32,
    /// Maximum allowed connections.
    pub max: u32,
}

/// A connection retrieved from the pool.
///
/// Dereferences to [`Connection`]. When dropped, a still-connected
/// connection is returned to the pool; a dead one is discarded.
pub struct PooledConnection {
    /// Present from acquisition until drop or detach.
    connection: Option<Connection>,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection").finish_non_exhaustive()
    }
}

// The connection is only vacated by detach() and Drop, both of which
// consume the handle.
#[allow(clippy::expect_used)]
impl PooledConnection {
    /// Detach the connection from the pool.
    ///
    /// The caller takes ownership; the connection will not be returned to
    /// the pool, and its capacity slot is released.
    #[must_use]
    pub fn detach(mut self) -> Connection {
        self.connection.take().expect("connection present until drop")
    }
}

#[allow(clippy::expect_used)]
impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.connection.as_ref().expect("connection present until drop")
    }
}

#[allow(clippy::expect_used)]
impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.connection.as_mut().expect("connection present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        if *self.pool.closed.lock() || !connection.is_connected() {
            tracing::trace!("discarding connection instead of returning it");
            return;
        }
        self.pool.idle.lock().push(connection);
        tracing::trace!("returning connection to pool");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_get_after_close_fails() {
        let pool = Pool::new(Config::default(), PoolConfig::default());
        pool.close().await;
        assert!(pool.is_closed());
        assert!(matches!(pool.get().await, Err(PoolError::PoolClosed)));
    }

    #[tokio::test]
    async fn test_acquisition_times_out_at_capacity() {
        let config = PoolConfig::new()
            .max_connections(0)
            .acquire_timeout(Duration::from_millis(20));
        let pool = Pool::new(Config::default(), config);
        let err = pool.get().await.unwrap_err();
        assert!(matches!(err, PoolError::AcquisitionTimeout(_)));
    }

    #[test]
    fn test_fresh_pool_status() {
        let pool = Pool::new(Config::default(), PoolConfig::new().max_connections(4));
        let status = pool.status();
        assert_eq!(status.available, 0);
        assert_eq!(status.in_use, 0);
        assert_eq!(status.total, 0);
        assert_eq!(status.max, 4);
    }
}
