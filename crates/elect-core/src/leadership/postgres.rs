//! PostgreSQL lock store using session-scoped advisory locks.
//!
//! # How it works
//!
//! - `pg_try_advisory_lock(key)` for non-blocking acquisition
//! - `pg_advisory_unlock(key)` for explicit release
//! - Lock keys are the `i64` keys from [`LockId`]
//!
//! # Connection Management
//!
//! Advisory locks belong to the database session that took them. Running
//! acquire and release as independent pooled queries could land them on
//! different connections, so every [`PgLockSession`] detaches one connection
//! from the pool and owns it until it is closed. The pool never sees that
//! connection again, and closing it ends the session, which makes the
//! server drop any lock still held.
//!
//! PostgreSQL advisory locks are re-entrant: taking one twice in the same
//! session needs two unlocks. The session therefore remembers which keys it
//! holds and answers repeated acquires for them with a liveness probe
//! instead of a second `pg_try_advisory_lock`.
//!
//! # Example
//!
//! ```rust,ignore
//! use elect_core::leadership::{LeaderElector, ElectorConfig, LockPurpose, PgAdvisoryLockStore};
//! use std::sync::Arc;
//!
//! async fn example(pool: sqlx::PgPool) {
//!     let store = Arc::new(PgAdvisoryLockStore::new(pool));
//!     let elector = LeaderElector::new(
//!         LockPurpose::JobsScheduler.lock_id(),
//!         store,
//!         ElectorConfig::new("my-instance"),
//!     );
//!
//!     elector.start(|| println!("leading"), || println!("following"));
//!     // ...
//!     elector.stop().await;
//! }
//! ```

use super::{AdvisoryLockStore, LeaderElectionError, LockId, LockSession};
use async_trait::async_trait;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::Connection;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};

/// Options for the connection pool sessions are detached from.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Maximum time to wait for a connection.
    pub acquire_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        let acquire_timeout_secs = std::env::var("DATABASE_ACQUIRE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        Self {
            max_connections,
            acquire_timeout: Duration::from_secs(acquire_timeout_secs),
        }
    }
}

/// PostgreSQL-backed [`AdvisoryLockStore`].
#[derive(Debug, Clone)]
pub struct PgAdvisoryLockStore {
    pool: PgPool,
}

impl PgAdvisoryLockStore {
    /// Wraps an existing pool.
    ///
    /// Each elector checks one connection out of this pool and detaches it,
    /// so pinned sessions do not count against `max_connections`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a dedicated pool for lock sessions.
    pub async fn connect(
        database_url: &str,
        options: PoolOptions,
    ) -> Result<Self, LeaderElectionError> {
        if !(database_url.starts_with("postgres://") || database_url.starts_with("postgresql://"))
        {
            return Err(LeaderElectionError::invalid_config(format!(
                "Unsupported database URL scheme. Expected postgres://, got: {}",
                database_url.split(':').next().unwrap_or("unknown")
            )));
        }

        info!("Creating PostgreSQL connection pool for advisory locks");
        let pool = PgPoolOptions::new()
            .max_connections(options.max_connections)
            .min_connections(0)
            .acquire_timeout(options.acquire_timeout)
            .connect(database_url)
            .await
            .map_err(convert_sqlx_error)?;

        Ok(Self::new(pool))
    }

    /// Returns the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Convert sqlx errors to LeaderElectionError.
fn convert_sqlx_error(err: sqlx::Error) -> LeaderElectionError {
    match &err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            LeaderElectionError::connection(err.to_string())
        }
        sqlx::Error::Protocol(_) | sqlx::Error::Tls(_) => {
            LeaderElectionError::connection(err.to_string())
        }
        _ => LeaderElectionError::query(err.to_string()),
    }
}

#[async_trait]
impl AdvisoryLockStore for PgAdvisoryLockStore {
    async fn open_session(&self) -> Result<Box<dyn LockSession>, LeaderElectionError> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(convert_sqlx_error)?
            .detach();

        debug!("Opened dedicated advisory lock session");

        Ok(Box::new(PgLockSession {
            conn: Some(conn),
            held: HashSet::new(),
        }))
    }
}

/// A detached PostgreSQL connection used for advisory locks.
pub struct PgLockSession {
    conn: Option<PgConnection>,
    held: HashSet<i64>,
}

impl std::fmt::Debug for PgLockSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgLockSession")
            .field("open", &self.conn.is_some())
            .field("held", &self.held)
            .finish()
    }
}

impl PgLockSession {
    fn conn(&mut self) -> Result<&mut PgConnection, LeaderElectionError> {
        self.conn.as_mut().ok_or(LeaderElectionError::SessionClosed)
    }
}

#[async_trait]
impl LockSession for PgLockSession {
    async fn try_lock(&mut self, id: LockId) -> Result<bool, LeaderElectionError> {
        let key = id.key();

        if self.held.contains(&key) {
            // The lock lives as long as this session; a live session still holds it.
            let conn = self.conn()?;
            sqlx::query("SELECT 1")
                .execute(&mut *conn)
                .await
                .map_err(convert_sqlx_error)?;
            return Ok(true);
        }

        let conn = self.conn()?;
        let (acquired,): (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
            .bind(key)
            .fetch_one(&mut *conn)
            .await
            .map_err(convert_sqlx_error)?;

        if acquired {
            self.held.insert(key);
            debug!(lock = %id.name(), lock_key = key, "Acquired advisory lock");
        } else {
            debug!(
                lock = %id.name(),
                lock_key = key,
                "Advisory lock held by another session"
            );
        }

        Ok(acquired)
    }

    async fn unlock(&mut self, id: LockId) -> Result<bool, LeaderElectionError> {
        let key = id.key();
        let conn = self.conn()?;

        let (released,): (bool,) = sqlx::query_as("SELECT pg_advisory_unlock($1)")
            .bind(key)
            .fetch_one(&mut *conn)
            .await
            .map_err(convert_sqlx_error)?;

        self.held.remove(&key);
        debug!(
            lock = %id.name(),
            lock_key = key,
            released = released,
            "Advisory unlock issued"
        );

        Ok(released)
    }

    async fn close(mut self: Box<Self>) -> Result<(), LeaderElectionError> {
        self.held.clear();
        match self.conn.take() {
            Some(conn) => conn.close().await.map_err(convert_sqlx_error),
            None => Ok(()),
        }
    }
}
