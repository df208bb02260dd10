//! Reconnecting pool
//!
//! Holds the current pool and replaces it at most once per failed acquire.
//! Pool creation and teardown sit behind [`ConnectionSource`] so the policy
//! does not depend on a live server.

use crate::config::DbConfig;
use crate::db::connection::{init_pool, is_connection_error, DbPool};
use crate::error::{Result, SqlRagError};
use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::MySql;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Creates pools and hands out connections from them.
#[async_trait]
pub trait ConnectionSource: Send + Sync {
    type Pool: Clone + Send + Sync;
    type Conn: Send;

    async fn connect(&self) -> std::result::Result<Self::Pool, sqlx::Error>;

    async fn acquire(&self, pool: &Self::Pool) -> std::result::Result<Self::Conn, sqlx::Error>;

    /// Dispose of a replaced pool without blocking the caller.
    fn retire(&self, pool: Self::Pool);
}

pub struct MySqlSource {
    config: DbConfig,
}

impl MySqlSource {
    pub fn new(config: DbConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConnectionSource for MySqlSource {
    type Pool = DbPool;
    type Conn = PoolConnection<MySql>;

    async fn connect(&self) -> std::result::Result<DbPool, sqlx::Error> {
        info!(
            "Connecting to MySQL at {}:{}/{}",
            self.config.host, self.config.port, self.config.database
        );
        init_pool(&self.config).await
    }

    async fn acquire(&self, pool: &DbPool) -> std::result::Result<PoolConnection<MySql>, sqlx::Error> {
        pool.acquire().await
    }

    fn retire(&self, pool: DbPool) {
        // close() waits for checked-out connections to come back.
        tokio::spawn(async move { pool.close().await });
    }
}

struct PoolSlot<P> {
    generation: u64,
    pool: P,
}

pub struct ReconnectingPool<S: ConnectionSource> {
    source: S,
    slot: RwLock<Option<PoolSlot<S::Pool>>>,
}

impl<S: ConnectionSource> ReconnectingPool<S> {
    /// The first pool is created on first use.
    pub fn new(source: S) -> Self {
        Self {
            source,
            slot: RwLock::new(None),
        }
    }

    /// Acquire a connection, rebuilding the pool at most once on a
    /// connection-level failure. Other failures are returned as-is.
    pub async fn acquire(&self) -> Result<S::Conn> {
        let (generation, pool) = self.current_pool().await?;
        match self.source.acquire(&pool).await {
            Ok(conn) => Ok(conn),
            Err(e) if is_connection_error(&e) => {
                warn!("Database connection lost ({}), reconnecting once", e);
                let (_, pool) = self.reconnect(Some(generation)).await?;
                self.source.acquire(&pool).await.map_err(|e| {
                    SqlRagError::Execution(format!("Failed to connect to the database: {}", e))
                })
            }
            Err(e) => Err(SqlRagError::Execution(format!(
                "Failed to acquire a database connection: {}",
                e
            ))),
        }
    }

    async fn current_pool(&self) -> Result<(u64, S::Pool)> {
        if let Some(slot) = self.slot.read().await.as_ref() {
            return Ok((slot.generation, slot.pool.clone()));
        }
        self.reconnect(None).await
    }

    /// Install a new pool. `stale` is the generation the caller saw fail; if
    /// another request already replaced it, the newer pool is reused.
    async fn reconnect(&self, stale: Option<u64>) -> Result<(u64, S::Pool)> {
        let mut guard = self.slot.write().await;
        let generation = match guard.as_ref() {
            Some(slot) if stale != Some(slot.generation) => {
                return Ok((slot.generation, slot.pool.clone()));
            }
            Some(slot) => slot.generation + 1,
            None => 0,
        };

        let pool = self
            .source
            .connect()
            .await
            .map_err(|e| SqlRagError::Execution(format!("Failed to connect to the database: {}", e)))?;

        let replaced = guard.replace(PoolSlot {
            generation,
            pool: pool.clone(),
        });
        drop(guard);

        if let Some(old) = replaced {
            self.source.retire(old.pool);
        }
        Ok((generation, pool))
    }
}
