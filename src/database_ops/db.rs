use anyhow::{Context, Result};
use sqlx::{
    pool::PoolConnection,
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool, Postgres,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Advisory lock id held for the duration of a sync run.
pub const RUN_LOCK_KEY: i64 = 0x5354_4541_4d43_4154;

#[derive(Clone)]
pub struct Db {
    pub pool: PgPool,
}

impl Db {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        // PgBouncer txn mode safe
        let connect_options = PgConnectOptions::from_str(database_url)
            .context("invalid database url")?
            .statement_cache_capacity(0);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(connect_options)
            .await
            .context("failed to connect to database")?;
        info!("connected to db");
        Ok(Self { pool })
    }

    /// Takes the session advisory lock on a dedicated connection. `None` means
    /// another run currently holds it.
    pub async fn try_run_lock(&self, key: i64) -> Result<Option<RunLock>> {
        let mut conn = self.pool.acquire().await?;
        let locked: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
            .persistent(false)
            .bind(key)
            .fetch_one(&mut *conn)
            .await
            .context("pg_try_advisory_lock failed")?;
        if locked {
            Ok(Some(RunLock { conn, key }))
        } else {
            Ok(None)
        }
    }
}

/// Held advisory lock; released explicitly or when the connection closes.
pub struct RunLock {
    conn: PoolConnection<Postgres>,
    key: i64,
}

impl RunLock {
    pub async fn release(mut self) -> Result<()> {
        let released: bool = sqlx::query_scalar("SELECT pg_advisory_unlock($1)")
            .persistent(false)
            .bind(self.key)
            .fetch_one(&mut *self.conn)
            .await?;
        if !released {
            warn!(key = self.key, "run lock was not held at release");
        }
        Ok(())
    }
}
