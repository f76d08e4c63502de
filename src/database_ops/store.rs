use crate::database_ops::db::Db;
use crate::models::CatalogEntry;
use anyhow::{anyhow, bail, Context, Result};
use sqlx::{Postgres, QueryBuilder};
use tracing::{info, warn};

/// Upper bound on items per `batch_put` call.
pub const MAX_BATCH_SIZE: usize = 25;

/// Persisted catalog: enumerate everything, put many with partial failure.
#[async_trait::async_trait]
pub trait CatalogStore: Send + Sync {
    async fn scan_all(&self) -> Result<Vec<CatalogEntry>>;

    /// Writes at most [`MAX_BATCH_SIZE`] items. Items held back by transient
    /// capacity limits come back as `unprocessed`; items the store refused
    /// on their own come back as `rejected`. `Err` means the submission
    /// failed outright.
    async fn batch_put(&self, items: &[CatalogEntry]) -> Result<BatchPutOutcome>;
}

/// Per-item result of one `batch_put` call. Anything not listed was written.
#[derive(Debug, Default)]
pub struct BatchPutOutcome {
    pub unprocessed: Vec<CatalogEntry>,
    pub rejected: Vec<(CatalogEntry, String)>,
}

impl BatchPutOutcome {
    pub fn written() -> Self {
        Self::default()
    }

    pub fn unprocessed(items: Vec<CatalogEntry>) -> Self {
        Self {
            unprocessed: items,
            rejected: Vec::new(),
        }
    }
}

/// Postgres-backed catalog table.
#[derive(Clone)]
pub struct PgCatalogStore {
    db: Db,
    table: String,
}

impl PgCatalogStore {
    pub fn new(db: Db, table: &str) -> Result<Self> {
        if !is_plain_identifier(table) {
            bail!("invalid catalog table name {table:?}");
        }
        Ok(Self {
            db,
            table: table.to_string(),
        })
    }

    /// Creates the table and its app id index if missing.
    pub async fn ensure_schema(&self) -> Result<()> {
        let create = format!(
            "CREATE TABLE IF NOT EXISTS {t} (\
                id TEXT PRIMARY KEY, \
                appid TEXT NOT NULL, \
                name TEXT NOT NULL, \
                multiplayer BOOLEAN NULL)",
            t = self.table
        );
        sqlx::query(&create)
            .persistent(false)
            .execute(&self.db.pool)
            .await
            .with_context(|| format!("create table {}", self.table))?;
        let index_name = format!("{}_appid_lower_idx", self.table.replace('.', "_"));
        let index = format!(
            "CREATE INDEX IF NOT EXISTS {index_name} ON {t} (lower(appid))",
            t = self.table
        );
        sqlx::query(&index)
            .persistent(false)
            .execute(&self.db.pool)
            .await
            .with_context(|| format!("create index {index_name}"))?;
        info!(table = %self.table, "catalog schema ensured");
        Ok(())
    }
}

#[async_trait::async_trait]
impl CatalogStore for PgCatalogStore {
    async fn scan_all(&self) -> Result<Vec<CatalogEntry>> {
        let sql = format!("SELECT id, appid, name, multiplayer FROM {}", self.table);
        let rows = sqlx::query_as::<_, CatalogEntry>(&sql)
            .persistent(false)
            .fetch_all(&self.db.pool)
            .await
            .with_context(|| format!("scan {}", self.table))?;
        Ok(rows)
    }

    async fn batch_put(&self, items: &[CatalogEntry]) -> Result<BatchPutOutcome> {
        if items.is_empty() {
            return Ok(BatchPutOutcome::written());
        }
        if items.len() > MAX_BATCH_SIZE {
            return Err(anyhow!(
                "batch of {} exceeds limit of {MAX_BATCH_SIZE}",
                items.len()
            ));
        }

        match self.insert_rows(items).await {
            Ok(()) => Ok(BatchPutOutcome::written()),
            Err(e) if is_transient(&e) => {
                warn!(error = %e, count = items.len(), "batch put throttled; reporting unprocessed");
                Ok(BatchPutOutcome::unprocessed(items.to_vec()))
            }
            Err(e) if items.len() == 1 => Ok(BatchPutOutcome {
                unprocessed: Vec::new(),
                rejected: vec![(items[0].clone(), e.to_string())],
            }),
            Err(e) => {
                // A single bad row fails the whole statement.
                warn!(error = %e, count = items.len(), "batch insert rejected; falling back to single rows");
                let mut outcome = BatchPutOutcome::default();
                for item in items {
                    match self.insert_rows(std::slice::from_ref(item)).await {
                        Ok(()) => {}
                        Err(e) if is_transient(&e) => outcome.unprocessed.push(item.clone()),
                        Err(e) => outcome.rejected.push((item.clone(), e.to_string())),
                    }
                }
                Ok(outcome)
            }
        }
    }
}

impl PgCatalogStore {
    async fn insert_rows(&self, items: &[CatalogEntry]) -> std::result::Result<(), sqlx::Error> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "INSERT INTO {} (id, appid, name, multiplayer) ",
            self.table
        ));
        qb.push_values(items, |mut b, e| {
            b.push_bind(e.id.clone())
                .push_bind(e.app_id.clone())
                .push_bind(e.name.clone())
                .push_bind(e.multiplayer);
        });
        qb.push(" ON CONFLICT (id) DO NOTHING");
        qb.build().persistent(false).execute(&self.db.pool).await?;
        Ok(())
    }
}

/// Failures worth resubmitting: pool exhaustion, I/O, and Postgres
/// serialization / deadlock / connection-capacity codes.
fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db) => matches!(
            db.code().as_deref(),
            Some("40001" | "40P01" | "53300" | "57P03")
        ),
        _ => false,
    }
}

/// `name` or `schema.name`, ASCII letters, digits and underscores only.
fn is_plain_identifier(s: &str) -> bool {
    let part_ok = |p: &str| {
        let mut chars = p.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    let parts: Vec<&str> = s.split('.').collect();
    (1..=2).contains(&parts.len()) && parts.into_iter().all(part_ok)
}
