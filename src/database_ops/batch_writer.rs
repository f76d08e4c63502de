use crate::config::RetryPolicy;
use crate::database_ops::store::{CatalogStore, MAX_BATCH_SIZE};
use crate::models::CatalogEntry;
use crate::service_result::{ErrorDetail, ErrorKind, ServiceResult};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Chunks writes to the store's batch limit and resubmits whatever the store
/// reports as unprocessed.
#[derive(Clone)]
pub struct BatchWriter {
    store: Arc<dyn CatalogStore>,
    retry: RetryPolicy,
}

impl BatchWriter {
    pub fn new(store: Arc<dyn CatalogStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Persists `items`. Invalid items are dropped with a `Persistence`
    /// error, every other item is still attempted.
    pub async fn write(&self, items: Vec<CatalogEntry>) -> ServiceResult<()> {
        let mut errors: Vec<ErrorDetail> = Vec::new();
        let mut valid: Vec<CatalogEntry> = Vec::with_capacity(items.len());
        for item in items {
            match validate(&item) {
                Ok(()) => valid.push(item),
                Err(e) => {
                    warn!(app_id = %item.app_id, error = %e, "dropping invalid catalog entry");
                    errors.push(e);
                }
            }
        }

        let chunk_count = valid.len().div_ceil(MAX_BATCH_SIZE);
        info!(items = valid.len(), chunks = chunk_count, "writing catalog entries");
        let mut written = 0usize;
        for (idx, chunk) in valid.chunks(MAX_BATCH_SIZE).enumerate() {
            let mut chunk_errors = self.write_chunk(idx, chunk).await;
            written += chunk.len().saturating_sub(chunk_errors.len());
            errors.append(&mut chunk_errors);
        }

        if errors.is_empty() {
            info!(written, "catalog entries persisted");
            ServiceResult::success(())
        } else {
            error!(written, failed = errors.len(), "catalog write finished with errors");
            ServiceResult::failure(errors)
        }
    }

    /// Returns one error per item of `chunk` that did not get written.
    async fn write_chunk(&self, idx: usize, chunk: &[CatalogEntry]) -> Vec<ErrorDetail> {
        let mut errors: Vec<ErrorDetail> = Vec::new();
        let mut pending: Vec<CatalogEntry> = chunk.to_vec();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let outcome = match self.store.batch_put(&pending).await {
                Ok(o) => o,
                Err(e) => {
                    error!(chunk = idx, attempt, error = %e, "batch submission failed");
                    errors.extend(pending.iter().map(|item| {
                        ErrorDetail::new(
                            ErrorKind::Persistence,
                            format!("app {} (id {}): batch submission failed: {e:#}", item.app_id, item.id),
                        )
                    }));
                    return errors;
                }
            };
            for (item, reason) in &outcome.rejected {
                warn!(chunk = idx, app_id = %item.app_id, reason = %reason, "store rejected catalog entry");
                errors.push(ErrorDetail::new(
                    ErrorKind::Persistence,
                    format!("app {} (id {}): rejected by store: {reason}", item.app_id, item.id),
                ));
            }
            let unprocessed = outcome.unprocessed;
            if unprocessed.is_empty() {
                debug!(chunk = idx, attempts = attempt, "chunk done");
                return errors;
            }
            if attempt >= self.retry.max_attempts {
                error!(
                    chunk = idx,
                    attempts = attempt,
                    unprocessed = unprocessed.len(),
                    "giving up on unprocessed items"
                );
                errors.extend(unprocessed.iter().map(|item| {
                    ErrorDetail::new(
                        ErrorKind::Persistence,
                        format!(
                            "app {} (id {}): still unprocessed after {attempt} attempts",
                            item.app_id, item.id
                        ),
                    )
                }));
                return errors;
            }
            let delay = self.retry.delay_for(attempt);
            warn!(
                chunk = idx,
                attempt,
                unprocessed = unprocessed.len(),
                delay_ms = delay.as_millis() as u64,
                "store reported unprocessed items; resubmitting"
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            pending = unprocessed;
        }
    }
}

fn validate(item: &CatalogEntry) -> Result<(), ErrorDetail> {
    if item.id.trim().is_empty() {
        return Err(ErrorDetail::new(
            ErrorKind::Persistence,
            format!("app {}: entry has no id", item.app_id),
        ));
    }
    if item.app_id.trim().is_empty() {
        return Err(ErrorDetail::new(
            ErrorKind::Persistence,
            format!("entry {}: entry has no appid", item.id),
        ));
    }
    // Postgres text columns cannot store NUL.
    if [&item.id, &item.app_id, &item.name].iter().any(|s| s.contains('\0')) {
        return Err(ErrorDetail::new(
            ErrorKind::Persistence,
            format!("app {} (id {}): entry contains a NUL byte", item.app_id.escape_debug(), item.id.escape_debug()),
        ));
    }
    Ok(())
}
