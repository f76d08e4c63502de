//! One sync run: scan the catalog table, fetch the Steam app list, diff,
//! classify the new apps and persist them.
use crate::config::RetryPolicy;
use crate::database_ops::batch_writer::BatchWriter;
use crate::database_ops::diff::diff;
use crate::database_ops::steam::{CatalogSource, ClassificationService};
use crate::database_ops::store::CatalogStore;
use crate::models::{CatalogEntry, RemoteListing};
use crate::service_result::{summarize, ErrorDetail, ErrorKind, ServiceResult};
use chrono::Utc;
use futures::{stream, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    CompletedSuccessfully,
    TerminatedFatalError,
}

/// Counts and errors of one run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub state: RunState,
    pub persisted: usize,
    pub remote: usize,
    pub new_items: usize,
    pub classified: usize,
    pub classification_failures: usize,
    pub written: usize,
    pub errors: Vec<ErrorDetail>,
}

impl SyncReport {
    fn started() -> Self {
        Self {
            state: RunState::CompletedSuccessfully,
            persisted: 0,
            remote: 0,
            new_items: 0,
            classified: 0,
            classification_failures: 0,
            written: 0,
            errors: Vec::new(),
        }
    }

    fn fatal(mut self, errors: &[ErrorDetail]) -> Self {
        self.state = RunState::TerminatedFatalError;
        self.errors.extend_from_slice(errors);
        self
    }

    pub fn is_success(&self) -> bool {
        self.state == RunState::CompletedSuccessfully
    }
}

pub struct Synchronizer {
    store: Arc<dyn CatalogStore>,
    source: Arc<dyn CatalogSource>,
    classifier: ClassificationService,
    writer: BatchWriter,
    classify_concurrency: usize,
}

impl Synchronizer {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        source: Arc<dyn CatalogSource>,
        retry: RetryPolicy,
        classify_concurrency: usize,
    ) -> Self {
        Self {
            classifier: ClassificationService::new(source.clone()),
            writer: BatchWriter::new(store.clone(), retry),
            store,
            source,
            classify_concurrency: classify_concurrency.max(1),
        }
    }

    pub async fn run(&self) -> SyncReport {
        let mut report = SyncReport::started();

        info!("retrieving all persisted games");
        let persisted = match self.store.scan_all().await {
            Ok(rows) => rows,
            Err(e) => {
                let detail =
                    ErrorDetail::new(ErrorKind::Persistence, format!("scan of persisted games failed: {e:#}"));
                error!(error = %detail, "sync aborted while scanning persisted games");
                return report.fatal(&[detail]);
            }
        };
        report.persisted = persisted.len();
        info!(count = persisted.len(), "persisted games retrieved");

        let remote = self.source.list_all().await;
        let remote = match remote.into_result() {
            Ok(apps) => apps,
            Err(errors) => {
                error!(errors = %summarize(&errors), "sync aborted while fetching the steam app list");
                return report.fatal(&errors);
            }
        };
        report.remote = remote.len();

        let new_items = diff(&persisted, &remote);
        report.new_items = new_items.len();
        info!(count = new_items.len(), "new games found");
        if new_items.is_empty() {
            info!("catalog already up to date");
            return report;
        }

        let entries = self.classify_all(new_items, &mut report).await;

        let written = self.writer.write(entries.clone()).await;
        let persist_errors = written.errors().len();
        report.written = entries.len().saturating_sub(persist_errors);
        if !written.is_success() {
            error!(
                written = report.written,
                failed = persist_errors,
                "sync finished with persistence errors"
            );
            return report.fatal(written.errors());
        }

        info!(
            written = report.written,
            classified = report.classified,
            classification_failures = report.classification_failures,
            "sync completed"
        );
        report
    }

    /// Classifies new listings and turns them into entries with fresh ids.
    /// Failed lookups leave `multiplayer` unset and are recorded, not raised.
    async fn classify_all(
        &self,
        new_items: Vec<RemoteListing>,
        report: &mut SyncReport,
    ) -> Vec<CatalogEntry> {
        let classifier = &self.classifier;
        let results: Vec<(RemoteListing, ServiceResult<bool>)> = stream::iter(new_items)
            .map(|item| async move {
                let result = classifier.classify(&item).await;
                (item, result)
            })
            .buffer_unordered(self.classify_concurrency)
            .collect()
            .await;

        let mut entries = Vec::with_capacity(results.len());
        for (item, result) in results {
            let mut entry = CatalogEntry::from_listing(generate_id(), item);
            match result.into_result() {
                Ok(multiplayer) => {
                    entry.multiplayer = Some(multiplayer);
                    report.classified += 1;
                }
                Err(errors) => {
                    warn!(app_id = %entry.app_id, "persisting without multiplayer status");
                    report.classification_failures += 1;
                    report.errors.extend(errors);
                }
            }
            entries.push(entry);
        }
        entries
    }
}

/// Random token plus creation time in epoch millis.
pub fn generate_id() -> String {
    format!("{}-{}", Uuid::new_v4(), Utc::now().timestamp_millis())
}
