use anyhow::{Context, Result};
use std::process::ExitCode;
use std::sync::Arc;
use steam_catalog_sync::config::SyncConfig;
use steam_catalog_sync::database_ops::db::{Db, RUN_LOCK_KEY};
use steam_catalog_sync::database_ops::steam::SteamCatalogClient;
use steam_catalog_sync::database_ops::store::PgCatalogStore;
use steam_catalog_sync::tracing::init_tracing;
use steam_catalog_sync::orchestrator::{SyncReport, Synchronizer};
use steam_catalog_sync::secrets::EnvSecretProvider;
use steam_catalog_sync::util::env;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    env::init_env();
    if let Err(e) = init_tracing("info") {
        eprintln!("{e}");
    }

    match run().await {
        Ok(Some(report)) if report.is_success() => ExitCode::SUCCESS,
        Ok(Some(_)) => ExitCode::FAILURE,
        // Another run holds the lock; nothing to do.
        Ok(None) => ExitCode::SUCCESS,
        Err(e) => {
            let chain = format!("{e:#}");
            error!(error = %chain, "catalog sync failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<Option<SyncReport>> {
    env::preflight_check(
        "catalog-sync",
        &[],
        &[
            "DATABASE_URL",
            "DB_URL",
            "DB_MAX_CONNS",
            "CATALOG_TABLE",
            "STEAM_API_ADDRESS",
            "STEAM_STORE_ADDRESS",
            "STEAM_HTTP_TIMEOUT_SECS",
            "STEAM_RATE_LIMIT_DELAYS",
            "CLASSIFY_CONCURRENCY",
            "PERSIST_MAX_ATTEMPTS",
            "PERSIST_BACKOFF_BASE_MS",
            "PERSIST_BACKOFF_MAX_MS",
            "AUTO_MIGRATE",
            "SYNC_RUN_LOCK",
        ],
    )?;
    let config = SyncConfig::from_env()?;

    let db = Db::connect(&config.store.database_url, config.store.max_connections).await?;
    let store = PgCatalogStore::new(db.clone(), &config.store.table)?;
    if config.store.auto_migrate {
        store.ensure_schema().await?;
    } else {
        info!("AUTO_MIGRATE disabled; skipping schema setup");
    }

    let lock = if config.store.run_lock {
        match db.try_run_lock(RUN_LOCK_KEY).await? {
            Some(lock) => Some(lock),
            None => {
                warn!("another catalog sync holds the run lock; exiting");
                return Ok(None);
            }
        }
    } else {
        None
    };

    let client = SteamCatalogClient::new(config.steam.clone(), Arc::new(EnvSecretProvider))
        .context("failed to build steam http client")?;
    let synchronizer = Synchronizer::new(
        Arc::new(store),
        Arc::new(client),
        config.retry.clone(),
        config.classify_concurrency,
    );

    let report = synchronizer.run().await;
    info!(
        state = ?report.state,
        persisted = report.persisted,
        remote = report.remote,
        new_items = report.new_items,
        classified = report.classified,
        classification_failures = report.classification_failures,
        written = report.written,
        errors = report.errors.len(),
        "catalog sync finished"
    );

    if let Some(lock) = lock {
        if let Err(e) = lock.release().await {
            warn!(error = %e, "failed to release run lock");
        }
    }
    Ok(Some(report))
}
