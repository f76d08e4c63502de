pub mod classify;
pub mod client;

use crate::models::{ClassificationCategory, RemoteListing};
use crate::service_result::ServiceResult;
use std::collections::HashSet;

pub use classify::ClassificationService;
pub use client::{mask_api_key, SteamCatalogClient};

/// Source of the authoritative app list and per-app details.
#[async_trait::async_trait]
pub trait CatalogSource: Send + Sync {
    async fn list_all(&self) -> ServiceResult<Vec<RemoteListing>>;

    async fn get_details(&self, app_id: &str) -> ServiceResult<HashSet<ClassificationCategory>>;
}
