use super::CatalogSource;
use crate::models::{ClassificationCategory, RemoteListing};
use crate::service_result::{summarize, ErrorKind, ServiceResult};
use std::sync::Arc;
use tracing::{debug, warn};

/// Decides whether an app is multiplayer from its store categories.
#[derive(Clone)]
pub struct ClassificationService {
    source: Arc<dyn CatalogSource>,
}

impl ClassificationService {
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        Self { source }
    }

    /// `true` when the app carries the multiplayer category. A failed lookup
    /// comes back as a `Classification` error; callers treat it as "unknown".
    pub async fn classify(&self, item: &RemoteListing) -> ServiceResult<bool> {
        debug!(app_id = %item.app_id, "classifying app");
        let details = self.source.get_details(&item.app_id).await;
        if !details.is_success() {
            warn!(
                app_id = %item.app_id,
                errors = %summarize(details.errors()),
                "could not determine multiplayer status"
            );
            return details
                .map(|_| false)
                .recast(ErrorKind::Classification, &format!("app {}", item.app_id));
        }
        let multiplayer = details.map(|c| c.contains(&ClassificationCategory::Multiplayer));
        if let Some(m) = multiplayer.data() {
            debug!(app_id = %item.app_id, multiplayer = *m, "app classified");
        }
        multiplayer
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::service_result::ErrorDetail;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    /// Canned list and detail responses.
    #[derive(Default)]
    pub struct StubSource {
        pub listing: Vec<RemoteListing>,
        pub list_error: Option<ErrorDetail>,
        /// app id -> categories; ids missing here fail with an `Api` error.
        pub details: HashMap<String, Vec<ClassificationCategory>>,
        pub detail_calls: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl CatalogSource for StubSource {
        async fn list_all(&self) -> ServiceResult<Vec<RemoteListing>> {
            match &self.list_error {
                Some(e) => ServiceResult::failure(vec![e.clone()]),
                None => ServiceResult::success(self.listing.clone()),
            }
        }

        async fn get_details(
            &self,
            app_id: &str,
        ) -> ServiceResult<HashSet<ClassificationCategory>> {
            self.detail_calls.lock().unwrap().push(app_id.to_string());
            match self.details.get(app_id) {
                Some(c) => ServiceResult::success(c.iter().copied().collect()),
                None => ServiceResult::fail(ErrorKind::Api, "status 503"),
            }
        }
    }
}
