use super::CatalogSource;
use crate::config::SteamConfig;
use crate::models::{app_id_key, ClassificationCategory, RemoteListing};
use crate::secrets::{SecretProvider, STEAM_API_KEY_SECRET_ID};
use crate::service_result::{ErrorKind, ServiceResult};
use anyhow::Result;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

pub const STEAM_API_KEY_MASK: &str = "*************";
pub const KEY_QUERY_PARAM: &str = "key";
pub const APP_IDS_QUERY_PARAM: &str = "appids";
pub const GET_APP_LIST_ENDPOINT: &str = "/ISteamApps/GetAppList/v2/";
pub const GET_APP_DETAILS_ENDPOINT: &str = "/api/appdetails/";

#[derive(Debug, Deserialize)]
struct AppListResp {
    applist: AppList,
}

#[derive(Debug, Deserialize)]
struct AppList {
    #[serde(default)]
    apps: Vec<RemoteListing>,
}

#[derive(Debug, Deserialize)]
struct AppDetailsWrapper {
    #[serde(default)]
    success: bool,
    data: Option<AppCategories>,
}

#[derive(Debug, Deserialize)]
struct AppCategories {
    #[serde(default)]
    categories: Option<Vec<CategoryEntry>>,
}

#[derive(Debug, Deserialize)]
struct CategoryEntry {
    id: i64,
}

/// HTTP client for the Steam Web API (app list) and the store API (app details).
pub struct SteamCatalogClient {
    http: Client,
    config: SteamConfig,
    secrets: Arc<dyn SecretProvider>,
}

impl SteamCatalogClient {
    pub fn new(config: SteamConfig, secrets: Arc<dyn SecretProvider>) -> Result<Self> {
        let http = Client::builder()
            .user_agent("steam-catalog-sync/0.1")
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            http,
            config,
            secrets,
        })
    }

    fn endpoint(base: &str, path: &str) -> ServiceResult<Url> {
        let raw = format!("{}{}", base.trim_end_matches('/'), path);
        match Url::parse(&raw) {
            Ok(url) => ServiceResult::success(url),
            Err(e) => ServiceResult::fail(
                ErrorKind::Api,
                format!("could not build request url {raw}: {e}"),
            ),
        }
    }

    async fn get_with_backoff(&self, url: &Url) -> reqwest::Result<reqwest::Response> {
        let mut attempt: usize = 0;
        loop {
            let resp = self
                .http
                .get(url.clone())
                .header("Accept", "application/json")
                .send()
                .await?;
            if resp.status() != StatusCode::TOO_MANY_REQUESTS {
                return Ok(resp);
            }
            let Some(&delay) = self.config.rate_limit_delays.get(attempt) else {
                return Ok(resp);
            };
            let retry_after = resp
                .headers()
                .get("Retry-After")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or_default();
            let sleep_for = delay.max(retry_after);
            warn!(
                url = %sanitize_request_url(url),
                attempt = attempt + 1,
                sleep_secs = sleep_for.as_secs(),
                "steam: rate limited; backing off"
            );
            attempt += 1;
            tokio::time::sleep(sleep_for).await;
        }
    }

    /// Performs a GET and returns the body of a 200 response with content.
    async fn fetch_body(&self, url: &Url, what: &str) -> ServiceResult<String> {
        let safe_url = sanitize_request_url(url);
        debug!(url = %safe_url, "steam: requesting {what}");
        let resp = match self.get_with_backoff(url).await {
            Ok(resp) => resp,
            Err(e) => {
                return ServiceResult::fail(
                    ErrorKind::Api,
                    format!("{what} request to {safe_url} failed: {}", e.without_url()),
                )
            }
        };
        let status = resp.status();
        if status != StatusCode::OK {
            return ServiceResult::fail(
                ErrorKind::Api,
                format!("{what} request to {safe_url} responded with status {status}"),
            );
        }
        match resp.text().await {
            Ok(body) if !body.trim().is_empty() => ServiceResult::success(body),
            Ok(_) => ServiceResult::fail(
                ErrorKind::Api,
                format!("{what} response from {safe_url} contained no response body"),
            ),
            Err(e) => ServiceResult::fail(
                ErrorKind::Api,
                format!("{what} response from {safe_url} could not be read: {}", e.without_url()),
            ),
        }
    }

    /// Fetches every app currently listed by Steam.
    pub async fn list_all(&self) -> ServiceResult<Vec<RemoteListing>> {
        info!("steam: requesting full app list");
        // Resolved per call; the key is never held past this request.
        let key = match self.secrets.get_secret(STEAM_API_KEY_SECRET_ID).await {
            Ok(k) => k,
            Err(e) => {
                error!(secret = STEAM_API_KEY_SECRET_ID, error = %e, "steam: could not resolve api key");
                return ServiceResult::fail(
                    ErrorKind::SecretRetrieval,
                    format!("could not resolve secret {STEAM_API_KEY_SECRET_ID}: {e:#}"),
                );
            }
        };

        let mut url = match Self::endpoint(&self.config.api_address, GET_APP_LIST_ENDPOINT)
            .into_result()
        {
            Ok(url) => url,
            Err(errors) => return ServiceResult::failure(errors),
        };
        url.query_pairs_mut().append_pair(KEY_QUERY_PARAM, &key);

        let body = match self.fetch_body(&url, "app list").await.into_result() {
            Ok(body) => body,
            Err(errors) => return ServiceResult::failure(errors),
        };

        let parsed: AppListResp = match serde_json::from_str(&body) {
            Ok(p) => p,
            Err(e) => {
                return ServiceResult::fail(
                    ErrorKind::Api,
                    format!("app list response could not be parsed: {e}"),
                )
            }
        };

        let mut seen: HashSet<String> = HashSet::with_capacity(parsed.applist.apps.len());
        let apps: Vec<RemoteListing> = parsed
            .applist
            .apps
            .into_iter()
            .filter(|a| seen.insert(app_id_key(&a.app_id)))
            .collect();
        if apps.is_empty() {
            return ServiceResult::fail(ErrorKind::EmptyCatalog, "steam app list contained no apps");
        }
        info!(count = apps.len(), "steam: app list retrieved");
        ServiceResult::success(apps)
    }

    /// Fetches the store categories of one app.
    ///
    /// Steam has no details for some retired or re-released apps. Those, and
    /// apps whose details carry no categories, are reported as multiplayer so
    /// they are never wrongly excluded.
    pub async fn get_details(&self, app_id: &str) -> ServiceResult<HashSet<ClassificationCategory>> {
        let mut url = match Self::endpoint(&self.config.store_address, GET_APP_DETAILS_ENDPOINT)
            .into_result()
        {
            Ok(url) => url,
            Err(errors) => return ServiceResult::failure(errors),
        };
        url.query_pairs_mut().append_pair(APP_IDS_QUERY_PARAM, app_id);

        self.fetch_body(&url, "app details")
            .await
            .into_result()
            .map_or_else(ServiceResult::failure, |body| {
                parse_app_details(app_id, &body).into()
            })
    }
}

#[async_trait::async_trait]
impl CatalogSource for SteamCatalogClient {
    async fn list_all(&self) -> ServiceResult<Vec<RemoteListing>> {
        SteamCatalogClient::list_all(self).await
    }

    async fn get_details(&self, app_id: &str) -> ServiceResult<HashSet<ClassificationCategory>> {
        SteamCatalogClient::get_details(self, app_id).await
    }
}

fn multiplayer_fallback() -> HashSet<ClassificationCategory> {
    HashSet::from([ClassificationCategory::Multiplayer])
}

fn parse_app_details(
    app_id: &str,
    body: &str,
) -> Result<HashSet<ClassificationCategory>, crate::service_result::ErrorDetail> {
    use crate::service_result::ErrorDetail;

    let mut envelope: HashMap<String, AppDetailsWrapper> = serde_json::from_str(body)
        .map_err(|e| {
            ErrorDetail::new(
                ErrorKind::Api,
                format!("app details for {app_id} could not be parsed: {e}"),
            )
        })?;
    // The envelope is keyed by the requested id; fall back to whatever single key came back.
    let entry = match envelope.remove(app_id) {
        Some(entry) => entry,
        None => envelope.into_values().next().ok_or_else(|| {
            ErrorDetail::new(
                ErrorKind::Api,
                format!("app details for {app_id} had an empty envelope"),
            )
        })?,
    };

    if !entry.success {
        debug!(app_id, "steam: no details available; treating as multiplayer");
        return Ok(multiplayer_fallback());
    }
    let categories: HashSet<ClassificationCategory> = entry
        .data
        .and_then(|d| d.categories)
        .unwrap_or_default()
        .into_iter()
        .map(|c| ClassificationCategory::from_id(c.id))
        .collect();
    if categories.is_empty() {
        debug!(app_id, "steam: details carry no categories; treating as multiplayer");
        return Ok(multiplayer_fallback());
    }
    Ok(categories)
}

fn sanitize_request_url(url: &Url) -> String {
    mask_api_key(url.as_str())
}

/// Replaces the value of the `key` query parameter with a fixed mask so the
/// url can be logged. Other parameters are left byte-for-byte intact.
pub fn mask_api_key(request_url: &str) -> String {
    let Some((base, rest)) = request_url.split_once('?') else {
        return request_url.to_string();
    };
    let (query, fragment) = match rest.split_once('#') {
        Some((q, f)) => (q, Some(f)),
        None => (rest, None),
    };
    let masked: Vec<String> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((name, _)) if name == KEY_QUERY_PARAM => {
                format!("{name}={STEAM_API_KEY_MASK}")
            }
            _ => pair.to_string(),
        })
        .collect();
    let mut out = format!("{base}?{}", masked.join("&"));
    if let Some(f) = fragment {
        out.push('#');
        out.push_str(f);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::testing::StaticSecrets;
    use mockito::{Matcher, Server};

    fn client_for(server: &Server, secrets: StaticSecrets) -> SteamCatalogClient {
        let config = SteamConfig {
            api_address: server.url(),
            store_address: server.url(),
            timeout: Duration::from_secs(5),
            rate_limit_delays: Vec::new(),
        };
        SteamCatalogClient::new(config, Arc::new(secrets)).expect("create client")
    }

    fn keyed() -> StaticSecrets {
        StaticSecrets::with(STEAM_API_KEY_SECRET_ID, "SECRET123")
    }

    #[test]
    fn masks_only_the_key_parameter() {
        let masked = mask_api_key("https://api.example/list?key=SECRET123&other=1");
        assert!(masked.contains(STEAM_API_KEY_MASK));
        assert!(masked.contains("other=1"));
        assert!(!masked.contains("SECRET123"));

        let masked = mask_api_key(".../list?key=SECRET123&other=1");
        assert_eq!(masked, format!(".../list?key={STEAM_API_KEY_MASK}&other=1"));
    }

    #[test]
    fn masking_leaves_lookalike_parameters_alone() {
        let masked = mask_api_key("/x?monkey=banana&key=abc#frag");
        assert_eq!(masked, format!("/x?monkey=banana&key={STEAM_API_KEY_MASK}#frag"));
        assert_eq!(mask_api_key("/x?appids=10"), "/x?appids=10");
        assert_eq!(mask_api_key("/x"), "/x");
    }

    #[test]
    fn details_fallback_and_categories() {
        let unsuccessful = parse_app_details("10", r#"{"10": {"success": false}}"#).unwrap();
        assert!(unsuccessful.contains(&ClassificationCategory::Multiplayer));

        let no_categories =
            parse_app_details("10", r#"{"10": {"success": true, "data": {"name": "X"}}}"#).unwrap();
        assert_eq!(no_categories, multiplayer_fallback());

        let empty_categories =
            parse_app_details("10", r#"{"10": {"success": true, "data": {"categories": []}}}"#)
                .unwrap();
        assert_eq!(empty_categories, multiplayer_fallback());

        let single = parse_app_details(
            "10",
            r#"{"10": {"success": true, "data": {"categories": [{"id": 2, "description": "Single-player"}]}}}"#,
        )
        .unwrap();
        assert_eq!(single, HashSet::from([ClassificationCategory::SinglePlayer]));
    }

    #[test]
    fn details_envelope_errors() {
        let err = parse_app_details("10", "not json").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Api);
        let err = parse_app_details("10", "{}").unwrap_err();
        assert!(err.message.contains("empty envelope"));
        // Envelope keyed differently than requested still resolves.
        let other_key =
            parse_app_details("10", r#"{"0010": {"success": true, "data": {"categories": [{"id": 1}]}}}"#)
                .unwrap();
        assert!(other_key.contains(&ClassificationCategory::Multiplayer));
    }

    #[tokio::test]
    async fn list_all_parses_and_dedups_apps() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", GET_APP_LIST_ENDPOINT)
            .match_query(Matcher::UrlEncoded("key".into(), "SECRET123".into()))
            .with_status(200)
            .with_body(
                r#"{"applist": {"apps": [
                    {"appid": 10, "name": "Counter-Strike"},
                    {"appid": 20, "name": "Team Fortress Classic"},
                    {"appid": 10, "name": "Counter-Strike (dup)"}
                ]}}"#,
            )
            .create_async()
            .await;

        let client = client_for(&server, keyed());
        let result = client.list_all().await;
        mock.assert_async().await;
        assert!(result.is_success(), "{:?}", result.errors());
        let apps = result.data().unwrap();
        assert_eq!(apps.len(), 2);
        assert_eq!(apps[0], RemoteListing::new("10", "Counter-Strike"));
        assert_eq!(apps[1].app_id, "20");
    }

    #[tokio::test]
    async fn list_all_non_200_is_api_error_without_leaking_key() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", GET_APP_LIST_ENDPOINT)
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let result = client_for(&server, keyed()).list_all().await;
        assert!(!result.is_success());
        let err = &result.errors()[0];
        assert_eq!(err.kind, ErrorKind::Api);
        assert!(err.message.contains("500"));
        assert!(!err.message.contains("SECRET123"));
        assert!(err.message.contains(STEAM_API_KEY_MASK));
    }

    #[tokio::test]
    async fn list_all_empty_or_malformed_body_is_api_error() {
        let mut server = Server::new_async().await;
        let _empty = server
            .mock("GET", GET_APP_LIST_ENDPOINT)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("")
            .create_async()
            .await;
        let result = client_for(&server, keyed()).list_all().await;
        assert_eq!(result.errors()[0].kind, ErrorKind::Api);
        assert!(result.errors()[0].message.contains("no response body"));

        let mut server = Server::new_async().await;
        let _bad = server
            .mock("GET", GET_APP_LIST_ENDPOINT)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("{\"applist\": ")
            .create_async()
            .await;
        let result = client_for(&server, keyed()).list_all().await;
        assert_eq!(result.errors()[0].kind, ErrorKind::Api);
        assert!(result.errors()[0].message.contains("could not be parsed"));
    }

    #[tokio::test]
    async fn list_all_without_apps_is_empty_catalog() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", GET_APP_LIST_ENDPOINT)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"applist": {"apps": []}}"#)
            .create_async()
            .await;
        let result = client_for(&server, keyed()).list_all().await;
        assert_eq!(result.errors()[0].kind, ErrorKind::EmptyCatalog);
    }

    #[tokio::test]
    async fn list_all_secret_failure_skips_request() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", GET_APP_LIST_ENDPOINT)
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let result = client_for(&server, StaticSecrets::default()).list_all().await;
        mock.assert_async().await;
        assert_eq!(result.errors()[0].kind, ErrorKind::SecretRetrieval);
    }

    #[tokio::test]
    async fn rate_limited_request_fails_once_ladder_is_exhausted() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", GET_APP_DETAILS_ENDPOINT)
            .match_query(Matcher::Any)
            .with_status(429)
            .create_async()
            .await;
        let result = client_for(&server, keyed()).get_details("10").await;
        assert_eq!(result.errors()[0].kind, ErrorKind::Api);
        assert!(result.errors()[0].message.contains("429"));
    }

    #[tokio::test]
    async fn get_details_requests_single_appid() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", GET_APP_DETAILS_ENDPOINT)
            .match_query(Matcher::UrlEncoded("appids".into(), "20".into()))
            .with_status(200)
            .with_body(r#"{"20": {"success": true, "data": {"categories": [{"id": 1}, {"id": 22}]}}}"#)
            .create_async()
            .await;
        let result = client_for(&server, keyed()).get_details("20").await;
        mock.assert_async().await;
        let categories = result.data().unwrap();
        assert!(categories.contains(&ClassificationCategory::Multiplayer));
        assert!(categories.contains(&ClassificationCategory::Other(22)));
    }
}
