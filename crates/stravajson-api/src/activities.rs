//! Paginated retrieval of the athlete's activity list.
//!
//! [`ActivityFetcher`] walks `GET /api/v3/athlete/activities` one page at a
//! time:
//!
//! - pages start at 1 and stop after `max_pages`
//! - an empty page ends the walk
//! - a page shorter than `per_page` is the last one
//! - with `only_runs`, each page is filtered to `type == "Run"`, but the
//!   short-page check always uses the unfiltered length
//!
//! [`ActivitySource`] abstracts the fetch so callers can be driven by a
//! fake in tests.

use std::future::Future;
use std::pin::Pin;

use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde_json::Value;
use stravajson_core::Activity;
use tracing::{debug, warn};

use crate::auth::TokenManager;
use crate::config::StravaConfig;
use crate::error::{ApiError, ApiResult};

/// Largest page size Strava accepts.
pub const MAX_PER_PAGE: u32 = 200;

/// Default page size.
pub const DEFAULT_PER_PAGE: u32 = 200;

/// Default page cap.
pub const DEFAULT_MAX_PAGES: u32 = 10;

/// A boxed future returned by [`ActivitySource`] methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Parameters for one paginated fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityQuery {
    /// Exclusive lower bound, epoch seconds.
    pub after: i64,
    /// Exclusive upper bound, epoch seconds.
    pub before: Option<i64>,
    /// Page size, 1..=200.
    pub per_page: u32,
    /// Maximum number of pages to request.
    pub max_pages: u32,
    /// Keep only activities whose type is `Run`.
    pub only_runs: bool,
}

impl ActivityQuery {
    /// Creates a query with default paging and the run filter on.
    pub fn new(after: i64) -> Self {
        Self {
            after,
            before: None,
            per_page: DEFAULT_PER_PAGE,
            max_pages: DEFAULT_MAX_PAGES,
            only_runs: true,
        }
    }

    /// Sets the upper bound.
    pub fn with_before(mut self, before: Option<i64>) -> Self {
        self.before = before;
        self
    }

    /// Sets the page size.
    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    /// Sets the page cap.
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Enables or disables the run filter.
    pub fn with_only_runs(mut self, only_runs: bool) -> Self {
        self.only_runs = only_runs;
        self
    }

    fn validate(&self) -> ApiResult<()> {
        if self.per_page == 0 || self.per_page > MAX_PER_PAGE {
            return Err(ApiError::configuration(format!(
                "per_page must be between 1 and {}, got {}",
                MAX_PER_PAGE, self.per_page
            )));
        }
        Ok(())
    }
}

/// Anything that can produce activities for a query.
pub trait ActivitySource: Send + Sync {
    /// Fetches all activities matching `query`, newest first.
    fn fetch_activities(&self, query: ActivityQuery) -> BoxFuture<'_, ApiResult<Vec<Activity>>>;
}

/// Fetches activities with a fixed bearer token.
#[derive(Clone)]
pub struct ActivityFetcher {
    http: reqwest::Client,
    endpoint: String,
    access_token: String,
}

impl std::fmt::Debug for ActivityFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityFetcher")
            .field("endpoint", &self.endpoint)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

impl ActivityFetcher {
    /// Creates a fetcher for `endpoint` authorized by `access_token`.
    pub fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            access_token: access_token.into(),
        }
    }

    /// Walks the pages described by `query`.
    ///
    /// # Errors
    ///
    /// - [`ApiError::RateLimited`] on HTTP 429
    /// - [`ApiError::Fetch`] on any other non-2xx status
    /// - [`ApiError::InvalidResponse`] if a page is not a JSON array
    pub async fn get_activities(&self, query: ActivityQuery) -> ApiResult<Vec<Activity>> {
        query.validate()?;

        let mut collected = Vec::new();
        let mut page = 1;

        while page <= query.max_pages {
            let items = self.fetch_page(&query, page).await?;
            if items.is_empty() {
                debug!(page, "empty page, stopping");
                break;
            }

            let page_len = items.len();
            let before_filter = collected.len();
            collected.extend(
                items
                    .into_iter()
                    .filter_map(Activity::from_value)
                    .filter(|activity| !query.only_runs || activity.is_run()),
            );
            debug!(
                page,
                received = page_len,
                kept = collected.len() - before_filter,
                "fetched activity page"
            );

            if page_len < query.per_page as usize {
                break;
            }
            page += 1;
        }

        Ok(collected)
    }

    async fn fetch_page(&self, query: &ActivityQuery, page: u32) -> ApiResult<Vec<Value>> {
        let mut params = vec![
            ("after", query.after.to_string()),
            ("per_page", query.per_page.to_string()),
            ("page", page.to_string()),
        ];
        if let Some(before) = query.before {
            params.push(("before", before.to_string()));
        }

        let response = self
            .http
            .get(&self.endpoint)
            .bearer_auth(&self.access_token)
            .query(&params)
            .send()
            .await
            .map_err(|e| ApiError::from_transport("activity request failed", &e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let error = rate_limit_error(response.headers());
            warn!("{}", error);
            return Err(error);
        }

        let body = response
            .text()
            .await
            .map_err(|e| ApiError::network(format!("failed to read activity page: {}", e)))?;

        if !status.is_success() {
            return Err(ApiError::Fetch {
                status: status.as_u16(),
                body,
            });
        }

        match serde_json::from_str::<Value>(&body) {
            Ok(Value::Array(items)) => Ok(items),
            Ok(other) => Err(ApiError::invalid_response(format!(
                "expected a JSON array of activities, got {}",
                json_kind(&other)
            ))),
            Err(e) => Err(ApiError::invalid_response(format!(
                "invalid activity page: {}",
                e
            ))),
        }
    }
}

impl ActivitySource for ActivityFetcher {
    fn fetch_activities(&self, query: ActivityQuery) -> BoxFuture<'_, ApiResult<Vec<Activity>>> {
        Box::pin(self.get_activities(query))
    }
}

fn rate_limit_error(headers: &HeaderMap) -> ApiError {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
    };

    ApiError::RateLimited {
        retry_after: header("retry-after").and_then(|v| v.parse().ok()),
        usage: header("x-ratelimit-usage"),
        limit: header("x-ratelimit-limit"),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Strava API client: token lifecycle plus activity fetching.
#[derive(Debug)]
pub struct StravaClient {
    http: reqwest::Client,
    activities_endpoint: String,
    tokens: TokenManager,
}

impl StravaClient {
    /// Builds a client from validated configuration.
    pub fn new(config: &StravaConfig) -> ApiResult<Self> {
        config.validate()?;
        let http = config.build_http_client()?;
        Ok(Self {
            tokens: TokenManager::new(config, http.clone()),
            activities_endpoint: config.activities_endpoint(),
            http,
        })
    }

    /// Returns the token manager.
    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Obtains an access token; see [`TokenManager::ensure_access_token`].
    pub async fn ensure_access_token(&mut self, auth_code: Option<&str>) -> ApiResult<String> {
        self.tokens.ensure_access_token(auth_code).await
    }

    /// Authenticates and returns a fetcher bound to the resulting token.
    pub async fn authorized_fetcher(&mut self, auth_code: Option<&str>) -> ApiResult<ActivityFetcher> {
        let access_token = self.ensure_access_token(auth_code).await?;
        Ok(ActivityFetcher::new(
            self.http.clone(),
            &self.activities_endpoint,
            access_token,
        ))
    }

    /// Authenticates, then fetches activities for `query`.
    pub async fn get_activities(
        &mut self,
        query: ActivityQuery,
        auth_code: Option<&str>,
    ) -> ApiResult<Vec<Activity>> {
        self.authorized_fetcher(auth_code)
            .await?
            .get_activities(query)
            .await
    }
}
