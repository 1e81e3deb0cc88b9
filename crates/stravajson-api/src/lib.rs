//! Strava API access for stravajson.
//!
//! - [`StravaConfig`] - endpoints, credentials and HTTP client settings
//! - [`TokenManager`] / [`TokenStore`] - OAuth token lifecycle and persistence
//! - [`LocalAuthorizer`] - browser authorization through a loopback redirect
//! - [`ActivityFetcher`] / [`ActivitySource`] - paginated activity retrieval
//! - [`ApiError`] - error type shared by all of the above
//!
//! # Example
//!
//! ```ignore
//! use stravajson_api::{ActivityQuery, OAuthCredentials, StravaClient, StravaConfig};
//!
//! let config = StravaConfig::new(OAuthCredentials::new("12345", "secret"));
//! let mut client = StravaClient::new(&config)?;
//! let runs = client.get_activities(ActivityQuery::new(1_704_067_200), None).await?;
//! ```

pub mod activities;
pub mod auth;
pub mod config;
pub mod error;
pub mod oauth;
pub mod tokens;

pub use activities::{
    ActivityFetcher, ActivityQuery, ActivitySource, BoxFuture, DEFAULT_MAX_PAGES,
    DEFAULT_PER_PAGE, MAX_PER_PAGE, StravaClient,
};
pub use auth::TokenManager;
pub use config::{
    DEFAULT_BASE_URL, DEFAULT_SCOPE, DEFAULT_TIMEOUT, OAuthCredentials, StravaConfig,
    default_token_path,
};
pub use error::{ApiError, ApiErrorCode, ApiResult};
pub use oauth::{
    AuthorizerSettings, DEFAULT_AUTH_TIMEOUT, DEFAULT_REDIRECT_HOST, DEFAULT_REDIRECT_PORT,
    LocalAuthorizer, PendingAuthorization, build_authorization_url,
};
pub use tokens::{EXPIRY_MARGIN_SECS, TokenSet, TokenStore};
