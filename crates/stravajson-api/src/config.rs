//! Strava API configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::error::{ApiError, ApiResult};

/// Default Strava host.
pub const DEFAULT_BASE_URL: &str = "https://www.strava.com";

/// Default OAuth scope requested during authorization.
pub const DEFAULT_SCOPE: &str = "read,activity:read_all";

/// Timeout applied to every HTTP request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// OAuth 2.0 client credentials registered with Strava.
#[derive(Clone)]
pub struct OAuthCredentials {
    /// The numeric client ID from the Strava API settings page.
    pub client_id: String,
    /// The client secret from the Strava API settings page.
    pub client_secret: String,
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

impl OAuthCredentials {
    /// Creates new OAuth credentials.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Checks that neither value is blank.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.client_id.trim().is_empty() {
            return Err("client_id is required");
        }
        if self.client_secret.trim().is_empty() {
            return Err("client_secret is required");
        }
        Ok(())
    }
}

/// Configuration shared by the token manager and the activity fetcher.
#[derive(Debug, Clone)]
pub struct StravaConfig {
    /// OAuth credentials for API access.
    pub credentials: OAuthCredentials,

    /// Base URL of the API host, without trailing slash.
    pub base_url: String,

    /// Base URL used for the browser authorization page.
    ///
    /// Defaults to [`StravaConfig::base_url`].
    pub auth_url: Option<String>,

    /// Path of the persisted token file.
    pub token_path: PathBuf,

    /// Per-request timeout.
    pub timeout: Duration,

    /// Whether to verify TLS certificates.
    pub verify_tls: bool,

    /// Extra PEM root certificate(s) to trust.
    pub ca_bundle: Option<PathBuf>,
}

impl StravaConfig {
    /// Creates a configuration with default endpoints and token path.
    pub fn new(credentials: OAuthCredentials) -> Self {
        Self {
            credentials,
            base_url: DEFAULT_BASE_URL.to_string(),
            auth_url: None,
            token_path: default_token_path(),
            timeout: DEFAULT_TIMEOUT,
            verify_tls: true,
            ca_bundle: None,
        }
    }

    /// Overrides the API base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Overrides the authorization page base URL.
    pub fn with_auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = Some(url.into().trim_end_matches('/').to_string());
        self
    }

    /// Sets the token file path.
    pub fn with_token_path(mut self, path: impl AsRef<Path>) -> Self {
        self.token_path = path.as_ref().to_path_buf();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enables or disables TLS certificate verification.
    pub fn with_verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    /// Adds a PEM CA bundle to trust.
    pub fn with_ca_bundle(mut self, path: impl AsRef<Path>) -> Self {
        self.ca_bundle = Some(path.as_ref().to_path_buf());
        self
    }

    /// `POST` endpoint for token exchange and refresh.
    pub fn token_endpoint(&self) -> String {
        format!("{}/oauth/token", self.base_url)
    }

    /// `GET` endpoint listing the athlete's activities.
    pub fn activities_endpoint(&self) -> String {
        format!("{}/api/v3/athlete/activities", self.base_url)
    }

    /// Browser authorization page.
    pub fn authorize_endpoint(&self) -> String {
        let base = self.auth_url.as_deref().unwrap_or(&self.base_url);
        format!("{}/oauth/authorize", base)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ApiResult<()> {
        self.credentials.validate().map_err(ApiError::configuration)?;
        url::Url::parse(&self.base_url)
            .map_err(|e| ApiError::configuration(format!("invalid base URL {:?}: {}", self.base_url, e)))?;
        if self.timeout.is_zero() {
            return Err(ApiError::configuration("timeout must be greater than zero"));
        }
        Ok(())
    }

    /// Builds the HTTP client used for every API call.
    pub fn build_http_client(&self) -> ApiResult<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("stravajson/", env!("CARGO_PKG_VERSION")));

        if !self.verify_tls {
            debug!("TLS verification disabled");
            builder = builder.danger_accept_invalid_certs(true);
        } else if let Some(ref path) = self.ca_bundle {
            let pem = std::fs::read(path).map_err(|e| {
                ApiError::configuration(format!(
                    "failed to read CA bundle {}: {}",
                    path.display(),
                    e
                ))
            })?;
            let certs = reqwest::Certificate::from_pem_bundle(&pem).map_err(|e| {
                ApiError::configuration(format!("invalid CA bundle {}: {}", path.display(), e))
            })?;
            debug!(path = %path.display(), count = certs.len(), "using custom CA bundle");
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }

        builder
            .build()
            .map_err(|e| ApiError::configuration(format!("failed to create HTTP client: {}", e)))
    }
}

/// Default token file: `<data dir>/stravajson/tokens.json`.
pub fn default_token_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stravajson")
        .join("tokens.json")
}
