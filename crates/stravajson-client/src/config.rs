//! Runtime settings.
//!
//! Everything comes from environment variables, after `.env` in the working
//! directory has been loaded. [`Settings::from_lookup`] takes the lookup as a
//! function so tests never have to touch the process environment.

use std::path::PathBuf;
use std::time::Duration;

use stravajson_api::{
    AuthorizerSettings, DEFAULT_AUTH_TIMEOUT, DEFAULT_BASE_URL, DEFAULT_REDIRECT_HOST,
    DEFAULT_REDIRECT_PORT, DEFAULT_SCOPE, OAuthCredentials, StravaConfig, default_token_path,
};
use tracing::debug;

use crate::error::{ClientError, ClientResult};

/// Environment variable names.
pub mod vars {
    pub const BASE_URL: &str = "STRAVA_BASE_URL";
    pub const AUTH_URL: &str = "STRAVA_AUTH_URL";
    pub const VERIFY_SSL: &str = "STRAVA_VERIFY_SSL";
    pub const CA_BUNDLE: &str = "STRAVA_CA_BUNDLE";
    pub const REQUESTS_CA_BUNDLE: &str = "REQUESTS_CA_BUNDLE";
    pub const CURL_CA_BUNDLE: &str = "CURL_CA_BUNDLE";
    pub const AUTH_CODE: &str = "STRAVA_AUTH_CODE";
    pub const TOKENS_FILE: &str = "STRAVA_TOKENS_FILE";
    pub const REDIRECT_HOST: &str = "STRAVA_REDIRECT_HOST";
    pub const REDIRECT_PORT: &str = "STRAVA_REDIRECT_PORT";
    pub const SCOPE: &str = "STRAVA_SCOPE";
    pub const OPEN_BROWSER: &str = "STRAVA_OPEN_BROWSER";
    pub const AUTH_TIMEOUT: &str = "STRAVA_AUTH_TIMEOUT";
    pub const CLIENT_ID: &str = "STRAVA_CLIENT_ID";
    pub const CLIENT_SECRET: &str = "STRAVA_CLIENT_SECRET";
}

/// Settings for one run.
#[derive(Clone)]
pub struct Settings {
    pub base_url: String,
    pub auth_url: Option<String>,
    pub verify_tls: bool,
    pub ca_bundle: Option<PathBuf>,
    /// Authorization code for non-interactive runs.
    pub auth_code: Option<String>,
    pub token_path: PathBuf,
    pub redirect_host: String,
    pub redirect_port: u16,
    pub scope: String,
    pub open_browser: bool,
    pub auth_timeout: Duration,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("base_url", &self.base_url)
            .field("auth_url", &self.auth_url)
            .field("verify_tls", &self.verify_tls)
            .field("ca_bundle", &self.ca_bundle)
            .field("auth_code", &self.auth_code.as_ref().map(|_| "<redacted>"))
            .field("token_path", &self.token_path)
            .field("redirect_host", &self.redirect_host)
            .field("redirect_port", &self.redirect_port)
            .field("scope", &self.scope)
            .field("open_browser", &self.open_browser)
            .field("auth_timeout", &self.auth_timeout)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Settings {
    /// Loads `.env` (if present) and reads the process environment.
    pub fn from_env() -> ClientResult<Self> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => debug!("ignoring unreadable .env: {}", e),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary variable lookup.
    ///
    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> ClientResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let ca_bundle = get(vars::CA_BUNDLE)
            .or_else(|| get(vars::REQUESTS_CA_BUNDLE))
            .or_else(|| get(vars::CURL_CA_BUNDLE))
            .map(PathBuf::from);

        let redirect_port = match get(vars::REDIRECT_PORT) {
            Some(raw) => raw.parse::<u16>().map_err(|_| {
                ClientError::config(format!(
                    "{} must be a port number, got {:?}",
                    vars::REDIRECT_PORT,
                    raw
                ))
            })?,
            None => DEFAULT_REDIRECT_PORT,
        };

        let auth_timeout = match get(vars::AUTH_TIMEOUT) {
            Some(raw) => raw.parse::<u64>().map(Duration::from_secs).map_err(|_| {
                ClientError::config(format!(
                    "{} must be a number of seconds, got {:?}",
                    vars::AUTH_TIMEOUT,
                    raw
                ))
            })?,
            None => DEFAULT_AUTH_TIMEOUT,
        };

        Ok(Self {
            base_url: get(vars::BASE_URL).unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            auth_url: get(vars::AUTH_URL),
            verify_tls: get(vars::VERIFY_SSL).is_none_or(|v| parse_bool(&v)),
            ca_bundle,
            auth_code: get(vars::AUTH_CODE),
            token_path: get(vars::TOKENS_FILE)
                .map(PathBuf::from)
                .unwrap_or_else(default_token_path),
            redirect_host: get(vars::REDIRECT_HOST)
                .unwrap_or_else(|| DEFAULT_REDIRECT_HOST.to_string()),
            redirect_port,
            scope: get(vars::SCOPE).unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
            open_browser: get(vars::OPEN_BROWSER).is_none_or(|v| parse_bool(&v)),
            auth_timeout,
            client_id: get(vars::CLIENT_ID),
            client_secret: get(vars::CLIENT_SECRET),
        })
    }

    /// API configuration for the given credentials.
    pub fn strava_config(&self, credentials: OAuthCredentials) -> StravaConfig {
        let mut config = StravaConfig::new(credentials)
            .with_base_url(&self.base_url)
            .with_token_path(&self.token_path)
            .with_verify_tls(self.verify_tls);
        if let Some(ref auth_url) = self.auth_url {
            config = config.with_auth_url(auth_url);
        }
        if let Some(ref ca_bundle) = self.ca_bundle {
            config = config.with_ca_bundle(ca_bundle);
        }
        config
    }

    /// Loopback authorizer settings for `config`.
    pub fn authorizer_settings(&self, config: &StravaConfig) -> AuthorizerSettings {
        AuthorizerSettings::from_config(config)
            .with_scope(&self.scope)
            .with_redirect(&self.redirect_host, self.redirect_port)
            .with_open_browser(self.open_browser)
            .with_timeout(self.auth_timeout)
    }
}

/// `1`, `true`, `yes` and `y` (any case) are true; everything else is false.
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y"
    )
}
