//! Access token lifecycle.
//!
//! [`TokenManager`] hands out a usable access token, refreshing or
//! exchanging as needed:
//!
//! 1. Load the token file once per process.
//! 2. A held token that is still valid is returned without any request.
//! 3. Otherwise a refresh token, when present, is traded for a new set.
//! 4. Otherwise a supplied authorization code is exchanged.
//! 5. Otherwise [`ApiError::NoUsableToken`] tells the caller to run the
//!    interactive authorization flow.
//!
//! Every newly obtained token set is written to disk before it is returned.

use chrono::Utc;
use tracing::{debug, info};

use crate::config::{OAuthCredentials, StravaConfig};
use crate::error::{ApiError, ApiResult};
use crate::tokens::{TokenResponse, TokenSet, TokenStore};

/// Which grant a token request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grant {
    AuthorizationCode,
    RefreshToken,
}

impl Grant {
    fn as_str(self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
        }
    }

    fn failure(self, status: u16, body: String) -> ApiError {
        match self {
            Self::AuthorizationCode => ApiError::TokenExchange { status, body },
            Self::RefreshToken => ApiError::TokenRefresh { status, body },
        }
    }
}

/// Owns the OAuth token set for the current run.
#[derive(Debug)]
pub struct TokenManager {
    credentials: OAuthCredentials,
    token_endpoint: String,
    http: reqwest::Client,
    store: TokenStore,
    tokens: Option<TokenSet>,
    loaded: bool,
}

impl TokenManager {
    /// Creates a token manager. Nothing is read from disk until the first
    /// call to [`TokenManager::ensure_access_token`].
    pub fn new(config: &StravaConfig, http: reqwest::Client) -> Self {
        Self {
            credentials: config.credentials.clone(),
            token_endpoint: config.token_endpoint(),
            http,
            store: TokenStore::new(&config.token_path),
            tokens: None,
            loaded: false,
        }
    }

    /// Returns the token set currently held in memory.
    pub fn tokens(&self) -> Option<&TokenSet> {
        self.tokens.as_ref()
    }

    /// Returns the held access token, if any.
    pub fn access_token(&self) -> Option<&str> {
        self.tokens
            .as_ref()
            .map(|t| t.access_token.as_str())
            .filter(|t| !t.is_empty())
    }

    /// Returns the backing token store.
    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Returns a valid access token, refreshing or exchanging if needed.
    ///
    /// # Errors
    ///
    /// - [`ApiError::TokenRefresh`] if the refresh endpoint rejects the refresh token
    /// - [`ApiError::TokenExchange`] if the authorization code is rejected
    /// - [`ApiError::NoUsableToken`] if there is nothing to refresh and no code
    pub async fn ensure_access_token(&mut self, auth_code: Option<&str>) -> ApiResult<String> {
        if !self.loaded {
            self.tokens = self.store.load();
            self.loaded = true;
        }

        let now = Utc::now().timestamp();

        if let Some(ref tokens) = self.tokens {
            if tokens.is_valid_at(now) {
                debug!("reusing stored access token");
                return Ok(tokens.access_token.clone());
            }

            if tokens.has_refresh_token() {
                debug!("access token expired, refreshing");
                let refresh_token = tokens.refresh_token.clone();
                let refreshed = self
                    .request_tokens(Grant::RefreshToken, &refresh_token)
                    .await?;
                info!("refreshed access token");
                return self.replace(refreshed);
            }
        }

        match auth_code.map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => {
                debug!("exchanging authorization code");
                let exchanged = self.request_tokens(Grant::AuthorizationCode, code).await?;
                info!("exchanged authorization code for tokens");
                self.replace(exchanged)
            }
            None => Err(ApiError::NoUsableToken),
        }
    }

    /// Persists and holds a new token set, returning its access token.
    fn replace(&mut self, tokens: TokenSet) -> ApiResult<String> {
        if tokens.access_token.is_empty() {
            return Err(ApiError::invalid_response(
                "token endpoint returned an empty access token",
            ));
        }
        self.store.save(&tokens)?;
        let access_token = tokens.access_token.clone();
        self.tokens = Some(tokens);
        Ok(access_token)
    }

    async fn request_tokens(&self, grant: Grant, credential: &str) -> ApiResult<TokenSet> {
        let credential_key = match grant {
            Grant::AuthorizationCode => "code",
            Grant::RefreshToken => "refresh_token",
        };
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("grant_type", grant.as_str()),
            (credential_key, credential),
        ];

        let response = self
            .http
            .post(&self.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| ApiError::from_transport("token request failed", &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::network(format!("failed to read token response: {}", e)))?;

        if !status.is_success() {
            return Err(grant.failure(status.as_u16(), body));
        }

        let token_response: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| ApiError::invalid_response(format!("invalid token response: {}", e)))?;

        let previous_refresh = match grant {
            Grant::RefreshToken => Some(credential),
            Grant::AuthorizationCode => None,
        };
        Ok(token_response.into_token_set(Utc::now().timestamp(), previous_refresh))
    }
}
