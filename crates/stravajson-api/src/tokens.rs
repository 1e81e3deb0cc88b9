//! OAuth token set and its on-disk storage.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ApiError, ApiResult};

/// Seconds before `expires_at` at which an access token stops being used.
pub const EXPIRY_MARGIN_SECS: i64 = 30;

/// The tokens returned by Strava's token endpoint.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    /// Bearer token for API requests.
    #[serde(default)]
    pub access_token: String,

    /// Long-lived token used to obtain new access tokens.
    #[serde(default)]
    pub refresh_token: String,

    /// Expiry of the access token, in epoch seconds.
    #[serde(default)]
    pub expires_at: i64,
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

fn redact(token: &str) -> &'static str {
    if token.is_empty() { "<empty>" } else { "<redacted>" }
}

impl TokenSet {
    /// Creates a token set.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: i64,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
        }
    }

    /// Returns true if the access token can be used at time `now`.
    ///
    /// The token must be non-empty and expire more than
    /// [`EXPIRY_MARGIN_SECS`] after `now`.
    pub fn is_valid_at(&self, now: i64) -> bool {
        !self.access_token.is_empty() && self.expires_at > now + EXPIRY_MARGIN_SECS
    }

    /// Returns true if the access token can be used right now.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now().timestamp())
    }

    /// Returns true if a refresh token is available.
    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }
}

/// Body returned by `POST /oauth/token`.
///
/// Strava sends `expires_at`; `expires_in` is accepted as a fallback.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    /// Converts the response into a token set, keeping `previous_refresh`
    /// when the response carries no refresh token.
    pub(crate) fn into_token_set(self, now: i64, previous_refresh: Option<&str>) -> TokenSet {
        let expires_at = self
            .expires_at
            .or_else(|| self.expires_in.map(|secs| now + secs))
            .unwrap_or(0);
        let refresh_token = self
            .refresh_token
            .filter(|t| !t.is_empty())
            .or_else(|| previous_refresh.map(str::to_string))
            .unwrap_or_default();

        TokenSet {
            access_token: self.access_token,
            refresh_token,
            expires_at,
        }
    }
}

/// File-backed token storage.
///
/// Holds no state besides the path: the token manager decides when to read
/// and when to write.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    /// Creates a store backed by the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the token file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the token file.
    ///
    /// Returns `None` when the file is missing, unreadable or not valid JSON.
    pub fn load(&self) -> Option<TokenSet> {
        if !self.path.exists() {
            debug!("no token file at {:?}", self.path);
            return None;
        }

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                warn!("ignoring unreadable token file {:?}: {}", self.path, e);
                return None;
            }
        };

        match serde_json::from_str::<TokenSet>(&content) {
            Ok(tokens) => {
                debug!("loaded tokens from {:?}", self.path);
                Some(tokens)
            }
            Err(e) => {
                warn!("ignoring malformed token file {:?}: {}", self.path, e);
                None
            }
        }
    }

    /// Writes the token set to disk, replacing any previous file.
    pub fn save(&self, tokens: &TokenSet) -> ApiResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                ApiError::configuration(format!("failed to create token directory: {}", e))
            })?;
        }

        // Write to temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(tokens)
            .map_err(|e| ApiError::invalid_response(format!("failed to serialize tokens: {}", e)))?;

        fs::write(&temp_path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600));
        }

        fs::rename(&temp_path, &self.path)?;

        info!("saved tokens to {:?}", self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity_respects_safety_margin() {
        let now = 1_700_000_000;
        assert!(TokenSet::new("a", "r", now + 31).is_valid_at(now));
        assert!(!TokenSet::new("a", "r", now + 30).is_valid_at(now));
        assert!(!TokenSet::new("a", "r", now - 100).is_valid_at(now));
        assert!(!TokenSet::new("", "r", now + 3600).is_valid_at(now));
    }

    #[test]
    fn token_response_prefers_expires_at() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"token_type":"Bearer","access_token":"a","refresh_token":"r","expires_at":500,"expires_in":10}"#,
        )
        .unwrap();
        let tokens = response.into_token_set(100, None);
        assert_eq!(tokens, TokenSet::new("a", "r", 500));
    }

    #[test]
    fn token_response_falls_back_to_expires_in_and_previous_refresh() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","expires_in":60}"#).unwrap();
        let tokens = response.into_token_set(100, Some("old-refresh"));
        assert_eq!(tokens, TokenSet::new("a", "old-refresh", 160));
    }

    #[test]
    fn store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("nested").join("tokens.json"));
        let tokens = TokenSet::new("access", "refresh", 123);

        store.save(&tokens).unwrap();
        assert_eq!(store.load(), Some(tokens));
        assert!(!dir.path().join("nested").join("tokens.json.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn store_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"));
        store.save(&TokenSet::new("a", "r", 1)).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn store_missing_or_corrupt_file_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"));
        assert_eq!(store.load(), None);

        fs::write(store.path(), "not json").unwrap();
        assert_eq!(store.load(), None);
    }

    #[test]
    fn store_reads_full_provider_response() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"));
        fs::write(
            store.path(),
            r#"{"token_type":"Bearer","expires_at":42,"expires_in":21600,
                "refresh_token":"r","access_token":"a","athlete":{"id":1}}"#,
        )
        .unwrap();
        assert_eq!(store.load(), Some(TokenSet::new("a", "r", 42)));
    }

    #[test]
    fn debug_output_hides_tokens() {
        let rendered = format!("{:?}", TokenSet::new("secret-access", "secret-refresh", 1));
        assert!(!rendered.contains("secret"));
    }
}
