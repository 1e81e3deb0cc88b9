//! Error types for Strava API operations.
//!
//! Every failure the token lifecycle, the loopback authorization flow or the
//! activity fetcher can produce is a distinct [`ApiError`] variant, so callers
//! branch on variants rather than on message text.

use std::fmt;

use thiserror::Error;

/// The category of an API error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorCode {
    /// Missing or invalid configuration.
    ConfigurationError,
    /// No usable token and no authorization code to exchange.
    AuthorizationRequired,
    /// Authentication failed for another reason.
    AuthenticationFailed,
    /// The token endpoint rejected an authorization code.
    TokenExchangeFailed,
    /// The token endpoint rejected a refresh token.
    TokenRefreshFailed,
    /// Nobody completed the browser authorization in time.
    AuthorizationTimeout,
    /// The user interrupted the run.
    Interrupted,
    /// HTTP 429 from the API.
    RateLimited,
    /// Any other non-success status from the activities endpoint.
    FetchFailed,
    /// Connection failure, timeout, DNS resolution.
    NetworkError,
    /// The server answered with something we could not parse.
    InvalidResponse,
    /// Local I/O failure.
    IoError,
}

impl ApiErrorCode {
    /// Returns a stable machine-readable name for this error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigurationError => "configuration_error",
            Self::AuthorizationRequired => "authorization_required",
            Self::AuthenticationFailed => "authentication_failed",
            Self::TokenExchangeFailed => "token_exchange_failed",
            Self::TokenRefreshFailed => "token_refresh_failed",
            Self::AuthorizationTimeout => "authorization_timeout",
            Self::Interrupted => "interrupted",
            Self::RateLimited => "rate_limited",
            Self::FetchFailed => "fetch_failed",
            Self::NetworkError => "network_error",
            Self::InvalidResponse => "invalid_response",
            Self::IoError => "io_error",
        }
    }
}

impl fmt::Display for ApiErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error raised while talking to Strava or running the authorization flow.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing credentials, bad URLs, unreadable CA bundle.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No valid tokens are held and no authorization code was supplied.
    ///
    /// This is the signal to start the interactive authorization flow.
    #[error("no valid tokens and no authorization code")]
    NoUsableToken,

    /// Authentication failed for a reason other than the above.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The authorization code could not be exchanged.
    #[error("token exchange failed ({status}): {body}")]
    TokenExchange { status: u16, body: String },

    /// The refresh token was rejected.
    #[error("token refresh failed ({status}): {body}")]
    TokenRefresh { status: u16, body: String },

    /// No authorization code arrived before the deadline.
    #[error(
        "timed out after {seconds}s waiting for the authorization code; \
         run the command again and approve access in the browser"
    )]
    AuthorizationTimeout { seconds: u64 },

    /// The user pressed Ctrl-C.
    #[error("interrupted")]
    Interrupted,

    /// HTTP 429 from the API. Not retried.
    #[error(
        "rate limited by Strava{}{}",
        fmt_retry_after(.retry_after),
        fmt_usage(.usage, .limit)
    )]
    RateLimited {
        /// `Retry-After`, in seconds.
        retry_after: Option<u64>,
        /// `X-RateLimit-Usage`, e.g. `"101,950"`.
        usage: Option<String>,
        /// `X-RateLimit-Limit`, e.g. `"100,1000"`.
        limit: Option<String>,
    },

    /// Any other non-success response from the activities endpoint.
    #[error("activities request failed ({status}): {body}")]
    Fetch { status: u16, body: String },

    /// The request never got a response.
    #[error("network error: {0}")]
    Network(String),

    /// The response body was not what we expected.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Local I/O failure (token file, listener socket).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn fmt_retry_after(retry_after: &Option<u64>) -> String {
    retry_after
        .map(|s| format!(", retry after {} seconds", s))
        .unwrap_or_default()
}

fn fmt_usage(usage: &Option<String>, limit: &Option<String>) -> String {
    match (usage, limit) {
        (Some(u), Some(l)) => format!(" (usage {} of {})", u, l),
        (Some(u), None) => format!(" (usage {})", u),
        (None, Some(l)) => format!(" (limit {})", l),
        (None, None) => String::new(),
    }
}

impl ApiError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Creates an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// Maps a reqwest transport error to a network error.
    pub fn from_transport(context: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::network(format!("{}: request timed out", context))
        } else if err.is_connect() {
            Self::network(format!("{}: connection failed: {}", context, err))
        } else {
            Self::network(format!("{}: {}", context, err))
        }
    }

    /// Returns the error code.
    pub fn code(&self) -> ApiErrorCode {
        match self {
            Self::Configuration(_) => ApiErrorCode::ConfigurationError,
            Self::NoUsableToken => ApiErrorCode::AuthorizationRequired,
            Self::Authentication(_) => ApiErrorCode::AuthenticationFailed,
            Self::TokenExchange { .. } => ApiErrorCode::TokenExchangeFailed,
            Self::TokenRefresh { .. } => ApiErrorCode::TokenRefreshFailed,
            Self::AuthorizationTimeout { .. } => ApiErrorCode::AuthorizationTimeout,
            Self::Interrupted => ApiErrorCode::Interrupted,
            Self::RateLimited { .. } => ApiErrorCode::RateLimited,
            Self::Fetch { .. } => ApiErrorCode::FetchFailed,
            Self::Network(_) => ApiErrorCode::NetworkError,
            Self::InvalidResponse(_) => ApiErrorCode::InvalidResponse,
            Self::Io(_) => ApiErrorCode::IoError,
        }
    }

    /// Returns true if this error means interactive authorization is needed.
    pub fn needs_authorization(&self) -> bool {
        matches!(self, Self::NoUsableToken)
    }
}

/// A specialized Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
