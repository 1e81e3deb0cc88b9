//! Interactive OAuth authorization through a loopback redirect.
//!
//! # Flow
//!
//! 1. Bind a TCP listener on the configured host/port (falling back to an
//!    OS-assigned port when the preferred one is taken)
//! 2. Build the Strava authorization URL pointing back at
//!    `http://host:port/exchange_token`
//! 3. Print it and, if asked to, open it in the browser
//! 4. Serve requests in a background task until one carries `?code=...`;
//!    every connection is handled in its own task, so an idle socket never
//!    holds up the redirect
//! 5. Poll for the captured code every 200ms until it arrives or the timeout
//!    elapses
//! 6. Shut the listener down on both paths
//!
//! The code travels from the listener task to the waiter through a oneshot
//! channel owned by [`PendingAuthorization`], so concurrent flows never share
//! state. No signal handler is installed here: Ctrl-C is handled once by the
//! binary, and dropping the pending authorization stops the listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{DEFAULT_SCOPE, StravaConfig};
use crate::error::{ApiError, ApiResult};

/// Path Strava redirects back to.
pub const EXCHANGE_PATH: &str = "/exchange_token";

/// Default loopback host.
pub const DEFAULT_REDIRECT_HOST: &str = "127.0.0.1";

/// Default loopback port.
pub const DEFAULT_REDIRECT_PORT: u16 = 8723;

/// How long to wait for the user to approve access.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(300); // 5 minutes

/// Interval at which the waiter checks for a captured code.
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Maximum time spent reading a single callback request.
const CONNECTION_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on header lines drained from a callback request.
const MAX_HEADER_LINES: usize = 100;

const SUCCESS_PAGE: &str =
    "<h2>Authorization complete.</h2><p>You can close this tab and return to the terminal.</p>";

/// Settings for one interactive authorization.
#[derive(Debug, Clone)]
pub struct AuthorizerSettings {
    /// OAuth client ID.
    pub client_id: String,
    /// Comma-separated scopes to request.
    pub scope: String,
    /// Host the loopback listener binds to and the redirect URI names.
    pub redirect_host: String,
    /// Preferred listener port.
    pub redirect_port: u16,
    /// Whether to launch the system browser.
    pub open_browser: bool,
    /// How long to wait for the redirect.
    pub timeout: Duration,
    /// Strava's `/oauth/authorize` endpoint.
    pub authorize_endpoint: String,
}

impl AuthorizerSettings {
    /// Creates settings with default host, port, scope and timeout.
    pub fn new(client_id: impl Into<String>, authorize_endpoint: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            scope: DEFAULT_SCOPE.to_string(),
            redirect_host: DEFAULT_REDIRECT_HOST.to_string(),
            redirect_port: DEFAULT_REDIRECT_PORT,
            open_browser: true,
            timeout: DEFAULT_AUTH_TIMEOUT,
            authorize_endpoint: authorize_endpoint.into(),
        }
    }

    /// Creates settings for the client and endpoint in `config`.
    pub fn from_config(config: &StravaConfig) -> Self {
        Self::new(&config.credentials.client_id, config.authorize_endpoint())
    }

    /// Sets the requested scope.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Sets the loopback host and preferred port.
    pub fn with_redirect(mut self, host: impl Into<String>, port: u16) -> Self {
        self.redirect_host = host.into();
        self.redirect_port = port;
        self
    }

    /// Enables or disables launching the browser.
    pub fn with_open_browser(mut self, open_browser: bool) -> Self {
        self.open_browser = open_browser;
        self
    }

    /// Sets the wait timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Runs the browser-based authorization and returns the authorization code.
#[derive(Debug, Clone)]
pub struct LocalAuthorizer {
    settings: AuthorizerSettings,
}

impl LocalAuthorizer {
    /// Creates an authorizer.
    pub fn new(settings: AuthorizerSettings) -> Self {
        Self { settings }
    }

    /// Returns the settings.
    pub fn settings(&self) -> &AuthorizerSettings {
        &self.settings
    }

    /// Binds the listener and starts serving the redirect route.
    pub async fn start(&self) -> ApiResult<PendingAuthorization> {
        PendingAuthorization::start(&self.settings).await
    }

    /// Runs the whole flow: listen, show the URL, open the browser, wait.
    ///
    /// # Errors
    ///
    /// - [`ApiError::AuthorizationTimeout`] if no code arrives in time
    /// - [`ApiError::Io`] if no port at all could be bound
    pub async fn authorize(&self) -> ApiResult<String> {
        let pending = self.start().await?;

        println!(
            "If your browser didn't open automatically, open this URL:\n{}",
            pending.authorization_url()
        );

        if self.settings.open_browser
            && let Err(e) = open::that(pending.authorization_url())
        {
            warn!("failed to open browser: {}", e);
        }

        pending.wait(self.settings.timeout).await
    }
}

/// A running loopback listener waiting for the authorization redirect.
///
/// Dropping it without calling [`PendingAuthorization::wait`] aborts the
/// listener task.
#[derive(Debug)]
pub struct PendingAuthorization {
    authorization_url: String,
    redirect_uri: String,
    local_addr: SocketAddr,
    code_rx: oneshot::Receiver<String>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<()>>,
}

impl PendingAuthorization {
    async fn start(settings: &AuthorizerSettings) -> ApiResult<Self> {
        let listener = bind_listener(&settings.redirect_host, settings.redirect_port).await?;
        let local_addr = listener.local_addr()?;

        let redirect_uri = format!(
            "http://{}:{}{}",
            settings.redirect_host,
            local_addr.port(),
            EXCHANGE_PATH
        );
        let authorization_url = build_authorization_url(
            &settings.authorize_endpoint,
            &settings.client_id,
            &redirect_uri,
            &settings.scope,
        );

        let (code_tx, code_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let server = tokio::spawn(serve(listener, code_tx, shutdown_rx));

        info!(%local_addr, "listening for authorization redirect");

        Ok(Self {
            authorization_url,
            redirect_uri,
            local_addr,
            code_rx,
            shutdown_tx: Some(shutdown_tx),
            server: Some(server),
        })
    }

    /// The URL the user must visit.
    pub fn authorization_url(&self) -> &str {
        &self.authorization_url
    }

    /// The redirect URI embedded in the authorization URL.
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Waits for the authorization code, then shuts the listener down.
    pub async fn wait(mut self, timeout: Duration) -> ApiResult<String> {
        let result = self.poll_for_code(timeout).await;
        self.shutdown().await;
        result
    }

    async fn poll_for_code(&mut self, timeout: Duration) -> ApiResult<String> {
        let deadline = Instant::now() + timeout;
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.code_rx.try_recv() {
                Ok(code) => {
                    info!("received authorization code");
                    return Ok(code);
                }
                Err(oneshot::error::TryRecvError::Empty) => {}
                Err(oneshot::error::TryRecvError::Closed) => {
                    return Err(ApiError::authentication(
                        "authorization listener stopped before a code was received",
                    ));
                }
            }
            if Instant::now() >= deadline {
                return Err(ApiError::AuthorizationTimeout {
                    seconds: timeout.as_secs(),
                });
            }
        }
    }

    async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(server) = self.server.take()
            && let Err(e) = server.await
            && !e.is_cancelled()
        {
            warn!("authorization listener task failed: {}", e);
        }
        debug!(local_addr = %self.local_addr, "authorization listener shut down");
    }
}

impl Drop for PendingAuthorization {
    fn drop(&mut self) {
        if let Some(server) = self.server.take() {
            server.abort();
        }
    }
}

/// Binds `host:port`, falling back to an ephemeral port on the same host.
async fn bind_listener(host: &str, port: u16) -> ApiResult<TcpListener> {
    match TcpListener::bind((host, port)).await {
        Ok(listener) => Ok(listener),
        Err(e) => {
            debug!("port {} unavailable ({}), using an ephemeral port", port, e);
            TcpListener::bind((host, 0)).await.map_err(ApiError::from)
        }
    }
}

/// Builds the Strava authorization URL.
pub fn build_authorization_url(
    authorize_endpoint: &str,
    client_id: &str,
    redirect_uri: &str,
    scope: &str,
) -> String {
    format!(
        "{}?client_id={}&response_type=code&redirect_uri={}&approval_prompt=auto&scope={}",
        authorize_endpoint,
        urlencoding::encode(client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(scope),
    )
}

/// Accept loop. Sends the first captured code and keeps answering until
/// told to stop. Connection tasks are aborted along with the loop.
async fn serve(
    listener: TcpListener,
    code_tx: oneshot::Sender<String>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let code_tx = Arc::new(Mutex::new(Some(code_tx)));
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("failed to accept connection: {}", e);
                        continue;
                    }
                };
                debug!(%peer, "callback connection");

                let code_tx = Arc::clone(&code_tx);
                connections.spawn(async move {
                    match tokio::time::timeout(CONNECTION_READ_TIMEOUT, handle_connection(stream)).await {
                        Ok(Ok(Some(code))) => {
                            if let Some(tx) = code_tx.lock().await.take() {
                                let _ = tx.send(code);
                            }
                        }
                        Ok(Ok(None)) => {}
                        Ok(Err(e)) => debug!("callback connection failed: {}", e),
                        Err(_) => debug!(%peer, "callback connection timed out"),
                    }
                });
            }
        }
    }
}

/// Answers one HTTP request; returns the code if this was the redirect.
async fn handle_connection(mut stream: TcpStream) -> std::io::Result<Option<String>> {
    let (reader, mut writer) = stream.split();
    let mut reader = BufReader::new(reader);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    let mut header = String::new();
    for _ in 0..MAX_HEADER_LINES {
        header.clear();
        let read = reader.read_line(&mut header).await?;
        if read == 0 || header == "\r\n" || header == "\n" {
            break;
        }
    }

    let code = parse_callback(&request_line);
    let response = match code {
        Some(_) => format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\n\
             Content-Length: {}\r\nConnection: close\r\n\r\n{}",
            SUCCESS_PAGE.len(),
            SUCCESS_PAGE
        ),
        None => "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            .to_string(),
    };

    writer.write_all(response.as_bytes()).await?;
    writer.flush().await?;
    writer.shutdown().await?;
    Ok(code)
}

/// Extracts the `code` parameter from a `GET /exchange_token?...` request line.
fn parse_callback(request_line: &str) -> Option<String> {
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?;
    let target = parts.next()?;
    if method != "GET" {
        return None;
    }

    let url = Url::parse("http://localhost").ok()?.join(target).ok()?;
    if !url.path().ends_with(EXCHANGE_PATH) {
        return None;
    }

    if let Some((_, error)) = url.query_pairs().find(|(k, _)| k == "error") {
        warn!("authorization was not granted: {}", error);
    }

    url.query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.into_owned())
        .filter(|code| !code.is_empty())
}
