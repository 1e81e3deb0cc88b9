//! Credential store for the Strava client id and secret.
//!
//! Lives at `~/.config/stravajson/credentials.toml`:
//!
//! ```toml
//! [strava]
//! client_id = "12345"
//! client_secret = "pass::strava/client-secret"
//! ```
//!
//! Values may be secret references (see [`crate::secret`]). The file is
//! edited with `toml_edit` so comments and unrelated tables survive `init`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use stravajson_api::OAuthCredentials;
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::{ClientError, ClientResult};
use crate::secret;

const TABLE: &str = "strava";

#[derive(Debug, Default, Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    strava: Option<StoredCredentials>,
}

/// Raw (unresolved) values from the `[strava]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StoredCredentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// File-backed credential storage.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Creates a store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/stravajson/credentials.toml`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stravajson")
            .join("credentials.toml")
    }

    /// Store at the default path.
    pub fn at_default_path() -> Self {
        Self::new(Self::default_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored values. A missing file yields empty credentials.
    pub fn load(&self) -> ClientResult<StoredCredentials> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no credential file");
            return Ok(StoredCredentials::default());
        }

        let content = fs::read_to_string(&self.path)?;
        let file: CredentialsFile = toml::from_str(&content).map_err(|e| {
            ClientError::config(format!("failed to parse {}: {}", self.path.display(), e))
        })?;
        Ok(file.strava.unwrap_or_default())
    }

    /// Writes the client id and secret into `[strava]`, keeping the rest of
    /// the file intact.
    pub fn save(&self, client_id: &str, client_secret: &str) -> ClientResult<()> {
        let content = if self.path.exists() {
            fs::read_to_string(&self.path)?
        } else {
            String::new()
        };

        let mut doc = content.parse::<toml_edit::DocumentMut>().map_err(|e| {
            ClientError::config(format!("failed to parse {}: {}", self.path.display(), e))
        })?;

        if !doc.contains_table(TABLE) {
            doc[TABLE] = toml_edit::Item::Table(toml_edit::Table::new());
        }
        let table = doc[TABLE].as_table_mut().ok_or_else(|| {
            ClientError::config(format!(
                "`{}` in {} is not a table",
                TABLE,
                self.path.display()
            ))
        })?;
        table["client_id"] = toml_edit::value(client_id);
        table["client_secret"] = toml_edit::value(client_secret);

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        fs::write(&self.path, doc.to_string())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }

        info!(path = %self.path.display(), "saved credentials");
        Ok(())
    }
}

/// Resolves the client credentials for a run.
///
/// Each value comes from its environment variable when set, otherwise from
/// the credential file (with secret references expanded).
pub fn resolve_credentials(
    settings: &Settings,
    store: &CredentialStore,
) -> ClientResult<OAuthCredentials> {
    let stored = if settings.client_id.is_some() && settings.client_secret.is_some() {
        StoredCredentials::default()
    } else {
        store.load()?
    };

    let client_id = pick(settings.client_id.as_deref(), stored.client_id.as_deref(), "client_id")?;
    let client_secret = pick(
        settings.client_secret.as_deref(),
        stored.client_secret.as_deref(),
        "client_secret",
    )?;

    match (client_id, client_secret) {
        (Some(id), Some(secret)) => Ok(OAuthCredentials::new(id, secret)),
        _ => Err(ClientError::config(format!(
            "missing Strava credentials. Run `stravajson init`, set STRAVA_CLIENT_ID and \
             STRAVA_CLIENT_SECRET, or edit {}",
            store.path().display()
        ))),
    }
}

fn pick(env: Option<&str>, stored: Option<&str>, name: &str) -> ClientResult<Option<String>> {
    if let Some(value) = env {
        return Ok(Some(value.to_string()));
    }
    let Some(raw) = stored.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    let resolved = secret::resolve(raw)
        .map_err(|e| ClientError::config(format!("failed to resolve {}: {}", name, e)))?;
    Ok(Some(resolved).filter(|v| !v.trim().is_empty()))
}
