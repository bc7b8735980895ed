//! Settings: TOML file overlaid by command-line flags and environment.

use roomsync_client::{ClientConfig, ReconnectPolicy};
use roomsync_core::{CredentialSource, FileCredential, ResumeToken, StaticCredential};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Contents of the config file. Every key is optional.
///
/// ```toml
/// url = "wss://chat.example.com/websocket"
/// token_file = "/home/me/.config/roomsync/token"
///
/// [reconnect]
/// max_attempts = 5
/// base_delay_ms = 1000
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileSettings {
    pub url: Option<String>,
    pub token_file: Option<PathBuf>,
    pub reconnect: Option<ReconnectPolicy>,
}

impl FileSettings {
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Values given on the command line (or through their environment variables).
#[derive(Debug, Default)]
pub struct Overrides {
    pub url: Option<String>,
    pub token: Option<String>,
    pub token_file: Option<PathBuf>,
}

/// Where the resume token comes from, after precedence is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    Inline(ResumeToken),
    File(PathBuf),
    None,
}

impl TokenSource {
    pub fn into_source(self) -> Arc<dyn CredentialSource> {
        match self {
            Self::Inline(token) => Arc::new(StaticCredential::new(token)),
            Self::File(path) => Arc::new(FileCredential::new(path)),
            Self::None => Arc::new(StaticCredential::none()),
        }
    }
}

#[derive(Debug)]
pub struct Settings {
    pub client: ClientConfig,
    pub token: TokenSource,
}

impl Settings {
    /// Flags win over the file, the file over built-in defaults.
    pub fn resolve(file: FileSettings, overrides: Overrides) -> Result<Self, SettingsError> {
        let mut client = ClientConfig::default();
        if let Some(url) = overrides.url.or(file.url) {
            client.url = url;
        }
        if let Some(reconnect) = file.reconnect {
            client.reconnect = reconnect;
        }

        let token = match (overrides.token, overrides.token_file.or(file.token_file)) {
            (Some(token), _) => {
                TokenSource::Inline(token.parse().map_err(|_| SettingsError::EmptyToken)?)
            }
            (None, Some(path)) => TokenSource::File(path),
            (None, None) => TokenSource::None,
        };

        Ok(Self { client, token })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("--token must not be empty")]
    EmptyToken,
}
