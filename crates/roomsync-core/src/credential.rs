//! Resume credentials.
//!
//! The backend issues a resume token at login. The sync client never logs in
//! with a password; it reads the stored token each time it opens a transport.
//!
//! Sources:
//! - [`StaticCredential`] - a token held in memory
//! - [`FileCredential`] - a token persisted in a local file

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// A previously issued authentication token.
///
/// `Debug` and `Display` redact the secret.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ResumeToken(String);

impl ResumeToken {
    /// Wrap a token without validation.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for placing on the wire.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ResumeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResumeToken(..)")
    }
}

impl fmt::Display for ResumeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Enough to tell tokens apart in logs.
        let prefix: String = self.0.chars().take(4).collect();
        write!(f, "{prefix}…")
    }
}

impl FromStr for ResumeToken {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        if token.is_empty() {
            return Err(CredentialError::Empty);
        }
        Ok(Self(token.to_string()))
    }
}

/// Where the client reads its resume token from.
pub trait CredentialSource: Send + Sync {
    /// Read the current token. `Ok(None)` means no session is stored.
    fn resume_token(&self) -> Result<Option<ResumeToken>, CredentialError>;
}

/// A token fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct StaticCredential(Option<ResumeToken>);

impl StaticCredential {
    pub fn new(token: ResumeToken) -> Self {
        Self(Some(token))
    }

    /// No stored session.
    pub fn none() -> Self {
        Self(None)
    }
}

impl CredentialSource for StaticCredential {
    fn resume_token(&self) -> Result<Option<ResumeToken>, CredentialError> {
        Ok(self.0.clone())
    }
}

/// A token stored in a file, re-read on every call.
///
/// A missing file means no stored session. Reads block; async callers
/// should go through `spawn_blocking`.
#[derive(Debug, Clone)]
pub struct FileCredential {
    path: PathBuf,
}

impl FileCredential {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialSource for FileCredential {
    fn resume_token(&self) -> Result<Option<ResumeToken>, CredentialError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no stored resume token");
                return Ok(None);
            }
            Err(source) => {
                return Err(CredentialError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        contents.parse().map(Some)
    }
}

/// Error reading a resume credential.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("failed to read token file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("resume token is empty")]
    Empty,
}
