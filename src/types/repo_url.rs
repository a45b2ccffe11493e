// ABOUTME: HTTPS repository URL validation and masking.
// ABOUTME: Only the masked form of a URL is ever meant to be logged.

use super::secret::MASK;
use std::fmt;
use thiserror::Error;
use url::{Host, Url};

/// Username paired with an access token when the URL does not carry one.
pub const TOKEN_USER: &str = "x-access-token";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RepoUrlError {
    #[error("repository URL cannot be parsed: {0}")]
    Unparseable(String),

    #[error("repository URL must use https, got '{0}'")]
    NotHttps(String),

    #[error("repository URL host must be a dotted host name")]
    BadHost,

    #[error("repository URL must include a repository path")]
    MissingPath,

    #[error("repository URL must not embed credentials; supply the token separately")]
    EmbeddedCredentials,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoUrl(Url);

impl RepoUrl {
    pub fn parse(value: &str) -> Result<Self, RepoUrlError> {
        let url =
            Url::parse(value.trim()).map_err(|e| RepoUrlError::Unparseable(e.to_string()))?;

        if url.scheme() != "https" {
            return Err(RepoUrlError::NotHttps(url.scheme().to_string()));
        }

        let dotted = match url.host() {
            Some(Host::Domain(domain)) => {
                domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
            }
            Some(Host::Ipv4(_)) => true,
            _ => false,
        };
        if !dotted {
            return Err(RepoUrlError::BadHost);
        }

        if !url.username().is_empty() || url.password().is_some() {
            return Err(RepoUrlError::EmbeddedCredentials);
        }

        let has_path = url
            .path_segments()
            .is_some_and(|mut segments| segments.any(|s| !s.is_empty()));
        if !has_path {
            return Err(RepoUrlError::MissingPath);
        }

        Ok(Self(url))
    }

    /// The clean URL, without any credential.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn host(&self) -> &str {
        self.0.host_str().unwrap_or_default()
    }

    /// URL with the credential slot shown as a placeholder.
    pub fn masked(&self) -> String {
        let mut url = self.0.clone();
        // Setting userinfo only fails for cannot-be-a-base URLs, which parse() rejects.
        if url.set_username(MASK).is_err() {
            return self.0.to_string();
        }
        url.to_string()
    }
}

impl fmt::Display for RepoUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}
