// ABOUTME: Errors raised while loading and validating deployment parameters.
// ABOUTME: Every variant classifies as invalid input.

use crate::types::{AppNameError, PortError, RepoUrlError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("missing required parameter: {0}")]
    Missing(&'static str),

    #[error("invalid repository URL: {0}")]
    RepoUrl(#[from] RepoUrlError),

    #[error("invalid application name: {0}")]
    AppName(#[from] AppNameError),

    #[error("invalid container port: {0}")]
    Port(#[from] PortError),

    #[error("container port {0} is already used by the reverse proxy")]
    ProxyPortClash(u16),

    #[error("invalid branch name: '{0}'")]
    Branch(String),

    #[error("invalid remote {field}: '{value}'")]
    Remote { field: &'static str, value: String },

    #[error("private key file not found: {0}")]
    KeyNotFound(PathBuf),

    #[error("configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
