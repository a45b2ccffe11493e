// ABOUTME: SSH-specific error types.
// ABOUTME: Covers connection, authentication, host key and remote command failures.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("connection attempt timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("authentication failed: no valid credentials")]
    AuthenticationFailed,

    #[error("host key for {host}:{port} does not match known_hosts")]
    HostKeyMismatch { host: String, port: u16 },

    #[error("SSH agent not available: {0}")]
    AgentUnavailable(String),

    #[error("failed to load key from {path}: {reason}")]
    KeyLoadFailed { path: PathBuf, reason: String },

    #[error(
        "could not log in non-interactively ({non_interactive}) or interactively ({interactive})"
    )]
    Unreachable {
        non_interactive: String,
        interactive: String,
    },

    #[error("command execution failed: {0}")]
    CommandFailed(String),

    #[error("channel closed unexpectedly without exit status")]
    ChannelClosed,

    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),

    #[error("SSH key error: {0}")]
    Key(#[from] russh::keys::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
