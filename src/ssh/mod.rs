// ABOUTME: SSH client module for the target host.
// ABOUTME: Key-file authentication with an interactive retry and trust-on-first-use host keys.

mod client;
mod error;
mod shell;

pub use client::{CommandOutput, Session, SessionConfig, probe};
pub use error::{Error, Result};
pub use shell::{RemoteShell, quote, remote_home};
