// ABOUTME: Validated domain types shared by every pipeline stage.
// ABOUTME: Invalid values are rejected at construction so stages never re-check them.

mod app_name;
mod port;
mod repo_url;
mod secret;

pub use app_name::{AppName, AppNameError, DEFAULT_APP_NAME};
pub use port::{Port, PortError};
pub use repo_url::{RepoUrl, RepoUrlError, TOKEN_USER};
pub use secret::{MASK, Secret};
