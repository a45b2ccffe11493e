// ABOUTME: Error types for source acquisition and build context discovery.
// ABOUTME: URLs in these errors are always the masked form.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("branch '{branch}' does not exist on {url}")]
    BranchNotFound { branch: String, url: String },

    #[error("authentication rejected by {url}")]
    AuthenticationRejected { url: String },

    #[error("{0} exists but is not a git working tree")]
    NotAWorkingTree(PathBuf),

    #[error("failed to clone {url}: {message}")]
    CloneFailed { url: String, message: String },

    #[error("failed to update working tree at {path}: {message}")]
    UpdateFailed { path: PathBuf, message: String },

    #[error("git task aborted: {0}")]
    Task(String),
}

/// No Dockerfile at the tree root or one level below it.
#[derive(Debug, Error)]
#[error(
    "no Dockerfile found in {} or its immediate subdirectories (entries: {})",
    .root.display(),
    list_entries(.entries)
)]
pub struct NoBuildContextError {
    pub root: PathBuf,
    /// Immediate entries of the root, for diagnosis.
    pub entries: Vec<String>,
}

fn list_entries(entries: &[String]) -> String {
    if entries.is_empty() {
        "none".to_string()
    } else {
        entries.join(", ")
    }
}
