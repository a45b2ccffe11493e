// ABOUTME: Terminal record of a run: success, failing stage, exit code and log location.
// ABOUTME: Created only by RunContext::finish.

use serde::Serialize;
use std::path::PathBuf;

/// Final result of a deploy or cleanup run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOutcome {
    pub success: bool,
    /// Failure classification (`TransferFailure`, ...) or `interrupted`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<String>,
    pub exit_code: i32,
    /// Action log with the details of this run.
    pub log_path: PathBuf,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}
