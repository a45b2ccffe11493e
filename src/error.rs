// ABOUTME: Pipeline-level error type and the stage taxonomy with its exit codes.
// ABOUTME: Uses the SNAFU pattern; each variant wraps the failing stage's own error.

use snafu::Snafu;
use std::fmt;

use crate::config;
use crate::container::DeployError;
use crate::pipeline::CleanupError;
use crate::provision::ProvisioningError;
use crate::proxy::ProxyConfigError;
use crate::source::{AcquisitionError, NoBuildContextError};
use crate::ssh;
use crate::sync::TransferError;

/// Exit code used when the run is interrupted (128 + SIGINT).
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Pipeline stages, one error classification each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validation,
    Acquisition,
    BuildContext,
    Connectivity,
    Provisioning,
    Transfer,
    Deploy,
    ProxyConfig,
    Cleanup,
}

impl Stage {
    /// Process exit code for a failure in this stage.
    pub fn exit_code(self) -> i32 {
        match self {
            Stage::Validation => 2,
            Stage::Acquisition => 3,
            Stage::BuildContext => 4,
            Stage::Connectivity => 5,
            Stage::Provisioning => 6,
            Stage::Transfer => 7,
            Stage::Deploy => 8,
            Stage::ProxyConfig => 9,
            Stage::Cleanup => 10,
        }
    }

    /// Name of the failure classification.
    pub fn failure_kind(self) -> &'static str {
        match self {
            Stage::Validation => "InvalidInput",
            Stage::Acquisition => "AcquisitionFailure",
            Stage::BuildContext => "BuildContextMissing",
            Stage::Connectivity => "ConnectivityFailure",
            Stage::Provisioning => "ProvisioningFailure",
            Stage::Transfer => "TransferFailure",
            Stage::Deploy => "DeployFailure",
            Stage::ProxyConfig => "ProxyConfigFailure",
            Stage::Cleanup => "CleanupFailure",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Validation => "validate parameters",
            Stage::Acquisition => "acquire source",
            Stage::BuildContext => "locate build context",
            Stage::Connectivity => "connect",
            Stage::Provisioning => "provision",
            Stage::Transfer => "transfer files",
            Stage::Deploy => "deploy container",
            Stage::ProxyConfig => "configure proxy",
            Stage::Cleanup => "clean up",
        };
        f.write_str(s)
    }
}

/// A failed run, classified by the stage that failed.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    #[snafu(display("invalid input: {source}"))]
    InvalidInput { source: config::Error },

    #[snafu(display("source acquisition failed: {source}"))]
    Acquisition { source: AcquisitionError },

    #[snafu(display("{source}"))]
    BuildContext { source: NoBuildContextError },

    #[snafu(display("remote connection failed: {source}"))]
    Connectivity { source: ssh::Error },

    #[snafu(display("remote provisioning failed: {source}"))]
    Provisioning { source: ProvisioningError },

    #[snafu(display("file transfer failed: {source}"))]
    Transfer { source: TransferError },

    #[snafu(display("{source}"))]
    Deploy { source: DeployError },

    #[snafu(display("proxy configuration failed: {source}"))]
    ProxyConfig { source: ProxyConfigError },

    #[snafu(display("cleanup failed: {source}"))]
    Cleanup { source: CleanupError },
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::InvalidInput { .. } => Stage::Validation,
            PipelineError::Acquisition { .. } => Stage::Acquisition,
            PipelineError::BuildContext { .. } => Stage::BuildContext,
            PipelineError::Connectivity { .. } => Stage::Connectivity,
            PipelineError::Provisioning { .. } => Stage::Provisioning,
            PipelineError::Transfer { .. } => Stage::Transfer,
            PipelineError::Deploy { .. } => Stage::Deploy,
            PipelineError::ProxyConfig { .. } => Stage::ProxyConfig,
            PipelineError::Cleanup { .. } => Stage::Cleanup,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.stage().exit_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Stage; 9] = [
        Stage::Validation,
        Stage::Acquisition,
        Stage::BuildContext,
        Stage::Connectivity,
        Stage::Provisioning,
        Stage::Transfer,
        Stage::Deploy,
        Stage::ProxyConfig,
        Stage::Cleanup,
    ];

    #[test]
    fn exit_codes_are_distinct_and_nonzero() {
        let mut codes: Vec<i32> = ALL.iter().map(|s| s.exit_code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), ALL.len());
        assert!(!codes.contains(&0));
        assert!(!codes.contains(&INTERRUPTED_EXIT_CODE));
    }

    #[test]
    fn error_maps_to_its_stage() {
        let err = PipelineError::InvalidInput {
            source: config::Error::Missing("repository"),
        };
        assert_eq!(err.stage(), Stage::Validation);
        assert_eq!(err.exit_code(), 2);

        let err = PipelineError::Transfer {
            source: TransferError::Extract {
                code: 2,
                output: String::new(),
            },
        };
        assert_eq!(err.stage(), Stage::Transfer);
        assert_eq!(err.exit_code(), 7);
    }
}
