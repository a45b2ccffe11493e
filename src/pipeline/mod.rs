// ABOUTME: Deploy and cleanup flows plus the run context they share.
// ABOUTME: Each flow is a fixed sequence of stages; failures carry their stage classification.

mod cleanup;
mod context;
mod deploy;
mod outcome;

pub use cleanup::{
    CleanupError, CleanupReport, ProxyStatus, cleanup, cleanup_remote, cleanup_script,
};
pub use context::{Completion, RunContext};
pub use deploy::{DeploySummary, deploy, deploy_remote};
pub use outcome::PipelineOutcome;

use crate::config::{RawParameters, RemoteAccess, Settings};
use crate::diagnostics::Warning;
use crate::error::{ConnectivitySnafu, PipelineError};
use crate::ssh::{self, Session};
use snafu::ResultExt;
use std::fmt;
use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Which flow to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Deploy,
    Cleanup,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Deploy => write!(f, "deploy"),
            Mode::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// Run `mode` and return a one-line summary on success.
pub async fn run(
    mode: Mode,
    raw: &RawParameters,
    settings: &Settings,
    ctx: &mut RunContext,
) -> Result<String, PipelineError> {
    match mode {
        Mode::Deploy => deploy(raw, settings, ctx).await.map(|s| s.to_string()),
        Mode::Cleanup => cleanup(raw, settings, ctx).await.map(|report| {
            if report.removed.is_empty() {
                "Cleanup complete; nothing was left to remove".to_string()
            } else {
                format!(
                    "Cleanup complete; removed {}",
                    report.removed.join(", ")
                )
            }
        }),
    }
}

/// Open the SSH session, warning first if the port does not answer.
async fn connect(
    remote: &RemoteAccess,
    settings: &Settings,
    ctx: &mut RunContext,
) -> Result<Session, PipelineError> {
    if !ssh::probe(&remote.host, remote.port, PROBE_TIMEOUT).await {
        ctx.warn(Warning::reachability(format!(
            "{}:{} did not accept a TCP connection within {}s; attempting login anyway",
            remote.host,
            remote.port,
            PROBE_TIMEOUT.as_secs()
        )));
    }

    let session = Session::connect(remote.session_config(&settings.ssh))
        .await
        .context(ConnectivitySnafu)?;
    ctx.step(&format!("Connected to {}@{}", remote.user, remote.host));
    Ok(session)
}

async fn disconnect(session: Session, ctx: &mut RunContext) {
    if let Err(e) = session.disconnect().await {
        ctx.warn(Warning::ssh_disconnect(format!(
            "SSH session did not close cleanly: {e}"
        )));
    }
}
