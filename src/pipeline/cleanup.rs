// ABOUTME: The cleanup flow: tear down everything a deploy created for one application.
// ABOUTME: One best-effort remote script; success is judged by that script's own exit status.

use super::context::RunContext;
use super::{connect, disconnect};
use crate::config::{CleanupParameters, DeploymentTarget, RawParameters, Settings};
use crate::diagnostics::Warning;
use crate::error::{CleanupSnafu, ConnectivitySnafu, InvalidInputSnafu, PipelineError, Stage};
use crate::ssh::{self, RemoteShell, quote};
use crate::types::AppName;
use snafu::ResultExt;
use thiserror::Error;

const REMOVED_MARKER: &str = "::removed::";
const FAILED_MARKER: &str = "::failed::";
const PROXY_MARKER: &str = "::proxy::";

#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("cleanup script exited with status {code}:\n{output}")]
    Script { code: u32, output: String },

    #[error(transparent)]
    Ssh(#[from] ssh::Error),
}

/// State of nginx after the proxy files were handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyStatus {
    /// No proxy file was removed, so nothing to reload.
    Unchanged,
    Reloaded,
    ReloadFailed,
    /// Remaining configuration does not validate; reload skipped.
    Invalid,
    NotInstalled,
}

/// What a cleanup run removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: Vec<String>,
    pub proxy: ProxyStatus,
}

/// Root script removing container, image, directory and nginx site of `target`.
pub fn cleanup_script(target: &DeploymentTarget) -> String {
    format!(
        r#"set -u
FAILED=0
removed() {{ echo "{removed}$1"; }}
failed() {{ echo "{failed}$1"; FAILED=1; }}

if command -v docker >/dev/null 2>&1; then
    if docker container inspect {name} >/dev/null 2>&1; then
        if docker rm -f {name} >/dev/null; then removed "container "{name}; else failed "container "{name}; fi
    fi
    if docker image inspect {image} >/dev/null 2>&1; then
        if docker rmi -f {image} >/dev/null; then removed "image "{image}; else failed "image "{image}; fi
    fi
fi

if [ -e {dir} ]; then
    if rm -rf {dir}; then removed "directory "{dir}; else failed "directory "{dir}; fi
fi

PROXY_CHANGED=0
for f in {conf} {link}; do
    if [ -e "$f" ] || [ -L "$f" ]; then
        if rm -f "$f"; then removed "proxy $f"; PROXY_CHANGED=1; else failed "proxy $f"; fi
    fi
done
rm -f {conf}.previous {conf}.rejected

if [ "$PROXY_CHANGED" -eq 0 ]; then
    echo "{proxy}unchanged"
elif ! command -v nginx >/dev/null 2>&1 && [ ! -x /usr/sbin/nginx ]; then
    echo "{proxy}not-installed"
elif nginx -t >/dev/null 2>&1; then
    if systemctl reload nginx >/dev/null 2>&1 || nginx -s reload >/dev/null 2>&1; then
        echo "{proxy}reloaded"
    else
        echo "{proxy}reload-failed"
    fi
else
    echo "{proxy}invalid"
fi

exit $FAILED
"#,
        removed = REMOVED_MARKER,
        failed = FAILED_MARKER,
        proxy = PROXY_MARKER,
        name = quote(&target.container_name),
        image = quote(&target.image_tag),
        dir = quote(&target.remote_app_dir),
        conf = quote(&target.proxy_config_path),
        link = quote(&target.proxy_enabled_path),
    )
}

/// Run the full cleanup flow.
pub async fn cleanup(
    raw: &RawParameters,
    settings: &Settings,
    ctx: &mut RunContext,
) -> Result<CleanupReport, PipelineError> {
    ctx.enter(Stage::Validation);
    let params = CleanupParameters::from_raw(raw).context(InvalidInputSnafu)?;
    ctx.step(&format!(
        "Cleaning up '{}' on {}@{}:{}",
        params.app(),
        params.remote().user,
        params.remote().host,
        params.remote().port
    ));

    ctx.enter(Stage::Connectivity);
    let session = connect(params.remote(), settings, ctx).await?;
    let result = cleanup_remote(&session, params.app(), ctx).await;
    disconnect(session, ctx).await;
    result
}

/// Remote half of the cleanup flow, over an established session.
pub async fn cleanup_remote(
    shell: &dyn RemoteShell,
    app: &AppName,
    ctx: &mut RunContext,
) -> Result<CleanupReport, PipelineError> {
    let home = ssh::remote_home(shell).await.context(ConnectivitySnafu)?;
    let target = DeploymentTarget::derive(app, &home);

    ctx.enter(Stage::Cleanup);
    let report = run_script(shell, &target).await.context(CleanupSnafu)?;

    if report.removed.is_empty() {
        ctx.step("Nothing to remove");
    }
    for item in &report.removed {
        ctx.step(&format!("Removed {item}"));
    }
    match report.proxy {
        ProxyStatus::ReloadFailed => {
            ctx.warn(Warning::proxy_reload("nginx configuration is valid but reload failed"))
        }
        ProxyStatus::Invalid => ctx.warn(Warning::proxy_reload(
            "remaining nginx configuration does not validate; nginx was not reloaded",
        )),
        ProxyStatus::Reloaded => ctx.step("Reloaded nginx"),
        ProxyStatus::Unchanged | ProxyStatus::NotInstalled => {}
    }

    Ok(report)
}

async fn run_script(
    shell: &dyn RemoteShell,
    target: &DeploymentTarget,
) -> Result<CleanupReport, CleanupError> {
    let output = shell.run_privileged_script(&cleanup_script(target)).await?;

    // The exit status is the remote script's own, read from the channel.
    if !output.success() {
        return Err(CleanupError::Script {
            code: output.exit_code,
            output: output.tail(20),
        });
    }
    Ok(parse_report(&output.stdout))
}

fn parse_report(stdout: &str) -> CleanupReport {
    let mut removed = Vec::new();
    let mut proxy = ProxyStatus::Unchanged;

    for line in stdout.lines().map(str::trim) {
        if let Some(item) = line.strip_prefix(REMOVED_MARKER) {
            removed.push(item.to_string());
        } else if let Some(status) = line.strip_prefix(PROXY_MARKER) {
            proxy = match status {
                "reloaded" => ProxyStatus::Reloaded,
                "reload-failed" => ProxyStatus::ReloadFailed,
                "invalid" => ProxyStatus::Invalid,
                "not-installed" => ProxyStatus::NotInstalled,
                _ => ProxyStatus::Unchanged,
            };
        }
    }

    CleanupReport { removed, proxy }
}
