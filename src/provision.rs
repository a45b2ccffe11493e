// ABOUTME: Ensures the remote host has docker and nginx installed, enabled and running.
// ABOUTME: One idempotent script; components already on PATH are left alone.

use crate::ssh::{self, RemoteShell, quote};
use thiserror::Error;

const UNSUPPORTED_EXIT: u32 = 3;
const INSTALL_FAILED_EXIT: u32 = 4;

#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("no supported package manager found on remote host (need apt-get, dnf or yum)")]
    UnsupportedPackageManager,

    #[error("failed to install {component}:\n{output}")]
    InstallFailed { component: String, output: String },

    #[error("provisioning script exited with status {code}:\n{output}")]
    ScriptFailed { code: u32, output: String },

    #[error(transparent)]
    Ssh(#[from] ssh::Error),
}

/// What the provisioning run found and did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    pub installed: Vec<String>,
    pub present: Vec<String>,
    /// Non-fatal problems, e.g. a service that would not start or the group change.
    pub warnings: Vec<String>,
}

/// Shell script that provisions the host for `user`.
///
/// Runs as the login user and elevates each step with `sudo -n`.
pub fn provision_script(user: &str) -> String {
    format!(
        r#"set -u
SUDO=""
if [ "$(id -u)" -ne 0 ]; then SUDO="sudo -n"; fi

have() {{
    command -v "$1" >/dev/null 2>&1 || [ -x "/usr/sbin/$1" ] || [ -x "/usr/bin/$1" ]
}}

if command -v apt-get >/dev/null 2>&1; then
    PM=apt
    DOCKER_PKG=docker.io
elif command -v dnf >/dev/null 2>&1; then
    PM=dnf
    DOCKER_PKG=docker
elif command -v yum >/dev/null 2>&1; then
    PM=yum
    DOCKER_PKG=docker
else
    echo "::provision::unsupported"
    exit {unsupported}
fi

UPDATED=0
install_pkg() {{
    case "$PM" in
        apt)
            if [ "$UPDATED" -eq 0 ]; then
                $SUDO env DEBIAN_FRONTEND=noninteractive apt-get update -q || return 1
                UPDATED=1
            fi
            $SUDO env DEBIAN_FRONTEND=noninteractive apt-get install -y -q "$1"
            ;;
        *)
            $SUDO "$PM" install -y -q "$1"
            ;;
    esac
}}

ensure() {{
    if have "$1"; then
        echo "::provision::present:$1"
    elif install_pkg "$2"; then
        echo "::provision::installed:$1"
    else
        echo "::provision::install-failed:$1"
        exit {install_failed}
    fi
}}

ensure docker "$DOCKER_PKG"
ensure nginx nginx

for svc in docker nginx; do
    if ! {{ $SUDO systemctl enable --now "$svc" || $SUDO service "$svc" start; }} >/dev/null 2>&1; then
        echo "::provision::service-warning:$svc"
    fi
done

if ! $SUDO usermod -aG docker {user} >/dev/null 2>&1; then
    echo "::provision::group-warning:docker"
fi
"#,
        unsupported = UNSUPPORTED_EXIT,
        install_failed = INSTALL_FAILED_EXIT,
        user = quote(user),
    )
}

/// Provision the remote host.
pub async fn provision(
    shell: &dyn RemoteShell,
    user: &str,
) -> Result<ProvisionReport, ProvisioningError> {
    let output = shell.run_script(&provision_script(user)).await?;
    let report = parse_report(&output.stdout);

    match output.exit_code {
        0 => Ok(report),
        UNSUPPORTED_EXIT => Err(ProvisioningError::UnsupportedPackageManager),
        INSTALL_FAILED_EXIT => Err(ProvisioningError::InstallFailed {
            component: failed_component(&output.stdout).unwrap_or_else(|| "unknown".into()),
            output: output.tail(20),
        }),
        code => Err(ProvisioningError::ScriptFailed {
            code,
            output: output.tail(20),
        }),
    }
}

fn markers(stdout: &str) -> impl Iterator<Item = &str> {
    stdout
        .lines()
        .filter_map(|line| line.trim().strip_prefix("::provision::"))
}

fn parse_report(stdout: &str) -> ProvisionReport {
    let mut report = ProvisionReport::default();
    for marker in markers(stdout) {
        if let Some(c) = marker.strip_prefix("installed:") {
            report.installed.push(c.to_string());
        } else if let Some(c) = marker.strip_prefix("present:") {
            report.present.push(c.to_string());
        } else if let Some(svc) = marker.strip_prefix("service-warning:") {
            report
                .warnings
                .push(format!("could not enable or start service {svc}"));
        } else if let Some(group) = marker.strip_prefix("group-warning:") {
            report.warnings.push(format!(
                "could not add remote user to the {group} group; later unprivileged sessions may lack access"
            ));
        }
    }
    report
}

fn failed_component(stdout: &str) -> Option<String> {
    markers(stdout)
        .find_map(|m| m.strip_prefix("install-failed:"))
        .map(str::to_string)
}
