// ABOUTME: Builds the image and replaces the running container in one remote script.
// ABOUTME: The old container is removed only after the new image has built.

use crate::config::DeploymentTarget;
use crate::source::BuildContext;
use crate::ssh::{self, RemoteShell, quote};
use crate::types::Port;
use std::fmt;
use thiserror::Error;

const STATE_MARKER: &str = "::state::";

/// Progress of the container replacement, as reported by the remote script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Absent,
    Building,
    Built,
    OldRemoved,
    Running,
}

impl ContainerState {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "absent" => Some(Self::Absent),
            "building" => Some(Self::Building),
            "built" => Some(Self::Built),
            "old-removed" => Some(Self::OldRemoved),
            "running" => Some(Self::Running),
            _ => None,
        }
    }

    /// Whether a failure in this state leaves the application without a container.
    pub fn app_down(self) -> bool {
        matches!(self, Self::OldRemoved)
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Absent => "absent",
            Self::Building => "building",
            Self::Built => "built",
            Self::OldRemoved => "old-removed",
            Self::Running => "running",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("container deploy failed in state {state} (exit {code}){}:\n{output}", down_note(.state))]
    Failed {
        state: ContainerState,
        code: u32,
        output: String,
    },

    #[error(transparent)]
    Ssh(#[from] ssh::Error),
}

fn down_note(state: &ContainerState) -> &'static str {
    if state.app_down() {
        "; the previous container is gone and the application is down"
    } else {
        ""
    }
}

/// Everything the deploy script needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub app_dir: String,
    pub image_tag: String,
    pub container_name: String,
    /// Build file name inside `app_dir`.
    pub dockerfile: String,
    /// Host port the proxy forwards to.
    pub host_port: Port,
    /// Port the application listens on inside the container.
    pub exposed_port: Port,
}

impl ContainerSpec {
    pub fn new(target: &DeploymentTarget, host_port: Port, build: &BuildContext) -> Self {
        Self {
            app_dir: target.remote_app_dir.clone(),
            image_tag: target.image_tag.clone(),
            container_name: target.container_name.clone(),
            dockerfile: build.dockerfile_name(),
            host_port,
            exposed_port: build.exposed_port,
        }
    }
}

/// Remote script: build, remove the old container, start the new one.
pub fn deploy_script(spec: &ContainerSpec) -> String {
    let dir = quote(&spec.app_dir);
    let image = quote(&spec.image_tag);
    let name = quote(&spec.container_name);
    let dockerfile = quote(&spec.dockerfile);

    format!(
        r#"set -eu
state() {{ echo "{marker}$1"; }}
state absent
cd {dir}
state building
docker build -f {dockerfile} -t {image} .
state built
docker rm -f {name} >/dev/null 2>&1 || true
state old-removed
docker run -d --name {name} --restart unless-stopped -p {host}:{inner} {image}
state running
"#,
        marker = STATE_MARKER,
        host = spec.host_port,
        inner = spec.exposed_port,
    )
}

/// Last state marker the script printed.
pub fn last_state(stdout: &str) -> ContainerState {
    stdout
        .lines()
        .filter_map(|line| line.trim().strip_prefix(STATE_MARKER))
        .filter_map(ContainerState::parse)
        .last()
        .unwrap_or(ContainerState::Absent)
}

/// Run the deploy script as root.
pub async fn deploy(shell: &dyn RemoteShell, spec: &ContainerSpec) -> Result<(), DeployError> {
    tracing::info!(
        "Deploying container {} from {} ({}:{})",
        spec.container_name,
        spec.image_tag,
        spec.host_port,
        spec.exposed_port
    );

    let output = shell.run_privileged_script(&deploy_script(spec)).await?;
    let state = last_state(&output.stdout);

    if !output.success() || state != ContainerState::Running {
        return Err(DeployError::Failed {
            state,
            code: output.exit_code,
            output: output.tail(20),
        });
    }
    Ok(())
}
