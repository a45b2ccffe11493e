// ABOUTME: The deploy flow: validate, acquire, locate, connect, provision, transfer, deploy, proxy.
// ABOUTME: Stages run strictly in order and the first failure ends the run.

use super::context::RunContext;
use super::{connect, disconnect};
use crate::config::{DeploymentTarget, ParameterSet, RawParameters, Settings};
use crate::container::{self, ContainerSpec};
use crate::diagnostics::Warning;
use crate::error::{
    AcquisitionSnafu, BuildContextSnafu, ConnectivitySnafu, DeploySnafu, InvalidInputSnafu,
    PipelineError, ProvisioningSnafu, ProxyConfigSnafu, Stage, TransferSnafu,
};
use crate::provision;
use crate::proxy;
use crate::source::{self, BuildContext, SourceRequest};
use crate::ssh::{self, RemoteShell};
use crate::sync::FileSynchronizer;
use snafu::ResultExt;
use std::fmt;

/// What a successful deploy produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploySummary {
    pub revision: String,
    pub image: String,
    pub container: String,
    pub url: String,
}

impl fmt::Display for DeploySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = &self.revision[..self.revision.len().min(12)];
        write!(
            f,
            "Deployed {short} as container {} (image {}) at {}",
            self.container, self.image, self.url
        )
    }
}

/// Run the full deploy flow.
pub async fn deploy(
    raw: &RawParameters,
    settings: &Settings,
    ctx: &mut RunContext,
) -> Result<DeploySummary, PipelineError> {
    ctx.enter(Stage::Validation);
    let params = ParameterSet::from_raw(raw).context(InvalidInputSnafu)?;
    ctx.step(&format!(
        "Deploying {} ({}) as '{}' to {}@{}:{}",
        params.display_repository(),
        params.branch(),
        params.app(),
        params.remote().user,
        params.remote().host,
        params.remote().port
    ));

    ctx.enter(Stage::Acquisition);
    let checkout = source::acquire(SourceRequest::for_params(&params))
        .await
        .context(AcquisitionSnafu)?;
    ctx.step(&format!(
        "{} at {} ({})",
        checkout.path.display(),
        checkout.revision,
        if checkout.fresh_clone { "fresh clone" } else { "updated" }
    ));

    ctx.enter(Stage::BuildContext);
    let build = source::locate(&checkout.path).context(BuildContextSnafu)?;
    ctx.step(&format!(
        "Build context {} (container listens on {})",
        build.root.display(),
        build.exposed_port
    ));

    ctx.enter(Stage::Connectivity);
    let session = connect(params.remote(), settings, ctx).await?;
    let result = deploy_remote(&session, &params, &build, settings, ctx).await;
    disconnect(session, ctx).await;
    let target = result?;

    Ok(DeploySummary {
        revision: checkout.revision,
        image: target.image_tag,
        container: target.container_name,
        url: format!("http://{}/", params.remote().host),
    })
}

/// Remote half of the deploy flow, over an established session.
pub async fn deploy_remote(
    shell: &dyn RemoteShell,
    params: &ParameterSet,
    build: &BuildContext,
    settings: &Settings,
    ctx: &mut RunContext,
) -> Result<DeploymentTarget, PipelineError> {
    let home = ssh::remote_home(shell).await.context(ConnectivitySnafu)?;
    let target = DeploymentTarget::derive(params.app(), &home);
    ctx.step(&format!("Remote application directory {}", target.remote_app_dir));

    ctx.enter(Stage::Provisioning);
    let report = provision::provision(shell, &params.remote().user)
        .await
        .context(ProvisioningSnafu)?;
    for component in &report.installed {
        ctx.step(&format!("Installed {component}"));
    }
    for component in &report.present {
        ctx.step(&format!("{component} already present"));
    }
    for warning in report.warnings {
        ctx.warn(Warning::provisioning(warning));
    }

    ctx.enter(Stage::Transfer);
    let synchronizer = FileSynchronizer::new(
        &params.remote().session_config(&settings.ssh),
        &settings.sync,
    );
    synchronizer
        .ensure_remote_dir(shell, &target.remote_app_dir)
        .await
        .context(TransferSnafu)?;
    let method = synchronizer
        .sync(shell, &build.root, &target.remote_app_dir)
        .await
        .context(TransferSnafu)?;
    ctx.step(&format!("Transferred {} via {method}", build.root.display()));

    ctx.enter(Stage::Deploy);
    let spec = ContainerSpec::new(&target, params.container_port(), build);
    container::deploy(shell, &spec).await.context(DeploySnafu)?;
    ctx.step(&format!(
        "Container {} running, publishing {}:{}",
        spec.container_name, spec.host_port, spec.exposed_port
    ));

    ctx.enter(Stage::ProxyConfig);
    proxy::configure(shell, &target, params.container_port())
        .await
        .context(ProxyConfigSnafu)?;
    ctx.step(&format!(
        "nginx forwards port 80 to 127.0.0.1:{}",
        params.container_port()
    ));

    Ok(target)
}
