// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Every parameter can also come from a GITSHIP_* environment variable.

use clap::Parser;
use gitship::config::RawParameters;
use gitship::types::Secret;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "gitship")]
#[command(about = "Build a git repository into a container on a remote host and serve it through nginx")]
#[command(
    long_about = "Build a git repository into a container on a remote host and serve it through nginx.\n\n\
The repository access token is read from GITSHIP_TOKEN, or prompted for when running in a terminal."
)]
#[command(version)]
pub struct Cli {
    /// Remove the deployment (container, image, remote directory, nginx site) instead of deploying
    #[arg(long)]
    pub cleanup: bool,

    /// HTTPS URL of the git repository
    #[arg(long, env = "GITSHIP_REPOSITORY")]
    pub repository: Option<String>,

    /// Branch to deploy [default: main]
    #[arg(long, env = "GITSHIP_BRANCH")]
    pub branch: Option<String>,

    /// SSH user on the remote host
    #[arg(long, env = "GITSHIP_USER")]
    pub user: Option<String>,

    /// Remote host name or address
    #[arg(long, env = "GITSHIP_HOST")]
    pub host: Option<String>,

    /// SSH port [default: 22]
    #[arg(long, env = "GITSHIP_SSH_PORT")]
    pub ssh_port: Option<u16>,

    /// Private key used for SSH
    #[arg(long, env = "GITSHIP_KEY")]
    pub key: Option<PathBuf>,

    /// Host port the container is published on (nginx forwards port 80 here)
    #[arg(long, env = "GITSHIP_PORT")]
    pub port: Option<String>,

    /// Application name; names the container, image, remote directory and nginx site [default: app]
    #[arg(long, env = "GITSHIP_APP")]
    pub app: Option<String>,

    /// Directory holding local clones [default: current directory]
    #[arg(long, env = "GITSHIP_WORKDIR")]
    pub workdir: Option<PathBuf>,

    /// Configuration file [default: gitship.yml in the current directory, if present]
    #[arg(long, env = "GITSHIP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Action log file [default: <state dir>/gitship/gitship.log]
    #[arg(long, env = "GITSHIP_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Show debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Print only the final result
    #[arg(short, long)]
    pub quiet: bool,

    /// Print events as JSON lines
    #[arg(long, conflicts_with = "quiet")]
    pub json: bool,
}

impl Cli {
    /// Parameters given on the command line or in the environment.
    pub fn raw_parameters(&self, credential: Secret) -> RawParameters {
        RawParameters {
            repository: self.repository.clone(),
            credential,
            branch: self.branch.clone(),
            user: self.user.clone(),
            host: self.host.clone(),
            ssh_port: self.ssh_port,
            key_path: self.key.clone(),
            container_port: self.port.clone(),
            app: self.app.clone(),
            workdir: self.workdir.clone(),
        }
    }
}
