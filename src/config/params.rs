// ABOUTME: Validated, immutable parameter sets for the deploy and cleanup flows.
// ABOUTME: Built from raw operator input; construction is the validation stage.

use super::error::{Error, Result};
use super::target::local_checkout_dir;
use super::SshSettings;
use crate::ssh::SessionConfig;
use crate::types::{AppName, Port, RepoUrl, Secret};
use std::path::{Path, PathBuf};

pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Unvalidated input as collected from flags, environment and the config file.
#[derive(Debug, Clone, Default)]
pub struct RawParameters {
    pub repository: Option<String>,
    pub credential: Secret,
    pub branch: Option<String>,
    pub user: Option<String>,
    pub host: Option<String>,
    pub ssh_port: Option<u16>,
    pub key_path: Option<PathBuf>,
    pub container_port: Option<String>,
    pub app: Option<String>,
    pub workdir: Option<PathBuf>,
}

/// How to reach the target host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAccess {
    pub user: String,
    pub host: String,
    pub port: u16,
    pub key_path: PathBuf,
}

impl RemoteAccess {
    fn from_raw(raw: &RawParameters) -> Result<Self> {
        let user = required(&raw.user, "remote user")?;
        if user.chars().any(|c| c.is_whitespace() || c == '@' || c == '\'') {
            return Err(Error::Remote {
                field: "user",
                value: user,
            });
        }

        let host = required(&raw.host, "remote host")?;
        if host.chars().any(|c| c.is_whitespace() || c == '/' || c == '@') {
            return Err(Error::Remote {
                field: "host",
                value: host,
            });
        }

        let port = raw.ssh_port.unwrap_or(DEFAULT_SSH_PORT);
        if port == 0 {
            return Err(Error::Remote {
                field: "port",
                value: port.to_string(),
            });
        }

        let key_path = raw
            .key_path
            .as_deref()
            .map(expand_home)
            .ok_or(Error::Missing("private key path"))?;
        if !key_path.is_file() {
            return Err(Error::KeyNotFound(key_path));
        }

        Ok(Self {
            user,
            host,
            port,
            key_path,
        })
    }

    /// SSH session settings for this host.
    pub fn session_config(&self, ssh: &SshSettings) -> SessionConfig {
        let config = SessionConfig::new(&self.host, &self.user, &self.key_path)
            .port(self.port)
            .trust_on_first_use(true)
            .connect_timeout(ssh.connect_timeout)
            .interactive_timeout(ssh.interactive_timeout);

        match &ssh.known_hosts {
            Some(path) => config.known_hosts_path(expand_home(path)),
            None => config,
        }
    }
}

/// Everything a deploy run needs. Immutable once built.
#[derive(Debug, Clone)]
pub struct ParameterSet {
    repository: RepoUrl,
    credential: Secret,
    branch: String,
    remote: RemoteAccess,
    container_port: Port,
    app: AppName,
    checkout_dir: PathBuf,
}

impl ParameterSet {
    pub fn from_raw(raw: &RawParameters) -> Result<Self> {
        let repository = RepoUrl::parse(&required(&raw.repository, "repository URL")?)?;

        let branch = raw
            .branch
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .unwrap_or(DEFAULT_BRANCH)
            .to_string();
        if !git2::Reference::is_valid_name(&format!("refs/heads/{branch}")) {
            return Err(Error::Branch(branch));
        }

        let container_port: Port = required(&raw.container_port, "container port")?.parse()?;
        if container_port == Port::HTTP {
            return Err(Error::ProxyPortClash(container_port.get()));
        }
        let app = parse_app(raw)?;
        let remote = RemoteAccess::from_raw(raw)?;

        let workdir = match &raw.workdir {
            Some(dir) => expand_home(dir),
            None => std::env::current_dir()?,
        };

        Ok(Self {
            checkout_dir: local_checkout_dir(&workdir, &app),
            repository,
            credential: raw.credential.clone(),
            branch,
            remote,
            container_port,
            app,
        })
    }

    pub fn repository(&self) -> &RepoUrl {
        &self.repository
    }

    /// Repository URL safe for logs.
    pub fn display_repository(&self) -> String {
        if self.credential.is_empty() {
            self.repository.to_string()
        } else {
            self.repository.masked()
        }
    }

    pub fn credential(&self) -> &Secret {
        &self.credential
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn remote(&self) -> &RemoteAccess {
        &self.remote
    }

    pub fn container_port(&self) -> Port {
        self.container_port
    }

    pub fn app(&self) -> &AppName {
        &self.app
    }

    pub fn checkout_dir(&self) -> &Path {
        &self.checkout_dir
    }
}

/// Inputs for tearing a deployment down. No repository or port needed.
#[derive(Debug, Clone)]
pub struct CleanupParameters {
    remote: RemoteAccess,
    app: AppName,
}

impl CleanupParameters {
    pub fn from_raw(raw: &RawParameters) -> Result<Self> {
        let app = parse_app(raw)?;
        let remote = RemoteAccess::from_raw(raw)?;
        Ok(Self { remote, app })
    }

    pub fn remote(&self) -> &RemoteAccess {
        &self.remote
    }

    pub fn app(&self) -> &AppName {
        &self.app
    }
}

fn parse_app(raw: &RawParameters) -> Result<AppName> {
    match raw.app.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => Ok(AppName::new(name)?),
        _ => Ok(AppName::default()),
    }
}

fn required(value: &Option<String>, name: &'static str) -> Result<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(Error::Missing(name))
}

/// Expand a leading `~/` to the local home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}
