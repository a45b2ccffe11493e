// ABOUTME: Configuration types and parsing for gitship.yml.
// ABOUTME: Merges file values under command-line input and exposes stage tunables.

mod error;
mod params;
mod target;

pub use error::{Error, Result};
pub use params::{
    CleanupParameters, DEFAULT_BRANCH, DEFAULT_SSH_PORT, ParameterSet, RawParameters,
    RemoteAccess, expand_home,
};
pub use target::{DeploymentTarget, SITES_AVAILABLE, SITES_ENABLED, local_checkout_dir};

use crate::sync::SyncStrategy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "gitship.yml";
pub const CONFIG_FILENAME_ALT: &str = "gitship.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".gitship/config.yml";

/// Contents of an optional gitship.yml.
///
/// Parameter values stay raw here; they are validated together with the
/// command-line values when the pipeline builds its parameter set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub repository: Option<String>,

    #[serde(default)]
    pub branch: Option<String>,

    #[serde(default)]
    pub app: Option<String>,

    #[serde(default)]
    pub container_port: Option<u16>,

    #[serde(default)]
    pub workdir: Option<PathBuf>,

    #[serde(default)]
    pub log_file: Option<PathBuf>,

    #[serde(default)]
    pub remote: RemoteSection,

    #[serde(default)]
    pub ssh: SshSettings,

    #[serde(default)]
    pub sync: SyncSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteSection {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub key: Option<PathBuf>,
}

/// SSH connection tunables.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SshSettings {
    /// Budget for the non-interactive login attempt.
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Budget for the interactive retry (passphrase prompt, agent).
    #[serde(default = "default_interactive_timeout", with = "humantime_serde")]
    pub interactive_timeout: Duration,

    /// known_hosts file used for trust-on-first-use. Defaults to ~/.ssh/known_hosts.
    #[serde(default)]
    pub known_hosts: Option<PathBuf>,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            interactive_timeout: default_interactive_timeout(),
            known_hosts: None,
        }
    }
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_interactive_timeout() -> Duration {
    Duration::from_secs(60)
}

/// File transfer tunables.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncSettings {
    #[serde(default)]
    pub strategy: SyncStrategy,

    /// Path names left out of the mirror, matched against every path component.
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            strategy: SyncStrategy::default(),
            exclude: default_exclude(),
        }
    }
}

fn default_exclude() -> Vec<String> {
    vec![".git".to_string()]
}

/// Stage tunables handed to the pipeline.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub ssh: SshSettings,
    pub sync: SyncSettings,
}

impl FileConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Look for a config file in `dir`. A missing file is not an error.
    pub fn discover(dir: &Path) -> Result<Option<Self>> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path).map(Some);
            }
        }

        Ok(None)
    }

    /// Fill parameters the command line left unset.
    pub fn fill(&self, raw: RawParameters) -> RawParameters {
        RawParameters {
            repository: raw.repository.or_else(|| self.repository.clone()),
            credential: raw.credential,
            branch: raw.branch.or_else(|| self.branch.clone()),
            user: raw.user.or_else(|| self.remote.user.clone()),
            host: raw.host.or_else(|| self.remote.host.clone()),
            ssh_port: raw.ssh_port.or(self.remote.port),
            key_path: raw.key_path.or_else(|| self.remote.key.clone()),
            container_port: raw
                .container_port
                .or_else(|| self.container_port.map(|p| p.to_string())),
            app: raw.app.or_else(|| self.app.clone()),
            workdir: raw.workdir.or_else(|| self.workdir.clone()),
        }
    }

    pub fn settings(&self) -> Settings {
        Settings {
            ssh: self.ssh.clone(),
            sync: self.sync.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
repository: https://github.com/acme/widgets.git
branch: release
app: widgets
container_port: 8000
remote:
  host: app.example.com
  user: deploy
  port: 2222
  key: ~/.ssh/deploy_ed25519
ssh:
  connect_timeout: 5s
  interactive_timeout: 2m
sync:
  strategy: archive
  exclude: [".git", "node_modules"]
"#;

    #[test]
    fn parses_full_file() {
        let config = FileConfig::from_yaml(FULL).unwrap();
        assert_eq!(config.branch.as_deref(), Some("release"));
        assert_eq!(config.remote.port, Some(2222));
        assert_eq!(config.ssh.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.ssh.interactive_timeout, Duration::from_secs(120));
        assert_eq!(config.sync.strategy, SyncStrategy::Archive);
        assert_eq!(config.sync.exclude, vec![".git", "node_modules"]);
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = FileConfig::from_yaml("{}").unwrap();
        let settings = config.settings();
        assert_eq!(settings.ssh.connect_timeout, Duration::from_secs(10));
        assert_eq!(settings.sync.strategy, SyncStrategy::Auto);
        assert_eq!(settings.sync.exclude, vec![".git"]);
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(FileConfig::from_yaml("servers: []").is_err());
    }

    #[test]
    fn command_line_values_win_over_file() {
        let config = FileConfig::from_yaml(FULL).unwrap();
        let raw = RawParameters {
            branch: Some("main".to_string()),
            ..Default::default()
        };

        let merged = config.fill(raw);
        assert_eq!(merged.branch.as_deref(), Some("main"));
        assert_eq!(merged.host.as_deref(), Some("app.example.com"));
        assert_eq!(merged.container_port.as_deref(), Some("8000"));
        assert_eq!(merged.ssh_port, Some(2222));
    }

    #[test]
    fn discover_finds_nothing_in_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileConfig::discover(dir.path()).unwrap().is_none());
    }

    #[test]
    fn discover_reads_dot_directory_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".gitship")).unwrap();
        std::fs::write(dir.path().join(".gitship/config.yml"), "app: demo\n").unwrap();

        let config = FileConfig::discover(dir.path()).unwrap().unwrap();
        assert_eq!(config.app.as_deref(), Some("demo"));
    }

    #[test]
    fn load_reports_missing_file() {
        assert!(matches!(
            FileConfig::load(Path::new("/nonexistent/gitship.yml")),
            Err(Error::ConfigNotFound(_))
        ));
    }
}
