// ABOUTME: Mirrors the local build context into the remote application directory.
// ABOUTME: Uses rsync when both ends have it, otherwise streams a tar archive over the session.

use crate::config::SyncSettings;
use crate::ssh::{self, RemoteShell, SessionConfig, quote};
use serde::Deserialize;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;

/// How the synchronizer picks its transfer tool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStrategy {
    /// rsync if available locally and remotely, archive otherwise.
    #[default]
    Auto,
    Rsync,
    Archive,
}

/// The transfer tool actually used for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMethod {
    Rsync,
    Archive,
}

impl fmt::Display for TransferMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferMethod::Rsync => write!(f, "rsync"),
            TransferMethod::Archive => write!(f, "tar archive"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("could not create remote directory {dir}:\n{output}")]
    RemoteDirectory { dir: String, output: String },

    #[error("rsync is not available {side}")]
    RsyncUnavailable { side: &'static str },

    #[error("failed to launch rsync: {0}")]
    Launch(#[source] io::Error),

    #[error("rsync exited with {status}:\n{output}")]
    Rsync { status: String, output: String },

    #[error("failed to archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("remote extraction exited with status {code}:\n{output}")]
    Extract { code: u32, output: String },

    #[error(transparent)]
    Ssh(#[from] ssh::Error),
}

/// One-way mirror of a local tree onto the remote host.
#[derive(Debug, Clone)]
pub struct FileSynchronizer {
    ssh: SessionConfig,
    settings: SyncSettings,
}

impl FileSynchronizer {
    /// `ssh` must describe the same host, user and key as the session in use.
    pub fn new(ssh: &SessionConfig, settings: &SyncSettings) -> Self {
        Self {
            ssh: ssh.clone(),
            settings: settings.clone(),
        }
    }

    /// Create the remote directory (and parents) if missing.
    pub async fn ensure_remote_dir(
        &self,
        shell: &dyn RemoteShell,
        dir: &str,
    ) -> Result<(), TransferError> {
        let output = shell.run(&format!("mkdir -p {}", quote(dir))).await?;
        if !output.success() {
            return Err(TransferError::RemoteDirectory {
                dir: dir.to_string(),
                output: output.tail(10),
            });
        }
        Ok(())
    }

    /// Make `remote_dir` match `local_root`, deleting remote files that no longer exist locally.
    pub async fn sync(
        &self,
        shell: &dyn RemoteShell,
        local_root: &Path,
        remote_dir: &str,
    ) -> Result<TransferMethod, TransferError> {
        let method = self.choose_method(shell).await?;
        tracing::info!(
            "Transferring {} to {}:{} via {}",
            local_root.display(),
            self.ssh.host,
            remote_dir,
            method
        );

        match method {
            TransferMethod::Rsync => self.rsync(local_root, remote_dir).await?,
            TransferMethod::Archive => self.stream_archive(shell, local_root, remote_dir).await?,
        }
        Ok(method)
    }

    async fn choose_method(&self, shell: &dyn RemoteShell) -> Result<TransferMethod, TransferError> {
        match self.settings.strategy {
            SyncStrategy::Archive => Ok(TransferMethod::Archive),
            SyncStrategy::Rsync => {
                if !local_rsync().await {
                    return Err(TransferError::RsyncUnavailable { side: "locally" });
                }
                if !remote_rsync(shell).await? {
                    return Err(TransferError::RsyncUnavailable {
                        side: "on the remote host",
                    });
                }
                Ok(TransferMethod::Rsync)
            }
            SyncStrategy::Auto => {
                if local_rsync().await && remote_rsync(shell).await? {
                    Ok(TransferMethod::Rsync)
                } else {
                    Ok(TransferMethod::Archive)
                }
            }
        }
    }

    /// Command-line arguments for the rsync invocation.
    pub fn rsync_args(&self, local_root: &Path, remote_dir: &str) -> Vec<String> {
        let mut ssh = format!(
            "ssh -i {} -p {} -o BatchMode=yes -o StrictHostKeyChecking=yes",
            quote(&self.ssh.key_path.to_string_lossy()),
            self.ssh.port
        );
        if let Some(known_hosts) = &self.ssh.known_hosts_path {
            ssh.push_str(&format!(
                " -o UserKnownHostsFile={}",
                quote(&known_hosts.to_string_lossy())
            ));
        }

        let mut args = vec![
            "-az".to_string(),
            "--delete".to_string(),
            "-e".to_string(),
            ssh,
        ];
        for pattern in &self.settings.exclude {
            args.push("--exclude".to_string());
            args.push(pattern.clone());
        }

        // Trailing slashes copy the contents rather than the directory itself.
        args.push(format!("{}/", local_root.display()));
        let host = if self.ssh.host.contains(':') {
            format!("[{}]", self.ssh.host)
        } else {
            self.ssh.host.clone()
        };
        args.push(format!(
            "{}@{}:{}/",
            self.ssh.user,
            host,
            remote_dir.trim_end_matches('/')
        ));
        args
    }

    async fn rsync(&self, local_root: &Path, remote_dir: &str) -> Result<(), TransferError> {
        let output = Command::new("rsync")
            .args(self.rsync_args(local_root, remote_dir))
            .output()
            .await
            .map_err(TransferError::Launch)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TransferError::Rsync {
                status: output.status.to_string(),
                output: stderr.trim().to_string(),
            });
        }
        Ok(())
    }

    async fn stream_archive(
        &self,
        shell: &dyn RemoteShell,
        local_root: &Path,
        remote_dir: &str,
    ) -> Result<(), TransferError> {
        let root = local_root.to_path_buf();
        let exclude = self.settings.exclude.clone();
        let archive = tokio::task::spawn_blocking(move || build_archive(&root, &exclude))
            .await
            .map_err(|e| TransferError::Archive {
                path: local_root.to_path_buf(),
                source: io::Error::other(e.to_string()),
            })?
            .map_err(|source| TransferError::Archive {
                path: local_root.to_path_buf(),
                source,
            })?;

        tracing::debug!(bytes = archive.len(), "archive built");

        let dir = quote(remote_dir);
        let command = format!("rm -rf {dir} && mkdir -p {dir} && tar -xf - -C {dir}");
        let output = shell.run_with_input(&command, &archive).await?;
        if !output.success() {
            return Err(TransferError::Extract {
                code: output.exit_code,
                output: output.tail(10),
            });
        }
        Ok(())
    }
}

/// Tar archive of `root`, entries in name order, skipping excluded path components.
pub fn build_archive(root: &Path, exclude: &[String]) -> io::Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    builder.follow_symlinks(false);
    append_dir(&mut builder, root, Path::new(""), exclude)?;
    builder.into_inner()
}

fn append_dir(
    builder: &mut tar::Builder<Vec<u8>>,
    dir: &Path,
    relative: &Path,
    exclude: &[String],
) -> io::Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?.collect::<io::Result<_>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name();
        if exclude.iter().any(|pattern| name.to_string_lossy() == pattern.as_str()) {
            continue;
        }

        let path = entry.path();
        let archived = relative.join(&name);
        if entry.file_type()?.is_dir() {
            builder.append_dir(&archived, &path)?;
            append_dir(builder, &path, &archived, exclude)?;
        } else {
            builder.append_path_with_name(&path, &archived)?;
        }
    }
    Ok(())
}

async fn local_rsync() -> bool {
    Command::new("rsync")
        .arg("--version")
        .output()
        .await
        .map(|o| o.status.success())
        .unwrap_or(false)
}

async fn remote_rsync(shell: &dyn RemoteShell) -> Result<bool, TransferError> {
    Ok(shell.run("command -v rsync").await?.success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn synchronizer(strategy: SyncStrategy) -> FileSynchronizer {
        let ssh = SessionConfig::new("example.com", "deploy", "/home/me/.ssh/id_ed25519").port(2222);
        FileSynchronizer::new(
            &ssh,
            &SyncSettings {
                strategy,
                exclude: vec![".git".to_string()],
            },
        )
    }

    #[test]
    fn rsync_args_mirror_with_session_key() {
        let args = synchronizer(SyncStrategy::Rsync)
            .rsync_args(Path::new("/work/demo"), "/home/deploy/demo");

        assert_eq!(&args[..2], ["-az", "--delete"]);
        assert_eq!(args[2], "-e");
        assert!(args[3].contains("-i '/home/me/.ssh/id_ed25519'"));
        assert!(args[3].contains("-p 2222"));
        assert!(args[3].contains("StrictHostKeyChecking=yes"));
        assert!(args[3].contains("BatchMode=yes"));
        assert!(args.windows(2).any(|w| w == ["--exclude", ".git"]));
        assert_eq!(args[args.len() - 2], "/work/demo/");
        assert_eq!(args[args.len() - 1], "deploy@example.com:/home/deploy/demo/");
    }

    #[test]
    fn rsync_args_bracket_ipv6_hosts() {
        let ssh = SessionConfig::new("2001:db8::1", "deploy", "/k");
        let sync = FileSynchronizer::new(&ssh, &SyncSettings::default());

        let args = sync.rsync_args(Path::new("/w"), "/srv/app/");
        assert_eq!(args.last().unwrap(), "deploy@[2001:db8::1]:/srv/app/");
    }

    #[test]
    fn rsync_args_use_configured_known_hosts() {
        let ssh = SessionConfig::new("h.example", "u", "/k").known_hosts_path("/tmp/kh");
        let sync = FileSynchronizer::new(&ssh, &SyncSettings::default());

        let args = sync.rsync_args(Path::new("/w"), "/d");
        assert!(args[3].contains("UserKnownHostsFile='/tmp/kh'"));
    }

    #[test]
    fn archive_skips_excluded_components() {
        let tree = tempfile::tempdir().unwrap();
        fs::create_dir_all(tree.path().join(".git/objects")).unwrap();
        fs::write(tree.path().join(".git/HEAD"), "ref").unwrap();
        fs::create_dir_all(tree.path().join("src")).unwrap();
        fs::write(tree.path().join("src/main.py"), "print()").unwrap();
        fs::write(tree.path().join("Dockerfile"), "FROM python").unwrap();

        let bytes = build_archive(tree.path(), &[".git".to_string()]).unwrap();
        let mut archive = tar::Archive::new(bytes.as_slice());
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| {
                e.unwrap()
                    .path()
                    .unwrap()
                    .to_string_lossy()
                    .trim_end_matches('/')
                    .to_string()
            })
            .collect();

        assert_eq!(names, vec!["Dockerfile", "src", "src/main.py"]);
    }
}
