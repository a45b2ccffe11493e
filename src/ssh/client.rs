// ABOUTME: SSH session management using russh.
// ABOUTME: Handles reachability probing, two-phase login, and command execution.

use super::error::{Error, Result};
use russh::client::{self, Config, Handle};
use russh::keys::agent::client::AgentClient;
use russh::keys::known_hosts::{
    check_known_hosts, check_known_hosts_path, learn_known_hosts, learn_known_hosts_path,
};
use russh::keys::{PrivateKeyWithHashAlg, load_secret_key, ssh_key};
use russh::{ChannelMsg, Disconnect};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpStream, UnixStream};

/// Configuration for establishing an SSH session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Remote host to connect to.
    pub host: String,
    /// SSH port (default: 22).
    pub port: u16,
    /// Username for authentication.
    pub user: String,
    /// Private key used for the login.
    pub key_path: PathBuf,
    /// Whether to accept unknown hosts (Trust On First Use).
    /// If false, connection to unknown hosts will fail.
    pub trust_on_first_use: bool,
    /// Optional path to known_hosts file.
    /// If None, uses the default ~/.ssh/known_hosts.
    pub known_hosts_path: Option<PathBuf>,
    /// Budget for the non-interactive login attempt.
    pub connect_timeout: Duration,
    /// Budget for the interactive retry.
    pub interactive_timeout: Duration,
}

impl SessionConfig {
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            host: host.into(),
            port: 22,
            user: user.into(),
            key_path: key_path.into(),
            trust_on_first_use: false,
            known_hosts_path: None,
            connect_timeout: Duration::from_secs(10),
            interactive_timeout: Duration::from_secs(60),
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn trust_on_first_use(mut self, tofu: bool) -> Self {
        self.trust_on_first_use = tofu;
        self
    }

    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn interactive_timeout(mut self, timeout: Duration) -> Self {
        self.interactive_timeout = timeout;
        self
    }
}

/// Output from a remote command execution.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code of the command.
    pub exit_code: u32,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last `lines` lines of stdout followed by stderr, for error messages.
    pub fn tail(&self, lines: usize) -> String {
        let combined: Vec<&str> = self
            .stdout
            .lines()
            .chain(self.stderr.lines())
            .filter(|l| !l.trim().is_empty())
            .collect();
        let start = combined.len().saturating_sub(lines);
        combined[start..].join("\n")
    }
}

/// SSH client handler for russh.
pub(crate) struct SshHandler {
    host: String,
    port: u16,
    trust_on_first_use: bool,
    known_hosts_path: Option<PathBuf>,
}

impl SshHandler {
    fn new(
        host: String,
        port: u16,
        trust_on_first_use: bool,
        known_hosts_path: Option<PathBuf>,
    ) -> Self {
        Self {
            host,
            port,
            trust_on_first_use,
            known_hosts_path,
        }
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let check_result = match &self.known_hosts_path {
            Some(path) => check_known_hosts_path(&self.host, self.port, server_public_key, path),
            None => check_known_hosts(&self.host, self.port, server_public_key),
        };

        match check_result {
            Ok(true) => Ok(true),
            Ok(false) => {
                // Host not in known_hosts
                if self.trust_on_first_use {
                    tracing::warn!(
                        "Trust-On-First-Use: accepting and pinning host key for {}:{}",
                        self.host,
                        self.port
                    );
                    let learn_result = match &self.known_hosts_path {
                        Some(path) => {
                            learn_known_hosts_path(&self.host, self.port, server_public_key, path)
                        }
                        None => learn_known_hosts(&self.host, self.port, server_public_key),
                    };
                    if let Err(e) = learn_result {
                        tracing::warn!("Failed to save host key to known_hosts: {}", e);
                    }
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Err(russh::keys::Error::KeyChanged { line }) => {
                tracing::error!(
                    "Host key for {}:{} changed (known_hosts line {}); refusing to connect",
                    self.host,
                    self.port,
                    line
                );
                Ok(false)
            }
            Err(_) => Ok(self.trust_on_first_use),
        }
    }
}

/// How much operator involvement a login attempt may ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginMode {
    NonInteractive,
    Interactive,
}

/// Authentication method resolved from config.
enum AuthMethod {
    Agent(AgentClient<UnixStream>),
    KeyFile(Arc<ssh_key::PrivateKey>),
}

/// An established SSH session.
pub struct Session {
    config: SessionConfig,
    handle: Handle<SshHandler>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("handle", &"<russh::Handle>")
            .finish()
    }
}

/// Check whether anything accepts TCP connections on `host:port`.
pub async fn probe(host: &str, port: u16, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}

impl Session {
    /// Connect to the remote host.
    ///
    /// Tries a non-interactive login first. If that fails, retries once with a
    /// longer timeout, prompting for the key passphrase when needed and falling
    /// back to the SSH agent.
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        let first = match Self::attempt(&config, LoginMode::NonInteractive).await {
            Ok(session) => return Ok(session),
            Err(e) => e,
        };

        tracing::warn!(
            "Non-interactive login to {}@{}:{} failed ({}); retrying interactively",
            config.user,
            config.host,
            config.port,
            first
        );

        Self::attempt(&config, LoginMode::Interactive)
            .await
            .map_err(|second| Error::Unreachable {
                non_interactive: first.to_string(),
                interactive: second.to_string(),
            })
    }

    async fn attempt(config: &SessionConfig, mode: LoginMode) -> Result<Self> {
        let timeout = match mode {
            LoginMode::NonInteractive => config.connect_timeout,
            LoginMode::Interactive => config.interactive_timeout,
        };

        match tokio::time::timeout(timeout, Self::establish(config, mode)).await {
            Ok(result) => result,
            Err(_) => Err(Error::ConnectTimeout(timeout)),
        }
    }

    async fn establish(config: &SessionConfig, mode: LoginMode) -> Result<Self> {
        let auth_methods = Self::resolve_auth_methods(config, mode).await?;

        // Long builds can be silent for minutes; keep the connection alive instead
        // of timing out on inactivity.
        let russh_config = Config {
            keepalive_interval: Some(Duration::from_secs(15)),
            ..Default::default()
        };

        let handler = SshHandler::new(
            config.host.clone(),
            config.port,
            config.trust_on_first_use,
            config.known_hosts_path.clone(),
        );

        let mut session = client::connect(
            Arc::new(russh_config),
            (config.host.as_str(), config.port),
            handler,
        )
        .await
        .map_err(|e| match e {
            russh::Error::UnknownKey => Error::HostKeyMismatch {
                host: config.host.clone(),
                port: config.port,
            },
            e if e.to_string().contains("Connection refused") => Error::Connection(format!(
                "connection refused to {}:{}",
                config.host, config.port
            )),
            e => Error::Connection(e.to_string()),
        })?;

        for method in auth_methods {
            if Self::authenticate(&mut session, config, method).await? {
                return Ok(Self {
                    config: config.clone(),
                    handle: session,
                });
            }
        }

        Err(Error::AuthenticationFailed)
    }

    /// Resolve which authentication methods to try, in order.
    async fn resolve_auth_methods(
        config: &SessionConfig,
        mode: LoginMode,
    ) -> Result<Vec<AuthMethod>> {
        let mut methods = Vec::new();
        let key_path = &config.key_path;

        match load_secret_key(key_path, None) {
            Ok(key) => methods.push(AuthMethod::KeyFile(Arc::new(key))),
            Err(russh::keys::Error::KeyIsEncrypted) if mode == LoginMode::Interactive => {
                let passphrase = prompt_passphrase(key_path).await?;
                let key = load_secret_key(key_path, Some(&passphrase)).map_err(|e| {
                    Error::KeyLoadFailed {
                        path: key_path.clone(),
                        reason: e.to_string(),
                    }
                })?;
                methods.push(AuthMethod::KeyFile(Arc::new(key)));
            }
            Err(e) if mode == LoginMode::NonInteractive => {
                return Err(Error::KeyLoadFailed {
                    path: key_path.clone(),
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                tracing::warn!("Cannot use key {}: {}", key_path.display(), e);
            }
        }

        if mode == LoginMode::Interactive {
            match AgentClient::connect_env().await {
                Ok(agent) => methods.push(AuthMethod::Agent(agent)),
                Err(e) => tracing::debug!("SSH agent not available: {}", e),
            }
        }

        if methods.is_empty() {
            return Err(Error::AgentUnavailable(
                "key file unusable and no SSH agent running".to_string(),
            ));
        }

        Ok(methods)
    }

    /// Authenticate the session.
    async fn authenticate(
        session: &mut Handle<SshHandler>,
        config: &SessionConfig,
        auth_method: AuthMethod,
    ) -> Result<bool> {
        match auth_method {
            AuthMethod::Agent(mut agent) => {
                let keys = agent.request_identities().await.map_err(|e| {
                    Error::AgentUnavailable(format!("failed to list agent keys: {}", e))
                })?;

                for key in &keys {
                    match session
                        .authenticate_publickey_with(&config.user, key.clone(), None, &mut agent)
                        .await
                    {
                        Ok(result) if result.success() => return Ok(true),
                        _ => continue,
                    }
                }
                Ok(false)
            }
            AuthMethod::KeyFile(key) => {
                let hash_alg = session
                    .best_supported_rsa_hash()
                    .await
                    .map_err(Error::Protocol)?
                    .flatten();

                let result = session
                    .authenticate_publickey(&config.user, PrivateKeyWithHashAlg::new(key, hash_alg))
                    .await
                    .map_err(Error::Protocol)?;

                Ok(result.success())
            }
        }
    }

    /// Execute a command on the remote host. Blocks until the command exits.
    pub async fn exec(&self, command: &str) -> Result<CommandOutput> {
        self.exec_inner(command, None).await
    }

    /// Execute a command, feeding `input` to its stdin and closing it.
    pub async fn exec_with_input(&self, command: &str, input: &[u8]) -> Result<CommandOutput> {
        self.exec_inner(command, Some(input)).await
    }

    async fn exec_inner(&self, command: &str, input: Option<&[u8]>) -> Result<CommandOutput> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| Error::CommandFailed(format!("failed to open channel: {}", e)))?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| Error::CommandFailed(format!("failed to exec command: {}", e)))?;

        if let Some(data) = input {
            channel
                .data(data)
                .await
                .map_err(|e| Error::CommandFailed(format!("failed to send input: {}", e)))?;
            channel
                .eof()
                .await
                .map_err(|e| Error::CommandFailed(format!("failed to close input: {}", e)))?;
        }

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code = 0u32;

        let mut got_exit_status = false;
        let mut got_eof = false;

        loop {
            match channel.wait().await {
                Some(ChannelMsg::Data { data }) => {
                    stdout.extend_from_slice(&data);
                }
                Some(ChannelMsg::ExtendedData { data, ext }) => {
                    if ext == 1 {
                        // stderr
                        stderr.extend_from_slice(&data);
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    exit_code = exit_status;
                    got_exit_status = true;
                    if got_eof {
                        break;
                    }
                }
                Some(ChannelMsg::Eof) => {
                    got_eof = true;
                    if got_exit_status {
                        break;
                    }
                }
                Some(ChannelMsg::Close) => {
                    break;
                }
                Some(_) => {}
                None => break,
            }
        }

        // The exit status is the remote command's own; a channel that closes
        // without one means the command never reported back.
        if !got_exit_status {
            return Err(Error::ChannelClosed);
        }

        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
        })
    }

    /// Disconnect the session.
    pub async fn disconnect(self) -> Result<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(Error::Protocol)?;
        Ok(())
    }
}

/// Ask the operator for the passphrase of an encrypted key.
async fn prompt_passphrase(key_path: &Path) -> Result<String> {
    let failed = |reason: String| Error::KeyLoadFailed {
        path: key_path.to_path_buf(),
        reason,
    };

    if !std::io::stdin().is_terminal() {
        return Err(failed(
            "key is encrypted and no terminal is available to ask for its passphrase".to_string(),
        ));
    }

    let prompt = format!("Passphrase for {}", key_path.display());
    tokio::task::spawn_blocking(move || dialoguer::Password::new().with_prompt(prompt).interact())
        .await
        .map_err(|e| failed(e.to_string()))?
        .map_err(|e| failed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_config_defaults() {
        let config = SessionConfig::new("example.com", "deploy", "/keys/id");
        assert_eq!(config.port, 22);
        assert!(!config.trust_on_first_use);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.interactive_timeout, Duration::from_secs(60));
    }

    #[test]
    fn tail_keeps_last_lines_of_both_streams() {
        let output = CommandOutput {
            exit_code: 1,
            stdout: "one\ntwo\nthree\n".to_string(),
            stderr: "\nboom\n".to_string(),
        };
        assert_eq!(output.tail(2), "three\nboom");
        assert_eq!(output.tail(10), "one\ntwo\nthree\nboom");
    }

    #[tokio::test]
    async fn probe_reports_closed_port() {
        // Bind then drop to get a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        assert!(!probe("127.0.0.1", port, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn probe_reports_open_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        assert!(probe("127.0.0.1", port, Duration::from_secs(1)).await);
    }
}
