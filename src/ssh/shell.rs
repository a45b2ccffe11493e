// ABOUTME: Command execution seam between pipeline stages and the SSH session.
// ABOUTME: Stages talk to a RemoteShell so they can be driven without a real host.

use super::client::{CommandOutput, Session};
use super::error::{Error, Result};
use async_trait::async_trait;

/// Remote command execution as the pipeline stages need it.
///
/// Scripts run as one unit in a single remote shell, so working directory and
/// variables persist across their lines. Exit codes are the remote command's own.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Run a single command line.
    async fn run(&self, command: &str) -> Result<CommandOutput>;

    /// Run `command` with `input` on its stdin.
    async fn run_with_input(&self, command: &str, input: &[u8]) -> Result<CommandOutput>;

    /// Run a multi-line script as the login user.
    async fn run_script(&self, script: &str) -> Result<CommandOutput> {
        self.run_with_input("bash -s", script.as_bytes()).await
    }

    /// Run a multi-line script as root via non-interactive sudo.
    async fn run_privileged_script(&self, script: &str) -> Result<CommandOutput> {
        self.run_with_input("sudo -n bash -s", script.as_bytes()).await
    }
}

#[async_trait]
impl RemoteShell for Session {
    async fn run(&self, command: &str) -> Result<CommandOutput> {
        tracing::debug!(command, "remote exec");
        self.exec(command).await
    }

    async fn run_with_input(&self, command: &str, input: &[u8]) -> Result<CommandOutput> {
        tracing::debug!(command, bytes = input.len(), "remote exec with input");
        self.exec_with_input(command, input).await
    }
}

/// Quote a value for a POSIX shell.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Home directory of the login user on the remote host.
///
/// Resolved once with an unprivileged command; privileged scripts would see root's home.
pub async fn remote_home(shell: &dyn RemoteShell) -> Result<String> {
    let output = shell.run("printf %s \"$HOME\"").await?;
    let home = output.stdout.trim();
    if !output.success() || !home.starts_with('/') {
        return Err(Error::CommandFailed(format!(
            "could not determine remote home directory (exit {}): {}",
            output.exit_code,
            output.tail(5)
        )));
    }
    Ok(home.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_wraps_plain_values() {
        assert_eq!(quote("/home/deploy/app"), "'/home/deploy/app'");
    }

    #[test]
    fn quote_escapes_single_quotes() {
        assert_eq!(quote("it's"), "'it'\\''s'");
    }
}
