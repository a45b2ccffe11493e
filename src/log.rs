// ABOUTME: Append-only action log kept outside any working tree.
// ABOUTME: Every line is timestamped and scrubbed of registered secrets before it is written.

use crate::types::{MASK, Secret};
use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const LOG_DIR: &str = "gitship";
const LOG_FILE: &str = "gitship.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    fn as_str(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

/// The run's persistent record.
pub struct ActionLog {
    path: PathBuf,
    file: Mutex<File>,
    secrets: Mutex<Vec<String>>,
}

impl std::fmt::Debug for ActionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionLog")
            .field("path", &self.path)
            .field("secrets", &self.secrets.lock().len())
            .finish()
    }
}

impl ActionLog {
    /// Open `path` for appending, creating it and its parent directories.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            secrets: Mutex::new(Vec::new()),
        })
    }

    /// `<state dir>/gitship/gitship.log`.
    pub fn default_path() -> PathBuf {
        dirs::state_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("state")))
            .unwrap_or_else(std::env::temp_dir)
            .join(LOG_DIR)
            .join(LOG_FILE)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mask every later occurrence of `secret` in this log.
    pub fn redact_secret(&self, secret: &Secret) {
        if secret.is_empty() {
            return;
        }
        let mut secrets = self.secrets.lock();
        if !secrets.iter().any(|s| s == secret.expose()) {
            secrets.push(secret.expose().to_string());
        }
    }

    /// Replace registered secrets in `text` with the mask.
    pub fn redact(&self, text: &str) -> String {
        self.secrets
            .lock()
            .iter()
            .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), MASK))
    }

    /// First line of a run.
    pub fn header(&self, mode: &str) {
        let host = gethostname::gethostname();
        self.info(&format!(
            "=== {mode} run started on {} (pid {}) ===",
            host.to_string_lossy(),
            std::process::id()
        ));
    }

    pub fn info(&self, message: &str) {
        self.write(Level::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.write(Level::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.write(Level::Error, message);
    }

    fn write(&self, level: Level, message: &str) {
        let message = self.redact(message);
        tracing::debug!(target: "gitship::action_log", level = level.as_str(), "{message}");

        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut file = self.file.lock();
        for line in message.lines() {
            if let Err(e) = writeln!(file, "{timestamp} {} {line}", level.as_str()) {
                tracing::warn!("Failed to write action log {}: {e}", self.path.display());
                return;
            }
        }
    }
}
