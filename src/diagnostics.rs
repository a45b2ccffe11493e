// ABOUTME: Diagnostics accumulator for non-fatal warnings during a run.
// ABOUTME: Collects warnings that shouldn't fail a deployment but should be shown to users.

/// Collects non-fatal warnings during deployment operations.
#[derive(Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// A non-fatal warning collected during a run.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a failed reachability probe warning.
    pub fn reachability(message: impl Into<String>) -> Self {
        Self::new(WarningKind::ReachabilityProbe, message)
    }

    /// Create a remote provisioning warning (service start, group membership).
    pub fn provisioning(message: impl Into<String>) -> Self {
        Self::new(WarningKind::Provisioning, message)
    }

    /// Create an SSH disconnect warning.
    pub fn ssh_disconnect(message: impl Into<String>) -> Self {
        Self::new(WarningKind::SshDisconnect, message)
    }

    /// Create a skipped or failed proxy reload warning.
    pub fn proxy_reload(message: impl Into<String>) -> Self {
        Self::new(WarningKind::ProxyReload, message)
    }
}

/// Categories of warnings that can occur during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Nothing answered on the SSH port before login was attempted.
    ReachabilityProbe,
    /// A service would not start or the docker group change failed.
    Provisioning,
    /// Failed to cleanly disconnect SSH session.
    SshDisconnect,
    /// nginx was not reloaded after cleanup.
    ProxyReload,
}
