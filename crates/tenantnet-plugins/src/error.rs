//! Error types for interface provisioning

use std::time::Duration;
use thiserror::Error;

/// External command failure
#[derive(Error, Debug)]
pub enum CommandError {
    /// The program could not be started
    #[error("{command}: failed to spawn: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The program ran and exited non-zero
    #[error("{command}: exited with status {status:?}: {}", .output.join("\n"))]
    Failed {
        command: String,
        status: Option<i32>,
        output: Vec<String>,
    },

    /// The program did not finish before its deadline
    #[error("{command}: timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
}

impl CommandError {
    /// Full command line that failed
    pub fn command(&self) -> &str {
        match self {
            Self::Spawn { command, .. }
            | Self::Failed { command, .. }
            | Self::Timeout { command, .. } => command,
        }
    }

    /// Captured output, empty unless the program ran to completion
    pub fn output(&self) -> &[String] {
        match self {
            Self::Failed { output, .. } => output,
            _ => &[],
        }
    }
}

/// Plugin and registry errors
#[derive(Error, Debug)]
pub enum PluginError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("unexpected output from `{command}`: {detail}")]
    UnexpectedOutput { command: String, detail: String },

    #[error("sandbox {sandbox}: {reason}")]
    Sandbox { sandbox: String, reason: String },

    #[error("network plugin {0:?} is already registered")]
    DuplicatePlugin(String),

    #[error("unknown network plugin {0:?}")]
    UnknownPlugin(String),

    #[error("plugin configuration: {0}")]
    Config(String),
}

impl PluginError {
    /// Configuration errors abort startup; everything else may be retried
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DuplicatePlugin(_) | Self::UnknownPlugin(_) | Self::Config(_)
        )
    }
}

/// Result type for plugin operations
pub type PluginResult<T> = Result<T, PluginError>;
