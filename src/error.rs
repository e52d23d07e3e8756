//! Domain-specific error types for the Terraform provisioner.
//!
//! This module defines `ProvisionerError`, a `thiserror`-based enum with one
//! variant per failure mode of the prepare and provision phases. Public API
//! functions return `Result<T, ProvisionerError>` for programmatic error
//! handling, while the transport boundary (`Communicator`) uses
//! `anyhow::Result`.
//!
//! Remote-step variants wrap a [`StepFailure`], which carries either the
//! transport error or the exit status together with the captured output of
//! the failed remote command.

use std::fmt;
use std::io;

use crate::template::RenderError;
use crate::version::VersionError;

/// Formats an IO error kind into a human-readable message.
///
/// Provides consistent, user-friendly messages for common IO error kinds
/// (e.g., "I/O error: not found") instead of the OS-level messages
/// (e.g., "No such file or directory (os error 2)"). For unrecognized
/// error kinds, falls back to including the OS-level error message
/// directly (e.g., "I/O error: connection refused").
pub(crate) fn io_error_kind_message(err: &io::Error) -> String {
    match err.kind() {
        io::ErrorKind::NotFound => "I/O error: not found".to_string(),
        io::ErrorKind::PermissionDenied => "I/O error: permission denied".to_string(),
        io::ErrorKind::IsADirectory => "I/O error: is a directory".to_string(),
        _ => format!("I/O error: {}", err),
    }
}

/// Why a single remote step did not complete.
#[derive(Debug)]
pub enum StepFailure {
    /// The transport itself failed (connection drop, upload error, etc.).
    Transport(anyhow::Error),
    /// The remote command ran but exited with a non-zero status.
    ExitStatus {
        /// Exit status reported by the remote side.
        status: i32,
        /// Captured standard output of the command.
        stdout: String,
        /// Captured standard error of the command.
        stderr: String,
    },
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(err) => write!(f, "{:#}", err),
            Self::ExitStatus {
                status,
                stdout,
                stderr,
            } => {
                write!(f, "non-zero exit status: {}", status)?;
                let stderr = stderr.trim_end();
                if !stderr.is_empty() {
                    write!(f, "\nstderr:\n{}", stderr)?;
                }
                let stdout = stdout.trim_end();
                if !stdout.is_empty() {
                    write!(f, "\nstdout:\n{}", stdout)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for StepFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(err) => Some(&**err),
            Self::ExitStatus { .. } => None,
        }
    }
}

/// Domain-specific error type for the provisioner.
///
/// Every variant aborts the remaining pipeline; nothing is retried.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProvisionerError {
    /// The configuration is missing a required field or has an invalid value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The local source code path cannot be accessed.
    #[error("bad source '{path}': {message}")]
    InvalidSource {
        /// The configured `code_path`.
        path: String,
        /// Human-readable description derived from [`io_error_kind_message`].
        message: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The raw variables blob is not a JSON object.
    #[error("error processing variables: {0}")]
    InvalidVariables(#[source] serde_json::Error),

    /// No version was pinned and the latest version could not be fetched.
    #[error("unable to fetch Terraform version: {0}")]
    VersionResolution(#[source] VersionError),

    /// A command template could not be rendered.
    #[error("error rendering template: {0}")]
    Render(#[from] RenderError),

    /// The staging directory could not be created on the target.
    #[error("error creating staging directory: {0}")]
    DirectoryCreation(#[source] StepFailure),

    /// The code directory could not be uploaded.
    #[error("error uploading code: {0}")]
    Upload(#[source] StepFailure),

    /// The variables file could not be generated or uploaded.
    #[error("error generating tfvars: {0}")]
    Variables(#[source] StepFailure),

    /// The install command failed.
    #[error("error installing Terraform: {0}")]
    Install(#[source] StepFailure),

    /// The run command failed.
    #[error("error running Terraform: {0}")]
    Run(#[source] StepFailure),
}

impl ProvisionerError {
    /// Creates an `InvalidSource` variant with the `message` field derived
    /// from the `source` via [`io_error_kind_message`].
    pub(crate) fn invalid_source(path: impl Into<String>, source: io::Error) -> Self {
        Self::InvalidSource {
            path: path.into(),
            message: io_error_kind_message(&source),
            source,
        }
    }

    /// Returns the step failure carried by a remote-step variant.
    pub fn step_failure(&self) -> Option<&StepFailure> {
        match self {
            Self::DirectoryCreation(f)
            | Self::Upload(f)
            | Self::Variables(f)
            | Self::Install(f)
            | Self::Run(f) => Some(f),
            _ => None,
        }
    }
}
