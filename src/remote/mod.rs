//! Remote transport abstraction.
//!
//! This module provides:
//! - [`RemoteCmdResult`]: Outcome of one remote command
//! - [`Communicator`]: Trait for the transport that reaches the target machine
//! - [`LocalCommunicator`]: Implementation that treats the local host as the target
//!
//! The provisioner never opens connections itself; the host orchestrator
//! hands it a `Communicator` (SSH, WinRM, ...) for the machine being built.

mod local;
mod pipe;

use std::io::Read;

use anyhow::Result;

pub use local::LocalCommunicator;

/// Outcome of a single remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteCmdResult {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Exit status reported by the target.
    pub exit_status: i32,
}

impl RemoteCmdResult {
    /// Returns true if the command exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

/// Transport to the machine being provisioned.
///
/// Implementations must be `Send + Sync` so one transport can be shared by
/// the orchestrator across build steps. Commands of one provisioning pass are
/// issued strictly one after another.
pub trait Communicator: Send + Sync {
    /// Runs `command` on the target and waits for it to finish.
    ///
    /// A non-zero exit status is not an error at this level; `Err` means the
    /// transport itself failed.
    fn run_command(&self, command: &str) -> Result<RemoteCmdResult>;

    /// Writes the contents of `data` to the file `dest` on the target.
    fn upload(&self, dest: &str, data: &mut dyn Read) -> Result<()>;

    /// Recursively uploads the local directory `src` to `dest` on the target.
    ///
    /// With a trailing separator on `src` the directory's contents land in
    /// `dest`; without one the directory itself is created inside `dest`.
    fn upload_dir(&self, dest: &str, src: &str) -> Result<()>;
}
