//! Local-host transport.
//!
//! [`LocalCommunicator`] runs commands through `sh -c` on the machine this
//! process runs on and implements uploads as file copies. It is useful for
//! provisioning the host itself (e.g. inside a chroot or container build)
//! and for exercising the full provisioning sequence without a remote target.

use std::fs;
use std::io::{self, Read};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use which::which;

use super::pipe::{StreamType, capture_pipe, panic_message};
use super::{Communicator, RemoteCmdResult};

/// Kills a child process and joins its reader threads.
///
/// Called from error paths in [`LocalCommunicator::run_command()`] so a
/// failed wait or thread spawn does not leak the process or the threads.
fn cleanup_child_process<I>(child: &mut Child, handles: I)
where
    I: IntoIterator<Item = JoinHandle<String>>,
{
    let pid = child.id();
    if let Err(e) = child.kill() {
        tracing::debug!(pid = pid, "kill returned error (process may have already exited): {}", e);
    }
    if let Err(e) = child.wait() {
        tracing::warn!(pid = pid, "failed to wait for child process after kill: {}", e);
    }
    for handle in handles {
        if let Err(e) = handle.join() {
            tracing::warn!("reader thread panicked during cleanup: {}", panic_message(&*e));
        }
    }
}

fn spawn_reader<R: Read + Send + 'static>(
    name: &str,
    pipe: Option<R>,
    stream_type: StreamType,
) -> io::Result<JoinHandle<String>> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || capture_pipe(pipe, stream_type))
}

/// Copies the contents of `src` into `dest`, creating `dest` as needed.
fn copy_dir_contents(src: &Utf8Path, dest: &Utf8Path) -> Result<()> {
    fs::create_dir_all(dest).with_context(|| format!("failed to create directory {}", dest))?;
    for entry in
        src.read_dir_utf8().with_context(|| format!("failed to read directory {}", src))?
    {
        let entry = entry.with_context(|| format!("failed to read entry in {}", src))?;
        let target = dest.join(entry.file_name());
        let file_type = entry
            .file_type()
            .with_context(|| format!("failed to read file type of {}", entry.path()))?;
        if file_type.is_dir() {
            copy_dir_contents(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)
                .with_context(|| format!("failed to copy {} to {}", entry.path(), target))?;
        }
    }
    Ok(())
}

/// Communicator that targets the local host.
///
/// When `dry_run` is true, commands and uploads are logged but not performed,
/// and every command reports exit status 0.
#[derive(Debug, Clone, Default)]
pub struct LocalCommunicator {
    pub dry_run: bool,
}

impl LocalCommunicator {
    /// Creates a communicator; see the type docs for `dry_run`.
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }
}

impl Communicator for LocalCommunicator {
    fn run_command(&self, command: &str) -> Result<RemoteCmdResult> {
        if self.dry_run {
            tracing::info!("dry run: sh -c {:?}", command);
            return Ok(RemoteCmdResult::default());
        }

        let shell = which("sh").context("command not found: sh")?;
        let mut child = Command::new(shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn `sh -c {:?}`", command))?;

        tracing::trace!("spawned command: pid={}", child.id());

        let stdout_handle = match spawn_reader("stdout-reader", child.stdout.take(), StreamType::Stdout) {
            Ok(handle) => handle,
            Err(e) => {
                cleanup_child_process(&mut child, []);
                anyhow::bail!("failed to spawn stdout reader thread: {}", e);
            }
        };
        let stderr_handle = match spawn_reader("stderr-reader", child.stderr.take(), StreamType::Stderr) {
            Ok(handle) => handle,
            Err(e) => {
                cleanup_child_process(&mut child, [stdout_handle]);
                anyhow::bail!("failed to spawn stderr reader thread: {}", e);
            }
        };

        let status = match child.wait() {
            Ok(status) => status,
            Err(e) => {
                cleanup_child_process(&mut child, [stdout_handle, stderr_handle]);
                anyhow::bail!("failed to wait for command: {}", e);
            }
        };

        let mut outputs = Vec::with_capacity(2);
        for (name, handle) in [("stdout", stdout_handle), ("stderr", stderr_handle)] {
            match handle.join() {
                Ok(text) => outputs.push(text),
                Err(e) => anyhow::bail!("{} reader thread panicked: {}", name, panic_message(&*e)),
            }
        }
        let stderr = outputs.pop().unwrap_or_default();
        let stdout = outputs.pop().unwrap_or_default();

        let exit_status = match status.code() {
            Some(code) => code,
            None => {
                tracing::warn!("command exited without status (possibly killed by signal)");
                -1
            }
        };
        tracing::trace!("executed command: exit_status={}", exit_status);

        Ok(RemoteCmdResult {
            stdout,
            stderr,
            exit_status,
        })
    }

    fn upload(&self, dest: &str, data: &mut dyn Read) -> Result<()> {
        if self.dry_run {
            tracing::info!("dry run: upload to {}", dest);
            return Ok(());
        }

        let dest = Utf8Path::new(dest);
        let file_name = dest
            .file_name()
            .with_context(|| format!("upload destination has no file name: {}", dest))?;
        let tmp: Utf8PathBuf = dest.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

        let result = (|| -> Result<()> {
            let mut file =
                fs::File::create(&tmp).with_context(|| format!("failed to create {}", tmp))?;
            io::copy(data, &mut file).with_context(|| format!("failed to write {}", tmp))?;
            fs::rename(&tmp, dest).with_context(|| format!("failed to move {} to {}", tmp, dest))
        })();

        if result.is_err()
            && let Err(e) = fs::remove_file(&tmp)
            && e.kind() != io::ErrorKind::NotFound
        {
            tracing::warn!("failed to remove partial upload {}: {}", tmp, e);
        }
        result
    }

    fn upload_dir(&self, dest: &str, src: &str) -> Result<()> {
        if self.dry_run {
            tracing::info!("dry run: upload directory {} to {}", src, dest);
            return Ok(());
        }

        let contents_only = src.ends_with('/') || src.ends_with(std::path::MAIN_SEPARATOR);
        let src_dir = Utf8Path::new(src);
        let dest_dir = Utf8Path::new(dest);

        if contents_only {
            copy_dir_contents(src_dir, dest_dir)
        } else {
            let name = src_dir
                .file_name()
                .with_context(|| format!("source directory has no name: {}", src))?;
            copy_dir_contents(src_dir, &dest_dir.join(name))
        }
    }
}
