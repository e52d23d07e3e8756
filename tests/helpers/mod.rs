//! Shared test doubles for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use camino::Utf8PathBuf;
use terraform_provisioner::remote::{Communicator, RemoteCmdResult};
use terraform_provisioner::ui::Ui;
use terraform_provisioner::version::{VersionError, VersionSource};
use url::Url;

/// One operation issued against a [`MockCommunicator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOp {
    Command(String),
    Upload { dest: String, content: String },
    UploadDir { dest: String, src: String },
}

/// Communicator that records every operation and succeeds unless told otherwise.
#[derive(Default)]
pub struct MockCommunicator {
    ops: Mutex<Vec<RemoteOp>>,
    command_results: Mutex<Vec<(String, RemoteCmdResult)>>,
    transport_failures: Mutex<Vec<String>>,
    fail_upload_dir: bool,
    fail_upload: bool,
}

impl MockCommunicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `upload_dir` return a transport error.
    pub fn failing_upload_dir(mut self) -> Self {
        self.fail_upload_dir = true;
        self
    }

    /// Makes `upload` return a transport error.
    pub fn failing_upload(mut self) -> Self {
        self.fail_upload = true;
        self
    }

    /// Returns `result` for every command containing `needle`.
    pub fn with_command_result(self, needle: &str, result: RemoteCmdResult) -> Self {
        self.command_results
            .lock()
            .unwrap()
            .push((needle.to_string(), result));
        self
    }

    /// Makes every command containing `needle` fail at the transport level.
    pub fn with_transport_failure(self, needle: &str) -> Self {
        self.transport_failures.lock().unwrap().push(needle.to_string());
        self
    }

    pub fn ops(&self) -> Vec<RemoteOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                RemoteOp::Command(cmd) => Some(cmd),
                _ => None,
            })
            .collect()
    }
}

impl Communicator for MockCommunicator {
    fn run_command(&self, command: &str) -> Result<RemoteCmdResult> {
        self.ops
            .lock()
            .unwrap()
            .push(RemoteOp::Command(command.to_string()));
        if self
            .transport_failures
            .lock()
            .unwrap()
            .iter()
            .any(|n| command.contains(n.as_str()))
        {
            anyhow::bail!("connection lost");
        }
        let results = self.command_results.lock().unwrap();
        Ok(results
            .iter()
            .find(|(needle, _)| command.contains(needle.as_str()))
            .map(|(_, r)| r.clone())
            .unwrap_or_default())
    }

    fn upload(&self, dest: &str, data: &mut dyn Read) -> Result<()> {
        let mut content = String::new();
        data.read_to_string(&mut content)?;
        self.ops.lock().unwrap().push(RemoteOp::Upload {
            dest: dest.to_string(),
            content,
        });
        if self.fail_upload {
            anyhow::bail!("disk full");
        }
        Ok(())
    }

    fn upload_dir(&self, dest: &str, src: &str) -> Result<()> {
        self.ops.lock().unwrap().push(RemoteOp::UploadDir {
            dest: dest.to_string(),
            src: src.to_string(),
        });
        if self.fail_upload_dir {
            anyhow::bail!("scp: permission denied");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiKind {
    Say,
    Message,
    Error,
}

/// Ui that records every line.
#[derive(Default)]
pub struct RecordingUi {
    lines: Mutex<Vec<(UiKind, String)>>,
}

impl RecordingUi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(UiKind, String)> {
        self.lines.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.of_kind(UiKind::Message)
    }

    pub fn errors(&self) -> Vec<String> {
        self.of_kind(UiKind::Error)
    }

    fn of_kind(&self, kind: UiKind) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, l)| l)
            .collect()
    }
}

impl Ui for RecordingUi {
    fn say(&self, message: &str) {
        self.lines.lock().unwrap().push((UiKind::Say, message.to_string()));
    }

    fn message(&self, message: &str) {
        self.lines
            .lock()
            .unwrap()
            .push((UiKind::Message, message.to_string()));
    }

    fn error(&self, message: &str) {
        self.lines.lock().unwrap().push((UiKind::Error, message.to_string()));
    }
}

/// Version source returning a fixed answer and counting calls.
pub struct StubVersions {
    version: Option<String>,
    calls: AtomicUsize,
}

impl StubVersions {
    pub fn returning(version: &str) -> Self {
        Self {
            version: Some(version.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            version: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl VersionSource for StubVersions {
    fn latest_version(&self) -> Result<String, VersionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.version.clone().ok_or_else(|| VersionError::UnexpectedStatus {
            url: "http://stub.invalid/".to_string(),
            status: 503,
        })
    }
}

/// Single-connection HTTP server answering with a canned response.
pub struct MockServer {
    pub url: Url,
    requests: Arc<Mutex<VecDeque<String>>>,
}

impl MockServer {
    /// Serves one request with `status` (e.g. `"200 OK"`) and `body`,
    /// waiting `delay` before answering.
    pub fn start(status: &str, body: &str, delay: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind mock server");
        let addr = listener.local_addr().expect("mock server has no address");
        let requests = Arc::new(Mutex::new(VecDeque::new()));

        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        let recorded = Arc::clone(&requests);
        thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let mut buf = Vec::new();
            let mut chunk = [0_u8; 1024];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                }
            }
            recorded
                .lock()
                .unwrap()
                .push_back(String::from_utf8_lossy(&buf).into_owned());
            thread::sleep(delay);
            let _ = stream.write_all(response.as_bytes());
            let _ = stream.flush();
        });

        Self {
            url: Url::parse(&format!("http://{}", addr)).expect("valid mock server url"),
            requests,
        }
    }

    /// Returns the first recorded raw request, lowercased.
    pub fn first_request(&self) -> Option<String> {
        self.requests
            .lock()
            .unwrap()
            .front()
            .map(|r| r.to_lowercase())
    }
}

/// Creates a temp dir containing an `infra/main.tf`, returning the guard and
/// the UTF-8 path of `infra`.
pub fn code_dir() -> (tempfile::TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("path should be valid UTF-8");
    let infra = root.join("infra");
    std::fs::create_dir(&infra).expect("failed to create infra dir");
    std::fs::write(infra.join("main.tf"), "terraform {}\n").expect("failed to write main.tf");
    (dir, infra)
}
