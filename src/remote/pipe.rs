//! Internal utilities for capturing command output.
//!
//! This module handles reading from stdout/stderr pipes, keeping the text
//! for the caller and tracing each line as it arrives.

use std::io::{BufRead, BufReader, Read};

/// Type of output stream for logging purposes.
#[derive(Clone, Copy)]
pub(super) enum StreamType {
    Stdout,
    Stderr,
}

impl std::fmt::Display for StreamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
        }
    }
}

/// Extracts a human-readable message from a thread panic.
///
/// The returned `&str` borrows from the panic payload, so it is valid
/// as long as the `err` reference is valid.
pub(super) fn panic_message(err: &(dyn std::any::Any + Send)) -> &str {
    err.downcast_ref::<&str>()
        .copied()
        .or_else(|| err.downcast_ref::<String>().map(|s| s.as_str()))
        .unwrap_or("unknown panic")
}

/// Reads a pipe to the end, returning everything read.
///
/// - Each line is traced at DEBUG level while reading; whether the output is
///   shown to the operator is decided by the caller once the exit status is known
/// - Binary data uses lossy UTF-8 conversion
/// - I/O errors stop reading and return what was captured so far
/// - `None` pipe logs an error and returns an empty string
pub(super) fn capture_pipe<R: Read>(pipe: Option<R>, stream_type: StreamType) -> String {
    let Some(pipe) = pipe else {
        tracing::error!(
            stream = %stream_type,
            "pipe was None (unexpected: Stdio::piped() was set), no output will be captured"
        );
        return String::new();
    };

    let mut reader = BufReader::new(pipe);
    let mut line_buf = Vec::new();
    let mut captured = String::new();

    loop {
        line_buf.clear();
        match reader.read_until(b'\n', &mut line_buf) {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line_buf);
                let line = text.trim_end_matches('\n').trim_end_matches('\r');
                tracing::debug!(stream = %stream_type, "{}", line);
                captured.push_str(&text);
            }
            Err(e) => {
                tracing::error!(stream = %stream_type, error = %e, "I/O error, stopping read");
                break;
            }
        }
    }

    captured
}
