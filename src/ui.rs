//! Operator-facing output sink.

use std::io::Write;

/// Fire-and-forget console output used for progress and failure messages.
pub trait Ui {
    /// Announces a major step.
    fn say(&self, message: &str);
    /// Reports progress within a step.
    fn message(&self, message: &str);
    /// Reports a failure.
    fn error(&self, message: &str);
}

/// Writes to the terminal in the usual image-builder layout:
/// `==> name: ...` for `say`, indented lines for `message`, and `error` on stderr.
#[derive(Debug, Clone)]
pub struct ConsoleUi {
    name: String,
}

impl ConsoleUi {
    /// Creates a console sink prefixing every line with `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn format(&self, marker: &str, message: &str) -> String {
        message
            .lines()
            .map(|line| format!("{} {}: {}\n", marker, self.name, line))
            .collect()
    }
}

impl Ui for ConsoleUi {
    fn say(&self, message: &str) {
        let _ = std::io::stdout().lock().write_all(self.format("==>", message).as_bytes());
    }

    fn message(&self, message: &str) {
        let _ = std::io::stdout().lock().write_all(self.format("   ", message).as_bytes());
    }

    fn error(&self, message: &str) {
        let _ = std::io::stderr().lock().write_all(self.format("==>", message).as_bytes());
    }
}
