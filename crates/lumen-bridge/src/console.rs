//! Console sinks for guest `fd_write` output.

use std::io::Write;
use std::sync::{Arc, Mutex};

/// Which console stream a write targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleStream {
    /// fd 1
    Stdout,
    /// fd 2
    Stderr,
}

impl ConsoleStream {
    /// Map a WASI file descriptor to a stream; other descriptors have none.
    pub fn from_fd(fd: u32) -> Option<Self> {
        match fd {
            1 => Some(ConsoleStream::Stdout),
            2 => Some(ConsoleStream::Stderr),
            _ => None,
        }
    }
}

/// Receives decoded guest console text.
pub trait Console {
    /// Write `text` verbatim (no newline is added).
    fn write(&mut self, stream: ConsoleStream, text: &str);
}

/// Writes to the process stdout/stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdConsole;

impl Console for StdConsole {
    fn write(&mut self, stream: ConsoleStream, text: &str) {
        let result = match stream {
            ConsoleStream::Stdout => {
                let mut out = std::io::stdout().lock();
                out.write_all(text.as_bytes()).and_then(|_| out.flush())
            }
            ConsoleStream::Stderr => std::io::stderr().lock().write_all(text.as_bytes()),
        };
        if let Err(e) = result {
            tracing::warn!(?stream, "console write failed: {}", e);
        }
    }
}

/// Captures console text in memory. Clones share the same buffers.
#[derive(Debug, Default, Clone)]
pub struct MemoryConsole {
    inner: Arc<Mutex<Captured>>,
}

#[derive(Debug, Default)]
struct Captured {
    stdout: String,
    stderr: String,
}

impl MemoryConsole {
    /// Create an empty capture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written to stdout so far.
    pub fn stdout(&self) -> String {
        self.inner.lock().map(|c| c.stdout.clone()).unwrap_or_default()
    }

    /// Everything written to stderr so far.
    pub fn stderr(&self) -> String {
        self.inner.lock().map(|c| c.stderr.clone()).unwrap_or_default()
    }
}

impl Console for MemoryConsole {
    fn write(&mut self, stream: ConsoleStream, text: &str) {
        if let Ok(mut captured) = self.inner.lock() {
            match stream {
                ConsoleStream::Stdout => captured.stdout.push_str(text),
                ConsoleStream::Stderr => captured.stderr.push_str(text),
            }
        }
    }
}

impl<C: Console + ?Sized> Console for Box<C> {
    fn write(&mut self, stream: ConsoleStream, text: &str) {
        (**self).write(stream, text);
    }
}
