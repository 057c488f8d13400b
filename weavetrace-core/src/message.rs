//! Side channel for diagnostics and audit messages
//!
//! Sinks must never let a failure propagate into the traced program, so
//! everything that goes wrong at record time — and every state
//! transition worth auditing, like the interval filter enabling or
//! disabling itself — is reported here instead.
//!
//! All methods take `&self`; implementations use interior mutability so
//! a single sink can be shared across recording threads.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::{Result, TraceError};

/// Destination for diagnostic and audit messages
pub trait MessageSink: Send + Sync {
    /// Report a message. Implementations must not panic.
    fn report(&self, message: &str);

    /// Sink name (for logging/debugging)
    fn name(&self) -> &'static str;
}

/// In-memory message sink for tests
#[derive(Debug, Default)]
pub struct MemoryMessageSink {
    messages: Mutex<Vec<String>>,
}

impl MemoryMessageSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything reported so far
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().map(|m| m.is_empty()).unwrap_or(true)
    }
}

impl MessageSink for MemoryMessageSink {
    fn report(&self, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.to_string());
        }
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Appends messages to a text file, one per line
pub struct FileMessageSink {
    file: Mutex<std::fs::File>,
}

impl FileMessageSink {
    /// Open (or create) the message file in append mode
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .map_err(TraceError::io)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl MessageSink for FileMessageSink {
    fn report(&self, message: &str) {
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{}", message);
        }
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

/// Writes messages to stderr
#[derive(Debug, Default, Clone)]
pub struct StderrMessageSink;

impl StderrMessageSink {
    pub fn new() -> Self {
        Self
    }
}

impl MessageSink for StderrMessageSink {
    fn report(&self, message: &str) {
        eprintln!("weavetrace: {}", message);
    }

    fn name(&self) -> &'static str {
        "stderr"
    }
}

/// Shared handle type used throughout the crate
pub type SharedMessageSink = Arc<dyn MessageSink>;
