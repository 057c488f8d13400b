//! Recording configuration
//!
//! Plain data carried from whatever launches a trace (agent bootstrap,
//! test harness) into the sinks. Argument parsing itself lives outside
//! this crate; this is the struct it produces.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default number of event records per binary file before rotation
pub const DEFAULT_EVENTS_PER_FILE: u64 = 10_000_000;

/// Default number of text rows per side-table file before rotation
pub const DEFAULT_ROWS_PER_TEXT_FILE: u64 = 1_000_000;

/// Default per-dataId ring buffer capacity for the latest-event sink
pub const DEFAULT_BUFFER_CAPACITY: usize = 32;

/// Which sink family records the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    /// Every event, verbatim, to rotating binary files
    Stream,
    /// Bounded per-site ring buffers, dumped on close
    Latest,
    /// Per-site counters only
    Frequency,
    /// Per-thread first-occurrence snapshots
    ExecuteBefore,
    /// No recording at all
    Discard,
}

/// How the latest-event sink retains object values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectRetention {
    /// Keep a direct reference, preventing reclamation
    Strong,
    /// Keep a weak reference; reclaimed values read back as a sentinel
    Weak,
    /// Keep only the surrogate id
    Id,
}

/// Output format for sink dumps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DumpFormat {
    Text,
    Json,
}

/// Configuration for a recording run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory receiving event files, metadata tables and side tables
    pub directory: PathBuf,

    /// Event records per binary file before rolling over
    pub events_per_file: u64,

    /// Text rows per side-table file before rolling over
    pub rows_per_text_file: u64,

    /// Sink family to use
    pub sink: SinkKind,

    /// Per-dataId capacity of the latest-event sink
    pub buffer_capacity: usize,

    /// Object retention mode of the latest-event sink
    pub retention: ObjectRetention,

    /// Dump format for the latest-event sink
    pub dump_format: DumpFormat,

    /// Record string contents of observed objects to a side table
    pub record_string_contents: bool,

    /// Record exception chains of observed objects to a side table
    pub record_exceptions: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("weavetrace-output"),
            events_per_file: DEFAULT_EVENTS_PER_FILE,
            rows_per_text_file: DEFAULT_ROWS_PER_TEXT_FILE,
            sink: SinkKind::Stream,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            retention: ObjectRetention::Id,
            dump_format: DumpFormat::Json,
            record_string_contents: true,
            record_exceptions: true,
        }
    }
}

impl OutputConfig {
    /// Create a config writing into the given directory
    pub fn new<P: Into<PathBuf>>(directory: P) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    /// Set the sink family
    pub fn sink(mut self, sink: SinkKind) -> Self {
        self.sink = sink;
        self
    }

    /// Set the number of event records per binary file
    pub fn events_per_file(mut self, n: u64) -> Self {
        self.events_per_file = n;
        self
    }

    /// Set the per-dataId ring buffer capacity
    pub fn buffer_capacity(mut self, n: usize) -> Self {
        self.buffer_capacity = n;
        self
    }

    /// Set the object retention mode
    pub fn retention(mut self, retention: ObjectRetention) -> Self {
        self.retention = retention;
        self
    }

    /// Set the dump format
    pub fn dump_format(mut self, format: DumpFormat) -> Self {
        self.dump_format = format;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OutputConfig::default();
        assert_eq!(config.sink, SinkKind::Stream);
        assert_eq!(config.events_per_file, DEFAULT_EVENTS_PER_FILE);
        assert_eq!(config.retention, ObjectRetention::Id);
    }

    #[test]
    fn test_builder_methods() {
        let config = OutputConfig::new("/tmp/trace")
            .sink(SinkKind::Latest)
            .buffer_capacity(64)
            .retention(ObjectRetention::Weak)
            .events_per_file(1000);

        assert_eq!(config.directory, PathBuf::from("/tmp/trace"));
        assert_eq!(config.sink, SinkKind::Latest);
        assert_eq!(config.buffer_capacity, 64);
        assert_eq!(config.retention, ObjectRetention::Weak);
        assert_eq!(config.events_per_file, 1000);
    }

    #[test]
    fn test_config_serialization() {
        let config = OutputConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: OutputConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.sink, config.sink);
        assert_eq!(parsed.dump_format, config.dump_format);
    }
}
