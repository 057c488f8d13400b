//! Per-site frequency counters
//!
//! The cheapest useful sink: one counter per dataId, no values at all.
//! The result answers "which sites executed, and how often" for the
//! cost of a vector of integers. On `close()` the counters are written
//! as `data_id,count` CSV rows covering every id up to the largest one
//! seen, zeros included, so the reader can line rows up with the data
//! table by index.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::config::OutputConfig;
use crate::error::{Result, TraceError};
use crate::message::SharedMessageSink;
use crate::registry::{DataInfo, DataInfoListener};

use super::EventSink;

/// Name of the counter dump file
pub const FREQUENCY_FILE: &str = "frequency.txt";

/// Sink that counts events per instrumentation site
pub struct FrequencySink {
    directory: PathBuf,
    counts: Mutex<Vec<u64>>,
    messages: Option<SharedMessageSink>,
}

impl FrequencySink {
    pub fn new(config: &OutputConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.directory).map_err(TraceError::io)?;
        Ok(Self {
            directory: config.directory.clone(),
            counts: Mutex::new(Vec::new()),
            messages: None,
        })
    }

    /// Attach a message sink receiving dump failure reports
    pub fn with_message_sink(mut self, sink: SharedMessageSink) -> Self {
        self.messages = Some(sink);
        self
    }

    /// Grow the counter vector to cover `data_id` without counting it
    ///
    /// Registering sites as they are woven keeps the hot path from
    /// reallocating under the lock.
    pub fn preallocate(&self, data_id: i32) {
        if data_id < 0 {
            return;
        }
        if let Ok(mut counts) = self.counts.lock() {
            let needed = data_id as usize + 1;
            if counts.len() < needed {
                counts.resize(needed, 0);
            }
        }
    }

    /// Current count for a site
    pub fn count_of(&self, data_id: i32) -> u64 {
        if data_id < 0 {
            return 0;
        }
        self.counts
            .lock()
            .ok()
            .and_then(|c| c.get(data_id as usize).copied())
            .unwrap_or(0)
    }

    fn write_dump(&self) -> Result<()> {
        let counts = match self.counts.lock() {
            Ok(counts) => counts.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        let path = self.directory.join(FREQUENCY_FILE);
        let file = File::create(&path).map_err(TraceError::io)?;
        let mut writer = BufWriter::new(file);
        for (data_id, count) in counts.iter().enumerate() {
            writeln!(writer, "{},{}", data_id, count).map_err(TraceError::io)?;
        }
        writer.flush().map_err(TraceError::io)?;
        Ok(())
    }
}

impl EventSink for FrequencySink {
    fn record_raw(&self, data_id: i32, _raw_value: i64) {
        if data_id < 0 {
            return;
        }
        if let Ok(mut counts) = self.counts.lock() {
            let index = data_id as usize;
            if counts.len() <= index {
                counts.resize(index + 1, 0);
            }
            counts[index] += 1;
        }
    }

    fn close(&self) {
        if let Err(e) = self.write_dump() {
            if let Some(sink) = &self.messages {
                sink.report(&format!("[{}] frequency dump failed: {}", e.error_code(), e));
            }
        }
    }

    fn name(&self) -> &'static str {
        "frequency"
    }
}

/// Registry listener that pre-sizes a [`FrequencySink`] as sites are
/// committed
pub struct FrequencyPreSizer {
    sink: Arc<FrequencySink>,
}

impl FrequencyPreSizer {
    pub fn new(sink: Arc<FrequencySink>) -> Self {
        Self { sink }
    }
}

impl DataInfoListener for FrequencyPreSizer {
    fn data_info_created(&mut self, info: &DataInfo) {
        self.sink.preallocate(info.data_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "weavetrace-freq-{}-{}",
            tag,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_counts_per_site() {
        let dir = temp_dir("counts");
        let sink = FrequencySink::new(&OutputConfig::new(&dir)).unwrap();

        sink.record_i64(0, 1);
        sink.record_i64(2, 1);
        sink.record_i64(2, 1);
        sink.record_i64(2, 1);

        assert_eq!(sink.count_of(0), 1);
        assert_eq!(sink.count_of(1), 0);
        assert_eq!(sink.count_of(2), 3);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_dump_covers_gaps_with_zeros() {
        let dir = temp_dir("gaps");
        let sink = FrequencySink::new(&OutputConfig::new(&dir)).unwrap();

        sink.record_i64(3, 1);
        sink.record_i64(3, 1);
        sink.close();

        let raw = std::fs::read_to_string(dir.join(FREQUENCY_FILE)).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines, vec!["0,0", "1,0", "2,0", "3,2"]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_preallocate_does_not_count() {
        let dir = temp_dir("prealloc");
        let sink = FrequencySink::new(&OutputConfig::new(&dir)).unwrap();

        sink.preallocate(5);
        assert_eq!(sink.count_of(5), 0);
        sink.record_i64(5, 1);
        assert_eq!(sink.count_of(5), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
