//! First-occurrence execution-history snapshots
//!
//! [`ExecuteBeforeSink`] answers "what had this thread executed before
//! site X ran for the first time". Each thread accumulates the sequence
//! of dataIds it has recorded; the first time any site executes
//! (globally, across all threads), the recording thread's history as it
//! stood immediately before that event is snapshotted. On `close()` the
//! first-occurrence snapshots and the final per-thread histories are
//! written as one JSON report.
//!
//! Values are not retained at all; this sink trades fidelity for a
//! compact causality summary.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::config::OutputConfig;
use crate::error::{Result, TraceError};
use crate::message::SharedMessageSink;
use crate::output::current_thread_id;

use super::EventSink;

/// Name of the JSON report file
pub const EXECUTE_BEFORE_FILE: &str = "execute_before.json";

/// One history snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// The site whose first occurrence triggered this snapshot; absent
    /// for final per-thread states
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_id: Option<i32>,
    pub thread_id: i32,
    /// History length at snapshot time
    pub length: usize,
    /// DataIds recorded by the thread, oldest first
    pub history: Vec<i32>,
}

/// The report written on close
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteBeforeReport {
    pub first_occurrences: Vec<Snapshot>,
    pub final_states: Vec<Snapshot>,
}

struct State {
    histories: HashMap<i32, Vec<i32>>,
    /// Global per-site occurrence counters, indexed by dataId
    counts: HashMap<i32, u64>,
    first_occurrences: Vec<Snapshot>,
}

/// Sink that snapshots per-thread history at each site's first run
pub struct ExecuteBeforeSink {
    directory: PathBuf,
    state: Mutex<State>,
    messages: Option<SharedMessageSink>,
}

impl ExecuteBeforeSink {
    pub fn new(config: &OutputConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.directory).map_err(TraceError::io)?;
        Ok(Self {
            directory: config.directory.clone(),
            state: Mutex::new(State {
                histories: HashMap::new(),
                counts: HashMap::new(),
                first_occurrences: Vec::new(),
            }),
            messages: None,
        })
    }

    /// Attach a message sink receiving dump failure reports
    pub fn with_message_sink(mut self, sink: SharedMessageSink) -> Self {
        self.messages = Some(sink);
        self
    }

    /// Occurrences of a site so far, across all threads
    pub fn occurrences(&self, data_id: i32) -> u64 {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.counts.get(&data_id).copied())
            .unwrap_or(0)
    }

    /// Build the report without writing it (also the test hook)
    pub fn report(&self) -> ExecuteBeforeReport {
        let state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut final_states: Vec<Snapshot> = state
            .histories
            .iter()
            .map(|(thread_id, history)| Snapshot {
                data_id: None,
                thread_id: *thread_id,
                length: history.len(),
                history: history.clone(),
            })
            .collect();
        final_states.sort_by_key(|s| s.thread_id);
        ExecuteBeforeReport {
            first_occurrences: state.first_occurrences.clone(),
            final_states,
        }
    }

    fn write_dump(&self) -> Result<()> {
        let report = self.report();
        let path = self.directory.join(EXECUTE_BEFORE_FILE);
        let file = File::create(&path).map_err(TraceError::io)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &report)?;
        writer.flush().map_err(TraceError::io)?;
        Ok(())
    }
}

impl EventSink for ExecuteBeforeSink {
    fn record_raw(&self, data_id: i32, _raw_value: i64) {
        let thread_id = current_thread_id();
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        let count = state.counts.entry(data_id).or_insert(0);
        let first = *count == 0;
        *count += 1;

        if first {
            // Snapshot before appending: the state immediately before
            // this site first executed
            let history = state.histories.get(&thread_id).cloned().unwrap_or_default();
            state.first_occurrences.push(Snapshot {
                data_id: Some(data_id),
                thread_id,
                length: history.len(),
                history,
            });
        }
        state.histories.entry(thread_id).or_default().push(data_id);
    }

    fn close(&self) {
        if let Err(e) = self.write_dump() {
            if let Some(sink) = &self.messages {
                sink.report(&format!(
                    "[{}] execute-before dump failed: {}",
                    e.error_code(),
                    e
                ));
            }
        }
    }

    fn name(&self) -> &'static str {
        "execute_before"
    }
}
