//! Full-fidelity streaming sink

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::config::OutputConfig;
use crate::error::{Result, TraceError};
use crate::message::SharedMessageSink;
use crate::objectid::{ObjRef, ObjectIdFile};
use crate::output::{current_thread_id, event_file_names, EventRecord, RotatingEventWriter};

use super::EventSink;

/// Sink that streams every event to rotating binary files
///
/// Records are written in arrival order under a single writer lock, so
/// the on-disk sequence is a valid interleaving of the per-thread
/// recording orders. Object values go through an [`ObjectIdFile`] and
/// are streamed as their surrogate ids.
///
/// A write failure disables the sink for the rest of the run; the
/// failure is reported once through the message sink and later events
/// are dropped silently rather than crashing the traced program.
pub struct StreamSink {
    writer: Mutex<RotatingEventWriter>,
    objects: ObjectIdFile,
    disabled: AtomicBool,
    messages: Option<SharedMessageSink>,
}

impl StreamSink {
    pub fn new(config: &OutputConfig) -> Result<Self> {
        let writer = RotatingEventWriter::new(
            &config.directory,
            event_file_names(),
            config.events_per_file,
        )?;
        let objects = ObjectIdFile::new(
            &config.directory,
            config.rows_per_text_file,
            config.record_string_contents,
            config.record_exceptions,
        )?;
        Ok(Self {
            writer: Mutex::new(writer),
            objects,
            disabled: AtomicBool::new(false),
            messages: None,
        })
    }

    /// Attach a message sink receiving failure reports
    pub fn with_message_sink(mut self, sink: SharedMessageSink) -> Self {
        self.objects = self.objects.with_message_sink(sink.clone());
        self.messages = Some(sink);
        self
    }

    /// Total records written so far
    pub fn count(&self) -> u64 {
        self.writer.lock().map(|w| w.count()).unwrap_or(0)
    }

    /// The identity map backing object values
    pub fn objects(&self) -> &ObjectIdFile {
        &self.objects
    }

    fn report(&self, err: &TraceError) {
        if let Some(sink) = &self.messages {
            sink.report(&format!("[{}] stream sink disabled: {}", err.error_code(), err));
        }
    }
}

impl EventSink for StreamSink {
    fn record_raw(&self, data_id: i32, raw_value: i64) {
        if self.disabled.load(Ordering::Relaxed) {
            return;
        }
        let thread_id = current_thread_id();
        let record = EventRecord::new(data_id, thread_id, raw_value);
        let result = match self.writer.lock() {
            Ok(mut writer) => writer.write_record(&record),
            Err(_) => return,
        };
        if let Err(e) = result {
            // First failure wins; everything after is dropped
            if !self.disabled.swap(true, Ordering::Relaxed) {
                self.report(&e);
            }
        }
    }

    fn record_object(&self, data_id: i32, obj: Option<&ObjRef>) {
        let id = self.objects.id_for(obj);
        self.record_raw(data_id, id);
    }

    fn close(&self) {
        if let Ok(mut writer) = self.writer.lock() {
            if let Err(e) = writer.flush() {
                self.report(&e);
            }
        }
        self.objects.close();
    }

    fn name(&self) -> &'static str {
        "stream"
    }
}
