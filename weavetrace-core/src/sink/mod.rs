//! Runtime event sinks
//!
//! Every sink implements one capability, [`EventSink`]: a `record_*`
//! method per value width plus `close()`. The instrumented program calls
//! these from arbitrary threads; implementations use interior mutability
//! and must never panic or propagate an error into the caller.
//!
//! The variants trade space for fidelity:
//!
//! | Sink                | Keeps                                  |
//! |---------------------|----------------------------------------|
//! | [`StreamSink`]      | every event, verbatim, on disk         |
//! | [`LatestEventSink`] | a bounded ring of recent events per site |
//! | [`FrequencySink`]   | a counter per site                     |
//! | [`ExecuteBeforeSink`] | first-occurrence history snapshots   |
//! | [`FilterSink`]      | whatever its inner sink keeps, gated   |
//! | [`DiscardSink`]     | nothing                                |
//! | [`MemorySink`]      | everything, in memory (tests only)     |
//!
//! `close()` is not safe to call concurrently with in-flight `record_*`
//! calls; arrange a quiescent state (e.g. a shutdown hook) first.

mod execute_before;
mod filter;
mod frequency;
mod latest;
mod stream;

pub use execute_before::{ExecuteBeforeReport, ExecuteBeforeSink, Snapshot, EXECUTE_BEFORE_FILE};
pub use filter::{DataIdPredicate, FilterSink, IdSetPredicate, LocationPredicate};
pub use frequency::{FrequencyPreSizer, FrequencySink, FREQUENCY_FILE};
pub use latest::{LatestEventSink, LATEST_DUMP_BASENAME};
pub use stream::StreamSink;

use std::sync::{Arc, Mutex};

use crate::config::{OutputConfig, SinkKind};
use crate::error::Result;
use crate::message::SharedMessageSink;
use crate::objectid::{ObjRef, ObjectIdMap};
use crate::output::current_thread_id;
use crate::registry::{
    encode_bool, encode_f32, encode_f64, encode_i16, encode_i32, encode_i8, encode_u16,
};

/// Capability shared by all event sinks
///
/// The typed methods encode their value into the raw `i64` payload and
/// delegate to [`record_raw`](EventSink::record_raw); object values go
/// through [`record_object`](EventSink::record_object) so sinks that
/// track identities can intercept them.
pub trait EventSink: Send + Sync {
    /// Record an already-encoded payload
    fn record_raw(&self, data_id: i32, raw_value: i64);

    /// Record an object reference (`None` for a null reference)
    ///
    /// The default discards the identity and records payload 0; sinks
    /// that assign surrogate ids override this.
    fn record_object(&self, data_id: i32, obj: Option<&ObjRef>) {
        let _ = obj;
        self.record_raw(data_id, 0);
    }

    /// Flush and finalize. Callers must be quiescent.
    fn close(&self);

    /// Sink name (for logging/debugging)
    fn name(&self) -> &'static str;

    fn record_bool(&self, data_id: i32, value: bool) {
        self.record_raw(data_id, encode_bool(value));
    }

    fn record_i8(&self, data_id: i32, value: i8) {
        self.record_raw(data_id, encode_i8(value));
    }

    fn record_u16(&self, data_id: i32, value: u16) {
        self.record_raw(data_id, encode_u16(value));
    }

    fn record_i16(&self, data_id: i32, value: i16) {
        self.record_raw(data_id, encode_i16(value));
    }

    fn record_i32(&self, data_id: i32, value: i32) {
        self.record_raw(data_id, encode_i32(value));
    }

    fn record_i64(&self, data_id: i32, value: i64) {
        self.record_raw(data_id, value);
    }

    fn record_f32(&self, data_id: i32, value: f32) {
        self.record_raw(data_id, encode_f32(value));
    }

    fn record_f64(&self, data_id: i32, value: f64) {
        self.record_raw(data_id, encode_f64(value));
    }
}

/// Sink that records nothing
#[derive(Debug, Default, Clone)]
pub struct DiscardSink;

impl DiscardSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for DiscardSink {
    fn record_raw(&self, _data_id: i32, _raw_value: i64) {}

    fn close(&self) {}

    fn name(&self) -> &'static str {
        "discard"
    }
}

/// One event captured by [`MemorySink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturedEvent {
    pub data_id: i32,
    pub thread_id: i32,
    pub raw_value: i64,
}

/// Unbounded in-memory sink for test harnesses
///
/// Appends every event to an ordered list. Not intended for production
/// volumes.
pub struct MemorySink {
    events: Mutex<Vec<CapturedEvent>>,
    ids: ObjectIdMap,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            ids: ObjectIdMap::with_capacity(256),
        }
    }

    /// Snapshot of everything recorded so far
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Data ids in recording order
    pub fn data_ids(&self) -> Vec<i32> {
        self.events
            .lock()
            .map(|e| e.iter().map(|ev| ev.data_id).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for MemorySink {
    fn record_raw(&self, data_id: i32, raw_value: i64) {
        if let Ok(mut events) = self.events.lock() {
            events.push(CapturedEvent {
                data_id,
                thread_id: current_thread_id(),
                raw_value,
            });
        }
    }

    fn record_object(&self, data_id: i32, obj: Option<&ObjRef>) {
        let id = self.ids.id_for(obj);
        self.record_raw(data_id, id);
    }

    fn close(&self) {}

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Build the sink selected by the configuration
pub fn create_sink(
    config: &OutputConfig,
    messages: Option<SharedMessageSink>,
) -> Result<Arc<dyn EventSink>> {
    Ok(match config.sink {
        SinkKind::Stream => {
            let mut sink = StreamSink::new(config)?;
            if let Some(messages) = messages {
                sink = sink.with_message_sink(messages);
            }
            Arc::new(sink)
        }
        SinkKind::Latest => {
            let mut sink = LatestEventSink::new(config)?;
            if let Some(messages) = messages {
                sink = sink.with_message_sink(messages);
            }
            Arc::new(sink)
        }
        SinkKind::Frequency => {
            let mut sink = FrequencySink::new(config)?;
            if let Some(messages) = messages {
                sink = sink.with_message_sink(messages);
            }
            Arc::new(sink)
        }
        SinkKind::ExecuteBefore => {
            let mut sink = ExecuteBeforeSink::new(config)?;
            if let Some(messages) = messages {
                sink = sink.with_message_sink(messages);
            }
            Arc::new(sink)
        }
        SinkKind::Discard => Arc::new(DiscardSink::new()),
    })
}
