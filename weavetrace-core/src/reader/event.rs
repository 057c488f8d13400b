//! A replayed event joined with its metadata

use crate::registry::{DataInfo, EventType, RecordedValue};

/// One event as seen by replay tooling
///
/// Combines the 16-byte wire record with everything the metadata tables
/// say about its site, plus the parameter sub-events the reader linked
/// to it.
#[derive(Debug, Clone)]
pub struct Event {
    /// Global position in the stream, starting at 0
    pub event_id: u64,
    pub data_id: i32,
    pub thread_id: i32,
    pub raw_value: i64,
    pub event_type: EventType,
    /// The raw payload reinterpreted via the site's value descriptor
    pub value: RecordedValue,
    /// Parameter sub-events consumed by linkage, in stream order
    pub params: Vec<Event>,
}

impl Event {
    pub(crate) fn from_record(
        event_id: u64,
        data_id: i32,
        thread_id: i32,
        raw_value: i64,
        info: &DataInfo,
    ) -> Self {
        Self {
            event_id,
            data_id,
            thread_id,
            raw_value,
            event_type: info.event_type,
            value: info.value_desc.decode(raw_value),
            params: Vec::new(),
        }
    }

    /// The surrogate object id of the payload, if the site records one
    pub fn object_id(&self) -> Option<i64> {
        self.value.object_id()
    }
}
