//! Per-class weave transaction
//!
//! A [`WeaveLog`] holds the tentative metadata produced while
//! instrumenting one class. Its counters are seeded from the last
//! committed registry state; nothing it allocates becomes visible until
//! [`MetadataRegistry::commit`](super::store::MetadataRegistry::commit)
//! succeeds. A failed weave simply drops the log, leaving the global id
//! spaces gap-free for the retry.

use crate::error::{Result, TraceError};

use super::descriptor::Descriptor;
use super::event_type::EventType;
use super::model::{Attributes, DataInfo, MethodInfo};

/// Tentative per-class metadata builder
#[derive(Debug)]
pub struct WeaveLog {
    class_id: i32,
    next_method_id: i32,
    next_data_id: i32,
    methods: Vec<MethodInfo>,
    data_entries: Vec<DataInfo>,
}

impl WeaveLog {
    /// Create a log seeded with the committed counters
    pub(crate) fn new(class_id: i32, next_method_id: i32, next_data_id: i32) -> Self {
        Self {
            class_id,
            next_method_id,
            next_data_id,
            methods: Vec::new(),
            data_entries: Vec::new(),
        }
    }

    /// The class id this weave attempt was assigned
    pub fn class_id(&self) -> i32 {
        self.class_id
    }

    /// Begin a method, returning its global method id
    ///
    /// Data id 0 of every method is reserved: it anchors the method
    /// metadata and never produces an event, so the reserved entry is
    /// allocated here rather than by the producer.
    pub fn start_method(
        &mut self,
        class_name: &str,
        method_name: &str,
        method_desc: &str,
        access: u32,
        source_file_name: Option<&str>,
    ) -> i32 {
        let method_id = self.next_method_id;
        self.next_method_id += 1;

        self.methods.push(MethodInfo {
            class_id: self.class_id,
            method_id,
            class_name: class_name.to_string(),
            method_name: method_name.to_string(),
            method_desc: method_desc.to_string(),
            access,
            source_file_name: source_file_name.map(|s| s.to_string()),
        });

        let reserved = self.next_data_id;
        self.next_data_id += 1;
        self.data_entries.push(DataInfo {
            class_id: self.class_id,
            method_id,
            data_id: reserved,
            line: -1,
            instruction_index: -1,
            event_type: EventType::Reserved,
            value_desc: Descriptor::Void,
            attributes: Attributes::new(),
        });

        method_id
    }

    /// Allocate a data id for an instrumentation site in the current method
    pub fn next_data_id(
        &mut self,
        line: i32,
        instruction_index: i32,
        event_type: EventType,
        value_desc: Descriptor,
        attributes: Attributes,
    ) -> Result<i32> {
        let method_id = match self.methods.last() {
            Some(method) => method.method_id,
            None => {
                return Err(TraceError::InternalError {
                    reason: "next_data_id called before start_method".to_string(),
                })
            }
        };

        let data_id = self.next_data_id;
        self.next_data_id += 1;
        self.data_entries.push(DataInfo {
            class_id: self.class_id,
            method_id,
            data_id,
            line,
            instruction_index,
            event_type,
            value_desc,
            attributes,
        });
        Ok(data_id)
    }

    /// Tentative method rows, in allocation order
    pub fn methods(&self) -> &[MethodInfo] {
        &self.methods
    }

    /// Tentative data rows, in allocation order
    pub fn data_entries(&self) -> &[DataInfo] {
        &self.data_entries
    }

    /// Counter values after this log's allocations
    pub(crate) fn end_counters(&self) -> (i32, i32) {
        (self.next_method_id, self.next_data_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_method_reserves_slot_zero() {
        let mut log = WeaveLog::new(0, 0, 0);
        let method_id = log.start_method("C", "m", "()V", 0, None);
        assert_eq!(method_id, 0);

        // Reserved entry allocated automatically
        assert_eq!(log.data_entries().len(), 1);
        let reserved = &log.data_entries()[0];
        assert_eq!(reserved.event_type, EventType::Reserved);
        assert_eq!(reserved.value_desc, Descriptor::Void);
        assert_eq!(reserved.data_id, 0);

        let data_id = log
            .next_data_id(10, 0, EventType::MethodEntry, Descriptor::Void, Attributes::new())
            .unwrap();
        assert_eq!(data_id, 1);
    }

    #[test]
    fn test_counters_inherited() {
        let mut log = WeaveLog::new(5, 30, 400);
        let m = log.start_method("C", "m", "()V", 0, None);
        assert_eq!(m, 30);
        let d = log
            .next_data_id(1, 0, EventType::MethodEntry, Descriptor::Void, Attributes::new())
            .unwrap();
        assert_eq!(d, 401); // 400 went to the reserved slot
        assert_eq!(log.end_counters(), (31, 402));
    }

    #[test]
    fn test_data_id_requires_method() {
        let mut log = WeaveLog::new(0, 0, 0);
        let err = log
            .next_data_id(1, 0, EventType::Label, Descriptor::Void, Attributes::new())
            .unwrap_err();
        assert_eq!(err.error_code(), "INTERNAL_ERROR");
    }
}
