//! Bounded per-site ring buffers
//!
//! [`LatestEventSink`] keeps, for each dataId, the most recent `k`
//! recorded values together with a global insertion sequence number and
//! the recording thread. Memory stays proportional to the number of
//! instrumentation sites, not to trace length. On `close()` the buffers
//! are dumped to a single text or JSON file.
//!
//! Object values are retained per the configured [`ObjectRetention`]:
//! strong references pin the object, weak references let it go and read
//! back as a `"<reclaimed>"` sentinel, id mode stores only the
//! surrogate id.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::config::{DumpFormat, ObjectRetention, OutputConfig};
use crate::error::{Result, TraceError};
use crate::message::SharedMessageSink;
use crate::objectid::{ObjRef, ObjectIdMap, WeakObjRef};
use crate::output::current_thread_id;

use super::EventSink;

/// Base name of the dump file; the extension follows the dump format
pub const LATEST_DUMP_BASENAME: &str = "latest";

/// Sentinel written for weakly held objects that were reclaimed
const RECLAIMED: &str = "<reclaimed>";

enum SlotValue {
    Raw(i64),
    Strong(ObjRef),
    Weak(WeakObjRef),
    /// Surrogate id only; 0 is null
    Id(i64),
}

struct Slot {
    value: SlotValue,
    seq: u64,
    thread_id: i32,
}

struct SiteBuffer {
    slots: Vec<Option<Slot>>,
    /// Total events ever offered to this site
    count: u64,
}

impl SiteBuffer {
    fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots, count: 0 }
    }

    fn push(&mut self, slot: Slot) {
        let index = (self.count % self.slots.len() as u64) as usize;
        self.slots[index] = Some(slot);
        self.count += 1;
    }

    /// Retained slots, oldest first
    fn ordered(&self) -> Vec<&Slot> {
        let capacity = self.slots.len() as u64;
        let retained = self.count.min(capacity);
        let start = if self.count <= capacity {
            0
        } else {
            (self.count % capacity) as usize
        };
        (0..retained as usize)
            .filter_map(|i| self.slots[(start + i) % self.slots.len()].as_ref())
            .collect()
    }
}

/// Sink that keeps the most recent `k` events per instrumentation site
pub struct LatestEventSink {
    directory: PathBuf,
    capacity: usize,
    retention: ObjectRetention,
    dump_format: DumpFormat,
    buffers: Mutex<HashMap<i32, SiteBuffer>>,
    ids: ObjectIdMap,
    seq: AtomicU64,
    messages: Option<SharedMessageSink>,
}

#[derive(Serialize)]
struct DumpValue {
    seq: u64,
    thread_id: i32,
    value: serde_json::Value,
}

#[derive(Serialize)]
struct DumpRow {
    data_id: i32,
    /// Total events observed at this site
    count: u64,
    /// Events still retained (`min(count, capacity)`)
    size: usize,
    values: Vec<DumpValue>,
}

impl LatestEventSink {
    pub fn new(config: &OutputConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.directory).map_err(TraceError::io)?;
        Ok(Self {
            directory: config.directory.clone(),
            capacity: config.buffer_capacity.max(1),
            retention: config.retention,
            dump_format: config.dump_format,
            buffers: Mutex::new(HashMap::new()),
            ids: ObjectIdMap::new(),
            seq: AtomicU64::new(0),
            messages: None,
        })
    }

    /// Attach a message sink receiving dump failure reports
    pub fn with_message_sink(mut self, sink: SharedMessageSink) -> Self {
        self.messages = Some(sink);
        self
    }

    /// Total events ever offered to a site
    pub fn site_count(&self, data_id: i32) -> u64 {
        self.buffers
            .lock()
            .ok()
            .and_then(|b| b.get(&data_id).map(|s| s.count))
            .unwrap_or(0)
    }

    /// Events still retained for a site
    pub fn site_size(&self, data_id: i32) -> usize {
        self.buffers
            .lock()
            .ok()
            .and_then(|b| {
                b.get(&data_id)
                    .map(|s| s.count.min(s.slots.len() as u64) as usize)
            })
            .unwrap_or(0)
    }

    /// Raw payloads retained for a site, oldest first (test hook)
    pub fn site_values(&self, data_id: i32) -> Vec<i64> {
        self.buffers
            .lock()
            .ok()
            .and_then(|b| {
                b.get(&data_id).map(|s| {
                    s.ordered()
                        .iter()
                        .map(|slot| match &slot.value {
                            SlotValue::Raw(v) | SlotValue::Id(v) => *v,
                            SlotValue::Strong(_) | SlotValue::Weak(_) => 0,
                        })
                        .collect()
                })
            })
            .unwrap_or_default()
    }

    fn push(&self, data_id: i32, value: SlotValue) {
        let slot = Slot {
            value,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            thread_id: current_thread_id(),
        };
        if let Ok(mut buffers) = self.buffers.lock() {
            buffers
                .entry(data_id)
                .or_insert_with(|| SiteBuffer::new(self.capacity))
                .push(slot);
        }
    }

    fn render(&self, slot: &Slot) -> serde_json::Value {
        match &slot.value {
            SlotValue::Raw(v) => serde_json::json!(v),
            SlotValue::Id(id) => serde_json::json!({ "object_id": id }),
            SlotValue::Strong(obj) => serde_json::json!({ "object_type": obj.type_name() }),
            SlotValue::Weak(weak) => match weak.upgrade() {
                Some(obj) => serde_json::json!({ "object_type": obj.type_name() }),
                None => serde_json::json!(RECLAIMED),
            },
        }
    }

    fn dump_rows(&self) -> Vec<DumpRow> {
        let buffers = match self.buffers.lock() {
            Ok(buffers) => buffers,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut data_ids: Vec<i32> = buffers.keys().copied().collect();
        data_ids.sort_unstable();
        data_ids
            .into_iter()
            .filter_map(|data_id| {
                let site = buffers.get(&data_id)?;
                let values = site
                    .ordered()
                    .into_iter()
                    .map(|slot| DumpValue {
                        seq: slot.seq,
                        thread_id: slot.thread_id,
                        value: self.render(slot),
                    })
                    .collect::<Vec<_>>();
                Some(DumpRow {
                    data_id,
                    count: site.count,
                    size: values.len(),
                    values,
                })
            })
            .collect()
    }

    fn write_dump(&self) -> Result<()> {
        let rows = self.dump_rows();
        match self.dump_format {
            DumpFormat::Json => {
                let path = self.directory.join(format!("{}.json", LATEST_DUMP_BASENAME));
                let file = File::create(&path).map_err(TraceError::io)?;
                let mut writer = BufWriter::new(file);
                serde_json::to_writer_pretty(&mut writer, &rows)?;
                writer.flush().map_err(TraceError::io)?;
            }
            DumpFormat::Text => {
                let path = self.directory.join(format!("{}.txt", LATEST_DUMP_BASENAME));
                let file = File::create(&path).map_err(TraceError::io)?;
                let mut writer = BufWriter::new(file);
                for row in rows {
                    let values = row
                        .values
                        .iter()
                        .map(|v| format!("{}@{}:{}", v.seq, v.thread_id, v.value))
                        .collect::<Vec<_>>()
                        .join(" ");
                    writeln!(
                        writer,
                        "{}\t{}\t{}\t{}",
                        row.data_id, row.count, row.size, values
                    )
                    .map_err(TraceError::io)?;
                }
                writer.flush().map_err(TraceError::io)?;
            }
        }
        Ok(())
    }
}

impl EventSink for LatestEventSink {
    fn record_raw(&self, data_id: i32, raw_value: i64) {
        self.push(data_id, SlotValue::Raw(raw_value));
    }

    fn record_object(&self, data_id: i32, obj: Option<&ObjRef>) {
        let value = match obj {
            None => SlotValue::Id(0),
            Some(obj) => match self.retention {
                ObjectRetention::Strong => SlotValue::Strong(obj.clone()),
                ObjectRetention::Weak => SlotValue::Weak(Arc::downgrade(obj)),
                ObjectRetention::Id => SlotValue::Id(self.ids.id_for(Some(obj))),
            },
        };
        self.push(data_id, value);
    }

    fn close(&self) {
        if let Err(e) = self.write_dump() {
            if let Some(sink) = &self.messages {
                sink.report(&format!("[{}] latest-event dump failed: {}", e.error_code(), e));
            }
        }
    }

    fn name(&self) -> &'static str {
        "latest"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objectid::TracedObject;

    struct Plain;
    impl TracedObject for Plain {
        fn type_name(&self) -> &str {
            "demo/Widget"
        }
    }

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "weavetrace-latest-{}-{}",
            tag,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn sink(dir: &PathBuf, capacity: usize, retention: ObjectRetention) -> LatestEventSink {
        let config = OutputConfig::new(dir)
            .buffer_capacity(capacity)
            .retention(retention);
        LatestEventSink::new(&config).unwrap()
    }

    #[test]
    fn test_ring_keeps_last_k_in_order() {
        let dir = temp_dir("ring");
        let sink = sink(&dir, 3, ObjectRetention::Id);

        for v in 1..=7 {
            sink.record_i64(10, v);
        }

        assert_eq!(sink.site_count(10), 7);
        assert_eq!(sink.site_size(10), 3);
        assert_eq!(sink.site_values(10), vec![5, 6, 7]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_underfilled_ring() {
        let dir = temp_dir("under");
        let sink = sink(&dir, 8, ObjectRetention::Id);

        sink.record_i64(1, 100);
        sink.record_i64(1, 200);

        assert_eq!(sink.site_count(1), 2);
        assert_eq!(sink.site_size(1), 2);
        assert_eq!(sink.site_values(1), vec![100, 200]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_sites_are_independent() {
        let dir = temp_dir("sites");
        let sink = sink(&dir, 2, ObjectRetention::Id);

        sink.record_i64(1, 1);
        sink.record_i64(2, 2);
        sink.record_i64(1, 3);

        assert_eq!(sink.site_count(1), 2);
        assert_eq!(sink.site_count(2), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_weak_retention_reads_back_reclaimed() {
        let dir = temp_dir("weak");
        let sink = sink(&dir, 4, ObjectRetention::Weak);

        let kept: ObjRef = Arc::new(Plain);
        sink.record_object(1, Some(&kept));
        {
            let transient: ObjRef = Arc::new(Plain);
            sink.record_object(1, Some(&transient));
        }

        let rows = sink.dump_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].values.len(), 2);
        assert_eq!(
            rows[0].values[0].value,
            serde_json::json!({ "object_type": "demo/Widget" })
        );
        assert_eq!(rows[0].values[1].value, serde_json::json!(RECLAIMED));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_json_dump_written_on_close() {
        let dir = temp_dir("dump");
        let sink = sink(&dir, 2, ObjectRetention::Id);
        sink.record_i64(5, 42);
        sink.close();

        let raw = std::fs::read_to_string(dir.join("latest.json")).unwrap();
        let rows: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(rows[0]["data_id"], 5);
        assert_eq!(rows[0]["count"], 1);
        assert_eq!(rows[0]["values"][0]["value"], 42);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_text_dump_format() {
        let dir = temp_dir("text");
        let config = OutputConfig::new(&dir)
            .buffer_capacity(2)
            .dump_format(DumpFormat::Text);
        let sink = LatestEventSink::new(&config).unwrap();
        sink.record_i64(3, 7);
        sink.close();

        let raw = std::fs::read_to_string(dir.join("latest.txt")).unwrap();
        let line = raw.lines().next().unwrap();
        assert!(line.starts_with("3\t1\t1\t"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
