//! Committed metadata registry
//!
//! The registry owns the three append-only metadata tables (classes,
//! methods, data ids) and the committed id counters. [`commit`] is the
//! only mutator of global state: it appends every tentative row from a
//! [`WeaveLog`], flushes, advances the counters and fans out new
//! [`DataInfo`] entries to registered listeners.
//!
//! Failure semantics: if a table file cannot be opened or written, that
//! table is marked dead for the remainder of the run and further writes
//! to it become silent no-ops, but the counters still advance so the id
//! spaces of the tables that did succeed stay consistent.
//!
//! [`commit`]: MetadataRegistry::commit

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Result, TraceError};
use crate::message::SharedMessageSink;

use super::model::{ClassInfo, DataInfo, MethodInfo};
use super::weave_log::WeaveLog;

/// Class table file name
pub const CLASS_TABLE_FILE: &str = "classes.txt";
/// Method table file name
pub const METHOD_TABLE_FILE: &str = "methods.txt";
/// Data-id table file name
pub const DATA_TABLE_FILE: &str = "dataids.txt";

const CLASS_TABLE_HEADER: &str =
    "#weavetrace-classes/1\tclass_id\tcontainer\tfilename\tclass_name\tweaving_level\tcontent_hash\tloader";
const METHOD_TABLE_HEADER: &str =
    "#weavetrace-methods/1\tclass_id\tmethod_id\tclass_name\tmethod_name\tmethod_desc\taccess\tsource_file";
const DATA_TABLE_HEADER: &str =
    "#weavetrace-dataids/1\tdata_id\tclass_id\tmethod_id\tline\tinstruction_index\tevent_type\tdescriptor\tattributes";

/// Fan-out hook notified of each newly committed [`DataInfo`]
///
/// Downstream consumers (e.g. the frequency sink) use this to pre-size
/// per-dataId structures.
pub trait DataInfoListener: Send {
    fn data_info_created(&mut self, info: &DataInfo);
}

/// One append-only table file; dead once a write fails
struct Table {
    name: &'static str,
    writer: Option<BufWriter<File>>,
}

impl Table {
    fn open(path: &Path, name: &'static str, header: &str) -> (Self, Option<TraceError>) {
        let result = OpenOptions::new().create(true).append(true).open(path);
        match result {
            Ok(file) => {
                let fresh = file.metadata().map(|m| m.len() == 0).unwrap_or(false);
                let mut writer = BufWriter::new(file);
                if fresh {
                    if let Err(e) = writeln!(writer, "{}", header) {
                        return (
                            Self { name, writer: None },
                            Some(TraceError::TableWriteFailed {
                                table: name.to_string(),
                                reason: e.to_string(),
                            }),
                        );
                    }
                }
                (
                    Self {
                        name,
                        writer: Some(writer),
                    },
                    None,
                )
            }
            Err(e) => (
                Self { name, writer: None },
                Some(TraceError::TableWriteFailed {
                    table: name.to_string(),
                    reason: e.to_string(),
                }),
            ),
        }
    }

    /// Append one row; a failure kills the table and is returned once
    fn append(&mut self, row: &str) -> Option<TraceError> {
        let writer = self.writer.as_mut()?;
        match writeln!(writer, "{}", row) {
            Ok(()) => None,
            Err(e) => {
                self.writer = None;
                Some(TraceError::TableWriteFailed {
                    table: self.name.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    fn flush(&mut self) -> Option<TraceError> {
        let writer = self.writer.as_mut()?;
        match writer.flush() {
            Ok(()) => None,
            Err(e) => {
                self.writer = None;
                Some(TraceError::TableWriteFailed {
                    table: self.name.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

struct RegistryInner {
    next_class_id: i32,
    next_method_id: i32,
    next_data_id: i32,
    classes: Table,
    methods: Table,
    data: Table,
    listeners: Vec<Box<dyn DataInfoListener>>,
}

/// The global, append-only metadata registry
pub struct MetadataRegistry {
    inner: Mutex<RegistryInner>,
    messages: Option<SharedMessageSink>,
    /// Table-open failures from `create`, reported once a sink attaches
    startup_errors: Vec<TraceError>,
}

impl MetadataRegistry {
    /// Create a registry writing its tables into `directory`
    ///
    /// A table whose file cannot be opened is dead from the start; the
    /// registry itself is still usable and keeps its counters coherent.
    pub fn create<P: Into<PathBuf>>(directory: P) -> Result<Self> {
        let dir = directory.into();
        std::fs::create_dir_all(&dir).map_err(TraceError::io)?;

        let (classes, c_err) =
            Table::open(&dir.join(CLASS_TABLE_FILE), "classes", CLASS_TABLE_HEADER);
        let (methods, m_err) =
            Table::open(&dir.join(METHOD_TABLE_FILE), "methods", METHOD_TABLE_HEADER);
        let (data, d_err) = Table::open(&dir.join(DATA_TABLE_FILE), "dataids", DATA_TABLE_HEADER);

        Ok(Self {
            inner: Mutex::new(RegistryInner {
                next_class_id: 0,
                next_method_id: 0,
                next_data_id: 0,
                classes,
                methods,
                data,
                listeners: Vec::new(),
            }),
            messages: None,
            startup_errors: [c_err, m_err, d_err].into_iter().flatten().collect(),
        })
    }

    /// Attach a message sink receiving table-degradation reports
    ///
    /// Tables that were already dead when the registry was created are
    /// reported here.
    pub fn with_message_sink(mut self, sink: SharedMessageSink) -> Self {
        for err in &self.startup_errors {
            sink.report(&format!("[{}] {}", err.error_code(), err));
        }
        self.messages = Some(sink);
        self
    }

    /// Register a listener notified of every committed data id
    pub fn add_listener(&self, listener: Box<dyn DataInfoListener>) -> Result<()> {
        let mut inner = self.inner.lock().map_err(|_| TraceError::LockPoisoned)?;
        inner.listeners.push(listener);
        Ok(())
    }

    /// Begin a weave attempt, seeded with the committed counters
    ///
    /// The returned log is purely tentative; dropping it without
    /// committing leaves the registry untouched. Weave attempts must be
    /// serialized by the caller: interleaving two attempts and
    /// committing both would overlap their id ranges, which `commit`
    /// rejects.
    pub fn begin_class_weave(&self) -> Result<WeaveLog> {
        let inner = self.inner.lock().map_err(|_| TraceError::LockPoisoned)?;
        Ok(WeaveLog::new(
            inner.next_class_id,
            inner.next_method_id,
            inner.next_data_id,
        ))
    }

    /// Commit a successful weave
    ///
    /// Appends the class row and every tentative method and data row,
    /// flushes all three tables, advances the counters and notifies
    /// listeners. Table write failures degrade the affected table but do
    /// not fail the commit.
    pub fn commit(&self, class_info: &ClassInfo, log: &WeaveLog) -> Result<()> {
        let mut guard = self.inner.lock().map_err(|_| TraceError::LockPoisoned)?;
        let inner = &mut *guard;

        let (end_method_id, end_data_id) = log.end_counters();
        let base_method_id = end_method_id - log.methods().len() as i32;
        let base_data_id = end_data_id - log.data_entries().len() as i32;
        if class_info.class_id != inner.next_class_id
            || class_info.class_id != log.class_id()
            || base_method_id != inner.next_method_id
            || base_data_id != inner.next_data_id
        {
            return Err(TraceError::InternalError {
                reason: format!(
                    "stale weave log for class {} (committed state moved; weave attempts must be serialized)",
                    log.class_id()
                ),
            });
        }

        let mut failures = Vec::new();
        if let Some(err) = inner.classes.append(&class_info.to_row()) {
            failures.push(err);
        }
        for method in log.methods() {
            if let Some(err) = inner.methods.append(&method.to_row()) {
                failures.push(err);
            }
        }
        for data in log.data_entries() {
            if let Some(err) = inner.data.append(&data.to_row()) {
                failures.push(err);
            }
        }
        for table in [&mut inner.classes, &mut inner.methods, &mut inner.data] {
            if let Some(err) = table.flush() {
                failures.push(err);
            }
        }

        inner.next_class_id += 1;
        inner.next_method_id = end_method_id;
        inner.next_data_id = end_data_id;

        // Fan out new data ids. Listeners run under the registry lock;
        // they must not call back into the registry.
        let RegistryInner {
            listeners,
            ..
        } = &mut *inner;
        for listener in listeners.iter_mut() {
            for data in log.data_entries() {
                listener.data_info_created(data);
            }
        }
        drop(guard);

        for err in failures {
            self.report(&err);
        }
        Ok(())
    }

    /// Committed `(class, method, data)` counter snapshot
    pub fn committed_counters(&self) -> Result<(i32, i32, i32)> {
        let inner = self.inner.lock().map_err(|_| TraceError::LockPoisoned)?;
        Ok((
            inner.next_class_id,
            inner.next_method_id,
            inner.next_data_id,
        ))
    }

    fn report(&self, err: &TraceError) {
        if let Some(sink) = &self.messages {
            sink.report(&format!("[{}] {}", err.error_code(), err));
        }
    }
}

fn read_table<T>(
    dir: &Path,
    file: &str,
    table: &str,
    header: &str,
    parse: fn(&str) -> Result<T>,
) -> Result<Vec<T>> {
    let path = dir.join(file);
    let file = File::open(&path).map_err(|e| TraceError::CorruptMetadata {
        table: table.to_string(),
        reason: format!("cannot open {}: {}", path.display(), e),
    })?;
    let reader = BufReader::new(file);
    let mut rows = Vec::new();
    let mut lines = reader.lines();

    match lines.next() {
        Some(Ok(first)) if first == header => {}
        Some(Ok(first)) => {
            return Err(TraceError::CorruptMetadata {
                table: table.to_string(),
                reason: format!("unexpected header '{}'", first),
            })
        }
        Some(Err(e)) => return Err(TraceError::io(e)),
        None => {
            return Err(TraceError::CorruptMetadata {
                table: table.to_string(),
                reason: "missing header row".to_string(),
            })
        }
    }

    for line in lines {
        let line = line.map_err(TraceError::io)?;
        if line.is_empty() {
            continue;
        }
        rows.push(parse(&line)?);
    }
    Ok(rows)
}

/// Load the committed class table
pub fn load_class_table(dir: &Path) -> Result<Vec<ClassInfo>> {
    read_table(
        dir,
        CLASS_TABLE_FILE,
        "classes",
        CLASS_TABLE_HEADER,
        ClassInfo::from_row,
    )
}

/// Load the committed method table
pub fn load_method_table(dir: &Path) -> Result<Vec<MethodInfo>> {
    read_table(
        dir,
        METHOD_TABLE_FILE,
        "methods",
        METHOD_TABLE_HEADER,
        MethodInfo::from_row,
    )
}

/// Load the committed data-id table
pub fn load_data_table(dir: &Path) -> Result<Vec<DataInfo>> {
    read_table(
        dir,
        DATA_TABLE_FILE,
        "dataids",
        DATA_TABLE_HEADER,
        DataInfo::from_row,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MemoryMessageSink;
    use crate::registry::descriptor::Descriptor;
    use crate::registry::event_type::EventType;
    use crate::registry::model::{Attributes, WeavingLevel};
    use std::sync::Arc;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "weavetrace-registry-{}-{}",
            tag,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn class_info(class_id: i32, name: &str) -> ClassInfo {
        ClassInfo {
            class_id,
            container: "classes".to_string(),
            filename: format!("{}.class", name),
            class_name: name.to_string(),
            weaving_level: WeavingLevel::Normal,
            content_hash: ClassInfo::content_hash_of(name.as_bytes()),
            loader_ident: "loader-0".to_string(),
        }
    }

    fn weave_one_method(log: &mut WeaveLog, class_name: &str) {
        log.start_method(class_name, "run", "()V", 1, Some("Main.java"));
        log.next_data_id(5, 0, EventType::MethodEntry, Descriptor::Void, Attributes::new())
            .unwrap();
        log.next_data_id(7, 3, EventType::MethodNormalExit, Descriptor::Int, Attributes::new())
            .unwrap();
    }

    #[test]
    fn test_commit_persists_and_advances() {
        let dir = temp_dir("commit");
        let registry = MetadataRegistry::create(&dir).unwrap();

        let mut log = registry.begin_class_weave().unwrap();
        weave_one_method(&mut log, "com/example/A");
        registry.commit(&class_info(0, "com/example/A"), &log).unwrap();

        assert_eq!(registry.committed_counters().unwrap(), (1, 1, 3));

        let classes = load_class_table(&dir).unwrap();
        let methods = load_method_table(&dir).unwrap();
        let data = load_data_table(&dir).unwrap();
        assert_eq!(classes.len(), 1);
        assert_eq!(methods.len(), 1);
        assert_eq!(data.len(), 3);
        assert_eq!(data[0].event_type, EventType::Reserved);
        assert_eq!(data[1].event_type, EventType::MethodEntry);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_discarded_weave_leaves_counters() {
        let dir = temp_dir("discard");
        let registry = MetadataRegistry::create(&dir).unwrap();

        {
            let mut log = registry.begin_class_weave().unwrap();
            weave_one_method(&mut log, "com/example/Fail");
            // weave failed: log dropped without commit
        }
        assert_eq!(registry.committed_counters().unwrap(), (0, 0, 0));

        // Retry (at a reduced level) produces a contiguous range from 0
        let mut log = registry.begin_class_weave().unwrap();
        log.start_method("com/example/Fail", "run", "()V", 1, None);
        let mut retried = class_info(0, "com/example/Fail");
        retried.weaving_level = WeavingLevel::OnlyEntryExit;
        registry.commit(&retried, &log).unwrap();

        let data = load_data_table(&dir).unwrap();
        let ids: Vec<i32> = data.iter().map(|d| d.data_id).collect();
        assert_eq!(ids, vec![0]);
        assert_eq!(load_class_table(&dir).unwrap()[0].weaving_level, WeavingLevel::OnlyEntryExit);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_stale_log_rejected() {
        let dir = temp_dir("stale");
        let registry = MetadataRegistry::create(&dir).unwrap();

        let mut stale = registry.begin_class_weave().unwrap();
        weave_one_method(&mut stale, "A");
        let mut fresh = registry.begin_class_weave().unwrap();
        weave_one_method(&mut fresh, "A");

        registry.commit(&class_info(0, "A"), &fresh).unwrap();
        let err = registry.commit(&class_info(0, "A"), &stale).unwrap_err();
        assert_eq!(err.error_code(), "INTERNAL_ERROR");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_dead_table_degrades_quietly() {
        let dir = temp_dir("dead");
        std::fs::create_dir_all(&dir).unwrap();
        // classes.txt pre-created as a directory: the class table can
        // never open, the other two must still work
        std::fs::create_dir_all(dir.join(CLASS_TABLE_FILE)).unwrap();

        let messages = Arc::new(MemoryMessageSink::new());
        let registry = MetadataRegistry::create(&dir)
            .unwrap()
            .with_message_sink(messages.clone());

        let mut log = registry.begin_class_weave().unwrap();
        weave_one_method(&mut log, "B");
        registry.commit(&class_info(0, "B"), &log).unwrap();

        // Counters advanced consistently even though one table is dead
        assert_eq!(registry.committed_counters().unwrap(), (1, 1, 3));
        assert_eq!(load_method_table(&dir).unwrap().len(), 1);
        assert_eq!(load_data_table(&dir).unwrap().len(), 3);
        assert!(messages
            .messages()
            .iter()
            .any(|m| m.contains("TABLE_WRITE_FAILED")));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_listener_fan_out() {
        struct Counting(std::sync::mpsc::Sender<i32>);
        impl DataInfoListener for Counting {
            fn data_info_created(&mut self, info: &DataInfo) {
                let _ = self.0.send(info.data_id);
            }
        }

        let dir = temp_dir("listener");
        let registry = MetadataRegistry::create(&dir).unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        registry.add_listener(Box::new(Counting(tx))).unwrap();

        let mut log = registry.begin_class_weave().unwrap();
        weave_one_method(&mut log, "C");
        registry.commit(&class_info(0, "C"), &log).unwrap();

        let seen: Vec<i32> = rx.try_iter().collect();
        assert_eq!(seen, vec![0, 1, 2]);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
