//! Identity map with persistent side content
//!
//! [`ObjectIdFile`] wraps an [`ObjectIdMap`] and, on every first
//! sighting, persists what the reader will need to interpret the
//! surrogate id: the object's runtime type, the text of string-like
//! objects, and the chain of exception-like objects (message, cause id,
//! suppressed ids, stack frames). Side tables are rotating,
//! newline-delimited text files.
//!
//! Cause and suppressed references are resolved through the same map, so
//! recording one exception may assign ids to its whole chain; chain rows
//! for a cause land in the file before the rows of the exception that
//! referenced it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Result, TraceError};
use crate::message::SharedMessageSink;
use crate::output::{read_text_rows, FileNameGenerator, RotatingTextWriter};

use super::{ObjRef, ObjectIdMap};

/// File name prefix of the object-type side table
pub const OBJECT_TYPE_FILE_PREFIX: &str = "objtypes-";
/// File name prefix of the string-content side table
pub const STRING_FILE_PREFIX: &str = "strings-";
/// File name prefix of the exception-chain side table
pub const EXCEPTION_FILE_PREFIX: &str = "exceptions-";

const SIDE_FILE_SUFFIX: &str = ".txt";

/// Name generator for the object-type side table
pub fn object_type_file_names() -> FileNameGenerator {
    FileNameGenerator::new(OBJECT_TYPE_FILE_PREFIX, SIDE_FILE_SUFFIX)
}

/// Name generator for the string-content side table
pub fn string_file_names() -> FileNameGenerator {
    FileNameGenerator::new(STRING_FILE_PREFIX, SIDE_FILE_SUFFIX)
}

/// Name generator for the exception-chain side table
pub fn exception_file_names() -> FileNameGenerator {
    FileNameGenerator::new(EXCEPTION_FILE_PREFIX, SIDE_FILE_SUFFIX)
}

struct SideWriters {
    types: Option<RotatingTextWriter>,
    strings: Option<RotatingTextWriter>,
    exceptions: Option<RotatingTextWriter>,
}

/// Identity map that mirrors assignments to side files
pub struct ObjectIdFile {
    map: ObjectIdMap,
    writers: Mutex<SideWriters>,
    messages: Option<SharedMessageSink>,
}

impl ObjectIdFile {
    /// Create side tables in `directory`
    ///
    /// `record_strings` / `record_exceptions` toggle the optional side
    /// tables; the object-type table is always written.
    pub fn new<P: Into<PathBuf>>(
        directory: P,
        rows_per_file: u64,
        record_strings: bool,
        record_exceptions: bool,
    ) -> Result<Self> {
        let dir = directory.into();
        let types = RotatingTextWriter::new(&dir, object_type_file_names(), rows_per_file)?;
        let strings = if record_strings {
            Some(RotatingTextWriter::new(
                &dir,
                string_file_names(),
                rows_per_file,
            )?)
        } else {
            None
        };
        let exceptions = if record_exceptions {
            Some(RotatingTextWriter::new(
                &dir,
                exception_file_names(),
                rows_per_file,
            )?)
        } else {
            None
        };
        Ok(Self {
            map: ObjectIdMap::new(),
            writers: Mutex::new(SideWriters {
                types: Some(types),
                strings,
                exceptions,
            }),
            messages: None,
        })
    }

    /// Attach a message sink receiving side-file failure reports
    pub fn with_message_sink(mut self, sink: SharedMessageSink) -> Self {
        self.messages = Some(sink);
        self
    }

    /// The surrogate id for an object reference; 0 for `None`
    ///
    /// First sightings also persist the object's type and, when enabled,
    /// its string content or exception chain.
    pub fn id_for(&self, obj: Option<&ObjRef>) -> i64 {
        let obj = match obj {
            None => return 0,
            Some(obj) => obj,
        };
        let (id, new) = self.map.assign(obj);
        if new {
            self.record_new(obj, id);
        }
        id
    }

    /// The underlying identity map
    pub fn map(&self) -> &ObjectIdMap {
        &self.map
    }

    /// Flush all side tables
    pub fn close(&self) {
        if let Ok(mut writers) = self.writers.lock() {
            let writers = &mut *writers;
            for writer in [&mut writers.types, &mut writers.strings, &mut writers.exceptions]
                .into_iter()
                .flatten()
            {
                if let Err(e) = writer.flush() {
                    self.report(&e);
                }
            }
        }
    }

    fn record_new(&self, obj: &ObjRef, id: i64) {
        // Resolve chain ids before taking the writers lock: id_for
        // recurses through this method and must not deadlock on it.
        let exception = obj.exception();
        let chain = exception.as_ref().map(|info| {
            let cause_id = self.id_for(info.cause.as_ref());
            let suppressed_ids: Vec<i64> = info
                .suppressed
                .iter()
                .map(|s| self.id_for(Some(s)))
                .collect();
            (cause_id, suppressed_ids)
        });

        let mut writers = match self.writers.lock() {
            Ok(writers) => writers,
            Err(_) => return,
        };

        if let Some(types) = writers.types.as_mut() {
            let row = format!("{}\t{}", id, sanitize(obj.type_name()));
            if let Err(e) = types.write_row(&row) {
                self.report(&e);
                writers.types = None;
            }
        }

        if let Some(content) = obj.string_content() {
            if let Some(strings) = writers.strings.as_mut() {
                let row = format!("{}\t{}", id, sanitize(&content));
                if let Err(e) = strings.write_row(&row) {
                    self.report(&e);
                    writers.strings = None;
                }
            }
        }

        if let (Some(info), Some((cause_id, suppressed_ids))) = (exception.as_ref(), chain) {
            if let Some(exceptions) = writers.exceptions.as_mut() {
                let mut rows = Vec::with_capacity(2 + suppressed_ids.len() + info.frames.len());
                rows.push(format!("{}\tmessage\t{}", id, sanitize(&info.message)));
                rows.push(format!("{}\tcause\t{}", id, cause_id));
                for sup in suppressed_ids {
                    rows.push(format!("{}\tsuppressed\t{}", id, sup));
                }
                for frame in &info.frames {
                    rows.push(format!("{}\tframe\t{}", id, sanitize(frame)));
                }
                for row in rows {
                    if let Err(e) = exceptions.write_row(&row) {
                        self.report(&e);
                        writers.exceptions = None;
                        break;
                    }
                }
            }
        }
    }

    fn report(&self, err: &TraceError) {
        if let Some(sink) = &self.messages {
            sink.report(&format!("[{}] {}", err.error_code(), err));
        }
    }
}

fn sanitize(s: &str) -> String {
    s.replace(['\t', '\n', '\r'], " ")
}

/// Load the object-type side table into an id→type map
pub fn load_object_types(dir: &Path) -> Result<HashMap<i64, String>> {
    let mut types = HashMap::new();
    for row in read_text_rows(dir, &object_type_file_names())? {
        let (id, name) = row.split_once('\t').ok_or_else(|| TraceError::CorruptMetadata {
            table: "objtypes".to_string(),
            reason: format!("bad row '{}'", row),
        })?;
        let id: i64 = id.parse().map_err(|_| TraceError::CorruptMetadata {
            table: "objtypes".to_string(),
            reason: format!("bad object id '{}'", id),
        })?;
        types.insert(id, name.to_string());
    }
    Ok(types)
}
