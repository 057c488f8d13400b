//! Sequential and random access over a recorded event stream
//!
//! [`EventReader`] walks the rotated binary files of a trace directory
//! in strict event order, joining each 16-byte record with its site
//! metadata. Because every record has the same width and every file but
//! the last holds the same number of records, `seek(eventId)` is pure
//! arithmetic: file `eventId / perFile`, byte offset
//! `16 * (eventId % perFile)`. The per-file count is inferred from the
//! size of the first file when the trace spans several.
//!
//! With parameter linkage enabled (the default), an event that opens a
//! parameter run (method entry, call, invokedynamic) absorbs the
//! immediately following parameter sub-events recorded by the same
//! thread, up to the site's declared count. The first non-matching
//! record ends the run and is pushed back for normal delivery.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Result, TraceError};
use crate::output::{event_file_names, EventRecord, FileNameGenerator, EVENT_RECORD_BYTES};

use super::data_id_map::DataIdMap;
use super::event::Event;

struct Pending {
    event: Event,
    /// Whether the event already went through parameter linkage
    linked: bool,
}

/// Reader over the rotated binary event files of one trace
pub struct EventReader {
    dir: PathBuf,
    names: FileNameGenerator,
    map: Arc<DataIdMap>,
    events_per_file: u64,
    total_events: u64,
    file: Option<BufReader<File>>,
    open_file_index: u64,
    /// Id of the next record at the file cursor
    next_event_id: u64,
    /// Events read past and pushed back, keyed by event id
    pending: BTreeMap<u64, Pending>,
    link_params: bool,
}

impl EventReader {
    /// Open the event files in `dir`
    pub fn open(dir: &Path, map: Arc<DataIdMap>) -> Result<Self> {
        let names = event_file_names();
        let file_count = names.count_existing(dir);

        let mut sizes = Vec::with_capacity(file_count as usize);
        for index in 0..file_count {
            let len = std::fs::metadata(names.path(dir, index))
                .map_err(TraceError::io)?
                .len();
            if len % EVENT_RECORD_BYTES as u64 != 0 {
                return Err(TraceError::TruncatedRecord {
                    offset: len - len % EVENT_RECORD_BYTES as u64,
                });
            }
            sizes.push(len / EVENT_RECORD_BYTES as u64);
        }
        let total_events: u64 = sizes.iter().sum();
        // A single file never rotated, so any positive per-file count
        // satisfies the seek arithmetic
        let events_per_file = match sizes.first() {
            Some(&first) if file_count > 1 => first,
            Some(&first) => first.max(1),
            None => 1,
        };

        Ok(Self {
            dir: dir.to_path_buf(),
            names,
            map,
            events_per_file,
            total_events,
            file: None,
            open_file_index: 0,
            next_event_id: 0,
            pending: BTreeMap::new(),
            link_params: true,
        })
    }

    /// Disable parameter linkage; every record is delivered bare
    pub fn without_param_linkage(mut self) -> Self {
        self.link_params = false;
        self
    }

    /// Total number of events in the trace
    pub fn total_events(&self) -> u64 {
        self.total_events
    }

    /// The metadata index this reader resolves against
    pub fn map(&self) -> &Arc<DataIdMap> {
        &self.map
    }

    /// Deliver the next event in stream order, or `None` at the end
    pub fn next_event(&mut self) -> Result<Option<Event>> {
        match self.next_undelivered()? {
            None => Ok(None),
            Some((event, true)) => Ok(Some(event)),
            Some((mut event, false)) => {
                if self.link_params {
                    self.link(&mut event)?;
                }
                Ok(Some(event))
            }
        }
    }

    /// Deliver the next event recorded by `thread_id`
    ///
    /// Events of other threads read along the way are pushed back and
    /// delivered later in stream order.
    pub fn next_thread_event(&mut self, thread_id: i32) -> Result<Option<Event>> {
        let mut skipped = Vec::new();
        let result = loop {
            match self.next_event()? {
                None => break None,
                Some(event) if event.thread_id == thread_id => break Some(event),
                Some(event) => skipped.push(event),
            }
        };
        for event in skipped {
            self.pending.insert(
                event.event_id,
                Pending {
                    event,
                    linked: true,
                },
            );
        }
        Ok(result)
    }

    /// Push a delivered event back; it will be delivered again first
    pub fn cancel_read(&mut self, event: Event) {
        self.pending.insert(
            event.event_id,
            Pending {
                event,
                linked: true,
            },
        );
    }

    /// Reposition to `event_id` without scanning
    ///
    /// Seeking to `total_events()` is allowed and makes the next read
    /// return `None`. Pushed-back events are discarded.
    pub fn seek(&mut self, event_id: u64) -> Result<()> {
        if event_id > self.total_events {
            return Err(TraceError::SeekOutOfRange {
                event_id,
                total: self.total_events,
            });
        }
        self.pending.clear();
        self.next_event_id = event_id;
        self.file = None;
        Ok(())
    }

    /// Pushed-back events first (they precede the file cursor), then
    /// the record at the cursor. The flag reports whether the event has
    /// already been through linkage.
    fn next_undelivered(&mut self) -> Result<Option<(Event, bool)>> {
        if let Some((&id, _)) = self.pending.iter().next() {
            if let Some(pending) = self.pending.remove(&id) {
                return Ok(Some((pending.event, pending.linked)));
            }
        }
        Ok(self.read_at_cursor()?.map(|event| (event, false)))
    }

    fn read_at_cursor(&mut self) -> Result<Option<Event>> {
        if self.next_event_id >= self.total_events {
            return Ok(None);
        }
        let file_index = self.next_event_id / self.events_per_file;
        if self.file.is_none() || file_index != self.open_file_index {
            let offset = (self.next_event_id % self.events_per_file) * EVENT_RECORD_BYTES as u64;
            let mut file =
                File::open(self.names.path(&self.dir, file_index)).map_err(TraceError::io)?;
            file.seek(SeekFrom::Start(offset)).map_err(TraceError::io)?;
            self.file = Some(BufReader::new(file));
            self.open_file_index = file_index;
        }

        let reader = self.file.as_mut().ok_or_else(|| TraceError::InternalError {
            reason: "event reader has no open file".to_string(),
        })?;
        let mut buf = [0u8; EVENT_RECORD_BYTES];
        let offset = (self.next_event_id % self.events_per_file) * EVENT_RECORD_BYTES as u64;
        reader
            .read_exact(&mut buf)
            .map_err(|_| TraceError::TruncatedRecord { offset })?;
        let record = EventRecord::decode(&buf);

        let info = self
            .map
            .data_info(record.data_id)
            .ok_or_else(|| TraceError::CorruptMetadata {
                table: "dataids".to_string(),
                reason: format!(
                    "event {} references unknown dataId {}",
                    self.next_event_id, record.data_id
                ),
            })?;
        let event = Event::from_record(
            self.next_event_id,
            record.data_id,
            record.thread_id,
            record.raw_value,
            info,
        );
        self.next_event_id += 1;
        Ok(Some(event))
    }

    /// Absorb the parameter run following an opening event
    fn link(&mut self, event: &mut Event) -> Result<()> {
        let param_type = match event.event_type.parameter_event() {
            None => return Ok(()),
            Some(param_type) => param_type,
        };
        let expected = match self.map.data_info(event.data_id) {
            Some(info) => self.map.declared_param_count(info),
            None => 0,
        };
        for _ in 0..expected {
            let (candidate, linked) = match self.next_undelivered()? {
                None => break,
                Some(next) => next,
            };
            if !linked
                && candidate.thread_id == event.thread_id
                && candidate.event_type == param_type
            {
                event.params.push(candidate);
            } else {
                // Not part of the run; deliver it normally later
                self.pending.insert(
                    candidate.event_id,
                    Pending {
                        event: candidate,
                        linked,
                    },
                );
                break;
            }
        }
        Ok(())
    }
}
