//! Multi-file segmentation
//!
//! Trace output rolls over to a new file once a configured number of
//! records has been written, so no single file grows without bound and
//! the reader can locate event N with pure arithmetic: file
//! `N / max_per_file`, byte offset `16 * (N % max_per_file)`.
//!
//! Side tables (object types, string contents, exception chains) use the
//! same naming scheme but hold newline-delimited text rows.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, TraceError};

use super::record::{EventRecord, EVENT_RECORD_BYTES};

/// Default zero-padding width of the sequence number in file names
pub const DEFAULT_SEQUENCE_DIGITS: usize = 5;

/// Produces `prefix + zero-padded-sequence + suffix` file names
#[derive(Debug, Clone)]
pub struct FileNameGenerator {
    prefix: String,
    suffix: String,
    digits: usize,
}

impl FileNameGenerator {
    pub fn new<P: Into<String>, S: Into<String>>(prefix: P, suffix: S) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
            digits: DEFAULT_SEQUENCE_DIGITS,
        }
    }

    /// Name of the file with the given sequence number
    pub fn name(&self, index: u64) -> String {
        format!(
            "{}{:0width$}{}",
            self.prefix,
            index,
            self.suffix,
            width = self.digits
        )
    }

    /// Path of the file with the given sequence number
    pub fn path(&self, dir: &Path, index: u64) -> PathBuf {
        dir.join(self.name(index))
    }

    /// Count how many consecutive files of this sequence exist in `dir`
    pub fn count_existing(&self, dir: &Path) -> u64 {
        let mut index = 0;
        while self.path(dir, index).exists() {
            index += 1;
        }
        index
    }
}

/// Writes fixed-width event records across a rotating file sequence
pub struct RotatingEventWriter {
    dir: PathBuf,
    names: FileNameGenerator,
    max_per_file: u64,
    written: u64,
    file: Option<BufWriter<File>>,
}

impl RotatingEventWriter {
    pub fn new<P: Into<PathBuf>>(
        dir: P,
        names: FileNameGenerator,
        max_per_file: u64,
    ) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(TraceError::io)?;
        Ok(Self {
            dir,
            names,
            max_per_file: max_per_file.max(1),
            written: 0,
            file: None,
        })
    }

    /// Append one record, rolling over at the file boundary
    pub fn write_record(&mut self, record: &EventRecord) -> Result<()> {
        if self.written % self.max_per_file == 0 {
            // Flush the full file before opening the next one
            if let Some(mut prev) = self.file.take() {
                prev.flush().map_err(TraceError::io)?;
            }
            let path = self.names.path(&self.dir, self.written / self.max_per_file);
            let file = File::create(&path).map_err(TraceError::io)?;
            self.file = Some(BufWriter::new(file));
        }
        let writer = self.file.as_mut().ok_or_else(|| TraceError::InternalError {
            reason: "rotating writer has no open file".to_string(),
        })?;
        writer.write_all(&record.encode()).map_err(TraceError::io)?;
        self.written += 1;
        Ok(())
    }

    /// Total records written so far
    pub fn count(&self) -> u64 {
        self.written
    }

    pub fn flush(&mut self) -> Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush().map_err(TraceError::io)?;
        }
        Ok(())
    }
}

/// Writes newline-delimited text rows across a rotating file sequence
pub struct RotatingTextWriter {
    dir: PathBuf,
    names: FileNameGenerator,
    max_per_file: u64,
    written: u64,
    file: Option<BufWriter<File>>,
}

impl RotatingTextWriter {
    pub fn new<P: Into<PathBuf>>(
        dir: P,
        names: FileNameGenerator,
        max_per_file: u64,
    ) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(TraceError::io)?;
        Ok(Self {
            dir,
            names,
            max_per_file: max_per_file.max(1),
            written: 0,
            file: None,
        })
    }

    /// Append one row. Embedded newlines are replaced with spaces; the
    /// format is one record per line.
    pub fn write_row(&mut self, row: &str) -> Result<()> {
        if self.written % self.max_per_file == 0 {
            if let Some(mut prev) = self.file.take() {
                prev.flush().map_err(TraceError::io)?;
            }
            let path = self.names.path(&self.dir, self.written / self.max_per_file);
            let file = File::create(&path).map_err(TraceError::io)?;
            self.file = Some(BufWriter::new(file));
        }
        let writer = self.file.as_mut().ok_or_else(|| TraceError::InternalError {
            reason: "rotating writer has no open file".to_string(),
        })?;
        if row.contains('\n') || row.contains('\r') {
            let clean = row.replace(['\n', '\r'], " ");
            writeln!(writer, "{}", clean).map_err(TraceError::io)?;
        } else {
            writeln!(writer, "{}", row).map_err(TraceError::io)?;
        }
        self.written += 1;
        Ok(())
    }

    pub fn count(&self) -> u64 {
        self.written
    }

    pub fn flush(&mut self) -> Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush().map_err(TraceError::io)?;
        }
        Ok(())
    }
}

/// Read every row of a rotated text sequence back, in order
pub fn read_text_rows(dir: &Path, names: &FileNameGenerator) -> Result<Vec<String>> {
    use std::io::BufRead;

    let mut rows = Vec::new();
    let mut index = 0;
    loop {
        let path = names.path(dir, index);
        if !path.exists() {
            break;
        }
        let file = File::open(&path).map_err(TraceError::io)?;
        for line in std::io::BufReader::new(file).lines() {
            rows.push(line.map_err(TraceError::io)?);
        }
        index += 1;
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "weavetrace-rotation-{}-{}",
            tag,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_file_names() {
        let names = FileNameGenerator::new("events-", ".bin");
        assert_eq!(names.name(0), "events-00000.bin");
        assert_eq!(names.name(123), "events-00123.bin");
    }

    #[test]
    fn test_event_rotation_boundaries() {
        let dir = temp_dir("events");
        let names = FileNameGenerator::new("events-", ".bin");
        let mut writer = RotatingEventWriter::new(&dir, names.clone(), 10).unwrap();

        // 2 * max + 1 records => exactly 3 files
        for i in 0..21 {
            writer.write_record(&EventRecord::new(i, 0, i as i64)).unwrap();
        }
        writer.flush().unwrap();

        assert_eq!(names.count_existing(&dir), 3);
        assert_eq!(
            std::fs::metadata(names.path(&dir, 0)).unwrap().len(),
            10 * EVENT_RECORD_BYTES as u64
        );
        assert_eq!(
            std::fs::metadata(names.path(&dir, 2)).unwrap().len(),
            EVENT_RECORD_BYTES as u64
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_text_rotation_and_read_back() {
        let dir = temp_dir("text");
        let names = FileNameGenerator::new("strings-", ".txt");
        let mut writer = RotatingTextWriter::new(&dir, names.clone(), 2).unwrap();

        writer.write_row("1\tfirst").unwrap();
        writer.write_row("2\tsecond\nwith newline").unwrap();
        writer.write_row("3\tthird").unwrap();
        writer.flush().unwrap();

        assert_eq!(names.count_existing(&dir), 2);
        let rows = read_text_rows(&dir, &names).unwrap();
        assert_eq!(rows, vec!["1\tfirst", "2\tsecond with newline", "3\tthird"]);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
