//! Binary event stream, file rotation and thread identity

mod record;
mod rotation;
mod thread_id;

pub use record::{EventRecord, EVENT_RECORD_BYTES};
pub use rotation::{
    read_text_rows, FileNameGenerator, RotatingEventWriter, RotatingTextWriter,
    DEFAULT_SEQUENCE_DIGITS,
};
pub use thread_id::current_thread_id;

/// File name prefix of the binary event file sequence
pub const EVENT_FILE_PREFIX: &str = "events-";
/// File name suffix of the binary event file sequence
pub const EVENT_FILE_SUFFIX: &str = ".bin";

/// The standard name generator for binary event files
pub fn event_file_names() -> FileNameGenerator {
    FileNameGenerator::new(EVENT_FILE_PREFIX, EVENT_FILE_SUFFIX)
}
