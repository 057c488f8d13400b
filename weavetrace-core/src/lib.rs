//! # Weavetrace Core
//!
//! Core engine of a dynamic execution tracer:
//!
//! - **Registry**: assigns dense, monotonically increasing ids to woven
//!   classes, methods and instrumentation sites, committed atomically
//!   per class to append-only tables
//! - **Sinks**: receive the runtime event firehose and keep everything
//!   (stream), a bounded recent window (latest), counters (frequency),
//!   first-occurrence history snapshots (execute-before) or nothing
//! - **Object identities**: live references become small surrogate ids
//!   without being kept alive, with type/string/exception side tables
//! - **Reader**: replays the binary stream in order or by O(1) seek,
//!   links parameter runs and validates call-stack nesting
//!
//! ## Core Principle
//!
//! > Recording never fails the traced program.
//!
//! Errors at record time degrade the trace and are reported through a
//! [`MessageSink`]; errors at replay time are surfaced to the caller.
//!
//! ## Example
//!
//! ```rust
//! use weavetrace_core::registry::{
//!     Attributes, ClassInfo, Descriptor, EventType, MetadataRegistry, WeavingLevel,
//! };
//! use weavetrace_core::sink::{EventSink, StreamSink};
//! use weavetrace_core::reader::{DataIdMap, EventReader};
//! use weavetrace_core::OutputConfig;
//!
//! let dir = std::env::temp_dir().join(format!("weavetrace-doc-{}", std::process::id()));
//! let _ = std::fs::remove_dir_all(&dir);
//!
//! // Weave one class: a method with an entry site
//! let registry = MetadataRegistry::create(&dir).unwrap();
//! let mut log = registry.begin_class_weave().unwrap();
//! log.start_method("com/example/Main", "run", "()V", 1, None);
//! let entry = log
//!     .next_data_id(10, 0, EventType::MethodEntry, Descriptor::Void, Attributes::new())
//!     .unwrap();
//! let class = ClassInfo {
//!     class_id: log.class_id(),
//!     container: "build".to_string(),
//!     filename: "Main.class".to_string(),
//!     class_name: "com/example/Main".to_string(),
//!     weaving_level: WeavingLevel::Normal,
//!     content_hash: ClassInfo::content_hash_of(b"bytecode"),
//!     loader_ident: "app".to_string(),
//! };
//! registry.commit(&class, &log).unwrap();
//!
//! // Record one event
//! let sink = StreamSink::new(&OutputConfig::new(&dir)).unwrap();
//! sink.record_i64(entry, 0);
//! sink.close();
//!
//! // Replay it
//! let map = DataIdMap::load(&dir).unwrap();
//! let mut reader = EventReader::open(&dir, map).unwrap();
//! let event = reader.next_event().unwrap().unwrap();
//! assert_eq!(event.event_type, EventType::MethodEntry);
//! # let _ = std::fs::remove_dir_all(&dir);
//! ```

pub mod config;
pub mod error;
pub mod message;
pub mod objectid;
pub mod output;
pub mod reader;
pub mod registry;
pub mod sink;

// Re-export main types
pub use config::{DumpFormat, ObjectRetention, OutputConfig, SinkKind};
pub use error::{ErrorCategory, Result, TraceError};
pub use message::{
    FileMessageSink, MemoryMessageSink, MessageSink, SharedMessageSink, StderrMessageSink,
};
pub use objectid::{ExceptionInfo, ObjRef, ObjectIdFile, ObjectIdMap, TracedObject};
pub use reader::{CallStackVerifier, DataIdMap, Event, EventReader};
pub use registry::{
    ClassInfo, DataInfo, Descriptor, EventType, MetadataRegistry, MethodInfo, RecordedValue,
    WeaveLog, WeavingLevel,
};
pub use sink::{create_sink, DiscardSink, EventSink, FilterSink, StreamSink};

/// Version of the trace directory format
pub const TRACE_FORMAT_VERSION: &str = "1";
