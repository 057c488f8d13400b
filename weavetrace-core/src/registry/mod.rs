//! Static metadata registry
//!
//! The weaving component discovers classes, methods and instrumentation
//! sites; this module assigns them stable, dense, monotonically
//! increasing ids and persists them to three parallel append-only
//! tables. Ids are allocated tentatively inside a per-class [`WeaveLog`]
//! and become global only on [`MetadataRegistry::commit`], so failed
//! weave attempts never leave gaps or duplicates in the committed id
//! spaces.

mod descriptor;
mod event_type;
mod model;
mod store;
mod weave_log;

pub use descriptor::{
    encode_bool, encode_f32, encode_f64, encode_i16, encode_i32, encode_i8, encode_u16,
    Descriptor, RecordedValue,
};
pub use event_type::EventType;
pub use model::{
    descriptor_param_count, Attributes, ClassInfo, DataInfo, MethodInfo, WeavingLevel,
};
pub use store::{
    load_class_table, load_data_table, load_method_table, DataInfoListener, MetadataRegistry,
    CLASS_TABLE_FILE, DATA_TABLE_FILE, METHOD_TABLE_FILE,
};
pub use weave_log::WeaveLog;
