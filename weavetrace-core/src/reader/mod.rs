//! Trace replay
//!
//! Everything the recording side wrote comes back together here: the
//! metadata tables ([`DataIdMap`]), the rotated binary event files
//! ([`EventReader`]) and the nesting protocol over them
//! ([`CallStackVerifier`]).

mod call_stack;
mod data_id_map;
mod event;
mod event_reader;

pub use call_stack::{CallStackVerifier, Frame};
pub use data_id_map::DataIdMap;
pub use event::Event;
pub use event_reader::EventReader;
